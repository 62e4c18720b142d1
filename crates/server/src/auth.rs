//! Bearer-token authentication middleware.
//!
//! A request's `Authorization: Bearer <token>` header is looked up
//! against the user allowlist parsed from `settings.auth.token_list`.
//! Public paths (health/readiness) bypass the check entirely; when auth
//! is disabled in configuration, every request bypasses it (logged once).

use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::state::AppState;

static AUTH_DISABLED_WARNED: AtomicBool = AtomicBool::new(false);

pub async fn auth_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let auth_config = &state.settings.server.auth;

    if !auth_config.enabled {
        if !AUTH_DISABLED_WARNED.swap(true, Ordering::Relaxed) {
            tracing::warn!("bearer-token authentication is disabled");
        }
        return next.run(request).await;
    }

    let path = request.uri().path();
    if auth_config.public_paths.iter().any(|p| path.starts_with(p.as_str())) {
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        None => (StatusCode::UNAUTHORIZED, "missing bearer token").into_response(),
        Some(token) => match state.users.get(token) {
            Some(_user) => next.run(request).await,
            None => (StatusCode::UNAUTHORIZED, "invalid bearer token").into_response(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragsvc_config::{ServerAuthConfig, Settings, UserRecord};
    use std::collections::HashMap;

    fn users_map() -> HashMap<String, UserRecord> {
        let mut m = HashMap::new();
        m.insert(
            "tok-1".to_string(),
            UserRecord {
                token: "tok-1".to_string(),
                user_id: "u1".to_string(),
                name: "Alice".to_string(),
            },
        );
        m
    }

    #[test]
    fn public_path_bypasses_even_when_enabled() {
        let mut settings = Settings::default();
        settings.server.auth = ServerAuthConfig {
            enabled: true,
            public_paths: vec!["/health".to_string()],
        };
        assert!(settings.server.auth.public_paths.iter().any(|p| "/health".starts_with(p.as_str())));
    }

    #[test]
    fn unknown_token_is_absent_from_user_map() {
        let users = users_map();
        assert!(users.get("tok-1").is_some());
        assert!(users.get("tok-unknown").is_none());
    }
}
