//! Application state shared across all handlers.

use std::collections::HashMap;
use std::sync::Arc;

use ragsvc_config::{Settings, UserRecord};
use ragsvc_core::registry::CollectionRegistry;
use ragsvc_core::traits::{LanguageModel, Retriever};
use ragsvc_orchestrator::{CourseOrchestrator, QcmOrchestrator};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<CollectionRegistry>,
    pub retriever: Arc<dyn Retriever>,
    pub llm: Arc<dyn LanguageModel>,
    pub course_orchestrator: Arc<CourseOrchestrator>,
    pub qcm_orchestrator: Arc<QcmOrchestrator>,
    /// Bearer token -> user record, built once from `settings.auth.token_list`.
    pub users: Arc<HashMap<String, UserRecord>>,
}

impl AppState {
    pub fn new(
        settings: Arc<Settings>,
        registry: Arc<CollectionRegistry>,
        retriever: Arc<dyn Retriever>,
        llm: Arc<dyn LanguageModel>,
        course_orchestrator: Arc<CourseOrchestrator>,
        qcm_orchestrator: Arc<QcmOrchestrator>,
    ) -> Self {
        let users = settings
            .auth
            .parse_users()
            .into_iter()
            .map(|u| (u.token.clone(), u))
            .collect();

        Self {
            settings,
            registry,
            retriever,
            llm,
            course_orchestrator,
            qcm_orchestrator,
            users: Arc::new(users),
        }
    }
}
