//! Hybrid RAG Service Entry Point

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use ragsvc_core::registry::CollectionRegistry;
use ragsvc_core::traits::{LanguageModel, Retriever};
use ragsvc_llm::{BackendConfig, OllamaBackend, OpenAiBackend};
use ragsvc_orchestrator::{CourseOrchestrator, FileserverClient, QcmOrchestrator};
use ragsvc_rag::{HybridRetriever, Lemmatizer, LexicalIndex, LexicalSearchClient, VectorSearchClient, VectorSearchConfig};
use ragsvc_server::{create_router, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let env = std::env::var("RAGSVC_ENV").ok();
    let settings = match ragsvc_config::load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load configuration, using defaults");
            ragsvc_config::Settings::default()
        }
    };

    tracing::info!(
        environment = ?settings.environment,
        port = settings.server.port,
        "starting hybrid RAG service"
    );

    let registry = Arc::new(CollectionRegistry::load_from_file(&settings.registry_path)?);

    let vector_client = VectorSearchClient::new(VectorSearchConfig {
        endpoint: settings.services.vector_store_url.clone(),
        api_key: settings.services.vector_store_api_key.clone(),
        embedding_url: settings.services.embedding_url.clone(),
        embedding_model: None,
        timeout: std::time::Duration::from_secs(10),
    })?;

    let lemmatizer = Lemmatizer::load()?;
    let lexical_client = LexicalSearchClient::new(lemmatizer);

    let mut lexical_indexes: HashMap<String, Arc<LexicalIndex>> = HashMap::new();
    for name in registry.collection_names() {
        let entry = registry.resolve(name)?;
        let path = Path::new(&settings.services.lexical_index_dir).join(&entry.lexical_index_id);
        let index = LexicalIndex::open(&path).map_err(|e| {
            tracing::error!(collection = name, path = %path.display(), error = %e, "failed to open lexical index");
            e
        })?;
        lexical_indexes.insert(name.to_string(), Arc::new(index));
    }

    let retriever: Arc<dyn Retriever> = Arc::new(HybridRetriever::new(
        vector_client,
        lexical_client,
        lexical_indexes,
        registry.clone(),
        settings.retriever.clone(),
    ));

    let llm: Arc<dyn LanguageModel> = build_llm_backend(&settings)?;

    let course_orchestrator = Arc::new(CourseOrchestrator::new(
        retriever.clone(),
        llm.clone(),
        settings.course.clone(),
        settings.services.fileserver_internal_base.clone(),
        settings.services.fileserver_public_base.clone(),
    ));

    let fileserver = FileserverClient::new(
        settings.services.fileserver_internal_base.clone(),
        settings.services.fileserver_public_base.clone(),
    );
    let qcm_orchestrator = Arc::new(QcmOrchestrator::new(
        retriever.clone(),
        llm.clone(),
        settings.qcm.clone(),
        fileserver,
        settings.services.fileserver_internal_base.clone(),
        settings.services.fileserver_public_base.clone(),
    ));

    let port = settings.server.port;
    let state = AppState::new(
        Arc::new(settings),
        registry,
        retriever,
        llm,
        course_orchestrator,
        qcm_orchestrator,
    );

    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn build_llm_backend(settings: &ragsvc_config::Settings) -> Result<Arc<dyn LanguageModel>, Box<dyn std::error::Error>> {
    let config = BackendConfig {
        endpoint: settings.services.llm_url.clone(),
        model: settings.rag.model.clone(),
        api_key: settings.services.llm_api_key.clone(),
        ..BackendConfig::default()
    };

    match settings.services.llm_backend.as_str() {
        "openai" => Ok(Arc::new(OpenAiBackend::new(config)?)),
        other => {
            if other != "ollama" {
                tracing::warn!(backend = other, "unknown llm_backend, defaulting to ollama");
            }
            Ok(Arc::new(OllamaBackend::new(config)?))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl+c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received ctrl+c, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("received sigterm, initiating graceful shutdown");
        }
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ragsvc=info,tower_http=debug".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
