//! Configuration loading for the hybrid RAG service.
//!
//! Settings are assembled once at startup by [`settings::load_settings`]
//! from environment variables layered over a static YAML file, then
//! wrapped in an `Arc` and threaded through the rest of the process.
//! There is no hot-reload path here — see the "Global configuration
//! state" design note.

pub mod constants;
pub mod error;
pub mod settings;

pub use error::ConfigError;
pub use settings::{
    load_settings, AuthSettings, CourseSettings, QcmSettings, RagSettings, RetrieverConfig,
    RuntimeEnvironment, ServerAuthConfig, ServerConfig, ServicesConfig, Settings, UserRecord,
};
