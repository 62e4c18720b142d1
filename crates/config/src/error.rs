use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<ConfigError> for ragsvc_core::Error {
    fn from(err: ConfigError) -> Self {
        ragsvc_core::Error::Config(err.to_string())
    }
}
