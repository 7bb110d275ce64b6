use thiserror::Error;
use warden_errors::prelude::*;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("unsupported config path: {0}")]
    UnsupportedPath(String),
    #[error("invalid value for {path}: {reason}")]
    InvalidValue { path: String, reason: String },
}

impl From<ConfigError> for ErrorObj {
    fn from(value: ConfigError) -> Self {
        ErrorBuilder::new(codes::PRECONDITION_FAILED)
            .user_msg("Configuration is invalid.")
            .dev_msg(value.to_string())
            .build()
    }
}
