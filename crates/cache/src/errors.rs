use thiserror::Error;
use warden_errors::prelude::*;

#[derive(Debug, Error, Clone)]
#[error("{0}")]
pub struct CacheError(pub Box<ErrorObj>);

impl CacheError {
    pub fn into_inner(self) -> ErrorObj {
        *self.0
    }

    pub fn load_failed(msg: &str) -> Self {
        Self(Box::new(
            ErrorBuilder::new(codes::CACHE_LOAD_FAILED)
                .dev_msg(msg)
                .build(),
        ))
    }

    pub fn precondition(msg: &str) -> Self {
        Self(Box::new(
            ErrorBuilder::new(codes::PRECONDITION_FAILED)
                .user_msg("The request is invalid.")
                .dev_msg(msg)
                .build(),
        ))
    }

    pub fn unknown(msg: &str) -> Self {
        Self(Box::new(
            ErrorBuilder::new(codes::INTERNAL)
                .user_msg("Cache internal error.")
                .dev_msg(msg)
                .build(),
        ))
    }
}

impl From<ErrorObj> for CacheError {
    fn from(value: ErrorObj) -> Self {
        Self(Box::new(value))
    }
}

impl From<CacheError> for ErrorObj {
    fn from(value: CacheError) -> Self {
        value.into_inner()
    }
}
