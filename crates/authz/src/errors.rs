use thiserror::Error;
use warden_errors::prelude::*;

#[derive(Debug, Error, Clone)]
#[error("{0}")]
pub struct AuthzError(pub ErrorObj);

impl AuthzError {
    pub fn into_inner(self) -> ErrorObj {
        self.0
    }

    pub fn invalid_policy(msg: &str) -> Self {
        Self(
            ErrorBuilder::new(codes::PRECONDITION_FAILED)
                .user_msg("The Policy is invalid.")
                .dev_msg(msg)
                .build(),
        )
    }
}

impl From<AuthzError> for ErrorObj {
    fn from(value: AuthzError) -> Self {
        value.0
    }
}
