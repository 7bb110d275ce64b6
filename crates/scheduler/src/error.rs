use thiserror::Error;
use warden_errors::prelude::*;

#[derive(Debug, Error, Clone)]
pub enum SchedulerError {
    #[error("task failed: {0}")]
    TaskFailed(ErrorObj),
    #[error("task panicked: {0}")]
    TaskPanicked(String),
}

impl From<SchedulerError> for ErrorObj {
    fn from(value: SchedulerError) -> Self {
        match value {
            SchedulerError::TaskFailed(err) => err,
            SchedulerError::TaskPanicked(msg) => ErrorBuilder::new(codes::INTERNAL)
                .dev_msg(format!("enforcement task panicked: {msg}"))
                .build(),
        }
    }
}
