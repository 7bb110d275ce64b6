pub mod error;
pub mod lane;
pub mod metrics;
pub mod model;
pub mod runtime;

pub use error::SchedulerError;
pub use model::{CommitFuture, EnforcementTask, LaneState, PrepareFuture};
pub use runtime::EnforcementScheduler;
