pub mod engine;
pub mod enforcer;
pub mod errors;
pub mod model;
pub mod placeholders;
pub mod prelude;

pub use engine::{
    authorize_action, authorize_creation, authorize_read, authorize_write, build_redacted_view,
    decide_read, decide_write, ActionRejection, Decision, Governance,
};
pub use enforcer::PolicyEnforcer;
pub use errors::AuthzError;
pub use model::{EffectedPermissions, Permission, Permissions, Policy, PolicyEntry};
