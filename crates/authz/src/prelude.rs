pub use crate::engine::*;
pub use crate::enforcer::PolicyEnforcer;
pub use crate::errors::AuthzError;
pub use crate::model::{EffectedPermissions, Permission, Permissions, Policy, PolicyEntry};
pub use crate::placeholders::{resolve_entry_label, PlaceholderError};
