use serde_json::Value;
use thiserror::Error;
use warden_core_types::{AuthorizationContext, EntityId, ResourceKey, ResourceType, SubjectId};

use crate::enforcer::PolicyEnforcer;
use crate::model::{Permission, Permissions, Policy};
use crate::placeholders::{resolve_entry_label, PlaceholderError};

/// What is known about the permission state of an entity.
#[derive(Clone, Copy, Debug)]
pub enum Governance<'a> {
    Governed(&'a PolicyEnforcer),
    /// The entity exists but the policy it references does not.
    Ungoverned { policy_id: &'a EntityId },
    Missing,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
    Ungoverned { policy_id: EntityId },
    Missing,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

pub fn authorize_write(
    enforcer: &PolicyEnforcer,
    resource: &ResourceKey,
    context: &AuthorizationContext,
    required: &Permissions,
) -> bool {
    enforcer.has_unrestricted_permissions(resource, context.subjects(), required)
}

/// Weaker than [`authorize_write`]: results are filtered per field afterwards.
pub fn authorize_read(
    enforcer: &PolicyEnforcer,
    resource: &ResourceKey,
    context: &AuthorizationContext,
) -> bool {
    enforcer.has_partial_permissions(
        resource,
        context.subjects(),
        &Permissions::of(Permission::Read),
    )
}

pub fn decide_write(
    governance: Governance<'_>,
    resource: &ResourceKey,
    context: &AuthorizationContext,
    required: &Permissions,
) -> Decision {
    match governance {
        Governance::Governed(enforcer) if authorize_write(enforcer, resource, context, required) => {
            Decision::Allow
        }
        Governance::Governed(_) => Decision::Deny,
        Governance::Ungoverned { policy_id } => Decision::Ungoverned {
            policy_id: policy_id.clone(),
        },
        Governance::Missing => Decision::Missing,
    }
}

pub fn decide_read(
    governance: Governance<'_>,
    resource: &ResourceKey,
    context: &AuthorizationContext,
) -> Decision {
    match governance {
        Governance::Governed(enforcer) if authorize_read(enforcer, resource, context) => {
            Decision::Allow
        }
        Governance::Governed(_) => Decision::Deny,
        Governance::Ungoverned { policy_id } => Decision::Ungoverned {
            policy_id: policy_id.clone(),
        },
        Governance::Missing => Decision::Missing,
    }
}

/// Filters `full_entity` down to readable fields; `always_visible` top-level
/// fields are copied over regardless of permissions.
pub fn build_redacted_view(
    enforcer: &PolicyEnforcer,
    resource_type: ResourceType,
    full_entity: &Value,
    context: &AuthorizationContext,
    always_visible: &[String],
) -> Value {
    let mut view = enforcer.build_json_view(
        resource_type,
        full_entity,
        context.subjects(),
        Permission::Read,
    );
    if let (Value::Object(target), Value::Object(source)) = (&mut view, full_entity) {
        for field in always_visible {
            if let Some(value) = source.get(field) {
                target.insert(field.clone(), value.clone());
            }
        }
    }
    view
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionRejection {
    #[error("missing {permission} on {resource}")]
    NotAllowed {
        resource: ResourceKey,
        permission: Permission,
    },
    #[error("subject of policy entry '{label}' could not be resolved: {reason}")]
    InvalidSubject {
        label: String,
        reason: PlaceholderError,
    },
}

/// Authorizes a policy action on one entry and returns the subject the
/// action should target once placeholders are resolved.
pub fn authorize_action(
    enforcer: &PolicyEnforcer,
    label: &str,
    action: &str,
    subject_template: &str,
    context: &AuthorizationContext,
    required: Permission,
) -> Result<SubjectId, ActionRejection> {
    let subject = resolve_entry_label(subject_template, label).map_err(|reason| {
        ActionRejection::InvalidSubject {
            label: label.to_string(),
            reason,
        }
    })?;
    let resource = ResourceKey::root(ResourceType::Policy)
        .child("entries")
        .child(label)
        .child("actions")
        .child(action);
    if enforcer.has_unrestricted_permissions(
        &resource,
        context.subjects(),
        &Permissions::of(required),
    ) {
        Ok(SubjectId::new(subject))
    } else {
        Err(ActionRejection::NotAllowed {
            resource,
            permission: required,
        })
    }
}

/// Self-authorization of a create: the command's own initial policy is the
/// candidate snapshot. Without one, the requesting subject alone is authorized.
pub fn authorize_creation(
    candidate: Option<&Policy>,
    resource: &ResourceKey,
    context: &AuthorizationContext,
    required: &Permissions,
) -> bool {
    match candidate {
        Some(policy) => {
            let enforcer = PolicyEnforcer::new(policy.clone());
            authorize_write(&enforcer, resource, context, required)
        }
        None => context.first_subject().is_some(),
    }
}
