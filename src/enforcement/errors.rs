use std::time::Duration;

use serde_json::json;
use warden_authz::Decision;
use warden_core_types::{EntityId, EntityKey, ResourceType};
use warden_errors::prelude::*;

/// What the rejected command tried to do.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Access {
    Read,
    Modify,
    Create,
    Send,
}

fn denial_code(resource_type: ResourceType, access: Access) -> ErrorCode {
    match (resource_type, access) {
        (_, Access::Send) | (ResourceType::Message, _) => codes::MESSAGE_SEND_NOT_ALLOWED,
        (ResourceType::Thing, Access::Read) => codes::THING_NOT_ACCESSIBLE,
        (ResourceType::Thing, Access::Modify) => codes::THING_NOT_MODIFIABLE,
        (ResourceType::Thing, Access::Create) => codes::THING_NOT_CREATABLE,
        (ResourceType::Policy, Access::Read) => codes::POLICY_NOT_ACCESSIBLE,
        (ResourceType::Policy, Access::Modify | Access::Create) => codes::POLICY_NOT_MODIFIABLE,
    }
}

fn noun(resource_type: ResourceType) -> &'static str {
    match resource_type {
        ResourceType::Thing | ResourceType::Message => "Thing",
        ResourceType::Policy => "Policy",
    }
}

/// The entity does not exist, or the caller may not know that it does.
pub(crate) fn not_found(key: &EntityKey) -> ErrorObj {
    let code = match key.resource_type {
        ResourceType::Policy => codes::POLICY_NOT_ACCESSIBLE,
        _ => codes::THING_NOT_ACCESSIBLE,
    };
    ErrorBuilder::new(code)
        .user_msg(format!(
            "The {} with ID '{}' could not be found or requester had insufficient permissions to access it.",
            noun(key.resource_type),
            key.id
        ))
        .meta_kv("entity", json!(key.to_string()))
        .build()
}

fn denied(key: &EntityKey, access: Access) -> ErrorObj {
    let verb = match access {
        Access::Read => "accessed",
        Access::Modify => "modified",
        Access::Create => "created",
        Access::Send => "messaged",
    };
    ErrorBuilder::new(denial_code(key.resource_type, access))
        .user_msg(format!(
            "The {} with ID '{}' could not be {verb} as the requester had insufficient permissions.",
            noun(key.resource_type),
            key.id
        ))
        .meta_kv("entity", json!(key.to_string()))
        .build()
}

fn ungoverned(key: &EntityKey, access: Access, policy_id: &EntityId) -> ErrorObj {
    ErrorBuilder::new(denial_code(key.resource_type, access))
        .user_msg(format!(
            "The {} with ID '{}' is not governed by an existing Policy.",
            noun(key.resource_type),
            key.id
        ))
        .description(format!(
            "The Policy with ID '{policy_id}' referenced by it could not be found. \
             Recreate the Policy with that ID to regain access."
        ))
        .meta_kv("entity", json!(key.to_string()))
        .meta_kv("policyId", json!(policy_id.as_str()))
        .build()
}

/// Maps a negative decision to the error family of the command.
pub(crate) fn rejection(key: &EntityKey, access: Access, decision: Decision) -> ErrorObj {
    match decision {
        Decision::Deny => denied(key, access),
        Decision::Missing => not_found(key),
        Decision::Ungoverned { policy_id } => ungoverned(key, access, &policy_id),
        Decision::Allow => ErrorBuilder::new(codes::INTERNAL)
            .dev_msg("allowed decision treated as rejection")
            .build(),
    }
}

pub(crate) fn not_creatable(key: &EntityKey, reason: &str) -> ErrorObj {
    ErrorBuilder::new(denial_code(key.resource_type, Access::Create))
        .user_msg(format!(
            "The {} with ID '{}' could not be created.",
            noun(key.resource_type),
            key.id
        ))
        .dev_msg(reason)
        .meta_kv("entity", json!(key.to_string()))
        .build()
}

pub(crate) fn action_failed(key: &EntityKey, action: &str, reason: &str) -> ErrorObj {
    ErrorBuilder::new(codes::POLICY_ACTION_FAILED)
        .user_msg(format!(
            "The action '{action}' could not be executed on the Policy with ID '{}'.",
            key.id
        ))
        .dev_msg(reason)
        .meta_kv("entity", json!(key.to_string()))
        .build()
}

pub(crate) fn unavailable(key: &EntityKey, timeout: Duration) -> ErrorObj {
    ErrorBuilder::new(codes::SERVICE_UNAVAILABLE)
        .dev_msg(format!(
            "no answer from the owner of {key} within {}ms",
            timeout.as_millis()
        ))
        .meta_kv("entity", json!(key.to_string()))
        .build()
}

/// A pending response slot given up to make room for newer ones.
pub(crate) fn displaced(key: &EntityKey) -> ErrorObj {
    ErrorBuilder::new(codes::SERVICE_UNAVAILABLE)
        .dev_msg(format!("too many pending responses; gave up waiting for {key}"))
        .meta_kv("entity", json!(key.to_string()))
        .build()
}

pub(crate) fn timed_out(key: &EntityKey, timeout: Duration) -> ErrorObj {
    ErrorBuilder::new(codes::COMMAND_TIMEOUT)
        .dev_msg(format!(
            "no response for {key} within {}ms",
            timeout.as_millis()
        ))
        .meta_kv("entity", json!(key.to_string()))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denial_family_follows_access_kind() {
        let thing = EntityKey::thing("org.example:lamp");
        let policy = EntityKey::policy("org.example:lamp");
        assert!(rejection(&thing, Access::Modify, Decision::Deny).is(codes::THING_NOT_MODIFIABLE));
        assert!(rejection(&thing, Access::Read, Decision::Deny).is(codes::THING_NOT_ACCESSIBLE));
        assert!(rejection(&thing, Access::Send, Decision::Deny).is(codes::MESSAGE_SEND_NOT_ALLOWED));
        assert!(rejection(&policy, Access::Modify, Decision::Deny).is(codes::POLICY_NOT_MODIFIABLE));
        assert!(rejection(&policy, Access::Modify, Decision::Missing).is(codes::POLICY_NOT_ACCESSIBLE));
    }

    #[test]
    fn ungoverned_rejection_explains_how_to_recover() {
        let thing = EntityKey::thing("org.example:lamp");
        let err = rejection(
            &thing,
            Access::Modify,
            Decision::Ungoverned {
                policy_id: EntityId::new("org.example:gone"),
            },
        );
        assert!(err.is(codes::THING_NOT_MODIFIABLE));
        assert!(err.description.unwrap().contains("org.example:gone"));
    }
}
