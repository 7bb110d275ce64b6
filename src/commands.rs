use std::fmt;

use serde_json::Value;
use warden_core_types::{
    CommandHeaders, EntityId, EntityKey, JsonPointer, ResourceKey, ResourceType, SubjectId,
};

/// Closed set of enforcement categories; each maps to one handler.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CommandCategory {
    ThingWrite,
    ThingRead,
    PolicyWrite,
    PolicyRead,
    Message,
    Action,
    LiveSignal,
}

impl CommandCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandCategory::ThingWrite => "thing_write",
            CommandCategory::ThingRead => "thing_read",
            CommandCategory::PolicyWrite => "policy_write",
            CommandCategory::PolicyRead => "policy_read",
            CommandCategory::Message => "message",
            CommandCategory::Action => "action",
            CommandCategory::LiveSignal => "live_signal",
        }
    }
}

impl fmt::Display for CommandCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Thing(ThingCommand),
    Policy(PolicyCommand),
    Message(MessageCommand),
    Live(LiveSignal),
}

impl Command {
    pub fn category(&self) -> CommandCategory {
        match self {
            Command::Thing(cmd) if cmd.kind.is_read() => CommandCategory::ThingRead,
            Command::Thing(_) => CommandCategory::ThingWrite,
            Command::Policy(cmd) => match cmd.kind {
                PolicyCommandKind::Retrieve { .. } => CommandCategory::PolicyRead,
                PolicyCommandKind::ActivateTokenIntegration { .. }
                | PolicyCommandKind::DeactivateTokenIntegration { .. } => CommandCategory::Action,
                _ => CommandCategory::PolicyWrite,
            },
            Command::Message(_) => CommandCategory::Message,
            Command::Live(_) => CommandCategory::LiveSignal,
        }
    }

    pub fn entity_key(&self) -> EntityKey {
        match self {
            Command::Thing(cmd) => cmd.entity_key(),
            Command::Policy(cmd) => cmd.entity_key(),
            Command::Message(cmd) => EntityKey::new(ResourceType::Thing, cmd.thing_id.clone()),
            Command::Live(signal) => signal.command.entity_key(),
        }
    }

    /// Mutations drop cached permission state once they complete.
    pub fn invalidates_cache(&self) -> bool {
        match self {
            Command::Thing(cmd) => !cmd.kind.is_read(),
            Command::Policy(cmd) => !matches!(cmd.kind, PolicyCommandKind::Retrieve { .. }),
            Command::Message(_) | Command::Live(_) => false,
        }
    }

    pub fn headers(&self) -> &CommandHeaders {
        match self {
            Command::Thing(cmd) => &cmd.headers,
            Command::Policy(cmd) => &cmd.headers,
            Command::Message(cmd) => &cmd.headers,
            Command::Live(signal) => &signal.command.headers,
        }
    }

    pub fn headers_mut(&mut self) -> &mut CommandHeaders {
        match self {
            Command::Thing(cmd) => &mut cmd.headers,
            Command::Policy(cmd) => &mut cmd.headers,
            Command::Message(cmd) => &mut cmd.headers,
            Command::Live(signal) => &mut signal.command.headers,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Thing(cmd) => cmd.kind.name(),
            Command::Policy(cmd) => cmd.kind.name(),
            Command::Message(_) => "message.send",
            Command::Live(_) => "live.signal",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ThingCommand {
    pub thing_id: EntityId,
    pub kind: ThingCommandKind,
    pub headers: CommandHeaders,
}

impl ThingCommand {
    pub fn new(thing_id: EntityId, kind: ThingCommandKind, headers: CommandHeaders) -> Self {
        Self {
            thing_id,
            kind,
            headers,
        }
    }

    pub fn entity_key(&self) -> EntityKey {
        EntityKey::new(ResourceType::Thing, self.thing_id.clone())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ThingCommandKind {
    Create {
        thing: Value,
        /// Inline policy to create alongside the thing.
        initial_policy: Option<Value>,
        /// Existing policy the new thing should reference.
        policy_id: Option<EntityId>,
    },
    Modify {
        path: JsonPointer,
        value: Value,
    },
    ModifyPolicyId {
        policy_id: EntityId,
    },
    Delete,
    Retrieve {
        fields: Option<Vec<JsonPointer>>,
        inline_policy: bool,
    },
}

impl ThingCommandKind {
    pub fn is_read(&self) -> bool {
        matches!(self, ThingCommandKind::Retrieve { .. })
    }

    /// Resource the command touches and whether it needs write access.
    pub fn resource(&self) -> ResourceKey {
        let root = ResourceKey::root(ResourceType::Thing);
        match self {
            ThingCommandKind::Modify { path, .. } => ResourceKey::new(ResourceType::Thing, path.clone()),
            ThingCommandKind::ModifyPolicyId { .. } => root.child("policyId"),
            _ => root,
        }
    }

    /// Whether the command can change which policy governs the thing.
    pub fn changes_governance(&self) -> bool {
        match self {
            ThingCommandKind::Create { .. }
            | ThingCommandKind::ModifyPolicyId { .. }
            | ThingCommandKind::Delete => true,
            ThingCommandKind::Modify { path, .. } => {
                path.is_root() || path.segments().first().map(String::as_str) == Some("policyId")
            }
            ThingCommandKind::Retrieve { .. } => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ThingCommandKind::Create { .. } => "thing.create",
            ThingCommandKind::Modify { .. } => "thing.modify",
            ThingCommandKind::ModifyPolicyId { .. } => "thing.modify_policy_id",
            ThingCommandKind::Delete => "thing.delete",
            ThingCommandKind::Retrieve { .. } => "thing.retrieve",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PolicyCommand {
    pub policy_id: EntityId,
    pub kind: PolicyCommandKind,
    pub headers: CommandHeaders,
}

impl PolicyCommand {
    pub fn new(policy_id: EntityId, kind: PolicyCommandKind, headers: CommandHeaders) -> Self {
        Self {
            policy_id,
            kind,
            headers,
        }
    }

    pub fn entity_key(&self) -> EntityKey {
        EntityKey::new(ResourceType::Policy, self.policy_id.clone())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PolicyCommandKind {
    Create {
        policy: Value,
    },
    Modify {
        path: JsonPointer,
        value: Value,
    },
    Delete,
    Retrieve {
        path: JsonPointer,
    },
    ActivateTokenIntegration {
        labels: Vec<String>,
        subject_template: String,
        expiry: Option<String>,
        /// Filled in by enforcement: one resolved subject per label.
        resolved_subjects: Vec<SubjectId>,
    },
    DeactivateTokenIntegration {
        labels: Vec<String>,
        subject_template: String,
        resolved_subjects: Vec<SubjectId>,
    },
}

impl PolicyCommandKind {
    pub fn activate(labels: Vec<String>, subject_template: impl Into<String>) -> Self {
        PolicyCommandKind::ActivateTokenIntegration {
            labels,
            subject_template: subject_template.into(),
            expiry: None,
            resolved_subjects: Vec::new(),
        }
    }

    pub fn deactivate(labels: Vec<String>, subject_template: impl Into<String>) -> Self {
        PolicyCommandKind::DeactivateTokenIntegration {
            labels,
            subject_template: subject_template.into(),
            resolved_subjects: Vec::new(),
        }
    }

    pub fn resource(&self) -> ResourceKey {
        match self {
            PolicyCommandKind::Modify { path, .. } | PolicyCommandKind::Retrieve { path } => {
                ResourceKey::new(ResourceType::Policy, path.clone())
            }
            _ => ResourceKey::root(ResourceType::Policy),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PolicyCommandKind::Create { .. } => "policy.create",
            PolicyCommandKind::Modify { .. } => "policy.modify",
            PolicyCommandKind::Delete => "policy.delete",
            PolicyCommandKind::Retrieve { .. } => "policy.retrieve",
            PolicyCommandKind::ActivateTokenIntegration { .. } => "policy.activate_token_integration",
            PolicyCommandKind::DeactivateTokenIntegration { .. } => {
                "policy.deactivate_token_integration"
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MessageDirection {
    /// Sent to the thing; lands in its inbox.
    To,
    /// Emitted by the thing; lands in its outbox.
    From,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MessageCommand {
    pub thing_id: EntityId,
    pub feature_id: Option<String>,
    pub direction: MessageDirection,
    pub subject: String,
    pub payload: Value,
    pub headers: CommandHeaders,
}

impl MessageCommand {
    pub fn resource(&self) -> ResourceKey {
        let mut key = ResourceKey::root(ResourceType::Message);
        if let Some(feature) = &self.feature_id {
            key = key.child("features").child(feature.clone());
        }
        let box_name = match self.direction {
            MessageDirection::To => "inbox",
            MessageDirection::From => "outbox",
        };
        key.child(box_name).child("messages").child(self.subject.clone())
    }
}

/// A thing command travelling on the live channel.
#[derive(Clone, Debug, PartialEq)]
pub struct LiveSignal {
    pub command: ThingCommand,
}

impl LiveSignal {
    pub fn new(command: ThingCommand) -> Self {
        Self { command }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core_types::AuthorizationContext;

    fn headers() -> CommandHeaders {
        CommandHeaders::new(AuthorizationContext::default())
    }

    #[test]
    fn categories_follow_command_kind() {
        let retrieve = Command::Thing(ThingCommand::new(
            EntityId::new("org.example:t"),
            ThingCommandKind::Retrieve {
                fields: None,
                inline_policy: false,
            },
            headers(),
        ));
        assert_eq!(retrieve.category(), CommandCategory::ThingRead);
        assert!(!retrieve.invalidates_cache());

        let action = Command::Policy(PolicyCommand::new(
            EntityId::new("org.example:p"),
            PolicyCommandKind::activate(vec!["owner".into()], "integration:{{ policy-entry:label }}"),
            headers(),
        ));
        assert_eq!(action.category(), CommandCategory::Action);
        assert!(action.invalidates_cache());
        assert_eq!(action.entity_key(), EntityKey::policy("org.example:p"));
    }

    #[test]
    fn message_resource_includes_feature_and_box() {
        let message = MessageCommand {
            thing_id: EntityId::new("org.example:t"),
            feature_id: Some("lamp".into()),
            direction: MessageDirection::To,
            subject: "switch".into(),
            payload: Value::Null,
            headers: headers(),
        };
        assert_eq!(
            message.resource().to_string(),
            "message:/features/lamp/inbox/messages/switch"
        );
    }

    #[test]
    fn policy_id_modification_changes_governance() {
        let modify = ThingCommandKind::Modify {
            path: JsonPointer::parse("/policyId"),
            value: Value::String("org.example:other".into()),
        };
        assert!(modify.changes_governance());
        let attribute = ThingCommandKind::Modify {
            path: JsonPointer::parse("/attributes/x"),
            value: Value::Bool(true),
        };
        assert!(!attribute.changes_governance());
        assert_eq!(attribute.resource().to_string(), "thing:/attributes/x");
    }
}
