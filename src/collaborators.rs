use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use warden_authz::Policy;
use warden_core_types::{EntityId, EntityKey};
use warden_errors::prelude::ErrorObj;

use crate::commands::Command;
use crate::response::CommandResponse;

/// Route to the component that owns an entity.
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Sends an authorized command and waits for the owner's answer.
    async fn ask(
        &self,
        key: &EntityKey,
        command: Command,
        timeout: Duration,
    ) -> Result<CommandResponse, ErrorObj>;

    /// Sends without waiting; answers, if any, come back through
    /// [`crate::EnforcementDispatcher::handle_live_response`].
    async fn publish(&self, key: &EntityKey, command: Command) -> Result<(), ErrorObj>;
}

/// Read access to persisted permission state. `Ok(None)` means the entity
/// is known not to exist; `Err` is a transient failure.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn policy(&self, id: &EntityId) -> Result<Option<Policy>, ErrorObj>;

    async fn thing_policy_id(&self, id: &EntityId) -> Result<Option<EntityId>, ErrorObj>;
}

#[derive(Default)]
pub struct InMemoryEntityStore {
    policies: DashMap<EntityId, Policy>,
    things: DashMap<EntityId, EntityId>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_policy(&self, id: EntityId, policy: Policy) {
        self.policies.insert(id, policy);
    }

    pub fn remove_policy(&self, id: &EntityId) -> bool {
        self.policies.remove(id).is_some()
    }

    pub fn put_thing(&self, id: EntityId, policy_id: EntityId) {
        self.things.insert(id, policy_id);
    }

    pub fn remove_thing(&self, id: &EntityId) -> bool {
        self.things.remove(id).is_some()
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn policy(&self, id: &EntityId) -> Result<Option<Policy>, ErrorObj> {
        Ok(self.policies.get(id).map(|policy| policy.clone()))
    }

    async fn thing_policy_id(&self, id: &EntityId) -> Result<Option<EntityId>, ErrorObj> {
        Ok(self.things.get(id).map(|policy_id| policy_id.clone()))
    }
}
