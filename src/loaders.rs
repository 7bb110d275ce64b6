use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;
use warden_authz::{Governance, Permission, PolicyEnforcer};
use warden_cache::prelude::*;
use warden_core_types::{EntityId, EntityKey, ResourceKey, ResourceType, SubjectId};

use crate::collaborators::EntityStore;

pub type EnforcerCache = EntryCache<EntityKey, Arc<PolicyEnforcer>>;
pub type PolicyIdCache = EntryCache<EntityKey, EntityId>;
pub type ReadSubjectsCache = ProjectedCache<EntityKey, Arc<PolicyEnforcer>, Arc<Vec<SubjectId>>>;

/// Loads the enforcer of a policy key.
pub struct PolicyEnforcerLoader {
    store: Arc<dyn EntityStore>,
}

impl PolicyEnforcerLoader {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EntryLoader<EntityKey, Arc<PolicyEnforcer>> for PolicyEnforcerLoader {
    async fn load(&self, key: &EntityKey) -> Result<Entry<Arc<PolicyEnforcer>>, CacheError> {
        let policy = self.store.policy(&key.id).await?;
        trace!(key = %key, found = policy.is_some(), "policy loaded");
        Ok(policy.map(|policy| Arc::new(PolicyEnforcer::new(policy))).into())
    }
}

/// Loads the id of the policy governing a thing key.
pub struct ThingPolicyIdLoader {
    store: Arc<dyn EntityStore>,
}

impl ThingPolicyIdLoader {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EntryLoader<EntityKey, EntityId> for ThingPolicyIdLoader {
    async fn load(&self, key: &EntityKey) -> Result<Entry<EntityId>, CacheError> {
        Ok(self.store.thing_policy_id(&key.id).await?.into())
    }
}

pub fn policy_key(policy_id: &EntityId) -> EntityKey {
    EntityKey::new(ResourceType::Policy, policy_id.clone())
}

/// Subjects allowed to see at least part of a thing.
pub fn read_subjects_of(enforcer: &PolicyEnforcer) -> Vec<SubjectId> {
    enforcer.subjects_with_partial_permission(&ResourceKey::root(ResourceType::Thing), Permission::Read)
}

#[derive(Clone, Debug)]
pub enum ThingEnforcement {
    Governed {
        policy_id: EntityId,
        enforcer: Arc<PolicyEnforcer>,
    },
    /// The thing references a policy that does not exist.
    Ungoverned { policy_id: EntityId },
    Missing,
}

impl ThingEnforcement {
    pub fn governance(&self) -> Governance<'_> {
        match self {
            ThingEnforcement::Governed { enforcer, .. } => Governance::Governed(enforcer.as_ref()),
            ThingEnforcement::Ungoverned { policy_id } => Governance::Ungoverned { policy_id },
            ThingEnforcement::Missing => Governance::Missing,
        }
    }

    pub fn policy_id(&self) -> Option<&EntityId> {
        match self {
            ThingEnforcement::Governed { policy_id, .. }
            | ThingEnforcement::Ungoverned { policy_id } => Some(policy_id),
            ThingEnforcement::Missing => None,
        }
    }

    pub fn enforcer(&self) -> Option<&Arc<PolicyEnforcer>> {
        match self {
            ThingEnforcement::Governed { enforcer, .. } => Some(enforcer),
            _ => None,
        }
    }
}

/// Resolves a thing's enforcer through the thing -> policy id indirection.
#[derive(Clone)]
pub struct ThingEnforcerLoader {
    policy_ids: PolicyIdCache,
    enforcers: EnforcerCache,
}

impl ThingEnforcerLoader {
    pub fn new(policy_ids: PolicyIdCache, enforcers: EnforcerCache) -> Self {
        Self {
            policy_ids,
            enforcers,
        }
    }

    pub async fn load(&self, thing: &EntityKey) -> Result<ThingEnforcement, CacheError> {
        let Some(policy_id) = self.policy_ids.get(thing).await?.into_value() else {
            return Ok(ThingEnforcement::Missing);
        };
        let enforcement = match self.enforcers.get(&policy_key(&policy_id)).await? {
            Entry::Present(enforcer) => ThingEnforcement::Governed {
                policy_id,
                enforcer,
            },
            Entry::Nonexistent => ThingEnforcement::Ungoverned { policy_id },
        };
        Ok(enforcement)
    }

    /// Drops the cached policy id of `thing`; the policy's enforcer stays.
    pub fn invalidate(&self, thing: &EntityKey) -> bool {
        self.policy_ids.invalidate(thing)
    }

    pub fn enforcers(&self) -> &EnforcerCache {
        &self.enforcers
    }

    pub fn policy_ids(&self) -> &PolicyIdCache {
        &self.policy_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::InMemoryEntityStore;
    use warden_authz::{EffectedPermissions, Policy, PolicyEntry};

    fn loader(store: Arc<InMemoryEntityStore>) -> ThingEnforcerLoader {
        let policy_ids = EntryCache::new(
            "thing-policy-ids",
            CachePolicy::default(),
            Arc::new(ThingPolicyIdLoader::new(store.clone())),
        );
        let enforcers = EntryCache::new(
            "policy-enforcers",
            CachePolicy::default(),
            Arc::new(PolicyEnforcerLoader::new(store)),
        );
        ThingEnforcerLoader::new(policy_ids, enforcers)
    }

    #[tokio::test]
    async fn resolves_governed_ungoverned_and_missing_things() {
        let store = Arc::new(InMemoryEntityStore::new());
        let policy_id = EntityId::new("org.example:policy");
        store.put_policy(
            policy_id.clone(),
            Policy::new(Some(policy_id.clone())).with_entry(
                PolicyEntry::new("owner")
                    .with_subject("google:alice", "user")
                    .with_resource(
                        ResourceKey::root(ResourceType::Thing),
                        EffectedPermissions::granting([Permission::Read]),
                    ),
            ),
        );
        store.put_thing(EntityId::new("org.example:lamp"), policy_id.clone());
        store.put_thing(EntityId::new("org.example:orphan"), EntityId::new("org.example:gone"));
        let loader = loader(store);

        let governed = loader.load(&EntityKey::thing("org.example:lamp")).await.unwrap();
        assert_eq!(governed.policy_id(), Some(&policy_id));
        let readers = read_subjects_of(governed.enforcer().unwrap());
        assert_eq!(readers, vec![SubjectId::new("google:alice")]);

        let orphan = loader.load(&EntityKey::thing("org.example:orphan")).await.unwrap();
        assert!(matches!(orphan, ThingEnforcement::Ungoverned { .. }));

        let missing = loader.load(&EntityKey::thing("org.example:nope")).await.unwrap();
        assert!(matches!(missing, ThingEnforcement::Missing));
    }

    #[tokio::test]
    async fn invalidation_picks_up_a_new_policy_reference() {
        let store = Arc::new(InMemoryEntityStore::new());
        let thing = EntityKey::thing("org.example:lamp");
        store.put_thing(thing.id.clone(), EntityId::new("org.example:a"));
        let loader = loader(store.clone());

        let first = loader.load(&thing).await.unwrap();
        assert_eq!(first.policy_id().unwrap().as_str(), "org.example:a");

        store.put_thing(thing.id.clone(), EntityId::new("org.example:b"));
        let cached = loader.load(&thing).await.unwrap();
        assert_eq!(cached.policy_id().unwrap().as_str(), "org.example:a");

        assert!(loader.invalidate(&thing));
        let reloaded = loader.load(&thing).await.unwrap();
        assert_eq!(reloaded.policy_id().unwrap().as_str(), "org.example:b");
    }
}
