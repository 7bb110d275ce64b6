use ahash::AHashSet;
use serde_json::{Map, Value};
use warden_core_types::{ResourceKey, ResourceType, SubjectId};

use crate::model::{Permission, Permissions, Policy};

#[derive(Debug)]
struct CompiledEntry {
    subjects: AHashSet<SubjectId>,
    resources: Vec<(ResourceKey, Permissions, Permissions)>,
}

/// Immutable, point-in-time evaluable view of a policy.
///
/// For a subject set `S`, a permission is *granted* at a resource when an entry
/// matching `S` grants it there or on an ancestor, and *revoked* under the same
/// rule. Revocation always wins.
#[derive(Debug)]
pub struct PolicyEnforcer {
    policy: Policy,
    entries: Vec<CompiledEntry>,
}

impl PolicyEnforcer {
    pub fn new(policy: Policy) -> Self {
        let entries = policy
            .entries
            .iter()
            .map(|entry| CompiledEntry {
                subjects: entry.subjects.keys().cloned().collect(),
                resources: entry
                    .resources
                    .iter()
                    .map(|(key, effected)| {
                        (key.clone(), effected.grant.clone(), effected.revoke.clone())
                    })
                    .collect(),
            })
            .collect();
        Self { policy, entries }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    fn matching<'a>(
        &'a self,
        subjects: &'a [SubjectId],
    ) -> impl Iterator<Item = &'a (ResourceKey, Permissions, Permissions)> + 'a {
        self.entries
            .iter()
            .filter(move |entry| subjects.iter().any(|s| entry.subjects.contains(s)))
            .flat_map(|entry| entry.resources.iter())
    }

    fn granted_on_path(&self, resource: &ResourceKey, subjects: &[SubjectId], p: Permission) -> bool {
        self.matching(subjects).any(|(key, grant, _)| {
            key.resource_type == resource.resource_type
                && key.path.is_prefix_of(&resource.path)
                && grant.contains(p)
        })
    }

    fn revoked_on_path(&self, resource: &ResourceKey, subjects: &[SubjectId], p: Permission) -> bool {
        self.matching(subjects).any(|(key, _, revoke)| {
            key.resource_type == resource.resource_type
                && key.path.is_prefix_of(&resource.path)
                && revoke.contains(p)
        })
    }

    fn revoked_below(&self, resource: &ResourceKey, subjects: &[SubjectId], p: Permission) -> bool {
        self.matching(subjects).any(|(key, _, revoke)| {
            key.resource_type == resource.resource_type
                && key.path.len() > resource.path.len()
                && resource.path.is_prefix_of(&key.path)
                && revoke.contains(p)
        })
    }

    fn effective(&self, resource: &ResourceKey, subjects: &[SubjectId], p: Permission) -> bool {
        self.granted_on_path(resource, subjects, p) && !self.revoked_on_path(resource, subjects, p)
    }

    fn effective_below(&self, resource: &ResourceKey, subjects: &[SubjectId], p: Permission) -> bool {
        self.matching(subjects).any(|(key, grant, _)| {
            key.resource_type == resource.resource_type
                && key.path.len() > resource.path.len()
                && resource.path.is_prefix_of(&key.path)
                && grant.contains(p)
                && !self.revoked_on_path(key, subjects, p)
        })
    }

    /// Every permission holds at `resource` and is revoked nowhere beneath it.
    pub fn has_unrestricted_permissions(
        &self,
        resource: &ResourceKey,
        subjects: &[SubjectId],
        permissions: &Permissions,
    ) -> bool {
        !permissions.is_empty()
            && permissions.iter().all(|p| {
                self.effective(resource, subjects, p) && !self.revoked_below(resource, subjects, p)
            })
    }

    /// At least one permission holds at `resource` or somewhere beneath it.
    pub fn has_partial_permissions(
        &self,
        resource: &ResourceKey,
        subjects: &[SubjectId],
        permissions: &Permissions,
    ) -> bool {
        permissions.iter().any(|p| {
            self.effective(resource, subjects, p) || self.effective_below(resource, subjects, p)
        })
    }

    fn all_subjects(&self) -> Vec<SubjectId> {
        let mut seen = Vec::new();
        for entry in &self.policy.entries {
            for subject in entry.subjects.keys() {
                if !seen.contains(subject) {
                    seen.push(subject.clone());
                }
            }
        }
        seen
    }

    pub fn subjects_with_partial_permission(
        &self,
        resource: &ResourceKey,
        permission: Permission,
    ) -> Vec<SubjectId> {
        let permissions = Permissions::of(permission);
        self.all_subjects()
            .into_iter()
            .filter(|subject| {
                self.has_partial_permissions(resource, std::slice::from_ref(subject), &permissions)
            })
            .collect()
    }

    pub fn subjects_with_unrestricted_permission(
        &self,
        resource: &ResourceKey,
        permission: Permission,
    ) -> Vec<SubjectId> {
        let permissions = Permissions::of(permission);
        self.all_subjects()
            .into_iter()
            .filter(|subject| {
                self.has_unrestricted_permissions(
                    resource,
                    std::slice::from_ref(subject),
                    &permissions,
                )
            })
            .collect()
    }

    /// Restricts `document` (rooted at `resource_type:/`) to the parts where
    /// `subjects` hold `permission`. The result is always an object.
    pub fn build_json_view(
        &self,
        resource_type: ResourceType,
        document: &Value,
        subjects: &[SubjectId],
        permission: Permission,
    ) -> Value {
        let root = ResourceKey::root(resource_type);
        let permissions = Permissions::of(permission);
        if self.has_unrestricted_permissions(&root, subjects, &permissions) {
            return document.clone();
        }
        match document {
            Value::Object(map) if self.has_partial_permissions(&root, subjects, &permissions) => {
                Value::Object(self.filter_object(&root, map, subjects, &permissions))
            }
            _ => Value::Object(Map::new()),
        }
    }

    fn filter_object(
        &self,
        base: &ResourceKey,
        map: &Map<String, Value>,
        subjects: &[SubjectId],
        permissions: &Permissions,
    ) -> Map<String, Value> {
        let mut filtered = Map::new();
        for (field, value) in map {
            let key = base.child(field.clone());
            if let Some(visible) = self.filter_value(&key, value, subjects, permissions) {
                filtered.insert(field.clone(), visible);
            }
        }
        filtered
    }

    fn filter_value(
        &self,
        key: &ResourceKey,
        value: &Value,
        subjects: &[SubjectId],
        permissions: &Permissions,
    ) -> Option<Value> {
        if self.has_unrestricted_permissions(key, subjects, permissions) {
            return Some(value.clone());
        }
        match value {
            Value::Object(map) if self.has_partial_permissions(key, subjects, permissions) => {
                let nested = self.filter_object(key, map, subjects, permissions);
                (!nested.is_empty()).then_some(Value::Object(nested))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EffectedPermissions, PolicyEntry};

    fn key(raw: &str) -> ResourceKey {
        ResourceKey::parse(raw).unwrap()
    }

    fn subjects(raw: &[&str]) -> Vec<SubjectId> {
        raw.iter().map(|s| SubjectId::new(*s)).collect()
    }

    fn enforcer() -> PolicyEnforcer {
        let policy = Policy::new(None)
            .with_entry(
                PolicyEntry::new("owner")
                    .with_subject("google:alice", "user")
                    .with_resource(
                        key("thing:/"),
                        EffectedPermissions::granting([Permission::Read, Permission::Write]),
                    )
                    .with_resource(
                        key("thing:/attributes/secret"),
                        EffectedPermissions::revoking([Permission::Write]),
                    ),
            )
            .with_entry(
                PolicyEntry::new("observer")
                    .with_subject("google:bob", "user")
                    .with_resource(
                        key("thing:/features/lamp"),
                        EffectedPermissions::granting([Permission::Read]),
                    ),
            )
            .with_entry(
                PolicyEntry::new("blocked")
                    .with_subject("group:blocked", "group")
                    .with_resource(
                        key("thing:/"),
                        EffectedPermissions::revoking([Permission::Read]),
                    ),
            );
        PolicyEnforcer::new(policy)
    }

    #[test]
    fn revocation_below_breaks_unrestricted_write() {
        let enforcer = enforcer();
        let alice = subjects(&["google:alice"]);
        let write = Permissions::of(Permission::Write);
        assert!(!enforcer.has_unrestricted_permissions(&key("thing:/"), &alice, &write));
        assert!(enforcer.has_unrestricted_permissions(&key("thing:/features"), &alice, &write));
        assert!(!enforcer.has_unrestricted_permissions(
            &key("thing:/attributes/secret/pin"),
            &alice,
            &write
        ));
        assert!(enforcer.has_partial_permissions(&key("thing:/"), &alice, &write));
    }

    #[test]
    fn grant_on_sub_path_is_partial_at_root() {
        let enforcer = enforcer();
        let bob = subjects(&["google:bob"]);
        let read = Permissions::of(Permission::Read);
        assert!(enforcer.has_partial_permissions(&key("thing:/"), &bob, &read));
        assert!(!enforcer.has_unrestricted_permissions(&key("thing:/"), &bob, &read));
        assert!(enforcer.has_unrestricted_permissions(
            &key("thing:/features/lamp/properties"),
            &bob,
            &read
        ));
        assert!(!enforcer.has_partial_permissions(&key("thing:/attributes"), &bob, &read));
    }

    #[test]
    fn revoke_of_any_subject_in_context_wins() {
        let enforcer = enforcer();
        let read = Permissions::of(Permission::Read);
        let both = subjects(&["google:alice", "group:blocked"]);
        assert!(!enforcer.has_partial_permissions(&key("thing:/"), &both, &read));
    }

    #[test]
    fn empty_permission_set_is_never_unrestricted() {
        let enforcer = enforcer();
        let alice = subjects(&["google:alice"]);
        assert!(!enforcer.has_unrestricted_permissions(
            &key("thing:/"),
            &alice,
            &Permissions::none()
        ));
    }

    #[test]
    fn json_view_keeps_only_readable_paths() {
        let enforcer = enforcer();
        let doc = serde_json::json!({
            "thingId": "org.example:lamp",
            "attributes": {"location": "kitchen"},
            "features": {
                "lamp": {"properties": {"on": true}},
                "battery": {"properties": {"level": 80}}
            }
        });
        let view = enforcer.build_json_view(
            ResourceType::Thing,
            &doc,
            &subjects(&["google:bob"]),
            Permission::Read,
        );
        assert_eq!(
            view,
            serde_json::json!({"features": {"lamp": {"properties": {"on": true}}}})
        );

        let full = enforcer.build_json_view(
            ResourceType::Thing,
            &doc,
            &subjects(&["google:alice"]),
            Permission::Read,
        );
        assert_eq!(full, doc);
    }

    #[test]
    fn subject_listing_ignores_revoked_subjects() {
        let enforcer = enforcer();
        let readers = enforcer.subjects_with_partial_permission(&key("thing:/"), Permission::Read);
        assert_eq!(readers, subjects(&["google:alice", "google:bob"]));
        let unrestricted =
            enforcer.subjects_with_unrestricted_permission(&key("thing:/"), Permission::Read);
        assert_eq!(unrestricted, subjects(&["google:alice"]));
    }
}
