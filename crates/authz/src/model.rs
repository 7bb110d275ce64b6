use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use warden_core_types::{EntityId, ResourceKey, ResourceType, SubjectId};

use crate::errors::AuthzError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Permission {
    Read,
    Write,
    Execute,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::Read => "READ",
            Permission::Write => "WRITE",
            Permission::Execute => "EXECUTE",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "READ" => Ok(Permission::Read),
            "WRITE" => Ok(Permission::Write),
            "EXECUTE" => Ok(Permission::Execute),
            other => Err(AuthzError::invalid_policy(&format!(
                "unknown permission '{other}'"
            ))),
        }
    }
}

/// Set of permissions; comparison is set-based.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(BTreeSet<Permission>);

impl Permissions {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn of(permission: Permission) -> Self {
        Self(BTreeSet::from([permission]))
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    pub fn insert(&mut self, permission: Permission) {
        self.0.insert(permission);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.0.iter().copied()
    }
}

impl<const N: usize> From<[Permission; N]> for Permissions {
    fn from(value: [Permission; N]) -> Self {
        Self(value.into_iter().collect())
    }
}

impl FromIterator<Permission> for Permissions {
    fn from_iter<T: IntoIterator<Item = Permission>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectedPermissions {
    #[serde(default)]
    pub grant: Permissions,
    #[serde(default)]
    pub revoke: Permissions,
}

impl EffectedPermissions {
    pub fn granting(grant: impl Into<Permissions>) -> Self {
        Self {
            grant: grant.into(),
            revoke: Permissions::none(),
        }
    }

    pub fn revoking(revoke: impl Into<Permissions>) -> Self {
        Self {
            grant: Permissions::none(),
            revoke: revoke.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyEntry {
    pub label: String,
    pub subjects: BTreeMap<SubjectId, String>,
    pub resources: BTreeMap<ResourceKey, EffectedPermissions>,
}

impl PolicyEntry {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            subjects: BTreeMap::new(),
            resources: BTreeMap::new(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>, kind: impl Into<String>) -> Self {
        self.subjects.insert(SubjectId::new(subject), kind.into());
        self
    }

    pub fn with_resource(mut self, resource: ResourceKey, effected: EffectedPermissions) -> Self {
        self.resources.insert(resource, effected);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Policy {
    pub id: Option<EntityId>,
    pub entries: Vec<PolicyEntry>,
}

#[derive(Serialize, Deserialize)]
struct PolicyDoc {
    #[serde(rename = "policyId", default, skip_serializing_if = "Option::is_none")]
    policy_id: Option<String>,
    #[serde(default)]
    entries: BTreeMap<String, EntryDoc>,
}

#[derive(Serialize, Deserialize)]
struct EntryDoc {
    #[serde(default)]
    subjects: BTreeMap<String, SubjectDoc>,
    #[serde(default)]
    resources: BTreeMap<String, EffectedPermissions>,
}

#[derive(Serialize, Deserialize)]
struct SubjectDoc {
    #[serde(rename = "type", default)]
    kind: String,
}

impl Policy {
    pub fn new(id: Option<EntityId>) -> Self {
        Self {
            id,
            entries: Vec::new(),
        }
    }

    pub fn with_entry(mut self, entry: PolicyEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn entry(&self, label: &str) -> Option<&PolicyEntry> {
        self.entries.iter().find(|entry| entry.label == label)
    }

    /// Policy granted to the creator when a thing is created without one.
    pub fn default_for(id: Option<EntityId>, subject: &SubjectId) -> Self {
        let all = Permissions::from([Permission::Read, Permission::Write]);
        let mut entry = PolicyEntry::new("DEFAULT").with_subject(subject.as_str(), "generated");
        for resource_type in ResourceType::ALL {
            entry = entry.with_resource(
                ResourceKey::root(resource_type),
                EffectedPermissions::granting(all.clone()),
            );
        }
        Self::new(id).with_entry(entry)
    }

    pub fn from_json(value: &Value) -> Result<Self, AuthzError> {
        let doc: PolicyDoc = serde_json::from_value(value.clone())
            .map_err(|err| AuthzError::invalid_policy(&err.to_string()))?;
        let id = match doc.policy_id {
            Some(raw) => Some(
                EntityId::parse(&raw).map_err(|err| AuthzError::invalid_policy(&err.to_string()))?,
            ),
            None => None,
        };
        let mut entries = Vec::with_capacity(doc.entries.len());
        for (label, entry_doc) in doc.entries {
            if label.trim().is_empty() {
                return Err(AuthzError::invalid_policy("policy entry label must not be blank"));
            }
            let mut entry = PolicyEntry::new(label);
            for (subject, subject_doc) in entry_doc.subjects {
                entry.subjects.insert(SubjectId::new(subject), subject_doc.kind);
            }
            for (raw_key, effected) in entry_doc.resources {
                let key = ResourceKey::parse(&raw_key)
                    .map_err(|err| AuthzError::invalid_policy(&err.to_string()))?;
                entry.resources.insert(key, effected);
            }
            entries.push(entry);
        }
        Ok(Self { id, entries })
    }

    pub fn to_json(&self) -> Value {
        let doc = PolicyDoc {
            policy_id: self.id.as_ref().map(|id| id.0.clone()),
            entries: self
                .entries
                .iter()
                .map(|entry| {
                    let subjects = entry
                        .subjects
                        .iter()
                        .map(|(id, kind)| (id.0.clone(), SubjectDoc { kind: kind.clone() }))
                        .collect();
                    let resources = entry
                        .resources
                        .iter()
                        .map(|(key, effected)| (key.to_string(), effected.clone()))
                        .collect();
                    (entry.label.clone(), EntryDoc { subjects, resources })
                })
                .collect(),
        };
        serde_json::to_value(doc).unwrap_or(Value::Null)
    }
}
