use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid resource type: {0}")]
    InvalidResourceType(String),
    #[error("invalid resource key: {0}")]
    InvalidResourceKey(String),
    #[error("invalid entity id: {0}")]
    InvalidEntityId(String),
}

/// Namespaced identifier of a thing or a policy (`namespace:name`).
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw.split_once(':') {
            Some((namespace, name)) if !name.is_empty() && !namespace.contains('/') => {
                Ok(Self(raw.to_string()))
            }
            _ => Err(CoreError::InvalidEntityId(raw.to_string())),
        }
    }

    pub fn namespace(&self) -> &str {
        self.0.split_once(':').map(|(ns, _)| ns).unwrap_or("")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "lowercase"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum ResourceType {
    Thing,
    Policy,
    Message,
}

impl ResourceType {
    pub const ALL: [ResourceType; 3] = [
        ResourceType::Thing,
        ResourceType::Policy,
        ResourceType::Message,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Thing => "thing",
            ResourceType::Policy => "policy",
            ResourceType::Message => "message",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "thing" => Ok(ResourceType::Thing),
            "policy" => Ok(ResourceType::Policy),
            "message" => Ok(ResourceType::Message),
            other => Err(CoreError::InvalidResourceType(other.to_string())),
        }
    }
}

/// Serialization domain of enforcement: one lane per key.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub resource_type: ResourceType,
    pub id: EntityId,
}

impl EntityKey {
    pub fn new(resource_type: ResourceType, id: EntityId) -> Self {
        Self { resource_type, id }
    }

    pub fn thing(id: impl Into<String>) -> Self {
        Self::new(ResourceType::Thing, EntityId::new(id))
    }

    pub fn policy(id: impl Into<String>) -> Self {
        Self::new(ResourceType::Policy, EntityId::new(id))
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.id)
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct JsonPointer {
    segments: Vec<String>,
}

impl JsonPointer {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(raw: &str) -> Self {
        let segments = raw
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
            .collect();
        Self { segments }
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn append(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn join(&self, other: &JsonPointer) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    /// True if `self` equals `other` or is one of its ancestors.
    pub fn is_prefix_of(&self, other: &JsonPointer) -> bool {
        self.segments.len() <= other.segments.len()
            && self
                .segments
                .iter()
                .zip(other.segments.iter())
                .all(|(a, b)| a == b)
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }
}

impl fmt::Display for JsonPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment.replace('~', "~0").replace('/', "~1"))?;
        }
        Ok(())
    }
}

/// A resource inside a policy, e.g. `thing:/attributes/location`.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub resource_type: ResourceType,
    pub path: JsonPointer,
}

impl ResourceKey {
    pub fn new(resource_type: ResourceType, path: JsonPointer) -> Self {
        Self {
            resource_type,
            path,
        }
    }

    pub fn root(resource_type: ResourceType) -> Self {
        Self::new(resource_type, JsonPointer::root())
    }

    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let (kind, path) = raw
            .split_once(':')
            .ok_or_else(|| CoreError::InvalidResourceKey(raw.to_string()))?;
        if !path.is_empty() && !path.starts_with('/') {
            return Err(CoreError::InvalidResourceKey(raw.to_string()));
        }
        let resource_type = kind
            .parse::<ResourceType>()
            .map_err(|_| CoreError::InvalidResourceKey(raw.to_string()))?;
        Ok(Self::new(resource_type, JsonPointer::parse(path)))
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        Self::new(self.resource_type, self.path.append(segment))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.path)
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct SubjectId(pub String);

impl SubjectId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum AuthorizationContextKind {
    PreAuthenticated,
    Jwt,
    #[default]
    Unspecified,
}

/// Ordered set of authorization subjects established for a caller.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AuthorizationContext {
    kind: AuthorizationContextKind,
    subjects: Vec<SubjectId>,
}

impl AuthorizationContext {
    pub fn new<I, S>(kind: AuthorizationContextKind, subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<SubjectId> = Vec::new();
        for subject in subjects {
            let subject = SubjectId(subject.into());
            if !unique.contains(&subject) {
                unique.push(subject);
            }
        }
        Self {
            kind,
            subjects: unique,
        }
    }

    pub fn kind(&self) -> AuthorizationContextKind {
        self.kind
    }

    pub fn subjects(&self) -> &[SubjectId] {
        &self.subjects
    }

    pub fn first_subject(&self) -> Option<&SubjectId> {
        self.subjects.first()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum Channel {
    #[default]
    Twin,
    Live,
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandHeaders {
    pub correlation_id: Option<String>,
    pub authorization_context: AuthorizationContext,
    pub timeout: Option<Duration>,
    pub response_required: bool,
    pub channel: Channel,
    pub invalidate_enforcer_preemptively: bool,
    /// Subjects allowed to read the entity; filled in by enforcement before forwarding.
    pub read_subjects: Vec<SubjectId>,
}

impl Default for CommandHeaders {
    fn default() -> Self {
        Self {
            correlation_id: None,
            authorization_context: AuthorizationContext::default(),
            timeout: None,
            response_required: true,
            channel: Channel::Twin,
            invalidate_enforcer_preemptively: false,
            read_subjects: Vec::new(),
        }
    }
}

impl CommandHeaders {
    pub fn new(authorization_context: AuthorizationContext) -> Self {
        Self {
            authorization_context,
            ..Self::default()
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_response_required(mut self, required: bool) -> Self {
        self.response_required = required;
        self
    }

    pub fn with_preemptive_invalidation(mut self) -> Self {
        self.invalidate_enforcer_preemptively = true;
        self
    }

    /// Assigns a random correlation id if none is present and returns it.
    pub fn ensure_correlation_id(&mut self) -> String {
        self.correlation_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone()
    }

    /// Zero timeout or `response_required = false` mean nobody waits for an answer.
    pub fn is_fire_and_forget(&self) -> bool {
        !self.response_required || self.timeout.map(|t| t.is_zero()).unwrap_or(false)
    }
}
