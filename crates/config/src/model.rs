use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct EnforcementConfig {
    pub rev: u64,
    pub enforcer_cache: CacheSection,
    pub thing_policy_id_cache: CacheSection,
    pub correlation_cache: CorrelationSection,
    pub dispatcher: DispatcherSection,
    pub logging: LoggingSection,
    /// Where each dotted path got its current value.
    pub provenance: BTreeMap<String, ConfigSource>,
}

impl EnforcementConfig {
    pub fn source_of(&self, path: &str) -> Option<ConfigSource> {
        self.provenance.get(path).copied()
    }

    pub(crate) fn set_provenance(&mut self, path: &str, source: ConfigSource) {
        self.provenance.insert(path.to_string(), source);
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CacheSection {
    pub max_entries: usize,
    pub ttl_ms: u64,
}

impl CacheSection {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CorrelationSection {
    pub default_ttl_ms: u64,
    pub max_entries: usize,
}

impl CorrelationSection {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct DispatcherSection {
    pub ask_timeout_ms: u64,
    /// Upper bound for timeouts requested by callers.
    pub max_timeout_ms: u64,
    /// Top-level entity fields that survive read filtering.
    pub always_visible_fields: Vec<String>,
}

impl DispatcherSection {
    pub fn ask_timeout(&self) -> Duration {
        Duration::from_millis(self.ask_timeout_ms)
    }

    pub fn max_timeout(&self) -> Duration {
        Duration::from_millis(self.max_timeout_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct LoggingSection {
    pub level: String,
    pub json: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConfigSource {
    Builtin,
    File,
    Env,
    RuntimeOverride,
}
