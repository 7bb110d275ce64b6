use crate::model::{
    CacheSection, CorrelationSection, DispatcherSection, EnforcementConfig, LoggingSection,
};

pub fn default_config() -> EnforcementConfig {
    EnforcementConfig {
        rev: 1,
        enforcer_cache: CacheSection {
            max_entries: 20_000,
            ttl_ms: 120_000,
        },
        thing_policy_id_cache: CacheSection {
            max_entries: 20_000,
            ttl_ms: 120_000,
        },
        correlation_cache: CorrelationSection {
            default_ttl_ms: 60_000,
            max_entries: 100_000,
        },
        dispatcher: DispatcherSection {
            ask_timeout_ms: 60_000,
            max_timeout_ms: 300_000,
            always_visible_fields: vec!["thingId".into(), "policyId".into()],
        },
        logging: LoggingSection {
            level: "info".into(),
            json: false,
        },
        provenance: Default::default(),
    }
}
