use crate::center::ConfigCenter;
use crate::defaults::default_config;
use crate::errors::ConfigError;
use crate::loader::{load_config, load_config_with_options, LoadOptions};
use crate::model::ConfigSource;
use std::env;
use std::sync::{Mutex, OnceLock};

fn env_guard() -> std::sync::MutexGuard<'static, ()> {
    static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
    GUARD
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[test]
fn default_config_has_expected_values() {
    let config = default_config();
    assert_eq!(config.enforcer_cache.max_entries, 20_000);
    assert_eq!(config.enforcer_cache.ttl_ms, 120_000);
    assert_eq!(config.correlation_cache.default_ttl_ms, 60_000);
    assert_eq!(config.dispatcher.ask_timeout_ms, 60_000);
    assert_eq!(config.dispatcher.max_timeout_ms, 300_000);
    assert_eq!(
        config.dispatcher.always_visible_fields,
        vec!["thingId".to_string(), "policyId".to_string()]
    );
    assert_eq!(config.logging.level, "info");
}

#[test]
fn file_values_override_builtins_and_record_provenance() {
    let _guard = env_guard();
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("warden.yaml");
    std::fs::write(
        &file_path,
        r#"enforcer_cache:
  max_entries: 500
  ttl_ms: 1000
dispatcher:
  always_visible_fields: ["thingId"]
logging:
  json: true
"#,
    )
    .unwrap();

    let config = load_config_with_options(&LoadOptions {
        paths: vec![file_path],
        include_env: false,
    })
    .unwrap();
    assert_eq!(config.enforcer_cache.max_entries, 500);
    assert_eq!(config.enforcer_cache.ttl_ms, 1000);
    assert_eq!(config.dispatcher.always_visible_fields, vec!["thingId".to_string()]);
    assert!(config.logging.json);
    assert_eq!(config.source_of("enforcer_cache.ttl_ms"), Some(ConfigSource::File));
    assert_eq!(
        config.source_of("correlation_cache.default_ttl_ms"),
        Some(ConfigSource::Builtin)
    );
}

#[test]
fn unknown_paths_are_rejected() {
    let _guard = env_guard();
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("warden.yaml");
    std::fs::write(&file_path, "enforcer_cache:\n  shards: 4\n").unwrap();

    let err = load_config_with_options(&LoadOptions {
        paths: vec![file_path],
        include_env: false,
    })
    .unwrap_err();
    assert!(matches!(err, ConfigError::UnsupportedPath(path) if path == "enforcer_cache.shards"));
}

#[test]
fn env_overrides_file() {
    let _guard = env_guard();
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("warden.yaml");
    std::fs::write(&file_path, "dispatcher:\n  ask_timeout_ms: 5000\n").unwrap();

    env::set_var("WARDEN__DISPATCHER__ASK_TIMEOUT_MS", "750");
    env::set_var(
        "WARDEN_CONFIG_OVERRIDE_JSON",
        r#"{"logging": {"level": "debug"}}"#,
    );
    let loaded = load_config(Some(&file_path));
    env::remove_var("WARDEN__DISPATCHER__ASK_TIMEOUT_MS");
    env::remove_var("WARDEN_CONFIG_OVERRIDE_JSON");

    let config = loaded.unwrap();
    assert_eq!(config.dispatcher.ask_timeout_ms, 750);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(
        config.source_of("dispatcher.ask_timeout_ms"),
        Some(ConfigSource::Env)
    );
}

#[tokio::test]
async fn zero_timeout_bound_is_rejected() {
    let center = ConfigCenter::new(default_config());
    let err = center
        .apply_override("dispatcher.max_timeout_ms", serde_json::json!(0))
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { .. }));
    assert_eq!(center.snapshot().dispatcher.max_timeout_ms, 300_000);
}

#[tokio::test]
async fn overrides_are_broadcast_and_can_be_rolled_back() {
    let center = ConfigCenter::new(default_config());
    let mut rx = center.subscribe();
    let original_rev = rx.borrow().rev;

    center
        .apply_override("enforcer_cache.ttl_ms", serde_json::json!(5_000))
        .await
        .unwrap();
    rx.changed().await.unwrap();
    let updated = rx.borrow().clone();
    assert_ne!(updated.rev, original_rev);
    assert_eq!(updated.enforcer_cache.ttl_ms, 5_000);
    assert_eq!(
        updated.source_of("enforcer_cache.ttl_ms"),
        Some(ConfigSource::RuntimeOverride)
    );

    let rejected = center
        .apply_override("enforcer_cache.max_entries", serde_json::json!(0))
        .await;
    assert!(matches!(rejected, Err(ConfigError::InvalidValue { .. })));

    let restored = center.rollback().await;
    assert_eq!(restored.enforcer_cache.ttl_ms, 120_000);
    assert!(restored.rev > updated.rev);
}
