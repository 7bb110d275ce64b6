use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tracing::info;

use crate::errors::ConfigError;
use crate::loader::apply_override_to_config;
use crate::model::{ConfigSource, EnforcementConfig};

/// Holds the live configuration. Readers get a consistent `Arc` snapshot;
/// writers are serialized and every new snapshot bumps `rev`.
pub struct ConfigCenter {
    current: ArcSwap<EnforcementConfig>,
    previous: ArcSwap<EnforcementConfig>,
    write_lock: Mutex<()>,
    watch_tx: watch::Sender<Arc<EnforcementConfig>>,
}

impl ConfigCenter {
    pub fn new(config: EnforcementConfig) -> Self {
        let initial = Arc::new(config);
        let (watch_tx, _watch_rx) = watch::channel(initial.clone());
        Self {
            current: ArcSwap::from(initial.clone()),
            previous: ArcSwap::from(initial),
            write_lock: Mutex::new(()),
            watch_tx,
        }
    }

    pub fn snapshot(&self) -> Arc<EnforcementConfig> {
        self.current.load_full()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<EnforcementConfig>> {
        self.watch_tx.subscribe()
    }

    /// Sets one dotted path at runtime.
    pub async fn apply_override(
        &self,
        path: &str,
        value: Value,
    ) -> Result<Arc<EnforcementConfig>, ConfigError> {
        let _guard = self.write_lock.lock().await;
        let mut next = (*self.current.load_full()).clone();
        apply_override_to_config(&mut next, path, &value, ConfigSource::RuntimeOverride)?;
        info!(path, %value, "config override applied");
        Ok(self.publish(next))
    }

    /// Swaps in a freshly loaded configuration.
    pub async fn replace(&self, config: EnforcementConfig) -> Arc<EnforcementConfig> {
        let _guard = self.write_lock.lock().await;
        self.publish(config)
    }

    /// Restores the snapshot that was current before the last change.
    pub async fn rollback(&self) -> Arc<EnforcementConfig> {
        let _guard = self.write_lock.lock().await;
        let restored = (*self.previous.load_full()).clone();
        self.publish(restored)
    }

    fn publish(&self, mut next: EnforcementConfig) -> Arc<EnforcementConfig> {
        next.rev = self.current.load().rev.saturating_add(1);
        let next = Arc::new(next);
        let previous = self.current.swap(next.clone());
        self.previous.store(previous);
        let _ = self.watch_tx.send(next.clone());
        next
    }
}
