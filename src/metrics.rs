use once_cell::sync::{Lazy, OnceCell};
use prometheus::{core::Collector, Encoder, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use tracing::error;
use warden_cache::StatsSnapshot;
use warden_scheduler::metrics as scheduler_metrics;

use crate::enforcement::EnforcementDispatcher;

static GLOBAL_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);
static REGISTER_ONCE: OnceCell<()> = OnceCell::new();
static SCHEDULER_TASKS: OnceCell<IntGaugeVec> = OnceCell::new();
static CACHE_EVENTS: OnceCell<IntGaugeVec> = OnceCell::new();
static CACHE_ENTRIES: OnceCell<IntGaugeVec> = OnceCell::new();
static PENDING_CORRELATIONS: OnceCell<IntGauge> = OnceCell::new();

pub fn global_registry() -> &'static Registry {
    &GLOBAL_REGISTRY
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector)) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register metric");
        }
    }
}

fn gauge_vec(name: &str, help: &str, labels: &[&str]) -> Option<IntGaugeVec> {
    match IntGaugeVec::new(Opts::new(name, help), labels) {
        Ok(gauge) => Some(gauge),
        Err(err) => {
            error!(?err, name, "failed to create gauge");
            None
        }
    }
}

pub fn register_metrics() {
    REGISTER_ONCE.get_or_init(|| {
        let registry = global_registry();
        if let Some(tasks) = gauge_vec(
            "warden_scheduler_tasks",
            "Enforcement tasks seen by the scheduler, by lifecycle event",
            &["event"],
        ) {
            register(registry, tasks.clone());
            let _ = SCHEDULER_TASKS.set(tasks);
        }
        if let Some(events) = gauge_vec(
            "warden_cache_events",
            "Cache lookups, loads and invalidations, by cache",
            &["cache", "event"],
        ) {
            register(registry, events.clone());
            let _ = CACHE_EVENTS.set(events);
        }
        if let Some(entries) = gauge_vec(
            "warden_cache_entries",
            "Entries currently held, by cache",
            &["cache"],
        ) {
            register(registry, entries.clone());
            let _ = CACHE_ENTRIES.set(entries);
        }
        match IntGauge::new(
            "warden_pending_correlations",
            "Callers waiting for a correlated response",
        ) {
            Ok(pending) => {
                register(registry, pending.clone());
                let _ = PENDING_CORRELATIONS.set(pending);
            }
            Err(err) => error!(?err, "failed to create correlation gauge"),
        }
    });
}

fn record_scheduler() {
    let Some(tasks) = SCHEDULER_TASKS.get() else {
        return;
    };
    let snapshot = scheduler_metrics::snapshot();
    for (event, value) in [
        ("submitted", snapshot.submitted),
        ("started", snapshot.started),
        ("completed", snapshot.completed),
        ("failed", snapshot.failed),
        ("panicked", snapshot.panicked),
    ] {
        tasks.with_label_values(&[event]).set(value as i64);
    }
}

pub fn record_cache_stats(cache: &str, stats: &StatsSnapshot, entries: usize) {
    register_metrics();
    if let Some(events) = CACHE_EVENTS.get() {
        for (event, value) in [
            ("hit", stats.hits),
            ("miss", stats.misses),
            ("load", stats.loads),
            ("load_error", stats.errors),
            ("eviction", stats.evictions),
            ("invalidation", stats.invalidations),
        ] {
            events.with_label_values(&[cache, event]).set(value as i64);
        }
    }
    if let Some(gauge) = CACHE_ENTRIES.get() {
        gauge.with_label_values(&[cache]).set(entries as i64);
    }
}

/// Copies the dispatcher's cache state into the registry.
pub fn observe_dispatcher(dispatcher: &EnforcementDispatcher) {
    let enforcers = dispatcher.enforcers();
    record_cache_stats(enforcers.name(), &enforcers.stats().snapshot(), enforcers.len());
    let policy_ids = dispatcher.policy_ids();
    record_cache_stats(policy_ids.name(), &policy_ids.stats().snapshot(), policy_ids.len());
    if let Some(pending) = PENDING_CORRELATIONS.get() {
        pending.set(dispatcher.correlations().len() as i64);
    }
}

/// Text exposition of everything registered.
pub fn render_prometheus() -> anyhow::Result<String> {
    register_metrics();
    record_scheduler();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&global_registry().gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
