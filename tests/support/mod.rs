#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use warden::{
    Command, CommandResponse, EnforcementDispatcher, Forwarder, InMemoryEntityStore, Reply,
};
use warden_authz::{EffectedPermissions, Permission, Policy, PolicyEntry};
use warden_config::{default_config, EnforcementConfig};
use warden_core_types::{
    AuthorizationContext, AuthorizationContextKind, CommandHeaders, EntityId, EntityKey,
    ResourceKey,
};
use warden_errors::prelude::ErrorObj;

/// Owner stand-in: answers with stored documents and records what it saw.
#[derive(Default)]
pub struct RecordingForwarder {
    documents: Mutex<HashMap<EntityKey, Value>>,
    asked: Mutex<Vec<(EntityKey, Command)>>,
    published: Mutex<Vec<(EntityKey, Command)>>,
    delay: Mutex<Option<Duration>>,
    panic_on_ask: AtomicBool,
}

impl RecordingForwarder {
    pub fn set_document(&self, key: EntityKey, document: Value) {
        self.documents.lock().insert(key, document);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn panic_on_ask(&self) {
        self.panic_on_ask.store(true, Ordering::SeqCst);
    }

    pub fn asked(&self) -> Vec<(EntityKey, Command)> {
        self.asked.lock().clone()
    }

    pub fn published(&self) -> Vec<(EntityKey, Command)> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl Forwarder for RecordingForwarder {
    async fn ask(
        &self,
        key: &EntityKey,
        command: Command,
        _timeout: Duration,
    ) -> Result<CommandResponse, ErrorObj> {
        self.asked.lock().push((key.clone(), command));
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic_on_ask.load(Ordering::SeqCst) {
            panic!("owner crashed");
        }
        let mut response = CommandResponse::new(key.clone(), 200);
        if let Some(document) = self.documents.lock().get(key).cloned() {
            response = response.with_payload(document);
        }
        Ok(response)
    }

    async fn publish(&self, key: &EntityKey, command: Command) -> Result<(), ErrorObj> {
        self.published.lock().push((key.clone(), command));
        Ok(())
    }
}

pub struct Harness {
    pub dispatcher: EnforcementDispatcher,
    pub store: Arc<InMemoryEntityStore>,
    pub forwarder: Arc<RecordingForwarder>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(&default_config())
    }

    pub fn with_config(config: &EnforcementConfig) -> Self {
        let store = Arc::new(InMemoryEntityStore::new());
        let forwarder = Arc::new(RecordingForwarder::default());
        let dispatcher = EnforcementDispatcher::new(config, store.clone(), forwarder.clone());
        Self {
            dispatcher,
            store,
            forwarder,
        }
    }

    /// Dispatches and returns the single reply, failing on a second one.
    pub async fn send(&self, command: Command) -> Reply {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.dispatcher.dispatch(command, Arc::new(tx));
        let reply = rx.recv().await.expect("a reply");
        self.dispatcher.scheduler().wait_idle().await;
        assert!(rx.try_recv().is_err(), "more than one reply");
        reply
    }

    /// Dispatches and hands back the reply channel.
    pub fn start(&self, command: Command) -> mpsc::UnboundedReceiver<Reply> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.dispatcher.dispatch(command, Arc::new(tx));
        rx
    }

    pub fn add_thing(&self, thing: &str, policy: &str) {
        self.store.put_thing(EntityId::new(thing), EntityId::new(policy));
    }

    pub fn add_policy(&self, id: &str, policy: Policy) {
        self.store.put_policy(EntityId::new(id), policy);
    }
}

pub fn ctx(subjects: &[&str]) -> AuthorizationContext {
    AuthorizationContext::new(AuthorizationContextKind::Jwt, subjects.iter().copied())
}

pub fn headers(subjects: &[&str]) -> CommandHeaders {
    CommandHeaders::new(ctx(subjects))
}

pub fn key(raw: &str) -> ResourceKey {
    ResourceKey::parse(raw).expect("resource key")
}

pub fn grant(permissions: &[Permission]) -> EffectedPermissions {
    EffectedPermissions::granting(permissions.iter().copied().collect::<warden_authz::Permissions>())
}

/// alice owns everything; bob may read the location attribute only.
pub fn lamp_policy(id: &str) -> Policy {
    Policy::new(Some(EntityId::new(id)))
        .with_entry(
            PolicyEntry::new("owner")
                .with_subject("google:alice", "user")
                .with_resource(key("thing:/"), grant(&[Permission::Read, Permission::Write]))
                .with_resource(key("policy:/"), grant(&[Permission::Read, Permission::Write]))
                .with_resource(key("message:/"), grant(&[Permission::Read, Permission::Write]))
                .with_resource(
                    key("policy:/entries/owner/actions"),
                    grant(&[Permission::Execute]),
                ),
        )
        .with_entry(
            PolicyEntry::new("reader")
                .with_subject("google:bob", "user")
                .with_resource(key("thing:/attributes/location"), grant(&[Permission::Read])),
        )
}

pub fn lamp_document() -> Value {
    json!({
        "thingId": "org.example:lamp",
        "policyId": "org.example:lamp",
        "attributes": {"location": "kitchen", "serial": "A-17"},
        "features": {"lamp": {"properties": {"on": true}}}
    })
}

/// Lamp thing governed by its own policy, known to store and owner.
pub fn lamp_harness() -> Harness {
    lamp_harness_with(&default_config())
}

pub fn lamp_harness_with(config: &EnforcementConfig) -> Harness {
    let harness = Harness::with_config(config);
    harness.add_policy("org.example:lamp", lamp_policy("org.example:lamp"));
    harness.add_thing("org.example:lamp", "org.example:lamp");
    harness
        .forwarder
        .set_document(EntityKey::thing("org.example:lamp"), lamp_document());
    harness.forwarder.set_document(
        EntityKey::policy("org.example:lamp"),
        lamp_policy("org.example:lamp").to_json(),
    );
    harness
}
