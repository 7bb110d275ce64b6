//! Per-category enforcement of commands.
//!
//! Every command becomes one [`EnforcementTask`] keyed by the entity it
//! addresses. The prepare phase loads permission state and decides; the
//! commit phase forwards, relays and invalidates.

mod errors;
mod live;
mod message;
mod policy;
mod thing;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use warden_authz::{authorize_read, build_redacted_view, Permission, Permissions};
use warden_cache::prelude::*;
use warden_config::EnforcementConfig;
use warden_core_types::{CommandHeaders, EntityKey, ResourceKey, ResourceType};
use warden_errors::prelude::*;
use warden_scheduler::{EnforcementScheduler, EnforcementTask};

use crate::collaborators::{EntityStore, Forwarder};
use crate::commands::{Command, CommandCategory};
use crate::loaders::{
    policy_key, read_subjects_of, EnforcerCache, PolicyEnforcerLoader, PolicyIdCache,
    ReadSubjectsCache, ThingEnforcement, ThingEnforcerLoader, ThingPolicyIdLoader,
};
use crate::response::{CommandResponse, Reply, ReplyAddress, Responder};

/// Extra lifetime of a correlation entry past its command's timeout. The
/// timeout watcher claims the entry first; expiry only catches leftovers.
const CORRELATION_GRACE: Duration = Duration::from_secs(1);

type Handler = fn(Arc<Inner>, Command, Responder) -> EnforcementTask;

fn handler_for(category: CommandCategory) -> Handler {
    match category {
        CommandCategory::ThingWrite => thing::enforce_write,
        CommandCategory::ThingRead => thing::enforce_read,
        CommandCategory::PolicyWrite => policy::enforce_write,
        CommandCategory::PolicyRead => policy::enforce_read,
        CommandCategory::Action => policy::enforce_action,
        CommandCategory::Message => message::enforce,
        CommandCategory::LiveSignal => live::enforce,
    }
}

/// Whoever waits for a published command's answer.
#[derive(Clone)]
pub struct Waiter {
    key: EntityKey,
    address: ReplyAddress,
    /// Thing payloads are filtered for the waiting caller; message payloads are not.
    redact: bool,
}

pub type Correlations = CorrelationCache<Waiter>;

pub(crate) struct Inner {
    scheduler: EnforcementScheduler,
    things: ThingEnforcerLoader,
    read_subjects: ReadSubjectsCache,
    correlations: Arc<Correlations>,
    forwarder: Arc<dyn Forwarder>,
    ask_timeout: Duration,
    max_timeout: Duration,
    always_visible: Vec<String>,
}

/// Result of the prepare phase.
pub(crate) enum Verdict {
    /// Authorization failed; the error goes straight back to the caller.
    Reject(ErrorObj),
    Proceed(Box<dyn FnOnce(Responder) -> BoxFuture<'static, Result<(), ErrorObj>> + Send>),
}

impl Verdict {
    fn proceed<F, Fut>(commit: F) -> Self
    where
        F: FnOnce(Responder) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ErrorObj>> + Send + 'static,
    {
        Verdict::Proceed(Box::new(move |responder| commit(responder).boxed()))
    }
}

/// Cache entries made stale by a mutation.
#[derive(Clone, Debug)]
pub(crate) enum Stale {
    ThingPolicyId(EntityKey),
    Enforcer(EntityKey),
}

pub(crate) enum Forwarded {
    Answered(CommandResponse),
    Published,
}

struct TaskMeta {
    key: EntityKey,
    category: CommandCategory,
    invalidates: bool,
    label: &'static str,
}

impl TaskMeta {
    fn of(command: &Command) -> Self {
        Self {
            key: command.entity_key(),
            category: command.category(),
            invalidates: command.invalidates_cache(),
            label: command.name(),
        }
    }
}

/// Wraps a prepare future into a task that always ends in one reply.
fn enforced<F>(meta: TaskMeta, responder: Responder, prepare: F) -> EnforcementTask
where
    F: Future<Output = Result<Verdict, ErrorObj>> + Send + 'static,
{
    let TaskMeta {
        key,
        category,
        invalidates,
        label,
    } = meta;
    let task_key = key.clone();
    EnforcementTask::new(task_key, invalidates, async move {
        match prepare.await {
            Ok(Verdict::Proceed(commit)) => Ok(commit(responder)),
            Ok(Verdict::Reject(err)) => {
                info!(key = %key, %category, command = label, labels = ?labels(&err), "command rejected");
                responder.fail(err);
                Ok(futures::future::ready(Ok(())).boxed())
            }
            Err(err) => {
                responder.fail(err.clone());
                Err(err)
            }
        }
    })
    .with_label(label)
}

/// Task for a command that reached the wrong handler.
fn misrouted(meta: TaskMeta, responder: Responder) -> EnforcementTask {
    let err = ErrorBuilder::new(codes::INTERNAL)
        .dev_msg(format!("{} routed to the {} handler", meta.label, meta.category))
        .build();
    enforced(meta, responder, async move { Err(err) })
}

fn write() -> Permissions {
    Permissions::of(Permission::Write)
}

impl Inner {
    /// Drops cached permission state before it is read, on request.
    fn invalidate_preemptively(&self, key: &EntityKey, headers: &CommandHeaders) {
        if !headers.invalidate_enforcer_preemptively {
            return;
        }
        debug!(key = %key, "preemptive enforcer invalidation");
        match key.resource_type {
            ResourceType::Policy => {
                self.things.enforcers().invalidate(key);
            }
            _ => {
                if let Some(Entry::Present(policy_id)) = self.things.policy_ids().get_if_present(key)
                {
                    self.things.enforcers().invalidate(&policy_key(&policy_id));
                }
                self.things.invalidate(key);
            }
        }
    }

    fn invalidate(&self, stale: &[Stale]) {
        for entry in stale {
            match entry {
                Stale::ThingPolicyId(key) => {
                    self.things.invalidate(key);
                }
                Stale::Enforcer(key) => {
                    self.things.enforcers().invalidate(key);
                }
            }
        }
    }

    /// Timeout of a command: its own, bounded by the configured maximum.
    fn timeout_of(&self, headers: &CommandHeaders) -> Duration {
        headers
            .timeout
            .unwrap_or(self.ask_timeout)
            .min(self.max_timeout)
    }

    async fn ask(
        &self,
        key: &EntityKey,
        command: Command,
        timeout: Duration,
    ) -> Result<CommandResponse, ErrorObj> {
        match tokio::time::timeout(timeout, self.forwarder.ask(key, command, timeout)).await {
            Ok(answer) => answer,
            Err(_) => {
                warn!(key = %key, timeout_ms = timeout.as_millis() as u64, "owner did not answer in time");
                Err(errors::unavailable(key, timeout))
            }
        }
    }

    /// Asks the owner, or just publishes when nobody waits for an answer.
    async fn forward(&self, key: &EntityKey, command: Command) -> Result<Forwarded, ErrorObj> {
        if command.headers().is_fire_and_forget() {
            self.forwarder.publish(key, command).await?;
            return Ok(Forwarded::Published);
        }
        let timeout = self.timeout_of(command.headers());
        self.ask(key, command, timeout).await.map(Forwarded::Answered)
    }

    /// Commit phase of a mutation: forward, invalidate, relay.
    fn forward_write(self: Arc<Self>, key: EntityKey, command: Command, stale: Vec<Stale>) -> Verdict {
        Verdict::proceed(move |responder| async move {
            let forwarded = self.forward(&key, command).await;
            self.invalidate(&stale);
            relay(responder, &key, forwarded)
        })
    }

    /// Publishes a command whose answer arrives later through
    /// [`EnforcementDispatcher::handle_live_response`].
    async fn publish_correlated(
        self: Arc<Self>,
        key: EntityKey,
        command: Command,
        responder: Responder,
        redact: bool,
    ) -> Result<(), ErrorObj> {
        let headers = command.headers().clone();
        if headers.is_fire_and_forget() {
            let published = self.forwarder.publish(&key, command).await;
            return relay(responder, &key, published.map(|_| Forwarded::Published));
        }
        let Some(correlation_id) = responder.correlation_id().map(str::to_string) else {
            let err = ErrorBuilder::new(codes::INTERNAL)
                .dev_msg("correlated publish without correlation id")
                .build();
            responder.fail(err.clone());
            return Err(err);
        };
        let timeout = self.timeout_of(&headers);
        let Some(address) = responder.into_address() else {
            return Ok(());
        };
        let waiter = Waiter {
            key: key.clone(),
            address: address.clone(),
            redact,
        };
        match self.correlations.put(
            &correlation_id,
            waiter,
            headers.authorization_context.clone(),
            Some(timeout.saturating_add(CORRELATION_GRACE)),
        ) {
            Ok(displaced) => {
                let mut own_displaced = false;
                for Displaced {
                    correlation_id: id,
                    reply_to,
                } in displaced
                {
                    warn!(key = %reply_to.key, correlation_id = %id, "pending response displaced");
                    own_displaced |= id == correlation_id;
                    let err = errors::displaced(&reply_to.key).with_correlation(Some(&id));
                    reply_to.address.reply(Reply::Error(err));
                }
                if own_displaced {
                    return Err(errors::displaced(&key));
                }
            }
            Err(err) => {
                let err = err.into_inner().with_correlation(Some(&correlation_id));
                address.reply(Reply::Error(err.clone()));
                return Err(err);
            }
        }

        if let Err(err) = self.forwarder.publish(&key, command).await {
            if let Some((waiter, _)) = self.correlations.take(&correlation_id) {
                waiter
                    .address
                    .reply(Reply::Error(err.clone().with_correlation(Some(&correlation_id))));
            }
            return Err(err);
        }

        let correlations = self.correlations.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some((waiter, _)) = correlations.take(&correlation_id) {
                warn!(key = %key, correlation_id = %correlation_id, "no response before timeout");
                let err = errors::timed_out(&key, timeout).with_correlation(Some(&correlation_id));
                waiter.address.reply(Reply::Error(err));
            }
        });
        Ok(())
    }

    /// Filters a thing payload for the caller holding `context`.
    async fn redact_for(
        &self,
        response: &mut CommandResponse,
        context: &warden_core_types::AuthorizationContext,
    ) -> Result<(), ErrorObj> {
        let key = response.entity_key.clone();
        let enforcement = self.things.load(&key).await?;
        let ThingEnforcement::Governed { enforcer, .. } = enforcement else {
            return Err(errors::not_found(&key));
        };
        if !authorize_read(&enforcer, &ResourceKey::root(ResourceType::Thing), context) {
            return Err(errors::not_found(&key));
        }
        if let Some(payload) = response.payload.take() {
            response.payload = Some(build_redacted_view(
                &enforcer,
                ResourceType::Thing,
                &payload,
                context,
                &self.always_visible,
            ));
        }
        Ok(())
    }
}

/// Sends the single reply for a forwarded command.
fn relay(
    responder: Responder,
    key: &EntityKey,
    forwarded: Result<Forwarded, ErrorObj>,
) -> Result<(), ErrorObj> {
    match forwarded {
        Ok(Forwarded::Answered(response)) => {
            responder.respond(response);
            Ok(())
        }
        Ok(Forwarded::Published) => {
            responder.accept(key.clone());
            Ok(())
        }
        Err(err) => {
            responder.fail(err.clone());
            Err(err)
        }
    }
}

/// Authorizes commands per entity and routes them to their owners.
#[derive(Clone)]
pub struct EnforcementDispatcher {
    inner: Arc<Inner>,
}

impl EnforcementDispatcher {
    pub fn new(
        config: &EnforcementConfig,
        store: Arc<dyn EntityStore>,
        forwarder: Arc<dyn Forwarder>,
    ) -> Self {
        let enforcers: EnforcerCache = EntryCache::new(
            "policy-enforcers",
            CachePolicy::new(config.enforcer_cache.ttl(), config.enforcer_cache.max_entries),
            Arc::new(PolicyEnforcerLoader::new(store.clone())),
        );
        let policy_ids: PolicyIdCache = EntryCache::new(
            "thing-policy-ids",
            CachePolicy::new(
                config.thing_policy_id_cache.ttl(),
                config.thing_policy_id_cache.max_entries,
            ),
            Arc::new(ThingPolicyIdLoader::new(store)),
        );
        let read_subjects = enforcers.project(|enforcer| Arc::new(read_subjects_of(enforcer)));
        let correlations = Arc::new(CorrelationCache::new(
            config.correlation_cache.default_ttl(),
            config.correlation_cache.max_entries,
        ));
        Self {
            inner: Arc::new(Inner {
                scheduler: EnforcementScheduler::new(),
                things: ThingEnforcerLoader::new(policy_ids, enforcers),
                read_subjects,
                correlations,
                forwarder,
                ask_timeout: config.dispatcher.ask_timeout(),
                max_timeout: config.dispatcher.max_timeout(),
                always_visible: config.dispatcher.always_visible_fields.clone(),
            }),
        }
    }

    /// Schedules enforcement of `command`. Exactly one [`Reply`] reaches
    /// `reply_to`. Must be called within a tokio runtime.
    pub fn dispatch(&self, mut command: Command, reply_to: ReplyAddress) {
        let correlation_id = command.headers_mut().ensure_correlation_id();
        let responder = Responder::new(reply_to, Some(correlation_id), command.name());
        let handler = handler_for(command.category());
        let task = handler(self.inner.clone(), command, responder);
        self.inner.scheduler.submit(task);
    }

    /// Routes a late response to the caller waiting for it. Returns `false`
    /// when nobody waits any more (unknown, expired or already answered).
    pub async fn handle_live_response(&self, mut response: CommandResponse) -> Result<bool, ErrorObj> {
        let correlation_id = response.correlation_id.clone().unwrap_or_default();
        let Some((waiter, context)) = self.inner.correlations.get(&correlation_id).await? else {
            debug!(correlation_id = %correlation_id, "response without waiter dropped");
            return Ok(false);
        };
        if waiter.redact {
            if let Err(err) = self.inner.redact_for(&mut response, &context).await {
                waiter
                    .address
                    .reply(Reply::Error(err.with_correlation(Some(&correlation_id))));
                return Ok(true);
            }
        }
        waiter.address.reply(Reply::Response(response));
        Ok(true)
    }

    pub fn scheduler(&self) -> &EnforcementScheduler {
        &self.inner.scheduler
    }

    pub fn enforcers(&self) -> &EnforcerCache {
        self.inner.things.enforcers()
    }

    pub fn policy_ids(&self) -> &PolicyIdCache {
        self.inner.things.policy_ids()
    }

    pub fn correlations(&self) -> &Arc<Correlations> {
        &self.inner.correlations
    }

    pub fn spawn_correlation_sweeper(&self, every: Duration) -> JoinHandle<()> {
        self.inner.correlations.spawn_sweeper(every)
    }
}
