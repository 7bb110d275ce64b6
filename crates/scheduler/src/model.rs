use std::fmt;
use std::future::Future;

use futures::future::{BoxFuture, FutureExt};
use warden_core_types::EntityKey;
use warden_errors::prelude::ErrorObj;

/// Side-effecting phase of a task; runs exclusively per key.
pub type CommitFuture = BoxFuture<'static, Result<(), ErrorObj>>;
/// Preparation phase; may overlap with other tasks on the same key.
pub type PrepareFuture = BoxFuture<'static, Result<CommitFuture, ErrorObj>>;

/// Unit of scheduled work for one entity.
pub struct EnforcementTask {
    key: EntityKey,
    invalidates_cache: bool,
    label: &'static str,
    prepare: PrepareFuture,
}

impl EnforcementTask {
    /// Builds a two-phase task: `prepare` resolves to the commit future.
    pub fn new<P, C>(key: EntityKey, invalidates_cache: bool, prepare: P) -> Self
    where
        P: Future<Output = Result<C, ErrorObj>> + Send + 'static,
        C: Future<Output = Result<(), ErrorObj>> + Send + 'static,
    {
        Self {
            key,
            invalidates_cache,
            label: "task",
            prepare: prepare
                .map(|prepared| prepared.map(|commit| commit.boxed()))
                .boxed(),
        }
    }

    /// A task without a preparation phase.
    pub fn exclusive<C>(key: EntityKey, invalidates_cache: bool, body: C) -> Self
    where
        C: Future<Output = Result<(), ErrorObj>> + Send + 'static,
    {
        Self::new(key, invalidates_cache, async move { Ok::<C, ErrorObj>(body) })
    }

    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn invalidates_cache(&self) -> bool {
        self.invalidates_cache
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub(crate) fn into_prepare(self) -> PrepareFuture {
        self.prepare
    }
}

impl fmt::Debug for EnforcementTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnforcementTask")
            .field("key", &self.key)
            .field("invalidates_cache", &self.invalidates_cache)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LaneState {
    Idle,
    /// Tasks are admitted but none has reached its commit.
    Preparing,
    /// One task owns the key and is committing.
    Dispatching,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum TaskPhase {
    Preparing,
    Committing,
}
