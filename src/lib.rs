//! Warden: per-entity enforcement of thing, policy and message commands.
//!
//! Commands are authorized against cached policy enforcers, serialized per
//! entity, forwarded to the component owning the entity, and answered
//! exactly once.

pub mod collaborators;
pub mod commands;
pub mod enforcement;
pub mod loaders;
pub mod metrics;
pub mod response;

pub use collaborators::{EntityStore, Forwarder, InMemoryEntityStore};
pub use commands::{
    Command, CommandCategory, LiveSignal, MessageCommand, MessageDirection, PolicyCommand,
    PolicyCommandKind, ThingCommand, ThingCommandKind,
};
pub use enforcement::EnforcementDispatcher;
pub use loaders::{ThingEnforcement, ThingEnforcerLoader};
pub use response::{CommandResponse, Reply, ReplyAddress, ReplyTarget, Responder};
