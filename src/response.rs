use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;
use warden_core_types::EntityKey;
use warden_errors::prelude::*;

/// Answer produced by the component owning an entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub entity_key: EntityKey,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl CommandResponse {
    pub fn new(entity_key: EntityKey, status: u16) -> Self {
        Self {
            entity_key,
            status,
            payload: None,
            correlation_id: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// What the original caller eventually receives.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    Response(CommandResponse),
    /// Fire-and-forget acknowledgement; nothing downstream was awaited.
    Accepted {
        entity_key: EntityKey,
        correlation_id: Option<String>,
    },
    Error(ErrorObj),
}

impl Reply {
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Reply::Response(response) => response.correlation_id.as_deref(),
            Reply::Accepted { correlation_id, .. } => correlation_id.as_deref(),
            Reply::Error(err) => err.correlation_id.as_deref(),
        }
    }

    pub fn error(&self) -> Option<&ErrorObj> {
        match self {
            Reply::Error(err) => Some(err),
            _ => None,
        }
    }
}

pub trait ReplyTarget: Send + Sync {
    fn reply(&self, reply: Reply);
}

/// Opaque handle on the caller, captured when the command arrives.
pub type ReplyAddress = Arc<dyn ReplyTarget>;

impl ReplyTarget for mpsc::UnboundedSender<Reply> {
    fn reply(&self, reply: Reply) {
        if self.send(reply).is_err() {
            warn!("reply dropped: caller went away");
        }
    }
}

/// Exactly-once reply handle for one command.
///
/// Consuming methods send the single reply. A responder dropped without
/// replying (a panicking task, a forgotten branch) answers with an internal
/// error instead of leaving the caller waiting.
pub struct Responder {
    target: Option<ReplyAddress>,
    correlation_id: Option<String>,
    command: &'static str,
}

impl Responder {
    pub fn new(target: ReplyAddress, correlation_id: Option<String>, command: &'static str) -> Self {
        Self {
            target: Some(target),
            correlation_id,
            command,
        }
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn respond(mut self, mut response: CommandResponse) {
        if response.correlation_id.is_none() {
            response.correlation_id = self.correlation_id.clone();
        }
        self.send(Reply::Response(response));
    }

    pub fn accept(mut self, entity_key: EntityKey) {
        let correlation_id = self.correlation_id.clone();
        self.send(Reply::Accepted {
            entity_key,
            correlation_id,
        });
    }

    pub fn fail(mut self, err: ErrorObj) {
        let err = err.with_correlation(self.correlation_id.as_deref());
        self.send(Reply::Error(err));
    }

    /// Hands the obligation to reply over to someone else, e.g. a correlation entry.
    pub fn into_address(mut self) -> Option<ReplyAddress> {
        self.target.take()
    }

    fn send(&mut self, reply: Reply) {
        if let Some(target) = self.target.take() {
            target.reply(reply);
        }
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("command", &self.command)
            .field("correlation_id", &self.correlation_id)
            .field("pending", &self.target.is_some())
            .finish()
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        if let Some(target) = self.target.take() {
            warn!(
                command = self.command,
                correlation_id = ?self.correlation_id,
                "enforcement ended without a reply"
            );
            let err = ErrorBuilder::new(codes::INTERNAL)
                .dev_msg(format!("{} finished without replying", self.command))
                .correlation_opt(self.correlation_id.as_deref())
                .build();
            target.reply(Reply::Error(err));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (ReplyAddress, mpsc::UnboundedReceiver<Reply>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(tx), rx)
    }

    #[test]
    fn errors_carry_the_callers_correlation_id() {
        let (address, mut rx) = channel();
        let responder = Responder::new(address, Some("c-9".into()), "thing.modify");
        responder.fail(ErrorBuilder::new(codes::THING_NOT_MODIFIABLE).build());
        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.correlation_id(), Some("c-9"));
        assert!(reply.error().unwrap().is(codes::THING_NOT_MODIFIABLE));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_responder_answers_with_internal_error() {
        let (address, mut rx) = channel();
        drop(Responder::new(address, None, "thing.retrieve"));
        let reply = rx.try_recv().unwrap();
        assert!(reply.error().unwrap().is(codes::INTERNAL));
    }

    #[test]
    fn handed_over_responder_stays_silent() {
        let (address, mut rx) = channel();
        let responder = Responder::new(address, Some("c-1".into()), "live.signal");
        let handed = responder.into_address();
        assert!(handed.is_some());
        assert!(rx.try_recv().is_err());
    }
}
