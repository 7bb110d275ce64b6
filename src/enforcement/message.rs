use std::sync::Arc;

use warden_authz::{decide_write, Decision, Permission};
use warden_scheduler::EnforcementTask;

use super::errors::{self, Access};
use super::{enforced, misrouted, write, Inner, TaskMeta, Verdict};
use crate::commands::Command;
use crate::response::Responder;

/// Messages need WRITE on their mailbox resource. They are published, never
/// asked: the answer, if one is expected, comes back through correlation.
pub(super) fn enforce(inner: Arc<Inner>, command: Command, responder: Responder) -> EnforcementTask {
    let meta = TaskMeta::of(&command);
    let Command::Message(mut message) = command else {
        return misrouted(meta, responder);
    };
    let key = meta.key.clone();
    enforced(meta, responder, async move {
        inner.invalidate_preemptively(&key, &message.headers);
        let enforcement = inner.things.load(&key).await?;
        let resource = message.resource();
        let decision = decide_write(
            enforcement.governance(),
            &resource,
            &message.headers.authorization_context,
            &write(),
        );
        if decision != Decision::Allow {
            return Ok(Verdict::Reject(errors::rejection(&key, Access::Send, decision)));
        }
        if let Some(enforcer) = enforcement.enforcer() {
            message.headers.read_subjects =
                enforcer.subjects_with_partial_permission(&resource, Permission::Read);
        }
        Ok(Verdict::proceed(move |responder| {
            inner.publish_correlated(key, Command::Message(message), responder, false)
        }))
    })
}
