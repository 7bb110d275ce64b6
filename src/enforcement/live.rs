use std::sync::Arc;

use warden_authz::{decide_read, decide_write, Decision};
use warden_core_types::{ResourceKey, ResourceType};
use warden_scheduler::EnforcementTask;

use super::errors::{self, Access};
use super::{enforced, misrouted, write, Inner, TaskMeta, Verdict};
use crate::commands::Command;
use crate::loaders::read_subjects_of;
use crate::response::Responder;

/// Live signals are authorized like their twin counterparts, then published.
/// Their responses are filtered again once they arrive.
pub(super) fn enforce(inner: Arc<Inner>, command: Command, responder: Responder) -> EnforcementTask {
    let meta = TaskMeta::of(&command);
    let Command::Live(mut signal) = command else {
        return misrouted(meta, responder);
    };
    let key = meta.key.clone();
    enforced(meta, responder, async move {
        let cmd = &mut signal.command;
        inner.invalidate_preemptively(&key, &cmd.headers);
        let enforcement = inner.things.load(&key).await?;
        let context = &cmd.headers.authorization_context;
        let is_read = cmd.kind.is_read();
        let (decision, access) = if is_read {
            let root = ResourceKey::root(ResourceType::Thing);
            (decide_read(enforcement.governance(), &root, context), Access::Read)
        } else {
            let resource = cmd.kind.resource();
            (decide_write(enforcement.governance(), &resource, context, &write()), Access::Modify)
        };
        if decision != Decision::Allow {
            return Ok(Verdict::Reject(errors::rejection(&key, access, decision)));
        }
        if let Some(enforcer) = enforcement.enforcer() {
            cmd.headers.read_subjects = read_subjects_of(enforcer);
        }
        Ok(Verdict::proceed(move |responder| {
            inner.publish_correlated(key, Command::Live(signal), responder, is_read)
        }))
    })
}
