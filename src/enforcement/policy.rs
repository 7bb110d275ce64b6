use std::sync::Arc;

use serde_json::{Map, Value};
use warden_authz::{
    authorize_action, authorize_creation, build_redacted_view, decide_read,
    decide_write, Decision, Governance, Permission, Policy, PolicyEnforcer,
};
use warden_cache::prelude::*;
use warden_core_types::{AuthorizationContext, JsonPointer, ResourceKey, ResourceType, SubjectId};
use warden_scheduler::EnforcementTask;

use super::errors::{self, Access};
use super::{enforced, misrouted, relay, write, Forwarded, Inner, Stale, TaskMeta, Verdict};
use crate::commands::{Command, PolicyCommand, PolicyCommandKind};
use crate::response::Responder;

fn governance(entry: &Entry<Arc<PolicyEnforcer>>) -> Governance<'_> {
    match entry {
        Entry::Present(enforcer) => Governance::Governed(enforcer.as_ref()),
        Entry::Nonexistent => Governance::Missing,
    }
}

pub(super) fn enforce_write(inner: Arc<Inner>, command: Command, responder: Responder) -> EnforcementTask {
    let meta = TaskMeta::of(&command);
    let Command::Policy(cmd) = command else {
        return misrouted(meta, responder);
    };
    let key = meta.key.clone();
    enforced(meta, responder, async move {
        inner.invalidate_preemptively(&key, &cmd.headers);
        let current = inner.things.enforcers().get(&key).await?;
        let context = &cmd.headers.authorization_context;
        let root = ResourceKey::root(ResourceType::Policy);

        if let (PolicyCommandKind::Create { policy }, Entry::Nonexistent) = (&cmd.kind, &current) {
            let candidate = match Policy::from_json(policy) {
                Ok(candidate) => candidate,
                Err(err) => return Ok(Verdict::Reject(err.into_inner())),
            };
            if !authorize_creation(Some(&candidate), &root, context, &write()) {
                return Ok(Verdict::Reject(errors::rejection(&key, Access::Create, Decision::Deny)));
            }
        } else {
            let decision = decide_write(governance(&current), &cmd.kind.resource(), context, &write());
            if decision != Decision::Allow {
                return Ok(Verdict::Reject(errors::rejection(&key, Access::Modify, decision)));
            }
        }
        let stale = vec![Stale::Enforcer(key.clone())];
        Ok(inner.forward_write(key, Command::Policy(cmd), stale))
    })
}

pub(super) fn enforce_read(inner: Arc<Inner>, command: Command, responder: Responder) -> EnforcementTask {
    let meta = TaskMeta::of(&command);
    let Command::Policy(cmd) = command else {
        return misrouted(meta, responder);
    };
    let key = meta.key.clone();
    enforced(meta, responder, async move {
        inner.invalidate_preemptively(&key, &cmd.headers);
        let current = inner.things.enforcers().get(&key).await?;
        let resource = cmd.kind.resource();
        let decision = decide_read(governance(&current), &resource, &cmd.headers.authorization_context);
        let Entry::Present(enforcer) = current else {
            return Ok(Verdict::Reject(errors::rejection(&key, Access::Read, decision)));
        };
        if decision != Decision::Allow {
            return Ok(Verdict::Reject(errors::rejection(&key, Access::Read, decision)));
        }
        let context = cmd.headers.authorization_context.clone();
        Ok(Verdict::proceed(move |responder| async move {
            let forwarded = match inner.forward(&key, Command::Policy(cmd)).await {
                Ok(Forwarded::Answered(mut response)) => {
                    if let Some(payload) = response.payload.take() {
                        response.payload =
                            Some(policy_view(&enforcer, &resource.path, payload, &context));
                    }
                    Ok(Forwarded::Answered(response))
                }
                other => other,
            };
            relay(responder, &key, forwarded)
        }))
    })
}

/// Filters a (possibly partial) policy document retrieved at `path`.
fn policy_view(
    enforcer: &PolicyEnforcer,
    path: &JsonPointer,
    payload: Value,
    context: &AuthorizationContext,
) -> Value {
    let mut document = payload;
    for segment in path.segments().iter().rev() {
        let mut parent = Map::new();
        parent.insert(segment.clone(), document);
        document = Value::Object(parent);
    }
    let view = build_redacted_view(enforcer, ResourceType::Policy, &document, context, &[]);
    if path.is_root() {
        return view;
    }
    view.pointer(&path.to_string())
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()))
}

fn action_name(kind: &PolicyCommandKind) -> &'static str {
    match kind {
        PolicyCommandKind::ActivateTokenIntegration { .. } => "activateTokenIntegration",
        PolicyCommandKind::DeactivateTokenIntegration { .. } => "deactivateTokenIntegration",
        _ => "",
    }
}

/// Token-integration actions: every targeted entry needs EXECUTE on its
/// action resource, and the subject template is resolved per entry.
pub(super) fn enforce_action(inner: Arc<Inner>, command: Command, responder: Responder) -> EnforcementTask {
    let meta = TaskMeta::of(&command);
    let Command::Policy(cmd) = command else {
        return misrouted(meta, responder);
    };
    let key = meta.key.clone();
    enforced(meta, responder, async move {
        inner.invalidate_preemptively(&key, &cmd.headers);
        let enforcer = match inner.things.enforcers().get(&key).await? {
            Entry::Present(enforcer) => enforcer,
            Entry::Nonexistent => return Ok(Verdict::Reject(errors::not_found(&key))),
        };
        let action = action_name(&cmd.kind);
        let mut cmd: PolicyCommand = cmd;
        let context = cmd.headers.authorization_context.clone();
        let (labels, template, resolved) = match &mut cmd.kind {
            PolicyCommandKind::ActivateTokenIntegration {
                labels,
                subject_template,
                resolved_subjects,
                ..
            }
            | PolicyCommandKind::DeactivateTokenIntegration {
                labels,
                subject_template,
                resolved_subjects,
            } => (labels, subject_template.clone(), resolved_subjects),
            _ => return Err(errors::action_failed(&key, action, "not a policy action")),
        };

        match resolve_targets(&enforcer, action, labels, &template, &context) {
            Ok((targets, subjects)) => {
                *labels = targets;
                *resolved = subjects;
            }
            Err(reason) => return Ok(Verdict::Reject(errors::action_failed(&key, action, &reason))),
        }
        let stale = vec![Stale::Enforcer(key.clone())];
        Ok(inner.forward_write(key, Command::Policy(cmd), stale))
    })
}

/// With explicit labels every one must be authorized; without, the action
/// applies to every entry the caller may execute it on.
fn resolve_targets(
    enforcer: &PolicyEnforcer,
    action: &str,
    labels: &[String],
    template: &str,
    context: &AuthorizationContext,
) -> Result<(Vec<String>, Vec<SubjectId>), String> {
    let explicit = !labels.is_empty();
    let candidates: Vec<String> = if explicit {
        labels.to_vec()
    } else {
        enforcer
            .policy()
            .entries
            .iter()
            .map(|entry| entry.label.clone())
            .collect()
    };

    let mut targets = Vec::new();
    let mut subjects = Vec::new();
    for label in candidates {
        if enforcer.policy().entry(&label).is_none() {
            return Err(format!("policy entry '{label}' does not exist"));
        }
        match authorize_action(enforcer, &label, action, template, context, Permission::Execute) {
            Ok(subject) => {
                targets.push(label);
                subjects.push(subject);
            }
            Err(rejection) if explicit => return Err(rejection.to_string()),
            Err(_) => {}
        }
    }
    if targets.is_empty() {
        return Err("no policy entry the requester may execute the action on".to_string());
    }
    Ok((targets, subjects))
}
