use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;
use warden_authz::{
    authorize_creation, authorize_read, authorize_write, build_redacted_view, decide_read,
    decide_write, Decision, Policy, PolicyEnforcer,
};
use warden_cache::prelude::*;
use warden_core_types::{EntityId, EntityKey, JsonPointer, ResourceKey, ResourceType};
use warden_errors::prelude::*;
use warden_scheduler::EnforcementTask;

use super::errors::{self, Access};
use super::{enforced, misrouted, relay, write, Forwarded, Inner, Stale, TaskMeta, Verdict};
use crate::commands::{Command, PolicyCommand, PolicyCommandKind, ThingCommand, ThingCommandKind};
use crate::loaders::{policy_key, read_subjects_of, ThingEnforcement};
use crate::response::Responder;

/// Field under which an inlined policy is returned with its thing.
const INLINE_POLICY_FIELD: &str = "_policy";

pub(super) fn enforce_write(inner: Arc<Inner>, command: Command, responder: Responder) -> EnforcementTask {
    let meta = TaskMeta::of(&command);
    let Command::Thing(cmd) = command else {
        return misrouted(meta, responder);
    };
    let key = meta.key.clone();
    enforced(meta, responder, async move {
        inner.invalidate_preemptively(&key, &cmd.headers);
        let enforcement = inner.things.load(&key).await?;
        if matches!(cmd.kind, ThingCommandKind::Create { .. }) {
            return prepare_create(inner, key, cmd, enforcement).await;
        }
        let resource = cmd.kind.resource();
        let decision = decide_write(
            enforcement.governance(),
            &resource,
            &cmd.headers.authorization_context,
            &write(),
        );
        if decision != Decision::Allow {
            return Ok(Verdict::Reject(errors::rejection(&key, Access::Modify, decision)));
        }
        let mut stale = Vec::new();
        if cmd.kind.changes_governance() {
            stale.push(Stale::ThingPolicyId(key.clone()));
        }
        let mut cmd = cmd;
        if let Some(enforcer) = enforcement.enforcer() {
            cmd.headers.read_subjects = read_subjects_of(enforcer);
        }
        Ok(inner.forward_write(key, Command::Thing(cmd), stale))
    })
}

/// A create has no permission state to check against yet: it is authorized
/// against the policy it brings along, the policy it references, or the
/// default policy for its creator.
async fn prepare_create(
    inner: Arc<Inner>,
    key: EntityKey,
    mut cmd: ThingCommand,
    enforcement: ThingEnforcement,
) -> Result<Verdict, ErrorObj> {
    let context = cmd.headers.authorization_context.clone();
    let root = ResourceKey::root(ResourceType::Thing);

    if let ThingEnforcement::Ungoverned { policy_id } = &enforcement {
        let decision = Decision::Ungoverned {
            policy_id: policy_id.clone(),
        };
        return Ok(Verdict::Reject(errors::rejection(&key, Access::Modify, decision)));
    }
    if let Some(enforcer) = enforcement.enforcer() {
        // Existing thing: the owner reports the conflict, but only to callers allowed to write.
        if !authorize_write(enforcer, &root, &context, &write()) {
            return Ok(Verdict::Reject(errors::rejection(&key, Access::Modify, Decision::Deny)));
        }
        cmd.headers.read_subjects = read_subjects_of(enforcer);
        return Ok(inner.forward_write(key, Command::Thing(cmd), Vec::new()));
    }

    let ThingCommandKind::Create {
        initial_policy,
        policy_id,
        ..
    } = &mut cmd.kind
    else {
        return Err(errors::not_creatable(&key, "not a create command"));
    };

    let (candidate, governing) = match (initial_policy.clone(), policy_id.clone()) {
        (Some(raw), _) => match Policy::from_json(&raw) {
            Ok(policy) => {
                let governing = policy.id.clone().unwrap_or_else(|| key.id.clone());
                (policy, governing)
            }
            Err(err) => return Ok(Verdict::Reject(errors::not_creatable(&key, &err.to_string()))),
        },
        (None, Some(referenced)) => match inner.things.enforcers().get(&policy_key(&referenced)).await? {
            Entry::Present(enforcer) => (enforcer.policy().clone(), referenced),
            Entry::Nonexistent => {
                return Ok(Verdict::Reject(errors::not_creatable(
                    &key,
                    &format!("referenced policy '{referenced}' does not exist"),
                )))
            }
        },
        (None, None) => {
            let Some(subject) = context.first_subject() else {
                return Ok(Verdict::Reject(errors::not_creatable(
                    &key,
                    "no subject to grant the default policy to",
                )));
            };
            let default = Policy::default_for(Some(key.id.clone()), subject);
            *initial_policy = Some(default.to_json());
            (default, key.id.clone())
        }
    };

    if !authorize_creation(Some(&candidate), &root, &context, &write()) {
        return Ok(Verdict::Reject(errors::rejection(&key, Access::Create, Decision::Deny)));
    }
    *policy_id = Some(governing.clone());
    cmd.headers.read_subjects = read_subjects_of(&PolicyEnforcer::new(candidate));
    let stale = vec![
        Stale::ThingPolicyId(key.clone()),
        Stale::Enforcer(policy_key(&governing)),
    ];
    Ok(inner.forward_write(key, Command::Thing(cmd), stale))
}

pub(super) fn enforce_read(inner: Arc<Inner>, command: Command, responder: Responder) -> EnforcementTask {
    let meta = TaskMeta::of(&command);
    let Command::Thing(cmd) = command else {
        return misrouted(meta, responder);
    };
    let key = meta.key.clone();
    enforced(meta, responder, async move {
        inner.invalidate_preemptively(&key, &cmd.headers);
        let enforcement = inner.things.load(&key).await?;
        let decision = decide_read(
            enforcement.governance(),
            &ResourceKey::root(ResourceType::Thing),
            &cmd.headers.authorization_context,
        );
        let ThingEnforcement::Governed {
            policy_id,
            enforcer,
        } = enforcement
        else {
            return Ok(Verdict::Reject(errors::rejection(&key, Access::Read, decision)));
        };
        if decision != Decision::Allow {
            return Ok(Verdict::Reject(errors::rejection(&key, Access::Read, decision)));
        }
        let mut cmd = cmd;
        cmd.headers.read_subjects = inner
            .read_subjects
            .get(&policy_key(&policy_id))
            .await?
            .into_value()
            .map(|subjects| subjects.as_ref().clone())
            .unwrap_or_default();
        Ok(Verdict::proceed(move |responder| async move {
            let forwarded = inner.forward(&key, Command::Thing(cmd.clone())).await;
            let forwarded = match forwarded {
                Ok(Forwarded::Answered(mut response)) => {
                    if let Some(payload) = response.payload.take() {
                        response.payload =
                            Some(retrieve_view(&inner, &cmd, &policy_id, &enforcer, payload).await);
                    }
                    Ok(Forwarded::Answered(response))
                }
                other => other,
            };
            relay(responder, &key, forwarded)
        }))
    })
}

/// Filters a retrieved thing, applies field selection, and inlines its policy
/// when asked to. The policy is fetched only after the thing is known.
async fn retrieve_view(
    inner: &Inner,
    cmd: &ThingCommand,
    policy_id: &EntityId,
    enforcer: &PolicyEnforcer,
    payload: Value,
) -> Value {
    let context = &cmd.headers.authorization_context;
    let ThingCommandKind::Retrieve {
        fields,
        inline_policy,
    } = &cmd.kind
    else {
        return Value::Object(Map::new());
    };

    let mut view = build_redacted_view(
        enforcer,
        ResourceType::Thing,
        &payload,
        context,
        &inner.always_visible,
    );
    if let Some(fields) = fields {
        view = select_fields(&view, fields);
    }
    if *inline_policy {
        let related = payload
            .get("policyId")
            .and_then(Value::as_str)
            .map(EntityId::new)
            .unwrap_or_else(|| policy_id.clone());
        if let Some(policy) = inline_policy_view(inner, cmd, &related).await {
            if let Value::Object(map) = &mut view {
                map.insert(INLINE_POLICY_FIELD.to_string(), policy);
            }
        }
    }
    view
}

async fn inline_policy_view(inner: &Inner, cmd: &ThingCommand, policy_id: &EntityId) -> Option<Value> {
    let key = policy_key(policy_id);
    let context = &cmd.headers.authorization_context;
    let enforcer = match inner.things.enforcers().get(&key).await {
        Ok(Entry::Present(enforcer)) => enforcer,
        Ok(Entry::Nonexistent) => return None,
        Err(err) => {
            debug!(key = %key, error = %err, "inline policy skipped");
            return None;
        }
    };
    if !authorize_read(&enforcer, &ResourceKey::root(ResourceType::Policy), context) {
        return None;
    }
    let retrieve = PolicyCommand::new(
        policy_id.clone(),
        PolicyCommandKind::Retrieve {
            path: JsonPointer::root(),
        },
        cmd.headers.clone(),
    );
    let timeout = inner.timeout_of(&cmd.headers);
    match inner.ask(&key, Command::Policy(retrieve), timeout).await {
        Ok(response) => response.payload.map(|policy| {
            build_redacted_view(&enforcer, ResourceType::Policy, &policy, context, &[])
        }),
        Err(err) => {
            debug!(key = %key, error = %err, "inline policy retrieval failed");
            None
        }
    }
}

/// Keeps only the selected pointers of `view`, preserving their nesting.
pub(crate) fn select_fields(view: &Value, fields: &[JsonPointer]) -> Value {
    let mut selected = Value::Object(Map::new());
    if fields.iter().any(JsonPointer::is_root) {
        return view.clone();
    }
    for field in fields {
        let Some(value) = view.pointer(&field.to_string()) else {
            continue;
        };
        let mut target = &mut selected;
        let segments = field.segments();
        for (i, segment) in segments.iter().enumerate() {
            let Value::Object(map) = target else { break };
            if i + 1 == segments.len() {
                map.insert(segment.clone(), value.clone());
                break;
            }
            target = map
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_selection_keeps_nesting() {
        let view = json!({
            "thingId": "org.example:lamp",
            "attributes": {"location": "kitchen", "owner": "alice"},
            "features": {"lamp": {"properties": {"on": true}}}
        });
        let selected = select_fields(
            &view,
            &[
                JsonPointer::parse("/thingId"),
                JsonPointer::parse("/attributes/location"),
                JsonPointer::parse("/missing"),
            ],
        );
        assert_eq!(
            selected,
            json!({"thingId": "org.example:lamp", "attributes": {"location": "kitchen"}})
        );
    }

    #[test]
    fn root_selection_keeps_the_whole_view() {
        let view = json!({"thingId": "org.example:lamp", "attributes": {"location": "kitchen"}});
        let selected = select_fields(
            &view,
            &[JsonPointer::root(), JsonPointer::parse("/thingId")],
        );
        assert_eq!(selected, view);
    }
}
