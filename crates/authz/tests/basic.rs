use serde_json::json;
use warden_authz::prelude::*;
use warden_core_types::{AuthorizationContext, AuthorizationContextKind, ResourceKey};

fn context(subject: &str) -> AuthorizationContext {
    AuthorizationContext::new(AuthorizationContextKind::PreAuthenticated, [subject])
}

#[test]
fn json_policy_drives_write_and_read_decisions() {
    let policy = Policy::from_json(&json!({
        "policyId": "org.example:building",
        "entries": {
            "admin": {
                "subjects": {"pre:admin": {"type": "pre-authenticated"}},
                "resources": {
                    "thing:/": {"grant": ["READ", "WRITE"]},
                    "policy:/": {"grant": ["READ", "WRITE"]}
                }
            },
            "visitor": {
                "subjects": {"pre:visitor": {"type": "pre-authenticated"}},
                "resources": {
                    "thing:/attributes/public": {"grant": ["READ"]}
                }
            }
        }
    }))
    .expect("valid policy");
    let enforcer = PolicyEnforcer::new(policy);
    let root = ResourceKey::parse("thing:/").unwrap();
    let write = Permissions::of(Permission::Write);

    assert!(authorize_write(&enforcer, &root, &context("pre:admin"), &write));
    assert!(!authorize_write(&enforcer, &root, &context("pre:visitor"), &write));
    assert!(authorize_read(&enforcer, &root, &context("pre:visitor")));
    assert!(!authorize_read(
        &enforcer,
        &ResourceKey::parse("policy:/").unwrap(),
        &context("pre:visitor")
    ));

    let thing = json!({
        "thingId": "org.example:building",
        "attributes": {"public": {"name": "HQ"}, "internal": {"alarm": "1234"}}
    });
    let view = build_redacted_view(
        &enforcer,
        warden_core_types::ResourceType::Thing,
        &thing,
        &context("pre:visitor"),
        &["thingId".to_string()],
    );
    assert_eq!(
        view,
        json!({"thingId": "org.example:building", "attributes": {"public": {"name": "HQ"}}})
    );
}
