use crate::{kind::ErrorKind, retry::RetryClass, severity::Severity};
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub &'static str);

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match REGISTRY.get_key_value(s.as_str()) {
            Some((key, _)) => Ok(ErrorCode(*key)),
            None => Ok(codes::INTERNAL),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CodeSpec {
    pub code: ErrorCode,
    pub kind: ErrorKind,
    pub http_status: u16,
    pub retryable: RetryClass,
    pub severity: Severity,
    pub default_user_msg: &'static str,
}

pub mod codes {
    use super::ErrorCode;

    pub const THING_NOT_ACCESSIBLE: ErrorCode = ErrorCode("things:thing.notfound");
    pub const THING_NOT_MODIFIABLE: ErrorCode = ErrorCode("things:thing.notmodifiable");
    pub const THING_NOT_CREATABLE: ErrorCode = ErrorCode("things:thing.notcreatable");
    pub const POLICY_NOT_ACCESSIBLE: ErrorCode = ErrorCode("policies:policy.notfound");
    pub const POLICY_NOT_MODIFIABLE: ErrorCode = ErrorCode("policies:policy.notmodifiable");
    pub const POLICY_ACTION_FAILED: ErrorCode = ErrorCode("policies:policy.action.notallowed");
    pub const MESSAGE_SEND_NOT_ALLOWED: ErrorCode = ErrorCode("messages:send.notallowed");
    pub const SERVICE_UNAVAILABLE: ErrorCode = ErrorCode("gateway:service.unavailable");
    pub const COMMAND_TIMEOUT: ErrorCode = ErrorCode("gateway:command.timeout");
    pub const PRECONDITION_FAILED: ErrorCode = ErrorCode("enforcement:precondition.failed");
    pub const CACHE_LOAD_FAILED: ErrorCode = ErrorCode("enforcement:cache.load.failed");
    pub const INTERNAL: ErrorCode = ErrorCode("internal:error");
}

pub static REGISTRY: Lazy<HashMap<&'static str, CodeSpec>> = Lazy::new(|| {
    use codes::*;

    let mut map = HashMap::new();
    let mut add = |spec: CodeSpec| {
        let key = spec.code.0;
        if map.insert(key, spec).is_some() {
            panic!("duplicate error code: {}", key);
        }
    };

    add(CodeSpec {
        code: THING_NOT_ACCESSIBLE,
        kind: ErrorKind::NotAccessible,
        http_status: 404,
        retryable: RetryClass::Permanent,
        severity: Severity::Info,
        default_user_msg: "The Thing could not be found or the requester had insufficient permissions to access it.",
    });

    add(CodeSpec {
        code: THING_NOT_MODIFIABLE,
        kind: ErrorKind::NotModifiable,
        http_status: 403,
        retryable: RetryClass::Permanent,
        severity: Severity::Warn,
        default_user_msg: "The Thing could not be modified as the requester had insufficient permissions.",
    });

    add(CodeSpec {
        code: THING_NOT_CREATABLE,
        kind: ErrorKind::NotModifiable,
        http_status: 403,
        retryable: RetryClass::Permanent,
        severity: Severity::Warn,
        default_user_msg: "The Thing could not be created as the requester had insufficient permissions.",
    });

    add(CodeSpec {
        code: POLICY_NOT_ACCESSIBLE,
        kind: ErrorKind::NotAccessible,
        http_status: 404,
        retryable: RetryClass::Permanent,
        severity: Severity::Info,
        default_user_msg: "The Policy could not be found or the requester had insufficient permissions to access it.",
    });

    add(CodeSpec {
        code: POLICY_NOT_MODIFIABLE,
        kind: ErrorKind::NotModifiable,
        http_status: 403,
        retryable: RetryClass::Permanent,
        severity: Severity::Warn,
        default_user_msg: "The Policy could not be modified as the requester had insufficient permissions.",
    });

    add(CodeSpec {
        code: POLICY_ACTION_FAILED,
        kind: ErrorKind::PolicyDeny,
        http_status: 403,
        retryable: RetryClass::Permanent,
        severity: Severity::Warn,
        default_user_msg: "The Policy action could not be executed.",
    });

    add(CodeSpec {
        code: MESSAGE_SEND_NOT_ALLOWED,
        kind: ErrorKind::PolicyDeny,
        http_status: 403,
        retryable: RetryClass::Permanent,
        severity: Severity::Warn,
        default_user_msg: "You are not allowed to send messages to the Thing.",
    });

    add(CodeSpec {
        code: SERVICE_UNAVAILABLE,
        kind: ErrorKind::Unavailable,
        http_status: 503,
        retryable: RetryClass::Transient,
        severity: Severity::Error,
        default_user_msg: "The service is currently not available. Please retry later.",
    });

    add(CodeSpec {
        code: COMMAND_TIMEOUT,
        kind: ErrorKind::Timeout,
        http_status: 408,
        retryable: RetryClass::Transient,
        severity: Severity::Warn,
        default_user_msg: "The command did not receive a response within the requested timeout.",
    });

    add(CodeSpec {
        code: PRECONDITION_FAILED,
        kind: ErrorKind::Precondition,
        http_status: 400,
        retryable: RetryClass::Permanent,
        severity: Severity::Warn,
        default_user_msg: "The request is invalid.",
    });

    add(CodeSpec {
        code: CACHE_LOAD_FAILED,
        kind: ErrorKind::Unavailable,
        http_status: 503,
        retryable: RetryClass::Transient,
        severity: Severity::Error,
        default_user_msg: "Permissions could not be resolved. Please retry later.",
    });

    add(CodeSpec {
        code: INTERNAL,
        kind: ErrorKind::Unknown,
        http_status: 500,
        retryable: RetryClass::Transient,
        severity: Severity::Critical,
        default_user_msg: "Internal error. Please retry later.",
    });

    map
});

/// Unregistered codes fall back to the internal error spec.
pub fn spec_of(code: ErrorCode) -> &'static CodeSpec {
    REGISTRY
        .get(code.0)
        .or_else(|| REGISTRY.get(codes::INTERNAL.0))
        .expect("internal error code is always registered")
}
