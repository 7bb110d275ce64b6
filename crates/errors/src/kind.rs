#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    NotAccessible,
    NotModifiable,
    PolicyDeny,
    Precondition,
    Timeout,
    Unavailable,
    Unknown,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotAccessible => "NotAccessible",
            ErrorKind::NotModifiable => "NotModifiable",
            ErrorKind::PolicyDeny => "PolicyDeny",
            ErrorKind::Precondition => "Precondition",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Unavailable => "Unavailable",
            ErrorKind::Unknown => "Unknown",
        }
    }
}
