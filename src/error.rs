//! Error taxonomy for the RANDOM.ORG client.

use std::fmt;

/// Closed set of failures a public operation can return.
///
/// Every public operation returns either its typed success value or exactly
/// one of these — never a partially filled result.
#[derive(Debug, Clone)]
pub enum RandomOrgError {
    /// The caller's blocking budget elapsed before the request reached the
    /// wire, or the advisory delay for the next send exceeds it.
    SendTimeout { waited: std::time::Duration },
    /// Service code 401: the API key is not running.
    KeyNotRunning { message: String },
    /// Service code 402: daily quota exhausted. Back-off is armed until the
    /// next UTC midnight; `message` is the verbatim `"Error 402: ..."` text.
    InsufficientRequests { message: String },
    /// Service code 403: insufficient bits remaining for this request.
    InsufficientBits { message: String, bits_left: Option<i64> },
    /// Any other recognized service error code (100–500, 32000, tickets).
    ServiceError { code: i64, message: String },
    /// A JSON-RPC-level error outside the recognized service code set.
    ProtocolError { message: String },
    /// Transport returned a non-success HTTP status.
    BadHttpResponse { status: u16, reason: String },
    /// The configured endpoint URL could not be used.
    MalformedUrl { message: String },
    /// Transport-layer I/O failure (connect, read, write, TLS, DNS, ...).
    Io { message: String },
}

impl RandomOrgError {
    /// Build a [`RandomOrgError`] from a JSON-RPC `error` object's numeric code.
    ///
    /// 401/402/403 get their dedicated variants (the 402 back-off message is
    /// formatted by the caller, since it needs the UTC-midnight boundary);
    /// every other code in the recognized set is [`Self::ServiceError`].
    pub fn from_service_code(code: i64, message: String, bits_left: Option<i64>) -> Self {
        match code {
            401 => Self::KeyNotRunning { message },
            402 => Self::InsufficientRequests { message },
            403 => Self::InsufficientBits { message, bits_left },
            _ => Self::ServiceError { code, message },
        }
    }

    pub fn is_send_timeout(&self) -> bool {
        matches!(self, Self::SendTimeout { .. })
    }

    pub fn is_key_not_running(&self) -> bool {
        matches!(self, Self::KeyNotRunning { .. })
    }

    pub fn is_insufficient_requests(&self) -> bool {
        matches!(self, Self::InsufficientRequests { .. })
    }

    pub fn is_insufficient_bits(&self) -> bool {
        matches!(self, Self::InsufficientBits { .. })
    }

    pub fn is_service_error(&self) -> bool {
        matches!(self, Self::ServiceError { .. })
    }

    /// Numeric service code, if this error originated from the service.
    pub fn service_code(&self) -> Option<i64> {
        match self {
            Self::KeyNotRunning { .. } => Some(401),
            Self::InsufficientRequests { .. } => Some(402),
            Self::InsufficientBits { .. } => Some(403),
            Self::ServiceError { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for RandomOrgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SendTimeout { waited } => {
                write!(f, "send timed out after waiting {:?}", waited)
            }
            Self::KeyNotRunning { message } => write!(f, "API key not running: {message}"),
            Self::InsufficientRequests { message } => {
                write!(f, "insufficient requests remaining: {message}")
            }
            Self::InsufficientBits { message, bits_left } => match bits_left {
                Some(left) => write!(f, "insufficient bits remaining ({left} left): {message}"),
                None => write!(f, "insufficient bits remaining: {message}"),
            },
            Self::ServiceError { code, message } => {
                write!(f, "service error {code}: {message}")
            }
            Self::ProtocolError { message } => write!(f, "protocol error: {message}"),
            Self::BadHttpResponse { status, reason } => {
                write!(f, "bad HTTP response {status}: {reason}")
            }
            Self::MalformedUrl { message } => write!(f, "malformed URL: {message}"),
            Self::Io { message } => write!(f, "I/O error: {message}"),
        }
    }
}

impl std::error::Error for RandomOrgError {}

impl PartialEq for RandomOrgError {
    fn eq(&self, other: &Self) -> bool {
        use RandomOrgError::*;
        match (self, other) {
            (SendTimeout { waited: a }, SendTimeout { waited: b }) => a == b,
            (KeyNotRunning { message: a }, KeyNotRunning { message: b }) => a == b,
            (InsufficientRequests { message: a }, InsufficientRequests { message: b }) => a == b,
            (
                InsufficientBits { message: m1, bits_left: b1 },
                InsufficientBits { message: m2, bits_left: b2 },
            ) => m1 == m2 && b1 == b2,
            (ServiceError { code: c1, message: m1 }, ServiceError { code: c2, message: m2 }) => {
                c1 == c2 && m1 == m2
            }
            (ProtocolError { message: a }, ProtocolError { message: b }) => a == b,
            (
                BadHttpResponse { status: s1, reason: r1 },
                BadHttpResponse { status: s2, reason: r2 },
            ) => s1 == s2 && r1 == r2,
            (MalformedUrl { message: a }, MalformedUrl { message: b }) => a == b,
            (Io { message: a }, Io { message: b }) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_service_code_maps_special_codes() {
        assert!(matches!(
            RandomOrgError::from_service_code(401, "x".into(), None),
            RandomOrgError::KeyNotRunning { .. }
        ));
        assert!(matches!(
            RandomOrgError::from_service_code(402, "x".into(), None),
            RandomOrgError::InsufficientRequests { .. }
        ));
        let err = RandomOrgError::from_service_code(403, "x".into(), Some(10));
        match err {
            RandomOrgError::InsufficientBits { bits_left, .. } => assert_eq!(bits_left, Some(10)),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn from_service_code_other_is_service_error() {
        let err = RandomOrgError::from_service_code(301, "bad params".into(), None);
        assert!(err.is_service_error());
        assert_eq!(err.service_code(), Some(301));
    }

    #[test]
    fn display_messages_are_informative() {
        let err = RandomOrgError::BadHttpResponse { status: 503, reason: "busy".into() };
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("busy"));
    }
}
