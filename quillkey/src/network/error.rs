use std::fmt;

use thiserror::Error;

pub const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    Configuration,
    NetworkTimeout,
    ConnectionFailed,
    HttpError,
    ParseError,
    FormatError,
    Unknown,
}

impl RemoteErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::NetworkTimeout | Self::ConnectionFailed)
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Configuration => "configuration error",
            Self::NetworkTimeout => "network timeout",
            Self::ConnectionFailed => "connection failed",
            Self::HttpError => "http error",
            Self::ParseError => "parse error",
            Self::FormatError => "format error",
            Self::Unknown => "unknown error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub body: Option<String>,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            body: None,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Configuration, message)
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::FormatError, message)
    }

    pub fn http(status: u16, body: &str) -> Self {
        Self {
            kind: RemoteErrorKind::HttpError,
            message: format!("remote service returned HTTP {status}"),
            status: Some(status),
            body: Some(truncate_body(body)),
        }
    }

    pub fn parse(message: impl Into<String>, body: Option<String>) -> Self {
        Self {
            kind: RemoteErrorKind::ParseError,
            message: message.into(),
            status: None,
            body,
        }
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = Some(truncate_body(body));
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFault {
    Timeout,
    Connect,
    Other,
}

impl From<&reqwest::Error> for TransportFault {
    fn from(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect
        } else {
            Self::Other
        }
    }
}

pub fn classify(fault: TransportFault, detail: &str) -> RemoteError {
    match fault {
        TransportFault::Timeout => RemoteError::new(
            RemoteErrorKind::NetworkTimeout,
            format!("remote request timed out: {detail}"),
        ),
        TransportFault::Connect => RemoteError::new(
            RemoteErrorKind::ConnectionFailed,
            format!("failed to connect to remote service: {detail}"),
        ),
        TransportFault::Other => RemoteError::new(
            RemoteErrorKind::Unknown,
            format!("unexpected transport error: {detail}"),
        ),
    }
}

pub fn classify_reqwest(err: &reqwest::Error) -> RemoteError {
    classify(TransportFault::from(err), &err.to_string())
}

pub fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((index, _)) => body[..index].to_string(),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_kinds_are_retryable() {
        assert!(RemoteErrorKind::NetworkTimeout.is_retryable());
        assert!(RemoteErrorKind::ConnectionFailed.is_retryable());
        for kind in [
            RemoteErrorKind::Configuration,
            RemoteErrorKind::HttpError,
            RemoteErrorKind::ParseError,
            RemoteErrorKind::FormatError,
            RemoteErrorKind::Unknown,
        ] {
            assert!(!kind.is_retryable(), "{kind} should not be retryable");
        }
    }

    #[test]
    fn timeout_fault_classifies_as_retryable_timeout() {
        let err = classify(TransportFault::Timeout, "deadline elapsed");
        assert_eq!(err.kind, RemoteErrorKind::NetworkTimeout);
        assert!(err.is_retryable());
        assert!(err.message.contains("deadline elapsed"));
    }

    #[test]
    fn other_fault_classifies_as_unknown() {
        let err = classify(TransportFault::Other, "body stream broke");
        assert_eq!(err.kind, RemoteErrorKind::Unknown);
        assert!(!err.is_retryable());
    }

    #[test]
    fn http_error_keeps_status_and_truncates_body() {
        let body = "x".repeat(MAX_ERROR_BODY_CHARS + 120);
        let err = RemoteError::http(404, &body);
        assert_eq!(err.kind, RemoteErrorKind::HttpError);
        assert_eq!(err.status, Some(404));
        assert_eq!(err.body.as_deref().map(str::len), Some(MAX_ERROR_BODY_CHARS));
        assert!(!err.is_retryable());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let body = "é".repeat(MAX_ERROR_BODY_CHARS + 1);
        let truncated = truncate_body(&body);
        assert_eq!(truncated.chars().count(), MAX_ERROR_BODY_CHARS);
    }
}
