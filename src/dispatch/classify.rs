//! Error classification for the retry policy.
//!
//! Structured [`SendError`] variants are classified directly. Text that carries
//! no structure (`SendError::Other`, decode failures) goes through
//! [`classify_message`], a substring heuristic over the lower-cased message.
//! The heuristic is not a contract with the service; it only recognises the
//! signatures listed in [`RETRYABLE_SIGNATURES`].

use crate::sender::SendError;

/// Lower-case substrings that mark an error as transient.
pub const RETRYABLE_SIGNATURES: &[&str] = &[
    "rate limit",
    "too many requests",
    "timeout",
    "connection",
    "network",
    "internal server error",
    "bad gateway",
    "service unavailable",
    "gateway timeout",
    "429",
    "502",
    "503",
    "504",
];

/// Classification of a send failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// HTTP 429 or equivalent throttling
    RateLimited,
    /// The request timed out
    Timeout,
    /// Connection refused, reset, DNS failure and the like
    Connection,
    /// HTTP 5xx
    ServerError(u16),
    /// HTTP 400 / validation failure
    InvalidRequest,
    /// HTTP 401 or 403
    Unauthorized(u16),
    /// HTTP 404
    NotFound,
    /// Any other 4xx
    ClientError(u16),
    /// The run was cancelled
    Cancelled,
    /// Transient signature found in unstructured text
    Transient,
    /// Nothing recognisable
    Unknown,
}

impl ErrorKind {
    /// Classify an HTTP status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited,
            400 | 422 => Self::InvalidRequest,
            401 | 403 => Self::Unauthorized(status),
            404 => Self::NotFound,
            500..=599 => Self::ServerError(status),
            _ => Self::ClientError(status),
        }
    }

    /// Classify a structured send error, falling back to its text.
    pub fn from_send_error(err: &SendError) -> Self {
        match err {
            SendError::Api { status, .. } => Self::from_status(*status),
            SendError::Timeout(_) => Self::Timeout,
            SendError::Connection(_) => Self::Connection,
            SendError::Cancelled => Self::Cancelled,
            SendError::InvalidResponse(message) | SendError::Other(message) => {
                classify_message(message)
            }
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited
                | Self::Timeout
                | Self::Connection
                | Self::ServerError(_)
                | Self::Transient
        )
    }

    /// Short human description used in retry log lines.
    pub fn description(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate limit exceeded",
            Self::Timeout => "request timeout",
            Self::Connection => "connection failed",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::InvalidRequest => "invalid request",
            Self::Unauthorized(_) => "authorization failed",
            Self::NotFound => "resource not found",
            Self::ClientError(_) => "client error",
            Self::Cancelled => "cancelled",
            Self::Transient => "transient error",
            Self::Unknown => "unrecognised error",
        }
    }
}

/// Substring fallback over unstructured error text.
pub fn classify_message(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    if lower.contains("rate limit") || lower.contains("too many requests") || lower.contains("429")
    {
        ErrorKind::RateLimited
    } else if lower.contains("gateway timeout") || lower.contains("504") {
        ErrorKind::ServerError(504)
    } else if lower.contains("timeout") {
        ErrorKind::Timeout
    } else if lower.contains("bad gateway") || lower.contains("502") {
        ErrorKind::ServerError(502)
    } else if lower.contains("service unavailable") || lower.contains("503") {
        ErrorKind::ServerError(503)
    } else if lower.contains("internal server error") {
        ErrorKind::ServerError(500)
    } else if lower.contains("connection") {
        ErrorKind::Connection
    } else if is_retryable_message(&lower) {
        ErrorKind::Transient
    } else {
        ErrorKind::Unknown
    }
}

/// Whether unstructured text contains one of [`RETRYABLE_SIGNATURES`].
pub fn is_retryable_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRYABLE_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

/// Best-effort conventional code for display. Unmatched text maps to 0.
pub fn error_code_from_message(message: &str) -> u16 {
    let lower = message.to_lowercase();
    if lower.contains("rate limit") || lower.contains("too many requests") || lower.contains("429")
    {
        429
    } else if lower.contains("unauthorized") || lower.contains("401") {
        401
    } else if lower.contains("forbidden") || lower.contains("403") {
        403
    } else if lower.contains("not found") || lower.contains("404") {
        404
    } else if lower.contains("bad request")
        || lower.contains("validation")
        || lower.contains("invalid")
        || lower.contains("400")
    {
        400
    } else if lower.contains("internal server error") || lower.contains("500") {
        500
    } else {
        0
    }
}

/// `None` is not retryable; otherwise classify.
pub fn is_retryable(err: Option<&SendError>) -> bool {
    err.map(|e| ErrorKind::from_send_error(e).is_retryable())
        .unwrap_or(false)
}

/// Display code for an error: the HTTP status when known, else the text heuristic.
pub fn error_code(err: Option<&SendError>) -> u16 {
    match err {
        None => 0,
        Some(SendError::Api { status, .. }) => *status,
        Some(SendError::Cancelled) => 0,
        Some(other) => error_code_from_message(&other.to_string()),
    }
}
