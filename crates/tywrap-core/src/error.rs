//! Boundary error taxonomy.
//!
//! Every failure that crosses a public seam is one of five kinds: codec
//! (validation/serialization at the boundary), protocol (envelope or framing
//! violations), execution (a Python-side exception), timeout (timer expiry
//! or abort), or disposed (operation on a torn-down context). The kind
//! decides recoverability: the bounded executor retries only timeouts and
//! transient-looking failures, never codec or execution errors.

use std::fmt;
use thiserror::Error;

/// Which half of the codec a failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecPhase {
    Encode,
    Decode,
}

impl fmt::Display for CodecPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecPhase::Encode => f.write_str("encode"),
            CodecPhase::Decode => f.write_str("decode"),
        }
    }
}

/// The value category a codec failure is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecValue {
    Number,
    Bytes,
    Json,
    Payload,
    Arrow,
}

impl fmt::Display for CodecValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CodecValue::Number => "number",
            CodecValue::Bytes => "bytes",
            CodecValue::Json => "json",
            CodecValue::Payload => "payload",
            CodecValue::Arrow => "arrow",
        };
        f.write_str(s)
    }
}

type Cause = Box<dyn std::error::Error + Send + Sync>;

/// Classified boundary error.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Validation or serialization failure at the boundary.
    #[error("codec error ({phase}/{value}): {message}")]
    Codec {
        phase: CodecPhase,
        value: CodecValue,
        message: String,
        /// JSON path of the offending value, when one exists.
        path: Option<String>,
        #[source]
        source: Option<Cause>,
    },

    /// Envelope shape, version, or framing violation.
    #[error("protocol error: {message}")]
    Protocol {
        message: String,
        /// Sanitized stderr tail for transport-originated failures.
        stderr_tail: Option<String>,
        #[source]
        source: Option<Cause>,
    },

    /// A Python-side exception, surfaced with its original identity.
    #[error("python {exc_type}: {message}")]
    Execution {
        exc_type: String,
        message: String,
        traceback: Option<String>,
        #[source]
        source: Option<Cause>,
    },

    /// Timer expiry or abort.
    #[error("timeout: {message}")]
    Timeout {
        message: String,
        #[source]
        source: Option<Cause>,
    },

    /// Operation attempted on a disposed context.
    #[error("disposed: {message}")]
    Disposed { message: String },
}

impl BridgeError {
    pub fn codec(
        phase: CodecPhase,
        value: CodecValue,
        message: impl Into<String>,
        path: Option<String>,
    ) -> Self {
        BridgeError::Codec {
            phase,
            value,
            message: message.into(),
            path,
            source: None,
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        BridgeError::Protocol {
            message: message.into(),
            stderr_tail: None,
            source: None,
        }
    }

    pub fn protocol_with_tail(message: impl Into<String>, stderr_tail: Option<String>) -> Self {
        BridgeError::Protocol {
            message: message.into(),
            stderr_tail,
            source: None,
        }
    }

    pub fn execution(
        exc_type: impl Into<String>,
        message: impl Into<String>,
        traceback: Option<String>,
    ) -> Self {
        BridgeError::Execution {
            exc_type: exc_type.into(),
            message: message.into(),
            traceback,
            source: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        BridgeError::Timeout {
            message: message.into(),
            source: None,
        }
    }

    pub fn disposed(message: impl Into<String>) -> Self {
        BridgeError::Disposed {
            message: message.into(),
        }
    }

    pub fn with_source(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        let slot = match &mut self {
            BridgeError::Codec { source, .. }
            | BridgeError::Protocol { source, .. }
            | BridgeError::Execution { source, .. }
            | BridgeError::Timeout { source, .. } => source,
            BridgeError::Disposed { .. } => return self,
        };
        *slot = Some(Box::new(cause));
        self
    }

    /// The taxonomy tag, for logs and assertions.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Codec { .. } => "codec",
            BridgeError::Protocol { .. } => "protocol",
            BridgeError::Execution { .. } => "execution",
            BridgeError::Timeout { .. } => "timeout",
            BridgeError::Disposed { .. } => "disposed",
        }
    }

    /// Whether the bounded executor may retry after this failure. Codec and
    /// execution errors are never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::Timeout { .. } => true,
            BridgeError::Protocol { message, .. } => is_transient_message(message),
            _ => false,
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

const TIMEOUT_PATTERNS: &[&str] = &["timeout", "etimedout", "timed out", "aborted"];

const PROTOCOL_PATTERNS: &[&str] = &[
    "protocol",
    "invalid json",
    "parse error",
    "unexpected token",
    "not found",
];

const TRANSIENT_PATTERNS: &[&str] = &[
    "econnreset",
    "epipe",
    "eagain",
    "broken pipe",
    "connection reset",
    "temporarily unavailable",
];

fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Maps an arbitrary error to a classified [`BridgeError`], preserving the
/// original as the cause. Already-classified errors pass through unchanged.
///
/// `disposed` reflects whether the owning context has been disposed; it wins
/// over message-pattern matching.
pub fn classify_error(err: anyhow::Error, disposed: bool) -> BridgeError {
    let err = match err.downcast::<BridgeError>() {
        Ok(classified) => return classified,
        Err(err) => err,
    };

    if disposed {
        return BridgeError::disposed(err.to_string());
    }

    let message = err.to_string();
    let lower = message.to_lowercase();

    if TIMEOUT_PATTERNS.iter().any(|p| lower.contains(p)) {
        return BridgeError::Timeout {
            message,
            source: Some(err.into()),
        };
    }
    if PROTOCOL_PATTERNS.iter().any(|p| lower.contains(p)) {
        return BridgeError::Protocol {
            message,
            stderr_tail: None,
            source: Some(err.into()),
        };
    }
    BridgeError::Execution {
        exc_type: "Error".to_string(),
        message,
        traceback: None,
        source: Some(err.into()),
    }
}
