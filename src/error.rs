//! Error types for the voicewire client

use thiserror::Error;

/// Result type alias for voicewire operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voicewire client
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Microphone capture error
    #[error("capture error: {0}")]
    Capture(String),

    /// Inbound audio payload could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// Session/transport error
    #[error("session error: {0}")]
    Session(String),

    /// WebSocket error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Classified session failure surfaced to the UI layer.
///
/// Every code is non-fatal to the process; each one triggers full teardown
/// and leaves recovery to a user-initiated reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// No credential available at connect time
    AuthMissing,
    /// Handshake rejected (401/403/generic transport failure)
    NetworkOrAuth,
    /// Requested model/resource unavailable for the credential
    NotFound,
    /// Rate/quota limit hit
    QuotaExceeded,
    /// Content blocked by remote moderation
    SafetyFilter,
    /// Connection closed/errored without a more specific classification
    SessionDrop,
    /// No compatible audio subsystem
    HardwareAccess,
    /// Microphone permission refused or no input device
    MicDenied,
}

impl ErrorCode {
    /// Stable string form of the code
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthMissing => "ERR_AUTH_MISSING",
            Self::NetworkOrAuth => "ERR_NETWORK_OR_AUTH",
            Self::NotFound => "ERR_NOT_FOUND",
            Self::QuotaExceeded => "ERR_QUOTA_EXCEEDED",
            Self::SafetyFilter => "ERR_SAFETY_FILTER",
            Self::SessionDrop => "ERR_SESSION_DROP",
            Self::HardwareAccess => "ERR_HARDWARE_ACCESS",
            Self::MicDenied => "ERR_MIC_DENIED",
        }
    }

    /// Classify an error's message text against known substrings.
    ///
    /// Best-effort heuristic for errors that arrive asynchronously without
    /// structured status information. Unmatched text maps to `SessionDrop`.
    #[must_use]
    pub fn classify_message(message: &str) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("401")
            || lower.contains("403")
            || lower.contains("unauthorized")
            || lower.contains("forbidden")
            || lower.contains("api key")
        {
            Self::NetworkOrAuth
        } else if lower.contains("404") || lower.contains("not found") {
            Self::NotFound
        } else if lower.contains("429") || lower.contains("quota") || lower.contains("rate limit")
        {
            Self::QuotaExceeded
        } else if lower.contains("safety") || lower.contains("blocked") {
            Self::SafetyFilter
        } else {
            Self::SessionDrop
        }
    }

    /// Classify a WebSocket handshake/transport error.
    ///
    /// Prefers the structured HTTP status from a rejected handshake and
    /// falls back to message-text matching.
    #[must_use]
    pub fn classify_transport(err: &tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        if let WsError::Http(response) = err {
            return match response.status().as_u16() {
                401 | 403 => Self::NetworkOrAuth,
                404 => Self::NotFound,
                429 => Self::QuotaExceeded,
                _ => Self::classify_message(&err.to_string()),
            };
        }

        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed | WsError::Protocol(_) => {
                Self::SessionDrop
            }
            WsError::Io(_) | WsError::Tls(_) | WsError::Url(_) => Self::NetworkOrAuth,
            _ => Self::classify_message(&err.to_string()),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
