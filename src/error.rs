//! Error types for the playback engine.

/// Top-level error type for the streaming playback engine.
#[derive(Debug, thiserror::Error)]
pub enum SpeakError {
    /// Network failure, timeout, or non-success status from the synthesis
    /// service. Triggers fallback rather than surfacing as fatal.
    #[error("transport error{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Transport {
        /// HTTP status, when the exchange got far enough to have one.
        status: Option<u16>,
        /// Human-readable cause.
        message: String,
    },

    /// Malformed audio payload. The offending frame is dropped and playback
    /// continues; this variant surfaces only from the decode helpers.
    #[error("decode error: {0}")]
    Decode(String),

    /// The remote engine completed without producing a single audio frame.
    #[error("synthesis produced no audio")]
    EmptyResult,

    /// Both the remote engine and the fallback bridge failed for one item.
    #[error("all synthesis strategies failed: remote: {remote}; fallback: {fallback}")]
    FallbackExhausted {
        /// Why the remote strategy failed.
        remote: String,
        /// Why the fallback strategy failed.
        fallback: String,
    },

    /// Audio device or stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Text recognition error from the OCR collaborator.
    #[error("OCR error {code}: {message}")]
    Ocr {
        /// Vendor error code (0 for transport-level failures).
        code: i64,
        /// Vendor error message.
        message: String,
    },

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, SpeakError>;

impl SpeakError {
    /// Build a transport error without an HTTP status.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }
}
