//! Incremental parser for the synthesis service's wire format.
//!
//! The response body is a stream of newline-delimited JSON records:
//!
//! ```text
//! {"type":"audio","data":"<base64 s16le pcm>"}
//! {"type":"audio","data":"..."}
//! {"type":"done"}
//! ```
//!
//! Records arrive in arbitrary-sized delivery ticks; a record split across
//! two ticks is buffered and parsed only once its terminating newline has
//! arrived. A half-received record is never discarded nor mis-parsed.

use serde::Deserialize;
use tracing::warn;

/// One parsed record from the synthesis stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SynthRecord {
    /// An encoded audio chunk; `data` is base64 s16le PCM.
    Audio {
        /// Base64-encoded payload.
        data: String,
    },
    /// Terminal marker: the service finished this segment successfully.
    Done,
    /// The service reports a synthesis failure.
    Error {
        /// Human-readable cause from the service.
        message: String,
    },
}

/// Incrementally parse newline-delimited records from a byte stream.
///
/// Feed chunks of bytes via [`RecordParser::push`] and collect emitted
/// records; call [`RecordParser::flush`] when the stream ends to parse a
/// trailing record that lacks a final newline.
#[derive(Debug, Default)]
pub struct RecordParser {
    line_buffer: String,
}

impl RecordParser {
    /// Create a new incremental parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk of bytes into the parser.
    ///
    /// Returns any complete records parsed from this chunk. Lines that are
    /// empty or fail to parse are skipped with a warning; a malformed line
    /// never aborts the stream.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SynthRecord> {
        let text = String::from_utf8_lossy(chunk);
        let mut records = Vec::new();

        for ch in text.chars() {
            if ch == '\n' {
                let line = std::mem::take(&mut self.line_buffer);
                let line = line.strip_suffix('\r').unwrap_or(&line);
                if let Some(record) = parse_line(line) {
                    records.push(record);
                }
            } else {
                self.line_buffer.push(ch);
            }
        }

        records
    }

    /// Flush any remaining buffered line as a final record.
    pub fn flush(&mut self) -> Option<SynthRecord> {
        if self.line_buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.line_buffer);
        let line = line.strip_suffix('\r').unwrap_or(&line);
        parse_line(line)
    }
}

/// Parse one line into a record. Blank lines yield `None`.
fn parse_line(line: &str) -> Option<SynthRecord> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("skipping malformed synthesis record: {e}");
            None
        }
    }
}
