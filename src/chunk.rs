//! Splits arbitrary-length text into transport-sized segments.
//!
//! Each segment fits the configured UTF-8 byte budget. Boundaries prefer
//! sentence-terminal punctuation, then clause punctuation, then whitespace,
//! then a hard cut, and a boundary is only accepted if it falls no earlier
//! than the configured fraction into the current window.

use crate::config::ChunkConfig;

/// One ordered text fragment sized to fit a single synthesis request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Position of this segment in the original text.
    pub index: usize,
    /// The segment text, whitespace-trimmed.
    pub text: String,
}

impl Segment {
    /// Encoded (UTF-8) byte length of the segment.
    pub fn byte_len(&self) -> usize {
        self.text.len()
    }
}

/// Sentence-terminal punctuation, the preferred boundary class.
const SENTENCE_PUNCT: &[char] = &['。', '！', '？', '…', '.', '!', '?'];

/// Clause punctuation, the second boundary class.
const CLAUSE_PUNCT: &[char] = &['，', '、', '；', '：', ',', ';', ':'];

/// Split `text` into ordered segments, each within the byte budget.
///
/// Text that already fits the budget is returned as a single segment
/// unchanged. Produced segments are trimmed; empty segments are dropped;
/// no non-whitespace content is ever lost, because a boundary cut falls
/// immediately after the boundary character.
pub fn split(text: &str, config: &ChunkConfig) -> Vec<Segment> {
    // Any single UTF-8 char must fit, or the loop could not make progress.
    let max_bytes = config.max_segment_bytes.max(4);

    if text.trim().is_empty() {
        return Vec::new();
    }
    if text.len() <= max_bytes {
        return vec![Segment {
            index: 0,
            text: text.to_string(),
        }];
    }

    let mut segments = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        if rest.len() <= max_bytes {
            push_segment(&mut segments, rest);
            break;
        }

        // Largest char-boundary window within the budget.
        let mut window_end = max_bytes;
        while !rest.is_char_boundary(window_end) {
            window_end -= 1;
        }
        let window = &rest[..window_end];
        let min_offset = (window_end as f32 * config.min_boundary_ratio) as usize;

        let cut = boundary_cut(window, min_offset).unwrap_or(window_end);
        push_segment(&mut segments, &rest[..cut]);
        rest = &rest[cut..];
    }

    segments
}

fn push_segment(segments: &mut Vec<Segment>, raw: &str) {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }
    segments.push(Segment {
        index: segments.len(),
        text: trimmed.to_string(),
    });
}

/// Find the cut position (exclusive byte offset, falling just after the
/// boundary char) for the highest-priority boundary class whose last
/// occurrence ends at or past `min_offset`.
fn boundary_cut(window: &str, min_offset: usize) -> Option<usize> {
    let mut last_sentence = None;
    let mut last_clause = None;
    let mut last_space = None;

    for (pos, ch) in window.char_indices() {
        let end = pos + ch.len_utf8();
        if SENTENCE_PUNCT.contains(&ch) {
            last_sentence = Some(end);
        } else if CLAUSE_PUNCT.contains(&ch) {
            last_clause = Some(end);
        } else if ch.is_whitespace() {
            last_space = Some(end);
        }
    }

    // The last occurrence is the furthest; if it falls too early, no
    // occurrence of that class qualifies and the next class is tried.
    [last_sentence, last_clause, last_space]
        .into_iter()
        .flatten()
        .find(|&end| end >= min_offset)
}
