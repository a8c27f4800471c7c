//! Splits recognized text into dictation items.
//!
//! OCR output arrives line by line, so a single word can be broken across
//! a line fold. Lines are merged first, then punctuation separates
//! paragraphs, then each paragraph is segmented: runs of Han characters
//! form one item, runs of ASCII alphanumerics another, and a space flanked
//! by Han characters on both sides is treated as a fold artifact and
//! dropped.

/// Punctuation that always separates items, Chinese and ASCII.
const SEPARATOR_PUNCT: &[char] = &[
    '，', '。', '、', '；', '：', '！', '？', ',', '.', ';', ':', '!', '?',
];

fn is_han(ch: char) -> bool {
    ('\u{4e00}'..='\u{9fa5}').contains(&ch)
}

/// Split recognized text into dictation items, preserving reading order.
pub fn segment_words(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    // Line breaks become spaces so a word folded across lines can rejoin.
    let merged = text.replace(['\r', '\n'], " ");
    let merged = merged.trim();

    let mut words = Vec::new();
    for paragraph in merged.split(|c: char| SEPARATOR_PUNCT.contains(&c)) {
        let cleaned = paragraph.split_whitespace().collect::<Vec<_>>().join(" ");
        if cleaned.is_empty() {
            continue;
        }
        if cleaned.chars().any(is_han) {
            words.extend(segment_mixed(&cleaned));
        } else {
            words.extend(cleaned.split_whitespace().map(String::from));
        }
    }

    if words.is_empty() {
        // No paragraph survived; split on any separator, then fall back to
        // single characters.
        let fallback: Vec<String> = merged
            .split(|c: char| c.is_whitespace() || SEPARATOR_PUNCT.contains(&c))
            .filter(|w| !w.is_empty())
            .map(String::from)
            .collect();
        if !fallback.is_empty() {
            return fallback;
        }
        return merged
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(String::from)
            .collect();
    }

    words
}

/// Segment a paragraph containing Han text into homogeneous runs.
fn segment_mixed(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let current_is_han =
        |current: &String| current.chars().next().is_some_and(is_han);

    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if is_han(ch) {
            if !current.is_empty() && !current_is_han(&current) {
                words.push(std::mem::take(&mut current));
            }
            current.push(ch);
        } else if ch.is_ascii_alphanumeric() {
            if !current.is_empty() && current_is_han(&current) {
                words.push(std::mem::take(&mut current));
            }
            current.push(ch);
        } else if ch.is_whitespace() {
            if current.is_empty() {
                continue;
            }
            // A space between two Han characters is a fold artifact.
            if current_is_han(&current) && chars.peek().copied().is_some_and(is_han) {
                continue;
            }
            words.push(std::mem::take(&mut current));
        } else {
            // Symbols end the current run and are not items themselves.
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_nothing() {
        assert!(segment_words("").is_empty());
        assert!(segment_words("  \n\t ").is_empty());
    }

    #[test]
    fn punctuation_separates_items() {
        assert_eq!(
            segment_words("苹果，香蕉。橘子"),
            vec!["苹果", "香蕉", "橘子"]
        );
    }

    #[test]
    fn fold_break_space_rejoins_a_chinese_word() {
        // A line fold split 香蕉 across OCR lines.
        assert_eq!(segment_words("苹果，香\n蕉"), vec!["苹果", "香蕉"]);
    }

    #[test]
    fn adjacent_chinese_words_without_punctuation_merge() {
        // Without a separator there is no way to tell two words apart.
        assert_eq!(segment_words("你好 世界"), vec!["你好世界"]);
    }

    #[test]
    fn ascii_runs_are_separate_items() {
        assert_eq!(
            segment_words("词语abc123词语"),
            vec!["词语", "abc123", "词语"]
        );
    }

    #[test]
    fn pure_english_splits_on_spaces() {
        assert_eq!(
            segment_words("apple banana cherry"),
            vec!["apple", "banana", "cherry"]
        );
    }

    #[test]
    fn english_spaces_still_separate_in_mixed_paragraphs() {
        assert_eq!(
            segment_words("单词 word 单词"),
            vec!["单词", "word", "单词"]
        );
    }

    #[test]
    fn symbols_end_a_run_and_are_dropped() {
        assert_eq!(segment_words("苹果@香蕉"), vec!["苹果", "香蕉"]);
    }

    #[test]
    fn punctuation_only_input_falls_back_to_characters() {
        assert_eq!(segment_words("，。！"), vec!["，", "。", "！"]);
    }

    #[test]
    fn crlf_lines_merge_like_unix_lines() {
        assert_eq!(
            segment_words("第一行，\r\n第二行。"),
            vec!["第一行", "第二行"]
        );
    }
}
