//! Text chunking for TTS processing.
//!
//! Text is split at the coarsest boundary that keeps every chunk under the
//! limit: paragraphs first, then sentences, then words, and as a last resort
//! fixed-width character slices. Within each level units are packed greedily.

use super::TextChunk;
use anyhow::Result;
use regex::Regex;
use std::sync::OnceLock;

/// Default maximum chunk size in characters.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 1000;

/// Share of the maximum actually filled, leaving room for providers that
/// count length differently than we do.
const SAFETY_PERCENT: usize = 95;

const PARAGRAPH_SEPARATOR: &str = "\n\n";
const SENTENCE_SEPARATOR: &str = " ";
const WORD_SEPARATOR: &str = " ";

/// One or more blank lines.
fn paragraph_break() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n").expect("paragraph regex should compile"))
}

/// Sentence-ending punctuation, whitespace, then an uppercase letter.
///
/// This is a heuristic: "Dr. Smith" and "3. Then" split too.
fn sentence_boundary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]\s+\p{Lu}").expect("sentence regex should compile"))
}

/// Summary of how a text chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkStats {
    /// Length of the input in characters
    pub total_length: usize,
    pub chunk_count: usize,
    pub min_length: usize,
    pub avg_length: f64,
    pub max_length: usize,
}

/// Splits text into chunks of at most `max_chunk_size` characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    max_chunk_size: usize,
    safe_chunk_size: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            safe_chunk_size: safe_size(DEFAULT_MAX_CHUNK_SIZE),
        }
    }
}

impl Chunker {
    /// Create a chunker for the given maximum size in characters.
    pub fn new(max_chunk_size: usize) -> Result<Self> {
        if max_chunk_size == 0 {
            anyhow::bail!("Maximum chunk size must be positive");
        }

        Ok(Self {
            max_chunk_size,
            safe_chunk_size: safe_size(max_chunk_size),
        })
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    /// The size chunks are actually packed to.
    pub fn safe_chunk_size(&self) -> usize {
        self.safe_chunk_size
    }

    /// Split text into ordered chunks.
    ///
    /// Empty or whitespace-only input yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        if char_len(text) <= self.safe_chunk_size {
            return vec![text.to_string()];
        }

        let mut chunks = Vec::new();
        split_paragraphs(text, self.safe_chunk_size, &mut chunks);
        chunks
    }

    /// Split text into chunks tagged with their position.
    pub fn chunks(&self, text: &str) -> Vec<TextChunk> {
        self.chunk(text)
            .into_iter()
            .enumerate()
            .map(|(index, text)| TextChunk::new(index, text))
            .collect()
    }

    /// Length statistics for the chunks `text` would produce.
    pub fn stats(&self, text: &str) -> ChunkStats {
        let lengths: Vec<usize> = self.chunk(text).iter().map(|c| char_len(c)).collect();
        let chunk_count = lengths.len();
        let total: usize = lengths.iter().sum();

        ChunkStats {
            total_length: char_len(text),
            chunk_count,
            min_length: lengths.iter().copied().min().unwrap_or(0),
            avg_length: if chunk_count > 0 {
                total as f64 / chunk_count as f64
            } else {
                0.0
            },
            max_length: lengths.iter().copied().max().unwrap_or(0),
        }
    }
}

/// Check that every chunk is non-blank and within `max_chunk_size` characters.
pub fn validate_chunks<S: AsRef<str>>(chunks: &[S], max_chunk_size: usize) -> bool {
    chunks.iter().all(|chunk| {
        let chunk = chunk.as_ref();
        !chunk.trim().is_empty() && char_len(chunk) <= max_chunk_size
    })
}

/// Split `text` into chunks of at most `max_chunk_size` characters.
pub fn chunk_text(text: &str, max_chunk_size: usize) -> Result<Vec<String>> {
    Ok(Chunker::new(max_chunk_size)?.chunk(text))
}

fn safe_size(max_chunk_size: usize) -> usize {
    // Split the multiplication so sizes near usize::MAX cannot overflow
    let whole = max_chunk_size / 100 * SAFETY_PERCENT;
    let rest = max_chunk_size % 100 * SAFETY_PERCENT / 100;
    (whole + rest).max(1)
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn split_paragraphs(text: &str, limit: usize, chunks: &mut Vec<String>) {
    pack(
        paragraph_break().split(text),
        PARAGRAPH_SEPARATOR,
        limit,
        chunks,
        split_paragraph,
    );
}

fn split_paragraph(paragraph: &str, limit: usize, chunks: &mut Vec<String>) {
    pack(
        split_into_sentences(paragraph),
        SENTENCE_SEPARATOR,
        limit,
        chunks,
        split_sentence,
    );
}

fn split_sentence(sentence: &str, limit: usize, chunks: &mut Vec<String>) {
    pack(
        sentence.split_whitespace(),
        WORD_SEPARATOR,
        limit,
        chunks,
        hard_split,
    );
}

/// Split a paragraph into sentences, keeping the closing punctuation.
fn split_into_sentences(paragraph: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for m in sentence_boundary().find_iter(paragraph) {
        // The punctuation is a single ASCII byte.
        sentences.push(&paragraph[start..m.start() + 1]);
        let capital_len = m.as_str().chars().last().map_or(0, char::len_utf8);
        start = m.end() - capital_len;
    }
    sentences.push(&paragraph[start..]);

    sentences
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Greedily pack units into chunks of at most `limit` characters.
///
/// A unit that alone exceeds the limit flushes the pending chunk and is
/// handed to `split_oversized`, whose pieces go straight to the output.
fn pack<'a>(
    units: impl IntoIterator<Item = &'a str>,
    separator: &str,
    limit: usize,
    chunks: &mut Vec<String>,
    split_oversized: fn(&str, usize, &mut Vec<String>),
) {
    let separator_len = char_len(separator);
    let mut current = String::new();
    let mut current_len = 0;

    for unit in units {
        let unit = unit.trim();
        if unit.is_empty() {
            continue;
        }
        let unit_len = char_len(unit);

        if unit_len > limit {
            flush(&mut current, &mut current_len, chunks);
            split_oversized(unit, limit, chunks);
            continue;
        }

        if current.is_empty() {
            current.push_str(unit);
            current_len = unit_len;
        } else if current_len + separator_len + unit_len <= limit {
            current.push_str(separator);
            current.push_str(unit);
            current_len += separator_len + unit_len;
        } else {
            flush(&mut current, &mut current_len, chunks);
            current.push_str(unit);
            current_len = unit_len;
        }
    }

    flush(&mut current, &mut current_len, chunks);
}

fn flush(current: &mut String, current_len: &mut usize, chunks: &mut Vec<String>) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
    current.clear();
    *current_len = 0;
}

/// Hard split text at exact positions (last resort).
fn hard_split(text: &str, limit: usize, chunks: &mut Vec<String>) {
    let chars: Vec<char> = text.chars().collect();
    chunks.extend(chars.chunks(limit).map(|piece| piece.iter().collect::<String>()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chunk(text: &str, max: usize) -> Vec<String> {
        Chunker::new(max).unwrap().chunk(text)
    }

    #[test]
    fn test_safe_chunk_size() {
        assert_eq!(Chunker::new(1000).unwrap().safe_chunk_size(), 950);
        assert_eq!(Chunker::new(40).unwrap().safe_chunk_size(), 38);
        assert_eq!(Chunker::new(1).unwrap().safe_chunk_size(), 1);
        assert_eq!(Chunker::default().max_chunk_size(), DEFAULT_MAX_CHUNK_SIZE);
    }

    #[test]
    fn test_huge_max_chunk_size() {
        let chunker = Chunker::new(usize::MAX).unwrap();
        assert!(chunker.safe_chunk_size() <= usize::MAX);
        assert!(chunker.safe_chunk_size() > usize::MAX / 100 * 94);

        let chunks = chunk_text("Hello there. General.", usize::MAX).unwrap();
        assert_eq!(chunks, vec!["Hello there. General."]);
        assert!(validate_chunks(&chunks, usize::MAX));

        assert_eq!(Chunker::new(101).unwrap().safe_chunk_size(), 95);
        assert_eq!(Chunker::new(199).unwrap().safe_chunk_size(), 189);
    }

    #[test]
    fn test_zero_max_rejected() {
        assert!(Chunker::new(0).is_err());
    }

    #[test]
    fn test_chunk_empty_text() {
        assert!(chunk("", 100).is_empty());
        assert!(chunk("   ", 100).is_empty());
        assert!(chunk("  \n\n\t ", 100).is_empty());
    }

    #[test]
    fn test_chunk_short_text() {
        let chunks = chunk("  Hello world. How are you?\n", 1000);
        assert_eq!(chunks, vec!["Hello world. How are you?"]);
    }

    #[test]
    fn test_text_at_safe_size_is_single_chunk() {
        // safe size for 100 is 95
        let text = "a".repeat(95);
        assert_eq!(chunk(&text, 100), vec![text.clone()]);

        let text = "a".repeat(96);
        assert_eq!(chunk(&text, 100).len(), 2);
    }

    #[test]
    fn test_paragraph_and_sentence_example() {
        let text = "Para one sentence one. Para one sentence two.\n\nPara two sentence one.";
        let chunks = chunk(text, 40);
        assert_eq!(
            chunks,
            vec![
                "Para one sentence one.",
                "Para one sentence two.",
                "Para two sentence one.",
            ]
        );
        assert!(validate_chunks(&chunks, 40));
    }

    #[test]
    fn test_prefers_paragraph_break() {
        let first = "The first paragraph has two sentences. It ends here.";
        let second = "The second one is short.";
        let text = format!("{}\n\n{}", first, second);
        // Both fit separately but not together.
        let max = 70;
        let chunks = chunk(&text, max);
        assert_eq!(chunks, vec![first, second]);
    }

    #[test]
    fn test_paragraphs_packed_together() {
        let text = "One.\n\nTwo.\n\n\n\nThree.\n  \nFour.";
        let chunks = chunk(&format!("{}\n\n{}", text, "x".repeat(30)), 40);
        assert_eq!(chunks[0], "One.\n\nTwo.\n\nThree.\n\nFour.");
        assert_eq!(chunks[1], "x".repeat(30));
    }

    #[test]
    fn test_long_paragraph_is_subdivided() {
        let paragraph = "First sentence here. Second sentence here. Third sentence here. Fourth sentence here.";
        let chunks = chunk(paragraph, 50);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c != paragraph));
        assert!(validate_chunks(&chunks, 50));
        assert_eq!(chunks[0], "First sentence here. Second sentence here.");
    }

    #[test]
    fn test_oversized_paragraph_flushes_pending() {
        let text = format!(
            "Intro.\n\n{}\n\nOutro.",
            "Alpha beta gamma. Delta epsilon zeta. Eta theta iota."
        );
        let chunks = chunk(&text, 30);
        assert_eq!(chunks.first().map(String::as_str), Some("Intro."));
        assert_eq!(chunks.last().map(String::as_str), Some("Outro."));
        // Sub-chunks of the long paragraph are not merged with neighbours.
        assert!(chunks.iter().all(|c| !c.contains("Intro.") || c == "Intro."));
    }

    #[test]
    fn test_sentence_split_requires_capital() {
        assert_eq!(
            split_into_sentences("It cost 3.5 dollars. then more. And done!"),
            vec!["It cost 3.5 dollars. then more.", "And done!"]
        );
        assert_eq!(
            split_into_sentences("Wait?  Yes!\nÉcoute. ok"),
            vec!["Wait?", "Yes!", "Écoute. ok"]
        );
    }

    #[test]
    fn test_abbreviation_is_split_as_sentence() {
        // Known limitation of the heuristic.
        assert_eq!(
            split_into_sentences("Ask Dr. Smith today."),
            vec!["Ask Dr.", "Smith today."]
        );
    }

    #[test]
    fn test_word_split_for_unpunctuated_text() {
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let chunks = chunk(text, 20);
        assert!(chunks.len() > 1);
        assert!(validate_chunks(&chunks, 20));
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn test_giant_word_is_character_split() {
        let word = "x".repeat(100);
        let chunks = chunk(&word, 20);
        // safe size 19
        assert_eq!(chunks.len(), 6);
        for piece in &chunks[..5] {
            assert_eq!(piece.chars().count(), 19);
        }
        assert_eq!(chunks[5].chars().count(), 5);
        assert_eq!(chunks.concat(), word);
    }

    #[test]
    fn test_character_split_respects_multibyte_chars() {
        let word = "ü".repeat(45);
        let chunks = chunk(&word, 20);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 19);
        assert!(validate_chunks(&chunks, 20));
    }

    #[test]
    fn test_giant_word_between_words() {
        let text = format!("short words {} tail", "y".repeat(30));
        let chunks = chunk(&text, 20);
        assert_eq!(chunks[0], "short words");
        assert_eq!(chunks[1], "y".repeat(19));
        assert_eq!(chunks[2], "y".repeat(11));
        assert_eq!(chunks[3], "tail");
    }

    #[test]
    fn test_chunks_are_indexed() {
        let chunker = Chunker::new(20).unwrap();
        let chunks = chunker.chunks("First one here. Second one here. Third one.");
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
        }
    }

    #[test]
    fn test_stats() {
        let chunker = Chunker::new(40).unwrap();
        let text = "Para one sentence one. Para one sentence two.\n\nPara two sentence one.";
        let stats = chunker.stats(text);
        assert_eq!(stats.total_length, text.chars().count());
        assert_eq!(stats.chunk_count, 3);
        assert_eq!(stats.min_length, 22);
        assert_eq!(stats.max_length, 22);
        assert!((stats.avg_length - 22.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stats_empty() {
        let stats = Chunker::default().stats("");
        assert_eq!(stats.chunk_count, 0);
        assert_eq!(stats.min_length, 0);
        assert_eq!(stats.max_length, 0);
        assert_eq!(stats.avg_length, 0.0);
    }

    #[test]
    fn test_validate_chunks() {
        assert!(validate_chunks(&["abc", "de"], 3));
        assert!(!validate_chunks(&["abcd"], 3));
        assert!(!validate_chunks(&["  "], 3));
        assert!(validate_chunks::<&str>(&[], 3));
    }

    #[test]
    fn test_chunk_text() {
        assert!(chunk_text("anything", 0).is_err());
        assert_eq!(chunk_text("One. Two.", 100).unwrap(), vec!["One. Two."]);
    }

    fn words(text: &str) -> Vec<&str> {
        text.split_whitespace().collect()
    }

    proptest! {
        #[test]
        fn prop_chunks_within_limit(text in "[a-zA-Z .!?\n]{0,600}", max in 1usize..120) {
            let chunks = chunk(&text, max);
            prop_assert!(validate_chunks(&chunks, max));
        }

        #[test]
        fn prop_word_sequence_preserved(
            text in "([A-Z][a-z]{0,12}[.!?]? |\n\n){0,60}",
            max in 20usize..200,
        ) {
            // Words never exceed the limit here, so no character splitting.
            let chunks = chunk(&text, max);
            let rejoined = chunks.join(" ");
            prop_assert_eq!(words(&rejoined), words(&text));
        }

        #[test]
        fn prop_short_text_single_chunk(text in "[a-z ]{1,90}") {
            prop_assume!(!text.trim().is_empty());
            let chunks = chunk(&text, 100);
            prop_assert_eq!(chunks, vec![text.trim().to_string()]);
        }
    }
}
