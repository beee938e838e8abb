//! Text normalization applied before chunking.
//!
//! Providers read typographic punctuation inconsistently and some reject
//! control characters outright, so input is reduced to plain equivalents.
//! Paragraph breaks survive because the chunker splits on them.

use regex::Regex;
use std::sync::OnceLock;

/// Characters replaced before synthesis.
const REPLACEMENTS: &[(char, &str)] = &[
    ('\u{2018}', "'"),   // Left single quote
    ('\u{2019}', "'"),   // Right single quote
    ('\u{201a}', "'"),   // Low single quote
    ('\u{201c}', "\""),  // Left double quote
    ('\u{201d}', "\""),  // Right double quote
    ('\u{201e}', "\""),  // Low double quote
    ('\u{00ab}', "\""),  // Left guillemet
    ('\u{00bb}', "\""),  // Right guillemet
    ('\u{2010}', "-"),   // Hyphen
    ('\u{2011}', "-"),   // Non-breaking hyphen
    ('\u{2013}', " - "), // En dash
    ('\u{2014}', " - "), // Em dash
    ('\u{2026}', "..."), // Ellipsis
    ('\u{00a0}', " "),   // Non-breaking space
    ('\u{202f}', " "),   // Narrow non-breaking space
    ('\u{00ad}', ""),    // Soft hyphen
    ('\u{200b}', ""),    // Zero-width space
    ('\u{200c}', ""),    // Zero-width non-joiner
    ('\u{200d}', ""),    // Zero-width joiner
    ('\u{feff}', ""),    // BOM
];

fn horizontal_space() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t]+").expect("space regex should compile"))
}

fn excess_newlines() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("newline regex should compile"))
}

/// Clean text for TTS processing.
///
/// Line endings become `\n`, lines are trimmed, runs of spaces and tabs
/// collapse to one space, and three or more newlines collapse to a single
/// blank line.
pub fn clean_text(text: &str) -> String {
    let mut replaced = String::with_capacity(text.len());

    for c in text.replace("\r\n", "\n").chars() {
        match REPLACEMENTS.iter().find(|(ch, _)| *ch == c) {
            Some((_, r)) => replaced.push_str(r),
            None if c == '\r' => replaced.push('\n'),
            None if c.is_control() && c != '\n' && c != '\t' => {}
            None => replaced.push(c),
        }
    }

    let lines: Vec<String> = replaced
        .lines()
        .map(|line| horizontal_space().replace_all(line.trim(), " ").into_owned())
        .collect();

    excess_newlines()
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}
