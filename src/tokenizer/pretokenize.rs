//! GPT-2 pre-tokenization without a regex engine.
//!
//! GPT-2 splits text with the pattern
//! `'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+`
//! before any byte-pair merging happens. [`PreTokenizer`] walks one span of
//! text and yields the same chunks the pattern would, as borrowed slices.

use unicode_properties::{GeneralCategoryGroup, UnicodeGeneralCategory};

/// Character classes distinguished by the GPT-2 pattern.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum CharClass {
    Letter,
    Number,
    Whitespace,
    Other,
}

pub(crate) fn char_class(ch: char) -> CharClass {
    if ch.is_whitespace() {
        return CharClass::Whitespace;
    }
    match ch.general_category_group() {
        GeneralCategoryGroup::Letter => CharClass::Letter,
        GeneralCategoryGroup::Number => CharClass::Number,
        _ => CharClass::Other,
    }
}

/// Scanner over a single span of text.
///
/// The iterator is finite and not restartable: create a new `PreTokenizer`
/// for every span.
#[derive(Debug, Clone)]
pub struct PreTokenizer<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> PreTokenizer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }
}

impl<'a> Iterator for PreTokenizer<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let rest = &self.text[self.pos..];
        if rest.is_empty() {
            return None;
        }
        let len = next_chunk_len(rest);
        self.pos += len;
        Some(&rest[..len])
    }
}

/// Byte length of the chunk at the start of `rest`, which must be non-empty.
fn next_chunk_len(rest: &str) -> usize {
    if let Some(len) = contraction_len(rest) {
        return len;
    }

    let mut chars = rest.char_indices();
    let Some((_, first)) = chars.next() else {
        return 0;
    };
    let second = chars.next().map(|(_, c)| c);

    // A single leading space joins the letter/number/other run after it.
    let (prefix, class) = match (first, second) {
        (' ', Some(next)) if !next.is_whitespace() => (1, char_class(next)),
        _ => (0, char_class(first)),
    };

    if class != CharClass::Whitespace {
        return prefix + run_len(&rest[prefix..], class);
    }

    let ws_len = run_len(rest, CharClass::Whitespace);
    if ws_len == rest.len() {
        return ws_len;
    }

    // The run is followed by text: leave its last character behind so the
    // following chunk can claim it as a leading space.
    let ws = &rest[..ws_len];
    match ws.char_indices().last() {
        Some((last, _)) if last > 0 => last,
        _ => ws_len,
    }
}

/// Length of the maximal prefix of `text` whose characters all belong to `class`.
fn run_len(text: &str, class: CharClass) -> usize {
    text.char_indices()
        .find(|&(_, c)| char_class(c) != class)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

/// Match one of `'s 't 're 've 'm 'll 'd` at the start of `text`.
fn contraction_len(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.first() != Some(&b'\'') {
        return None;
    }
    match (bytes.get(1), bytes.get(2)) {
        (Some(b's' | b't' | b'm' | b'd'), _) => Some(2),
        (Some(b'r' | b'v'), Some(b'e')) | (Some(b'l'), Some(b'l')) => Some(3),
        _ => None,
    }
}
