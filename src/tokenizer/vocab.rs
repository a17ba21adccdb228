//! Vocabulary, merge ranks and special tokens loaded from GPT-2 style files.
//!
//! [`VocabTable`] is built once from the text of a `vocab.json` (token string
//! to id) and a `merges.txt` (one `left right` pair per line, highest
//! priority first) and is immutable afterwards. It answers the three queries
//! the tokenizer needs on the hot path: the symbol id of a raw byte, the
//! special-token segmentation of an input string, and the BPE reduction of a
//! chunk's symbols.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use tracing::{debug, trace, warn};

use super::byte_codec::ByteCodec;
use crate::error::TokenizerError;

/// A ranked merge rule, keyed in the table by its two operand ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Merge {
    rank: u32,
    /// Id of the concatenated token, `None` when the vocabulary lacks it.
    id: Option<u32>,
}

/// One piece of input after special-token splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Ordinary text that still needs pre-tokenization and merging.
    Text(&'a str),
    /// A special token, already resolved to its reserved id.
    Special(u32),
}

/// Immutable token/merge tables for byte-level BPE.
#[derive(Debug)]
pub struct VocabTable {
    /// Token string -> token ID.
    token_to_id: HashMap<String, u32>,
    /// Token ID -> token string. Ids may be sparse.
    id_to_token: HashMap<u32, String>,
    /// Merge rules keyed by (left id, right id).
    merges: HashMap<(u32, u32), Merge>,
    /// Symbol id of every raw byte; bytes missing from the vocabulary map to `unk_id`.
    byte_symbols: [u32; 256],
    /// Special tokens sorted longest first, so the first hit is the longest match.
    special_tokens: Vec<(String, u32)>,
    /// Leading bytes of all special tokens, for a cheap reject while scanning.
    special_first_bytes: [bool; 256],
    unk_id: u32,
}

impl VocabTable {
    /// Parse `vocab_text` (a JSON object of token -> id) and `merges_text`.
    ///
    /// `unk_token` and every entry of `special_tokens` are looked up in the
    /// vocabulary and appended with the next free id when missing.
    pub fn load(
        vocab_text: &str,
        merges_text: &str,
        special_tokens: &[String],
        unk_token: &str,
    ) -> Result<Self, TokenizerError> {
        if vocab_text.trim().is_empty() {
            return Err(TokenizerError::Config("vocabulary shouldn't be empty".into()));
        }
        if merges_text.trim().is_empty() {
            return Err(TokenizerError::Config("merges shouldn't be empty".into()));
        }

        let raw: HashMap<String, i64> = serde_json::from_str(vocab_text)?;
        if raw.is_empty() {
            return Err(TokenizerError::Config("vocabulary has no entries".into()));
        }

        let mut token_to_id = HashMap::with_capacity(raw.len() + special_tokens.len() + 1);
        let mut id_to_token = HashMap::with_capacity(token_to_id.capacity());
        let mut next_id = 0u64;
        for (token, id) in raw {
            if token.is_empty() {
                return Err(TokenizerError::Config(
                    "vocabulary contains an empty token".into(),
                ));
            }
            let id = u32::try_from(id).map_err(|_| {
                TokenizerError::Config(format!("token {token:?} has out-of-range id {id}"))
            })?;
            if id_to_token.insert(id, token.clone()).is_some() {
                return Err(TokenizerError::Config(format!(
                    "id {id} is assigned to more than one token"
                )));
            }
            next_id = next_id.max(u64::from(id) + 1);
            token_to_id.insert(token, id);
        }

        let mut interner = Interner {
            token_to_id: &mut token_to_id,
            id_to_token: &mut id_to_token,
            next_id,
        };
        let unk_id = interner.intern(unk_token)?;
        let mut specials = Vec::with_capacity(special_tokens.len());
        for token in special_tokens {
            let id = interner.intern(token)?;
            specials.push((token.clone(), id));
        }
        specials.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        specials.dedup_by(|a, b| a.0 == b.0);

        let mut special_first_bytes = [false; 256];
        for (token, _) in &specials {
            special_first_bytes[token.as_bytes()[0] as usize] = true;
        }

        let codec = ByteCodec::global();
        let mut byte_symbols = [unk_id; 256];
        let mut unmapped_bytes = 0usize;
        let mut buf = [0u8; 4];
        for b in 0..=255u8 {
            match token_to_id.get(codec.encode(b).encode_utf8(&mut buf) as &str) {
                Some(&id) => byte_symbols[b as usize] = id,
                None => unmapped_bytes += 1,
            }
        }
        if unmapped_bytes > 0 {
            warn!(unmapped_bytes, unk_id, "vocabulary lacks byte tokens, they encode as unknown");
        }

        let merges = parse_merges(merges_text, &token_to_id)?;
        let dangling = merges.values().filter(|m| m.id.is_none()).count();
        if dangling > 0 {
            warn!(dangling, "merge rules produce tokens missing from the vocabulary");
        }

        debug!(
            vocab_size = token_to_id.len(),
            merge_count = merges.len(),
            special_count = specials.len(),
            unk_id,
            "vocabulary loaded"
        );

        Ok(Self {
            token_to_id,
            id_to_token,
            merges,
            byte_symbols,
            special_tokens: specials,
            special_first_bytes,
            unk_id,
        })
    }

    /// Number of distinct tokens, including appended special tokens.
    pub fn vocab_size(&self) -> usize {
        self.token_to_id.len()
    }

    pub fn token_id(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    pub fn token(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(&id).map(String::as_str)
    }

    pub fn unk_id(&self) -> u32 {
        self.unk_id
    }

    /// Special tokens and their ids, longest first.
    pub fn special_tokens(&self) -> &[(String, u32)] {
        &self.special_tokens
    }

    /// Priority of merging `left` followed by `right`; lower merges first.
    pub fn merge_rank(&self, left: &str, right: &str) -> Option<u32> {
        let key = (self.token_id(left)?, self.token_id(right)?);
        self.merges.get(&key).map(|m| m.rank)
    }

    /// Symbol id for a raw byte of input.
    #[inline]
    pub fn byte_symbol(&self, byte: u8) -> u32 {
        self.byte_symbols[byte as usize]
    }

    /// Split `text` into special tokens and the ordinary text between them.
    ///
    /// At every position the longest configured special token wins. Text
    /// spans are emitted unchanged and never empty.
    pub fn split_by_special_tokens<'a>(&self, text: &'a str) -> Vec<Segment<'a>> {
        let mut segments = Vec::new();
        if self.special_tokens.is_empty() {
            if !text.is_empty() {
                segments.push(Segment::Text(text));
            }
            return segments;
        }

        let bytes = text.as_bytes();
        let mut span_start = 0;
        let mut pos = 0;
        while pos < bytes.len() {
            if self.special_first_bytes[bytes[pos] as usize] {
                if let Some((len, id)) = self.match_special(&text[pos..]) {
                    if span_start < pos {
                        segments.push(Segment::Text(&text[span_start..pos]));
                    }
                    segments.push(Segment::Special(id));
                    pos += len;
                    span_start = pos;
                    continue;
                }
            }
            pos += utf8_len(bytes[pos]);
        }
        if span_start < bytes.len() {
            segments.push(Segment::Text(&text[span_start..]));
        }
        segments
    }

    fn match_special(&self, rest: &str) -> Option<(usize, u32)> {
        self.special_tokens
            .iter()
            .find(|(token, _)| rest.starts_with(token.as_str()))
            .map(|(token, id)| (token.len(), *id))
    }

    /// Reduce one chunk's byte symbols to vocabulary ids.
    ///
    /// Repeatedly takes the lowest-ranked adjacent pair present and merges
    /// every non-overlapping occurrence of it, left to right, until no ranked
    /// pair remains. A merged symbol whose string is not a vocabulary token
    /// stops merging and is emitted as the symbols it was built from.
    pub fn bpe(&self, symbols: &[u32]) -> Vec<u32> {
        let mut out = Vec::with_capacity(symbols.len());
        self.bpe_into(symbols, &mut out);
        out
    }

    /// Like [`VocabTable::bpe`], appending to `out`.
    pub fn bpe_into(&self, symbols: &[u32], out: &mut Vec<u32>) {
        match symbols {
            [] => return,
            [single] => {
                out.push(*single);
                return;
            }
            _ => {}
        }

        let len = symbols.len();
        let mut nodes: Vec<Symbol> = (0..len)
            .map(|i| Symbol {
                id: Some(symbols[i]),
                end: i + 1,
                prev: i.checked_sub(1),
                next: (i + 1 < len).then_some(i + 1),
                merged: false,
            })
            .collect();

        let mut queue = BinaryHeap::with_capacity(len);
        for left in 0..len - 1 {
            self.queue_pair(&nodes, left, &mut queue);
        }

        let mut touched = Vec::new();
        while let Some(Reverse(first)) = queue.pop() {
            // Drain every candidate of this rank before queueing the pairs the
            // merges create: that is one pass of the reference algorithm.
            let rank = first.rank;
            let mut next = Some(first);
            touched.clear();
            while let Some(candidate) = next {
                if candidate.is_current(&nodes) {
                    merge_nodes(&mut nodes, &candidate);
                    touched.push(candidate.left);
                }
                next = if queue.peek().is_some_and(|Reverse(c)| c.rank == rank) {
                    queue.pop().map(|Reverse(c)| c)
                } else {
                    None
                };
            }

            for &idx in &touched {
                if nodes[idx].merged {
                    continue;
                }
                if let Some(prev) = nodes[idx].prev {
                    self.queue_pair(&nodes, prev, &mut queue);
                }
                self.queue_pair(&nodes, idx, &mut queue);
            }
        }

        let mut idx = Some(0);
        while let Some(i) = idx {
            let node = &nodes[i];
            match node.id {
                Some(id) => out.push(id),
                None => {
                    trace!(span = node.end - i, "merged symbol missing from vocabulary");
                    out.extend_from_slice(&symbols[i..node.end]);
                }
            }
            idx = node.next;
        }
    }

    /// Queue the pair starting at `left` if both symbols are tokens and a merge rule exists.
    fn queue_pair(&self, nodes: &[Symbol], left: usize, queue: &mut BinaryHeap<Reverse<Candidate>>) {
        let Some(right) = nodes[left].next else {
            return;
        };
        let (Some(left_id), Some(right_id)) = (nodes[left].id, nodes[right].id) else {
            return;
        };
        if let Some(merge) = self.merges.get(&(left_id, right_id)) {
            queue.push(Reverse(Candidate {
                rank: merge.rank,
                left,
                right,
                left_id,
                right_id,
                merged_id: merge.id,
            }));
        }
    }
}

/// A symbol in the BPE linked list. Its index is the position of its first byte symbol.
#[derive(Clone, Debug)]
struct Symbol {
    id: Option<u32>,
    /// One past the last byte symbol this symbol covers.
    end: usize,
    prev: Option<usize>,
    next: Option<usize>,
    merged: bool,
}

/// A queued merge. Ordered by rank, then by position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Candidate {
    rank: u32,
    left: usize,
    right: usize,
    left_id: u32,
    right_id: u32,
    merged_id: Option<u32>,
}

impl Candidate {
    /// Whether the two symbols are still adjacent and unchanged since queueing.
    fn is_current(&self, nodes: &[Symbol]) -> bool {
        let (left, right) = (&nodes[self.left], &nodes[self.right]);
        !left.merged
            && !right.merged
            && left.next == Some(self.right)
            && left.id == Some(self.left_id)
            && right.id == Some(self.right_id)
    }
}

/// Absorb the right symbol of `candidate` into the left one.
fn merge_nodes(nodes: &mut [Symbol], candidate: &Candidate) {
    let (left, right) = (candidate.left, candidate.right);
    let right_next = nodes[right].next;
    let right_end = nodes[right].end;

    nodes[right].merged = true;
    let node = &mut nodes[left];
    node.id = candidate.merged_id;
    node.end = right_end;
    node.next = right_next;
    if let Some(n) = right_next {
        nodes[n].prev = Some(left);
    }
}

/// Hands out ids above the largest vocabulary id to tokens the vocabulary lacks.
struct Interner<'t> {
    token_to_id: &'t mut HashMap<String, u32>,
    id_to_token: &'t mut HashMap<u32, String>,
    next_id: u64,
}

impl Interner<'_> {
    /// Id of `token`, assigning the next free one if it is not yet in the vocabulary.
    fn intern(&mut self, token: &str) -> Result<u32, TokenizerError> {
        if token.is_empty() {
            return Err(TokenizerError::Config("special tokens must not be empty".into()));
        }
        if let Some(&id) = self.token_to_id.get(token) {
            return Ok(id);
        }
        let id = u32::try_from(self.next_id)
            .map_err(|_| TokenizerError::Config("vocabulary id space exhausted".into()))?;
        debug!(token, id, "added special token to the vocabulary");
        self.next_id += 1;
        self.token_to_id.insert(token.to_string(), id);
        self.id_to_token.insert(id, token.to_string());
        Ok(id)
    }
}

/// Parse `merges.txt`: an optional `#version` header, then one `left right` pair per line.
fn parse_merges(
    merges_text: &str,
    token_to_id: &HashMap<String, u32>,
) -> Result<HashMap<(u32, u32), Merge>, TokenizerError> {
    let mut merges = HashMap::new();
    let mut rank = 0u32;

    for (line_no, raw) in merges_text.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        if rank == 0 && line.starts_with("#version") {
            continue;
        }

        let invalid = |reason: String| TokenizerError::InvalidMerge {
            line: line_no + 1,
            reason,
        };

        let mut fields = line.split_whitespace();
        let (Some(left), Some(right), None) = (fields.next(), fields.next(), fields.next()) else {
            return Err(invalid(format!("expected exactly two fields in {line:?}")));
        };
        let lookup = |operand: &str| {
            token_to_id
                .get(operand)
                .copied()
                .ok_or_else(|| invalid(format!("operand {operand:?} is not in the vocabulary")))
        };
        let key = (lookup(left)?, lookup(right)?);
        let id = token_to_id.get(&format!("{left}{right}")).copied();

        // Repeated pairs keep their first, highest-priority rank.
        merges.entry(key).or_insert(Merge { rank, id });
        rank += 1;
    }

    if merges.is_empty() {
        return Err(TokenizerError::Config("merges contain no rules".into()));
    }
    Ok(merges)
}

/// Byte length of the UTF-8 sequence introduced by `lead`.
#[inline]
fn utf8_len(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        _ => 4,
    }
}
