use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Hex characters in a generated transfer id (64 random bits)
pub const TRANSFER_ID_LEN: usize = 16;

/// Most fragments one transfer may declare; receivers reject larger totals
pub const MAX_TRANSFER_CHUNKS: u32 = 4096;

/// Preset chunk budgets, in bytes of base64 text per fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChunkSize {
    Small,
    Medium,
    Large,
}

impl ChunkSize {
    pub fn budget(&self) -> usize {
        match self {
            ChunkSize::Small => 150,
            ChunkSize::Medium => 180,
            ChunkSize::Large => 200,
        }
    }
}

impl Default for ChunkSize {
    fn default() -> Self {
        ChunkSize::Medium
    }
}

impl fmt::Display for ChunkSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChunkSize::Small => "Small",
            ChunkSize::Medium => "Medium",
            ChunkSize::Large => "Large",
        };
        write!(f, "{} ({} bytes)", name, self.budget())
    }
}

impl FromStr for ChunkSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "small" => Ok(ChunkSize::Small),
            "medium" => Ok(ChunkSize::Medium),
            "large" => Ok(ChunkSize::Large),
            _ => Err(format!("unknown chunk size: {}", s)),
        }
    }
}

/// One fragment of a base64-armoured payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub transfer_id: String,
    /// 1-based
    pub sequence_number: u32,
    pub total_count: u32,
    pub text_data: String,
}

/// Fresh identifier for an outbound fragmented transfer
pub fn new_transfer_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(TRANSFER_ID_LEN);
    id
}

/// Number of fragments `len` bytes of text need at `budget` bytes each
pub fn chunk_count(len: usize, budget: usize) -> usize {
    if budget == 0 {
        return 0;
    }
    len.div_ceil(budget)
}

/// Slice `text` into budget-sized windows; the last may be shorter.
///
/// Windows never split a UTF-8 character, so for non-ASCII text a window
/// can come out shorter than `budget`. Base64 text is always ASCII.
pub fn split_text(text: &str, budget: usize) -> Vec<&str> {
    let budget = budget.max(1);
    let mut pieces = Vec::with_capacity(chunk_count(text.len(), budget));
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + budget).min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            end = start + 1;
            while !text.is_char_boundary(end) {
                end += 1;
            }
        }
        pieces.push(&text[start..end]);
        start = end;
    }
    pieces
}

/// Fragment `text` into sequence-numbered chunks for one transfer
pub fn fragment(transfer_id: &str, text: &str, budget: usize) -> Vec<Chunk> {
    let pieces = split_text(text, budget);
    let total = pieces.len() as u32;
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| Chunk {
            transfer_id: transfer_id.to_string(),
            sequence_number: i as u32 + 1,
            total_count: total,
            text_data: piece.to_string(),
        })
        .collect()
}
