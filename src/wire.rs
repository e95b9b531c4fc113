//! JSON messages exchanged on the private application port.
//!
//! Keys are fixed for interoperability with existing nodes:
//!
//! | kind     | keys                                          |
//! |----------|-----------------------------------------------|
//! | voice    | `voice_data`, `timestamp`                     |
//! | fragment | `chunk_id`, `chunk_num`, `total_chunks`, `data` |
//! | probe    | `test`                                        |

use serde::{Deserialize, Serialize};

use crate::fragment::Chunk;

/// Format of capture timestamps and received-file names
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireMessage {
    Chunk {
        chunk_id: String,
        chunk_num: u32,
        total_chunks: u32,
        data: String,
    },
    Voice {
        voice_data: String,
        timestamp: String,
    },
    Test {
        test: String,
    },
}

impl WireMessage {
    pub fn voice(voice_data: String) -> Self {
        WireMessage::Voice { voice_data, timestamp: timestamp_now() }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WireMessage::Chunk { .. } => "chunk",
            WireMessage::Voice { .. } => "voice",
            WireMessage::Test { .. } => "test",
        }
    }
}

impl From<&Chunk> for WireMessage {
    fn from(chunk: &Chunk) -> Self {
        WireMessage::Chunk {
            chunk_id: chunk.transfer_id.clone(),
            chunk_num: chunk.sequence_number,
            total_chunks: chunk.total_count,
            data: chunk.text_data.clone(),
        }
    }
}

/// Local wall-clock time in [`TIMESTAMP_FORMAT`]
pub fn timestamp_now() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}
