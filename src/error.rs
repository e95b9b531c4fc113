//! Error types for the voice payload pipeline
//!
//! Every failure here is scoped to a single message: an encode error
//! triggers the fallback strategy, a send error is retried and then
//! recorded against one chunk, a decode error drops one message.

use thiserror::Error;

/// Failures while turning a clip into an [`EncodedPayload`](crate::codec::EncodedPayload)
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("vocoder unavailable: {0}")]
    CodecUnavailable(String),

    #[error("unsupported sample width: {0} bytes")]
    UnsupportedSampleWidth(u16),

    #[error("malformed clip: {0}")]
    MalformedClip(String),

    #[error("payload header is {0} bytes, limit is 255")]
    HeaderOverflow(usize),

    #[error("failed to read source clip: {0}")]
    Source(#[from] hound::Error),

    #[error("compression failed: {0}")]
    Compression(#[from] std::io::Error),
}

/// Failures while turning payload bytes back into a clip
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("payload is empty")]
    Empty,

    #[error("not a vocoder payload")]
    NotVocoderPayload,

    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("unknown codec tag: {0}")]
    UnsupportedCodec(String),

    #[error("unsupported vocoder bit rate: {0}")]
    UnsupportedBitRate(u32),

    #[error("vocoder unavailable on this receiver")]
    CodecUnavailable,

    #[error("decompression failed: {0}")]
    Decompression(#[source] std::io::Error),

    #[error("decompressed payload exceeds {0} bytes")]
    TooLarge(usize),

    #[error("invalid base64 text: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Transport refused or failed to queue a packet
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("transport not connected")]
    NotConnected,

    #[error("transport refused packet: {0}")]
    Refused(String),

    #[error("packet of {0} bytes exceeds transport limit")]
    TooLarge(usize),
}

/// Failures opening a transport handle
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("connection failed: {0}")]
    Failed(String),
}

/// Failures of a send request as a whole (per-chunk failures live in the report)
#[derive(Error, Debug)]
pub enum TransmitError {
    #[error("a fragmented transfer is already in flight")]
    Busy,

    #[error("chunk budget must be at least 1 byte")]
    InvalidChunkBudget,

    #[error("payload needs {chunks} chunks, limit is {limit}")]
    TooManyChunks { chunks: usize, limit: u32 },

    #[error("failed to serialize wire message: {0}")]
    Wire(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] SendError),

    #[error("failed to start send worker: {0}")]
    Worker(#[source] std::io::Error),

    #[error("send worker panicked")]
    WorkerPanicked,
}
