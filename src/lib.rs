//! # meshvoice
//!
//! Voice clips over a lossy, low-MTU mesh radio link.
//!
//! ## Overview
//!
//! The radio only carries small best-effort datagrams. meshvoice layers a
//! "reliable enough" message protocol on top: a clip is compressed into a
//! self-describing payload, base64-armoured, split into fragments that fit
//! the link, sent with bounded retry and pacing, and reassembled on the far
//! side regardless of arrival order.
//!
//! ## Pipeline
//!
//! 1. **Encode**: [`AudioEncoder`] turns an [`AudioClip`] into an
//!    [`EncodedPayload`] with the speech vocoder, or with the legacy
//!    resample + narrow + compress + zlib path when the vocoder fails
//! 2. **Transmit**: [`FragmentationTransmitter`] sends it as one packet or
//!    as numbered fragments under a random transfer id
//! 3. **Reassemble**: [`ReassemblyStore`] collects fragments per transfer
//!    and reaps transfers that stall
//! 4. **Decode**: [`PayloadDecoder`] reads the header tag and picks the
//!    matching decode path
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meshvoice::{AudioClip, AudioEncoder, PayloadDecoder, QualityTier};
//!
//! # fn main() -> anyhow::Result<()> {
//! let clip = AudioClip::read_wav("memo.wav")?;
//! let payload = AudioEncoder::new().encode(&clip, &QualityTier::Low.profile())?;
//! let decoded = PayloadDecoder::new().decode(payload.as_bytes())?;
//! assert_eq!(decoded.channels, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`quality`]: named tiers and their encoding parameters
//! - [`codec`]: payload framing, vocoder and legacy strategies
//! - [`transmitter`]: fragmenting sender with retry, pacing and cancellation
//! - [`reassembly`]: receive-side session table
//! - [`receiver`]: packet callback and background reaper
//! - [`transport`]: mesh radio boundary and an in-process loopback mesh
//! - [`config`]: persistent configuration

/// PCM clip container and WAV I/O
pub mod audio;

/// Named quality tiers
pub mod quality;

/// Sample-rate conversion
pub mod resample;

/// Payload framing and the two encode strategies
pub mod codec;

pub mod encoder;

pub mod decoder;

/// Cooperative cancellation
pub mod cancel;

/// Splitting base64 text into numbered fragments
pub mod fragment;

/// JSON messages on the private port
pub mod wire;

/// Mesh radio boundary
pub mod transport;

pub mod transmitter;

pub mod reassembly;

pub mod receiver;

/// Saving received clips
pub mod archive;

/// Configuration management with persistence and validation
pub mod config;

pub mod error;

#[cfg(test)]
pub mod tests;

// Re-export main types for convenience
pub use archive::VoiceArchive;
pub use audio::AudioClip;
pub use cancel::CancellationToken;
pub use codec::{EncodedPayload, PayloadKind};
pub use config::{AppConfig, ConfigManager};
pub use decoder::PayloadDecoder;
pub use encoder::{AudioEncoder, EncodeStrategy};
pub use error::{ConnectError, DecodeError, EncodeError, SendError, TransmitError};
pub use fragment::{Chunk, ChunkSize};
pub use quality::{QualityProfile, QualityTier};
pub use reassembly::{IngestOutcome, ReassemblyStore, ReceivedVoice};
pub use receiver::{Reaper, ReceiverEvent, VoiceReceiver};
pub use transmitter::{FragmentationTransmitter, SendHandle, SendOutcome, SendReport, TransmitterConfig};
pub use transport::{Destination, LoopbackMesh, MeshConnector, MeshTransport, PortNum};
