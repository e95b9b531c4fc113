use std::path::Path;

use log::{info, warn};

use crate::audio::AudioClip;
use crate::codec::{EncodedPayload, legacy, vocoder};
use crate::error::EncodeError;
use crate::quality::QualityProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeStrategy {
    /// Low bit-rate speech vocoder
    Vocoder,
    /// Resample, narrow, amplitude-compress, zlib
    Legacy,
}

/// Turns recorded clips into compact self-describing payloads
#[derive(Debug, Clone)]
pub struct AudioEncoder {
    prefer_vocoder: bool,
}

impl Default for AudioEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEncoder {
    /// Vocoder first, legacy on any vocoder failure
    pub fn new() -> Self {
        Self { prefer_vocoder: true }
    }

    pub fn legacy_only() -> Self {
        Self { prefer_vocoder: false }
    }

    pub fn with_vocoder(prefer_vocoder: bool) -> Self {
        Self { prefer_vocoder }
    }

    pub fn prefers_vocoder(&self) -> bool {
        self.prefer_vocoder
    }

    pub fn encode(&self, clip: &AudioClip, profile: &QualityProfile) -> Result<EncodedPayload, EncodeError> {
        if self.prefer_vocoder {
            match self.encode_with(EncodeStrategy::Vocoder, clip, profile) {
                Ok(payload) => return Ok(payload),
                Err(e) => warn!("Vocoder encode failed ({}), falling back to legacy compression", e),
            }
        }
        self.encode_with(EncodeStrategy::Legacy, clip, profile)
    }

    pub fn encode_with(
        &self,
        strategy: EncodeStrategy,
        clip: &AudioClip,
        profile: &QualityProfile,
    ) -> Result<EncodedPayload, EncodeError> {
        let payload = match strategy {
            EncodeStrategy::Vocoder => vocoder::encode(clip, profile)?,
            EncodeStrategy::Legacy => legacy::encode(clip, profile)?,
        };
        info!(
            "Encoded {:.2}s clip at {} quality with {:?}: {} bytes",
            clip.duration().as_secs_f32(),
            profile.tier,
            strategy,
            payload.len()
        );
        Ok(payload)
    }

    /// Read a WAV file and encode it
    pub fn encode_file<P: AsRef<Path>>(&self, path: P, profile: &QualityProfile) -> Result<EncodedPayload, EncodeError> {
        let clip = AudioClip::read_wav(path)?;
        self.encode(&clip, profile)
    }
}
