use log::debug;

use crate::audio::AudioClip;
use crate::codec::{self, EncodedPayload, PayloadFormat, legacy, vocoder};
use crate::error::DecodeError;

/// Detects the payload format from its header and decodes to playable PCM
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadDecoder;

impl PayloadDecoder {
    pub fn new() -> Self {
        Self
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<AudioClip, DecodeError> {
        match codec::detect(bytes)? {
            PayloadFormat::Vocoder { pcm, params, body } => {
                debug!("Decoding vocoder payload @ {} bps", params.bit_rate);
                vocoder::decode_body(pcm, params, body)
            }
            PayloadFormat::Legacy => {
                debug!("Decoding legacy payload ({} bytes)", bytes.len());
                legacy::decode(bytes)
            }
        }
    }

    /// Decode the base64 text carried on the wire
    pub fn decode_base64(&self, text: &str) -> Result<(EncodedPayload, AudioClip), DecodeError> {
        let payload = EncodedPayload::from_base64(text)?;
        let clip = self.decode(payload.as_bytes())?;
        Ok((payload, clip))
    }
}
