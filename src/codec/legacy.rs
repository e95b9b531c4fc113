use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use log::info;

use super::{CodecTag, EncodedPayload, PayloadHeader, PcmFormat, dynamics};
use crate::audio::{self, AudioClip};
use crate::error::{DecodeError, EncodeError};
use crate::quality::QualityProfile;
use crate::resample;

/// Inflated size limit for one legacy payload (about six minutes of 11 kHz stereo)
pub const MAX_DECOMPRESSED_BYTES: usize = 16 * 1024 * 1024;

/// Encode a clip with the generic fallback: downsample, narrow, flatten, zlib
pub fn encode(clip: &AudioClip, profile: &QualityProfile) -> Result<EncodedPayload, EncodeError> {
    clip.validate()?;

    let mut sample_rate = clip.sample_rate;
    let mut samples = clip.samples_i16();
    if sample_rate > profile.legacy_sample_rate {
        samples = resample::resample(&samples, clip.channels, sample_rate, profile.legacy_sample_rate);
        sample_rate = profile.legacy_sample_rate;
    }

    let sample_width = clip.sample_width.min(profile.legacy_sample_width);
    let pcm = match sample_width {
        1 => {
            let mut narrow: Vec<u8> = samples.iter().map(|&s| audio::i16_to_u8(s)).collect();
            if let Some(curve) = profile.dynamics {
                dynamics::compress_u8(&mut narrow, curve);
            }
            narrow
        }
        _ => {
            if let Some(curve) = profile.dynamics {
                dynamics::compress_i16(&mut samples, curve);
            }
            AudioClip::from_i16(sample_rate, clip.channels, &samples).pcm
        }
    };

    let header = PayloadHeader::pcm(PcmFormat { sample_rate, channels: clip.channels, sample_width });
    let framed = super::frame(&header, &pcm)?;

    let mut encoder = ZlibEncoder::new(Vec::with_capacity(framed.len() / 2), Compression::best());
    encoder.write_all(&framed)?;
    let compressed = encoder.finish()?;

    info!("Compressed audio: {} -> {} bytes ({})", pcm.len(), compressed.len(), header);
    Ok(EncodedPayload::new(compressed))
}

/// Decompress and unwrap a legacy payload; the PCM body is returned as-is
pub fn decode(bytes: &[u8]) -> Result<AudioClip, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let mut raw = Vec::with_capacity(bytes.len() * 4);
    ZlibDecoder::new(bytes)
        .take(MAX_DECOMPRESSED_BYTES as u64 + 1)
        .read_to_end(&mut raw)
        .map_err(DecodeError::Decompression)?;
    if raw.len() > MAX_DECOMPRESSED_BYTES {
        return Err(DecodeError::TooLarge(MAX_DECOMPRESSED_BYTES));
    }

    let (text, pcm) = super::unframe(&raw)?;
    let header = PayloadHeader::parse(text)?;
    if header.codec != CodecTag::Absent {
        return Err(DecodeError::MalformedHeader(format!(
            "legacy header carries a codec tag: {}",
            text
        )));
    }

    let PcmFormat { sample_rate, channels, sample_width } = header.pcm;
    Ok(AudioClip::new(sample_rate, channels, sample_width, pcm.to_vec()))
}
