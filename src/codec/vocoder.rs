use log::{debug, info};

use super::{EncodedPayload, PayloadFormat, PayloadHeader, PcmFormat, VocoderParams};
use crate::audio::AudioClip;
use crate::error::{DecodeError, EncodeError};
use crate::quality::QualityProfile;
use crate::resample;

/// Native rate of the speech vocoder
pub const VOCODER_SAMPLE_RATE: u32 = 8000;

/// Bit rates the vocoder can decode, highest first
pub const SUPPORTED_BIT_RATES: [u32; 6] = [3200, 2400, 1600, 1400, 1300, 1200];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VocoderInitError {
    /// Built without the `vocoder` feature
    Unavailable,
    UnsupportedBitRate(u32),
}

#[cfg(feature = "vocoder")]
mod backend {
    use super::VocoderInitError;
    use codec2::{Codec2, Codec2Mode};

    pub type Backend = Codec2;

    pub fn open(bit_rate: u32) -> Result<Backend, VocoderInitError> {
        let mode = match bit_rate {
            3200 => Codec2Mode::MODE_3200,
            2400 => Codec2Mode::MODE_2400,
            1600 => Codec2Mode::MODE_1600,
            1400 => Codec2Mode::MODE_1400,
            1300 => Codec2Mode::MODE_1300,
            1200 => Codec2Mode::MODE_1200,
            other => return Err(VocoderInitError::UnsupportedBitRate(other)),
        };
        Ok(Codec2::new(mode))
    }

    pub fn samples_per_frame(codec: &Backend) -> usize {
        codec.samples_per_frame()
    }

    pub fn bytes_per_frame(codec: &Backend) -> usize {
        (codec.bits_per_frame() + 7) / 8
    }

    pub fn encode(codec: &mut Backend, speech: &[i16], bits: &mut [u8]) {
        codec.encode(bits, speech);
    }

    pub fn decode(codec: &mut Backend, bits: &[u8], speech: &mut [i16]) {
        codec.decode(speech, bits);
    }
}

#[cfg(not(feature = "vocoder"))]
mod backend {
    use super::{SUPPORTED_BIT_RATES, VocoderInitError};

    pub enum Backend {}

    pub fn open(bit_rate: u32) -> Result<Backend, VocoderInitError> {
        if !SUPPORTED_BIT_RATES.contains(&bit_rate) {
            return Err(VocoderInitError::UnsupportedBitRate(bit_rate));
        }
        Err(VocoderInitError::Unavailable)
    }

    pub fn samples_per_frame(codec: &Backend) -> usize {
        match *codec {}
    }

    pub fn bytes_per_frame(codec: &Backend) -> usize {
        match *codec {}
    }

    pub fn encode(codec: &mut Backend, _speech: &[i16], _bits: &mut [u8]) {
        match *codec {}
    }

    pub fn decode(codec: &mut Backend, _bits: &[u8], _speech: &mut [i16]) {
        match *codec {}
    }
}

/// Frame-oriented speech vocoder at a fixed bit rate
pub struct Vocoder {
    bit_rate: u32,
    codec: backend::Backend,
}

impl Vocoder {
    pub fn new(bit_rate: u32) -> Result<Self, VocoderInitError> {
        Ok(Self { bit_rate, codec: backend::open(bit_rate)? })
    }

    pub fn bit_rate(&self) -> u32 {
        self.bit_rate
    }

    pub fn samples_per_frame(&self) -> usize {
        backend::samples_per_frame(&self.codec)
    }

    pub fn bytes_per_frame(&self) -> usize {
        backend::bytes_per_frame(&self.codec)
    }

    pub fn params(&self) -> VocoderParams {
        VocoderParams {
            bit_rate: self.bit_rate,
            samples_per_frame: self.samples_per_frame(),
            bytes_per_frame: self.bytes_per_frame(),
        }
    }

    /// Encode exactly one frame of `samples_per_frame` samples
    pub fn encode_frame(&mut self, speech: &[i16], bits: &mut [u8]) {
        backend::encode(&mut self.codec, speech, bits);
    }

    /// Decode exactly one frame of `bytes_per_frame` bytes
    pub fn decode_frame(&mut self, bits: &[u8], speech: &mut [i16]) {
        backend::decode(&mut self.codec, bits, speech);
    }
}

/// Whether this build can encode and decode vocoder payloads
pub fn is_available() -> bool {
    cfg!(feature = "vocoder")
}

fn init_for_encode(bit_rate: u32) -> Result<Vocoder, EncodeError> {
    Vocoder::new(bit_rate).map_err(|e| match e {
        VocoderInitError::Unavailable => {
            EncodeError::CodecUnavailable("built without the vocoder feature".to_string())
        }
        VocoderInitError::UnsupportedBitRate(bps) => {
            EncodeError::CodecUnavailable(format!("no vocoder mode for {} bps", bps))
        }
    })
}

fn init_for_decode(bit_rate: u32) -> Result<Vocoder, DecodeError> {
    Vocoder::new(bit_rate).map_err(|e| match e {
        VocoderInitError::Unavailable => DecodeError::CodecUnavailable,
        VocoderInitError::UnsupportedBitRate(bps) => DecodeError::UnsupportedBitRate(bps),
    })
}

/// Encode a clip as a vocoder payload: mono, 8 kHz, zero-padded to whole frames
pub fn encode(clip: &AudioClip, profile: &QualityProfile) -> Result<EncodedPayload, EncodeError> {
    clip.validate()?;
    let mut vocoder = init_for_encode(profile.vocoder_bit_rate)?;
    let params = vocoder.params();
    let spf = params.samples_per_frame;
    let bpf = params.bytes_per_frame;

    let mono = clip.to_mono_i16();
    let mut speech = resample::resample(&mono, 1, clip.sample_rate, VOCODER_SAMPLE_RATE);

    let rem = speech.len() % spf;
    if rem != 0 {
        speech.resize(speech.len() + spf - rem, 0);
    }

    let mut body = Vec::with_capacity(speech.len() / spf * bpf);
    let mut bits = vec![0u8; bpf];
    for frame in speech.chunks_exact(spf) {
        vocoder.encode_frame(frame, &mut bits);
        body.extend_from_slice(&bits);
    }

    let header = PayloadHeader::vocoder(
        PcmFormat { sample_rate: VOCODER_SAMPLE_RATE, channels: 1, sample_width: 2 },
        params,
    );
    let framed = super::frame(&header, &body)?;

    info!(
        "Vocoder: {} PCM bytes -> {} coded bytes @ {} bps",
        speech.len() * 2,
        body.len(),
        params.bit_rate
    );
    Ok(EncodedPayload::new(framed))
}

/// Decode a payload that must be in vocoder format
pub fn decode(bytes: &[u8]) -> Result<AudioClip, DecodeError> {
    match super::detect(bytes)? {
        PayloadFormat::Vocoder { pcm, params, body } => decode_body(pcm, params, body),
        PayloadFormat::Legacy => Err(DecodeError::NotVocoderPayload),
    }
}

/// Decode whole frames of `body`; a short trailing frame is discarded
pub fn decode_body(pcm: PcmFormat, params: VocoderParams, body: &[u8]) -> Result<AudioClip, DecodeError> {
    if pcm.sample_width != 2 || pcm.channels != 1 {
        return Err(DecodeError::MalformedHeader(format!(
            "vocoder output must be mono 16-bit, header says {} ch x {} bytes",
            pcm.channels, pcm.sample_width
        )));
    }

    let mut vocoder = init_for_decode(params.bit_rate)?;
    let expected = vocoder.params();
    if expected != params {
        return Err(DecodeError::MalformedHeader(format!(
            "frame geometry {}x{} does not match {} bps vocoder ({}x{})",
            params.samples_per_frame,
            params.bytes_per_frame,
            params.bit_rate,
            expected.samples_per_frame,
            expected.bytes_per_frame
        )));
    }

    let trailing = body.len() % params.bytes_per_frame;
    if trailing != 0 {
        debug!("Discarding {} trailing bytes of a partial vocoder frame", trailing);
    }

    let frames = body.len() / params.bytes_per_frame;
    let mut speech = Vec::with_capacity(frames * params.samples_per_frame);
    let mut frame = vec![0i16; params.samples_per_frame];
    for bits in body.chunks_exact(params.bytes_per_frame) {
        vocoder.decode_frame(bits, &mut frame);
        speech.extend_from_slice(&frame);
    }

    Ok(AudioClip::from_i16(pcm.sample_rate, 1, &speech))
}
