//! Self-describing payload format.
//!
//! ```text
//! [1 byte header length][ASCII header][body]
//! header = sample_rate,channels,sample_width[,TAG,params...]
//! ```
//!
//! Vocoder payloads carry this framing on the outside with the tag `C2`
//! followed by `bit_rate,samples_per_frame,bytes_per_frame`. Legacy payloads
//! are a zlib stream whose decompressed content carries the same framing
//! with no tag.

pub mod dynamics;
pub mod legacy;
pub mod vocoder;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::fmt;

use crate::error::{DecodeError, EncodeError};

/// Codec tag marking a vocoder body
pub const VOCODER_TAG: &str = "C2";
/// Header length must fit the 1-byte prefix
pub const MAX_HEADER_LEN: usize = 255;

/// Binary payload produced by the encoder and carried base64-armoured on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload(Vec<u8>);

impl EncodedPayload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn from_base64(text: &str) -> Result<Self, DecodeError> {
        Ok(Self(STANDARD.decode(text)?))
    }

    /// Which decode path this payload will take
    pub fn kind(&self) -> Result<PayloadKind, DecodeError> {
        Ok(match detect(&self.0)? {
            PayloadFormat::Vocoder { .. } => PayloadKind::Vocoder,
            PayloadFormat::Legacy => PayloadKind::Legacy,
        })
    }
}

impl From<Vec<u8>> for EncodedPayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for EncodedPayload {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Vocoder,
    Legacy,
}

/// The three mandatory header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_width: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VocoderParams {
    pub bit_rate: u32,
    pub samples_per_frame: usize,
    pub bytes_per_frame: usize,
}

/// What follows the mandatory fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecTag {
    /// No tag: raw PCM body
    Absent,
    Vocoder(VocoderParams),
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadHeader {
    pub pcm: PcmFormat,
    pub codec: CodecTag,
}

impl PayloadHeader {
    pub fn pcm(pcm: PcmFormat) -> Self {
        Self { pcm, codec: CodecTag::Absent }
    }

    pub fn vocoder(pcm: PcmFormat, params: VocoderParams) -> Self {
        Self { pcm, codec: CodecTag::Vocoder(params) }
    }

    pub fn parse(text: &str) -> Result<Self, DecodeError> {
        let fields: Vec<&str> = text.split(',').map(str::trim).collect();
        if fields.len() < 3 {
            return Err(DecodeError::MalformedHeader(format!(
                "expected at least 3 fields, got {}",
                fields.len()
            )));
        }

        let pcm = PcmFormat {
            sample_rate: parse_field(fields[0], "sample_rate")?,
            channels: parse_field(fields[1], "channels")?,
            sample_width: parse_field(fields[2], "sample_width")?,
        };

        let codec = match fields.get(3).copied() {
            None => CodecTag::Absent,
            Some(tag) if tag == VOCODER_TAG => {
                if fields.len() < 7 {
                    return Err(DecodeError::MalformedHeader(format!(
                        "vocoder header needs 7 fields, got {}",
                        fields.len()
                    )));
                }
                CodecTag::Vocoder(VocoderParams {
                    bit_rate: parse_field(fields[4], "bit_rate")?,
                    samples_per_frame: parse_field(fields[5], "samples_per_frame")?,
                    bytes_per_frame: parse_field(fields[6], "bytes_per_frame")?,
                })
            }
            Some(other) => CodecTag::Unknown(other.to_string()),
        };

        Ok(Self { pcm, codec })
    }
}

impl fmt::Display for PayloadHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.pcm.sample_rate, self.pcm.channels, self.pcm.sample_width)?;
        match &self.codec {
            CodecTag::Absent => Ok(()),
            CodecTag::Vocoder(p) => write!(
                f,
                ",{},{},{},{}",
                VOCODER_TAG, p.bit_rate, p.samples_per_frame, p.bytes_per_frame
            ),
            CodecTag::Unknown(tag) => write!(f, ",{}", tag),
        }
    }
}

fn parse_field<T: std::str::FromStr>(value: &str, name: &str) -> Result<T, DecodeError> {
    value
        .parse()
        .map_err(|_| DecodeError::MalformedHeader(format!("{} is not a number: {:?}", name, value)))
}

/// Prefix `body` with the length-framed header
pub fn frame(header: &PayloadHeader, body: &[u8]) -> Result<Vec<u8>, EncodeError> {
    let text = header.to_string();
    if text.len() > MAX_HEADER_LEN {
        return Err(EncodeError::HeaderOverflow(text.len()));
    }
    let mut out = Vec::with_capacity(1 + text.len() + body.len());
    out.push(text.len() as u8);
    out.extend_from_slice(text.as_bytes());
    out.extend_from_slice(body);
    Ok(out)
}

/// Split framed bytes into header text and body
pub fn unframe(bytes: &[u8]) -> Result<(&str, &[u8]), DecodeError> {
    let (&len, rest) = bytes.split_first().ok_or(DecodeError::Empty)?;
    let len = len as usize;
    if rest.len() < len {
        return Err(DecodeError::MalformedHeader(format!(
            "header length {} exceeds {} available bytes",
            len,
            rest.len()
        )));
    }
    let (header, body) = rest.split_at(len);
    let header = std::str::from_utf8(header)
        .map_err(|_| DecodeError::MalformedHeader("header is not ASCII".to_string()))?;
    Ok((header, body))
}

/// Outer format of a payload, decided from the header alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadFormat<'a> {
    Vocoder {
        pcm: PcmFormat,
        params: VocoderParams,
        body: &'a [u8],
    },
    Legacy,
}

/// Classify a payload without attempting to decode its body.
///
/// Bytes that do not carry a readable outer header are legacy (zlib streams
/// never start with a length byte followed by ASCII digits). A readable
/// header with an unrecognised tag is an error rather than a legacy guess.
pub fn detect(bytes: &[u8]) -> Result<PayloadFormat<'_>, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let (text, body) = match unframe(bytes) {
        Ok(parts) => parts,
        Err(_) => return Ok(PayloadFormat::Legacy),
    };

    // A header whose mandatory fields do not parse is not an outer header at all
    if text.split(',').take(3).any(|f| f.trim().parse::<u32>().is_err()) {
        return Ok(PayloadFormat::Legacy);
    }

    let header = PayloadHeader::parse(text)?;
    match header.codec {
        CodecTag::Vocoder(params) => Ok(PayloadFormat::Vocoder { pcm: header.pcm, params, body }),
        CodecTag::Absent => Ok(PayloadFormat::Legacy),
        CodecTag::Unknown(tag) => Err(DecodeError::UnsupportedCodec(tag)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PCM_8K: PcmFormat = PcmFormat { sample_rate: 8000, channels: 1, sample_width: 2 };

    #[test]
    fn test_vocoder_header_text() {
        let header = PayloadHeader::vocoder(
            PCM_8K,
            VocoderParams { bit_rate: 1600, samples_per_frame: 320, bytes_per_frame: 8 },
        );
        assert_eq!(header.to_string(), "8000,1,2,C2,1600,320,8");
        assert_eq!(PayloadHeader::parse("8000,1,2,C2,1600,320,8").unwrap(), header);
    }

    #[test]
    fn test_plain_header_has_no_tag() {
        let header = PayloadHeader::parse("11025,1,2").unwrap();
        assert_eq!(header.codec, CodecTag::Absent);
        assert_eq!(header.pcm.sample_rate, 11025);
    }

    #[test]
    fn test_frame_and_unframe() {
        let framed = frame(&PayloadHeader::pcm(PCM_8K), &[1, 2, 3]).unwrap();
        assert_eq!(framed[0] as usize, "8000,1,2".len());
        let (text, body) = unframe(&framed).unwrap();
        assert_eq!(text, "8000,1,2");
        assert_eq!(body, &[1, 2, 3]);
    }

    #[test]
    fn test_header_overflow_is_rejected() {
        let header = PayloadHeader { pcm: PCM_8K, codec: CodecTag::Unknown("x".repeat(300)) };
        assert!(matches!(frame(&header, &[]), Err(EncodeError::HeaderOverflow(_))));
    }

    #[test]
    fn test_detect_dispatches_on_tag() {
        let params = VocoderParams { bit_rate: 1200, samples_per_frame: 320, bytes_per_frame: 6 };
        let framed = frame(&PayloadHeader::vocoder(PCM_8K, params), &[9; 12]).unwrap();
        match detect(&framed).unwrap() {
            PayloadFormat::Vocoder { params: p, body, .. } => {
                assert_eq!(p, params);
                assert_eq!(body.len(), 12);
            }
            other => panic!("expected vocoder, got {:?}", other),
        }

        // zlib stream header bytes
        assert_eq!(detect(&[0x78, 0xda, 0x01, 0x02]).unwrap(), PayloadFormat::Legacy);

        let unknown = frame(&PayloadHeader { pcm: PCM_8K, codec: CodecTag::Unknown("OP".into()) }, &[]).unwrap();
        assert!(matches!(detect(&unknown), Err(DecodeError::UnsupportedCodec(tag)) if tag == "OP"));

        assert!(matches!(detect(&[]), Err(DecodeError::Empty)));
    }

    #[test]
    fn test_truncated_vocoder_header_is_malformed() {
        let framed = frame(&PayloadHeader { pcm: PCM_8K, codec: CodecTag::Unknown("C2,1600".into()) }, &[]).unwrap();
        assert!(matches!(detect(&framed), Err(DecodeError::MalformedHeader(_))));
    }
}
