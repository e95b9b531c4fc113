use std::io::{Read, Seek, Write};
use std::path::Path;
use std::time::Duration;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::EncodeError;

/// Raw PCM clip as exchanged with capture and playback.
///
/// Samples are interleaved. 8-bit samples are unsigned (WAV convention),
/// 16-bit samples are signed little-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_width: u16,
    pub pcm: Vec<u8>,
}

impl AudioClip {
    pub fn new(sample_rate: u32, channels: u16, sample_width: u16, pcm: Vec<u8>) -> Self {
        Self { sample_rate, channels, sample_width, pcm }
    }

    /// Build a 16-bit clip from signed samples
    pub fn from_i16(sample_rate: u32, channels: u16, samples: &[i16]) -> Self {
        let mut pcm = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            pcm.extend_from_slice(&s.to_le_bytes());
        }
        Self::new(sample_rate, channels, 2, pcm)
    }

    /// Bytes per interleaved frame (one sample per channel)
    pub fn frame_bytes(&self) -> usize {
        self.sample_width as usize * self.channels as usize
    }

    pub fn frame_count(&self) -> usize {
        match self.frame_bytes() {
            0 => 0,
            n => self.pcm.len() / n,
        }
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frame_count() as f64 / self.sample_rate as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.frame_count() == 0
    }

    pub fn validate(&self) -> Result<(), EncodeError> {
        if self.sample_width != 1 && self.sample_width != 2 {
            return Err(EncodeError::UnsupportedSampleWidth(self.sample_width));
        }
        if self.channels == 0 {
            return Err(EncodeError::MalformedClip("zero channels".to_string()));
        }
        if self.sample_rate == 0 {
            return Err(EncodeError::MalformedClip("zero sample rate".to_string()));
        }
        Ok(())
    }

    /// All samples widened to signed 16-bit, still interleaved
    pub fn samples_i16(&self) -> Vec<i16> {
        let usable = self.frame_count() * self.frame_bytes();
        let pcm = &self.pcm[..usable];
        match self.sample_width {
            1 => pcm.iter().map(|&b| u8_to_i16(b)).collect(),
            _ => pcm
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]]))
                .collect(),
        }
    }

    /// Mix down to one channel by averaging each frame
    pub fn to_mono_i16(&self) -> Vec<i16> {
        let samples = self.samples_i16();
        let channels = self.channels.max(1) as usize;
        if channels == 1 {
            return samples;
        }
        samples
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            })
            .collect()
    }

    pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<Self, hound::Error> {
        Self::from_wav_reader(WavReader::open(path)?)
    }

    pub fn from_wav_reader<R: Read>(mut reader: WavReader<R>) -> Result<Self, hound::Error> {
        let spec = reader.spec();
        if spec.sample_format != SampleFormat::Int {
            return Err(hound::Error::Unsupported);
        }

        let pcm = match spec.bits_per_sample {
            8 => reader
                .samples::<i8>()
                .map(|s| s.map(i8_to_u8))
                .collect::<Result<Vec<u8>, _>>()?,
            16 => {
                let mut pcm = Vec::with_capacity(reader.len() as usize * 2);
                for sample in reader.samples::<i16>() {
                    pcm.extend_from_slice(&sample?.to_le_bytes());
                }
                pcm
            }
            _ => return Err(hound::Error::Unsupported),
        };

        Ok(Self::new(spec.sample_rate, spec.channels, spec.bits_per_sample / 8, pcm))
    }

    pub fn write_wav<P: AsRef<Path>>(&self, path: P) -> Result<(), hound::Error> {
        let writer = WavWriter::create(path, self.wav_spec())?;
        self.write_samples(writer)
    }

    pub fn write_wav_to<W: Write + Seek>(&self, out: W) -> Result<(), hound::Error> {
        let writer = WavWriter::new(out, self.wav_spec())?;
        self.write_samples(writer)
    }

    fn wav_spec(&self) -> WavSpec {
        WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.sample_width * 8,
            sample_format: SampleFormat::Int,
        }
    }

    fn write_samples<W: Write + Seek>(&self, mut writer: WavWriter<W>) -> Result<(), hound::Error> {
        let usable = self.frame_count() * self.frame_bytes();
        match self.sample_width {
            1 => {
                for &b in &self.pcm[..usable] {
                    writer.write_sample(u8_to_i8(b))?;
                }
            }
            2 => {
                for b in self.pcm[..usable].chunks_exact(2) {
                    writer.write_sample(i16::from_le_bytes([b[0], b[1]]))?;
                }
            }
            _ => return Err(hound::Error::Unsupported),
        }
        writer.finalize()
    }
}

/// Unsigned 8-bit sample to signed 16-bit
pub fn u8_to_i16(b: u8) -> i16 {
    ((b as i16) - 128) << 8
}

/// Signed 16-bit sample to unsigned 8-bit, keeping the high byte
pub fn i16_to_u8(s: i16) -> u8 {
    ((s >> 8) + 128) as u8
}

fn i8_to_u8(s: i8) -> u8 {
    (s as i16 + 128) as u8
}

fn u8_to_i8(b: u8) -> i8 {
    (b as i16 - 128) as i8
}
