//! Sample rate conversion for both encoder strategies.
//!
//! The FFT resampler from `rubato` is used whenever it can be built for the
//! requested ratio. It band-limits the signal, so downsampling needs no
//! separate anti-aliasing stage. Linear interpolation is the fallback.
//! Either way the output holds `round(n_in * rate_out / rate_in)` frames.

use log::{debug, warn};
use rubato::{FftFixedIn, Resampler};

/// Input frames handed to the FFT resampler per block
const CHUNK_FRAMES: usize = 1024;
/// Upper bound on zero-input flushes used to drain the resampler delay line
const MAX_FLUSHES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleMethod {
    Polyphase,
    Linear,
}

/// Number of output frames that preserves the clip duration
pub fn expected_len(frames_in: usize, rate_in: u32, rate_out: u32) -> usize {
    if rate_in == 0 {
        return 0;
    }
    let num = frames_in as u64 * rate_out as u64 + rate_in as u64 / 2;
    (num / rate_in as u64) as usize
}

/// Resample interleaved 16-bit audio, preferring the FFT resampler
pub fn resample(samples: &[i16], channels: u16, rate_in: u32, rate_out: u32) -> Vec<i16> {
    resample_with(samples, channels, rate_in, rate_out, ResampleMethod::Polyphase).0
}

/// Resample with an explicit method; reports the method actually used
pub fn resample_with(
    samples: &[i16],
    channels: u16,
    rate_in: u32,
    rate_out: u32,
    method: ResampleMethod,
) -> (Vec<i16>, ResampleMethod) {
    if rate_in == rate_out || samples.is_empty() || rate_in == 0 || rate_out == 0 {
        return (samples.to_vec(), method);
    }

    let planar = deinterleave(samples, channels.max(1) as usize);

    let (out, used) = match method {
        ResampleMethod::Polyphase => match polyphase(&planar, rate_in, rate_out) {
            Ok(out) => (out, ResampleMethod::Polyphase),
            Err(e) => {
                warn!("Polyphase resampler unavailable ({}), using linear interpolation", e);
                (linear_planar(&planar, rate_in, rate_out), ResampleMethod::Linear)
            }
        },
        ResampleMethod::Linear => (linear_planar(&planar, rate_in, rate_out), ResampleMethod::Linear),
    };

    debug!(
        "Resampled {} -> {} Hz ({:?}): {} -> {} frames",
        rate_in,
        rate_out,
        used,
        planar[0].len(),
        out.first().map(|c| c.len()).unwrap_or(0)
    );

    (interleave(&out), used)
}

fn polyphase(planar: &[Vec<f64>], rate_in: u32, rate_out: u32) -> Result<Vec<Vec<f64>>, String> {
    let channels = planar.len();
    let frames_in = planar[0].len();
    let target = expected_len(frames_in, rate_in, rate_out);

    let mut resampler = FftFixedIn::<f64>::new(rate_in as usize, rate_out as usize, CHUNK_FRAMES, 2, channels)
        .map_err(|e| e.to_string())?;
    let delay = resampler.output_delay();

    let mut out: Vec<Vec<f64>> = vec![Vec::with_capacity(target + delay); channels];
    let mut pos = 0;

    while frames_in - pos >= resampler.input_frames_next() {
        let n = resampler.input_frames_next();
        let block: Vec<&[f64]> = planar.iter().map(|c| &c[pos..pos + n]).collect();
        let frames = resampler.process(&block, None).map_err(|e| e.to_string())?;
        append(&mut out, frames);
        pos += n;
    }

    if pos < frames_in {
        let block: Vec<&[f64]> = planar.iter().map(|c| &c[pos..]).collect();
        let frames = resampler
            .process_partial(Some(block.as_slice()), None)
            .map_err(|e| e.to_string())?;
        append(&mut out, frames);
    }

    let mut flushes = 0;
    while out[0].len() < target + delay && flushes < MAX_FLUSHES {
        let frames = resampler
            .process_partial(None::<&[&[f64]]>, None)
            .map_err(|e| e.to_string())?;
        append(&mut out, frames);
        flushes += 1;
    }

    for ch in out.iter_mut() {
        let skip = delay.min(ch.len());
        ch.drain(..skip);
        ch.resize(target, 0.0);
    }
    Ok(out)
}

fn append(out: &mut [Vec<f64>], frames: Vec<Vec<f64>>) {
    for (dst, src) in out.iter_mut().zip(frames) {
        dst.extend_from_slice(&src);
    }
}

fn linear_planar(planar: &[Vec<f64>], rate_in: u32, rate_out: u32) -> Vec<Vec<f64>> {
    planar.iter().map(|c| linear(c, rate_in, rate_out)).collect()
}

/// Endpoint-aligned linear interpolation onto the duration-preserving grid
pub fn linear(input: &[f64], rate_in: u32, rate_out: u32) -> Vec<f64> {
    let n_in = input.len();
    let n_out = expected_len(n_in, rate_in, rate_out);
    match (n_in, n_out) {
        (0, _) | (_, 0) => return Vec::new(),
        (1, n) => return vec![input[0]; n],
        (_, 1) => return vec![input[0]],
        _ => {}
    }

    let step = (n_in - 1) as f64 / (n_out - 1) as f64;
    (0..n_out)
        .map(|i| {
            let pos = i as f64 * step;
            let lo = (pos.floor() as usize).min(n_in - 1);
            let hi = (lo + 1).min(n_in - 1);
            let frac = pos - lo as f64;
            input[lo] * (1.0 - frac) + input[hi] * frac
        })
        .collect()
}

fn deinterleave(samples: &[i16], channels: usize) -> Vec<Vec<f64>> {
    let frames = samples.len() / channels;
    let mut planar = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (ch, &s) in planar.iter_mut().zip(frame) {
            ch.push(s as f64);
        }
    }
    planar
}

fn interleave(planar: &[Vec<f64>]) -> Vec<i16> {
    let frames = planar.first().map(|c| c.len()).unwrap_or(0);
    let mut out = Vec::with_capacity(frames * planar.len());
    for i in 0..frames {
        for ch in planar {
            out.push(ch[i].round().clamp(i16::MIN as f64, i16::MAX as f64) as i16);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(rate: u32, frames: usize) -> Vec<i16> {
        (0..frames)
            .map(|i| {
                let t = i as f64 / rate as f64;
                (8000.0 * (2.0 * std::f64::consts::PI * 440.0 * t).sin()) as i16
            })
            .collect()
    }

    #[test]
    fn test_expected_len_rounds() {
        assert_eq!(expected_len(16000, 16000, 8000), 8000);
        assert_eq!(expected_len(44100, 44100, 8000), 8000);
        assert_eq!(expected_len(3, 16000, 8000), 2);
        assert_eq!(expected_len(0, 16000, 8000), 0);
    }

    #[test]
    fn test_polyphase_preserves_duration() {
        for &(rate_in, frames) in &[(16000u32, 16000usize), (44100, 22050), (11025, 5000), (48000, 1000)] {
            let input = tone(rate_in, frames);
            let (out, used) = resample_with(&input, 1, rate_in, 8000, ResampleMethod::Polyphase);
            assert_eq!(used, ResampleMethod::Polyphase);
            assert_eq!(out.len(), expected_len(frames, rate_in, 8000), "rate {}", rate_in);
        }
    }

    #[test]
    fn test_linear_preserves_duration_and_endpoints() {
        let input: Vec<f64> = (0..101).map(|i| i as f64).collect();
        let out = linear(&input, 100, 50);
        assert_eq!(out.len(), 51);
        assert_eq!(out[0], 0.0);
        assert_eq!(*out.last().unwrap(), 100.0);
    }

    #[test]
    fn test_stereo_stays_interleaved() {
        let left = tone(16000, 4000);
        let mut stereo = Vec::with_capacity(8000);
        for &s in &left {
            stereo.push(s);
            stereo.push(0);
        }
        let out = resample(&stereo, 2, 16000, 8000);
        assert_eq!(out.len(), 2 * 2000);
        let right_peak = out.iter().skip(1).step_by(2).map(|s| s.unsigned_abs()).max().unwrap();
        assert!(right_peak < 50, "silent channel leaked: {}", right_peak);
    }

    #[test]
    fn test_identity_when_rates_match() {
        let input = tone(8000, 100);
        assert_eq!(resample(&input, 1, 8000, 8000), input);
    }
}
