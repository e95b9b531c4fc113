//! Soft-knee amplitude compression used by the legacy encoder to flatten
//! peaks before the zlib stage.

use crate::quality::DynamicsCurve;

impl DynamicsCurve {
    /// Apply the curve to one normalised sample in [-1.0, 1.0]
    pub fn apply(&self, x: f32) -> f32 {
        let magnitude = x.abs();
        if magnitude <= self.threshold {
            return x;
        }
        x.signum() * (self.threshold + (magnitude - self.threshold) * self.ratio)
    }
}

/// Compress signed 16-bit samples in place
pub fn compress_i16(samples: &mut [i16], curve: DynamicsCurve) {
    for s in samples.iter_mut() {
        let y = curve.apply(*s as f32 / 32768.0) * 32768.0;
        *s = y.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
    }
}

/// Compress unsigned 8-bit samples (128 = silence) in place
pub fn compress_u8(samples: &mut [u8], curve: DynamicsCurve) {
    for s in samples.iter_mut() {
        let x = (*s as f32 - 128.0) / 128.0;
        let y = curve.apply(x) * 128.0 + 128.0;
        *s = y.clamp(0.0, 255.0) as u8;
    }
}
