use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User-facing quality tier, ascending in fidelity and payload size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityTier {
    #[serde(rename = "Ultra Low")]
    UltraLow,
    #[serde(rename = "Very Low")]
    VeryLow,
    #[serde(rename = "Low")]
    Low,
}

impl QualityTier {
    pub const ALL: [QualityTier; 3] = [QualityTier::UltraLow, QualityTier::VeryLow, QualityTier::Low];

    pub fn name(&self) -> &'static str {
        match self {
            QualityTier::UltraLow => "Ultra Low",
            QualityTier::VeryLow => "Very Low",
            QualityTier::Low => "Low",
        }
    }

    pub fn profile(&self) -> QualityProfile {
        QualityProfile::for_tier(*self)
    }
}

impl Default for QualityTier {
    fn default() -> Self {
        QualityTier::Low
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for QualityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "ultralow" => Ok(QualityTier::UltraLow),
            "verylow" => Ok(QualityTier::VeryLow),
            "low" => Ok(QualityTier::Low),
            _ => Err(format!("unknown quality tier: {}", s)),
        }
    }
}

/// Soft-knee amplitude curve applied by the legacy encoder
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicsCurve {
    /// Normalised magnitude above which samples are compressed
    pub threshold: f32,
    /// Slope applied above the threshold (< 1.0)
    pub ratio: f32,
}

/// Concrete encoding parameters for one tier.
///
/// Vocoder rates are 1200 / 1400 / 1600 bps. Older nodes label Ultra Low as
/// 700 bps and Very Low as 1200 bps, but the `codec2` crate has no 700C mode,
/// so every tier moves up one supported rate. Payload headers carry the
/// actual bit rate, so receivers are unaffected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityProfile {
    pub tier: QualityTier,
    /// Legacy path: clips above this rate are downsampled to it
    pub legacy_sample_rate: u32,
    /// Legacy path: 16-bit input is reduced to this width
    pub legacy_sample_width: u16,
    /// Legacy path: amplitude compression, if any
    pub dynamics: Option<DynamicsCurve>,
    /// Vocoder path: target bit rate
    pub vocoder_bit_rate: u32,
}

impl QualityProfile {
    pub fn for_tier(tier: QualityTier) -> Self {
        match tier {
            QualityTier::UltraLow => Self {
                tier,
                legacy_sample_rate: 4000,
                legacy_sample_width: 1,
                dynamics: Some(DynamicsCurve { threshold: 0.6, ratio: 0.7 }),
                vocoder_bit_rate: 1200,
            },
            QualityTier::VeryLow => Self {
                tier,
                legacy_sample_rate: 8000,
                legacy_sample_width: 2,
                dynamics: Some(DynamicsCurve { threshold: 0.7, ratio: 0.8 }),
                vocoder_bit_rate: 1400,
            },
            QualityTier::Low => Self {
                tier,
                legacy_sample_rate: 11025,
                legacy_sample_width: 2,
                dynamics: None,
                vocoder_bit_rate: 1600,
            },
        }
    }
}
