use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;

use crate::reassembly::ReceivedVoice;

/// Writes received clips as WAV files named by origin and capture time
#[derive(Debug, Clone)]
pub struct VoiceArchive {
    dir: PathBuf,
}

impl VoiceArchive {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `received_<origin>_<timestamp>.wav`, suffixed when the name is taken
    pub fn path_for(&self, voice: &ReceivedVoice) -> PathBuf {
        let stem = format!("received_{}_{}", sanitize(&voice.origin), sanitize(&voice.timestamp));
        let mut path = self.dir.join(format!("{}.wav", stem));
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{}_{}.wav", stem, n));
            n += 1;
        }
        path
    }

    pub fn save(&self, voice: &ReceivedVoice) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create output directory {:?}", self.dir))?;

        let path = self.path_for(voice);
        voice
            .clip
            .write_wav(&path)
            .with_context(|| format!("Failed to write {:?}", path))?;

        info!("Saved voice message from {} to {:?}", voice.origin, path);
        Ok(path)
    }
}

fn sanitize(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() { "unknown".to_string() } else { cleaned }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioClip;
    use crate::codec::EncodedPayload;

    fn voice(origin: &str) -> ReceivedVoice {
        ReceivedVoice {
            origin: origin.to_string(),
            transfer_id: None,
            timestamp: "20240501_093000".to_string(),
            payload: EncodedPayload::new(vec![]),
            clip: AudioClip::from_i16(8000, 1, &[0, 100, -100, 0]),
        }
    }

    #[test]
    fn test_file_names_are_sanitised_and_unique() {
        let dir = std::env::temp_dir().join(format!("meshvoice-archive-{}", uuid::Uuid::new_v4().simple()));
        let archive = VoiceArchive::new(&dir);

        let first = archive.save(&voice("!a1b2/c3")).unwrap();
        assert_eq!(first.file_name().unwrap(), "received__a1b2_c3_20240501_093000.wav");

        let second = archive.save(&voice("!a1b2/c3")).unwrap();
        assert_ne!(first, second);

        let restored = AudioClip::read_wav(&second).unwrap();
        assert_eq!(restored.frame_count(), 4);

        let _ = fs::remove_dir_all(&dir);
    }
}
