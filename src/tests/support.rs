//! Shared fixtures: synthetic clips, hand-built payloads, a scripted transport

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::audio::AudioClip;
use crate::cancel::CancellationToken;
use crate::codec::{self, EncodedPayload, PayloadHeader, PcmFormat};
use crate::error::SendError;
use crate::transmitter::TransmitterConfig;
use crate::transport::{Destination, MeshTransport, PacketHandler, PortNum};
use crate::wire::WireMessage;

/// Mono 16-bit white noise; barely compressible
pub fn noise_clip(sample_rate: u32, frames: usize, seed: u64) -> AudioClip {
    let mut rng = StdRng::seed_from_u64(seed);
    let samples: Vec<i16> = (0..frames).map(|_| rng.gen_range(-12000..12000)).collect();
    AudioClip::from_i16(sample_rate, 1, &samples)
}

/// A few harmonics of a voice-range fundamental
pub fn voiced_clip(sample_rate: u32, channels: u16, frames: usize) -> AudioClip {
    let mut samples = Vec::with_capacity(frames * channels as usize);
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let v = (0.5 * (2.0 * std::f32::consts::PI * 180.0 * t).sin()
            + 0.25 * (2.0 * std::f32::consts::PI * 360.0 * t).sin()
            + 0.1 * (2.0 * std::f32::consts::PI * 720.0 * t).sin())
            * 20000.0;
        for _ in 0..channels {
            samples.push(v as i16);
        }
    }
    AudioClip::from_i16(sample_rate, channels, &samples)
}

/// Legacy payload around an exact PCM body, bypassing the encoder
pub fn legacy_payload(pcm: PcmFormat, body: &[u8]) -> EncodedPayload {
    let framed = codec::frame(&PayloadHeader::pcm(pcm), body).unwrap();
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(&framed).unwrap();
    EncodedPayload::new(encoder.finish().unwrap())
}

/// Transmitter timings small enough for tests
pub fn fast_config() -> TransmitterConfig {
    TransmitterConfig {
        retry_delay: Duration::from_millis(1),
        chunk_interval: Duration::ZERO,
        cancel_poll: Duration::from_millis(1),
        ..TransmitterConfig::default()
    }
}

/// Packet key used by [`ScriptedTransport`]: chunk number, or 0 for unfragmented messages
pub fn packet_key(message: &WireMessage) -> u32 {
    match message {
        WireMessage::Chunk { chunk_num, .. } => *chunk_num,
        _ => 0,
    }
}

#[derive(Default)]
struct Script {
    attempts: Vec<WireMessage>,
    accepted: Vec<WireMessage>,
    failures: HashMap<u32, u32>,
    fail_everything: bool,
    cancel_after: Option<(u32, CancellationToken)>,
}

/// Transport that records every attempt and fails on demand
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next `times` attempts of the packet with this key
    pub fn fail_times(&self, key: u32, times: u32) {
        self.script.lock().unwrap().failures.insert(key, times);
    }

    pub fn fail_everything(&self) {
        self.script.lock().unwrap().fail_everything = true;
    }

    /// Trip `token` once the packet with this key is accepted
    pub fn cancel_after(&self, key: u32, token: CancellationToken) {
        self.script.lock().unwrap().cancel_after = Some((key, token));
    }

    pub fn attempts(&self) -> Vec<WireMessage> {
        self.script.lock().unwrap().attempts.clone()
    }

    pub fn accepted(&self) -> Vec<WireMessage> {
        self.script.lock().unwrap().accepted.clone()
    }

    pub fn attempts_for(&self, key: u32) -> usize {
        self.attempts().iter().filter(|m| packet_key(m) == key).count()
    }

    pub fn as_transport(&self) -> Arc<dyn MeshTransport> {
        Arc::new(self.clone())
    }
}

impl MeshTransport for ScriptedTransport {
    fn node_id(&self) -> String {
        "!scripted".to_string()
    }

    fn send(&self, payload: &[u8], _destination: &Destination, _port: PortNum, _want_ack: bool) -> Result<(), SendError> {
        let message = WireMessage::from_bytes(payload).map_err(|e| SendError::Refused(e.to_string()))?;
        let key = packet_key(&message);

        let mut script = self.script.lock().unwrap();
        script.attempts.push(message.clone());

        if script.fail_everything {
            return Err(SendError::Refused("link down".to_string()));
        }
        if let Some(remaining) = script.failures.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SendError::Refused(format!("simulated loss of packet {}", key)));
            }
        }

        script.accepted.push(message);
        if let Some((at, token)) = &script.cancel_after {
            if *at == key {
                token.cancel();
            }
        }
        Ok(())
    }

    fn subscribe(&self, _handler: PacketHandler) {}

    fn disconnect(&self) {}

    fn is_connected(&self) -> bool {
        true
    }
}
