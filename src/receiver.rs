//! Inbound packet handling: wire parsing, reassembly, and stale-session reaping

use std::sync::Arc;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::decoder::PayloadDecoder;
use crate::error::DecodeError;
use crate::fragment::Chunk;
use crate::reassembly::{IngestOutcome, ReassemblyStore, ReceivedVoice};
use crate::transport::{InboundPacket, PacketHandler, PortNum};
use crate::wire::WireMessage;

#[derive(Debug)]
pub enum ReceiverEvent {
    Voice(ReceivedVoice),
    Text { from: String, text: String },
    TestProbe { from: String, text: String },
    Progress { transfer_id: String, from: String, have: u32, total: u32 },
    Dropped { from: String, reason: String },
    Reaped(String),
}

/// Packet callback for a mesh transport; emits [`ReceiverEvent`]s
#[derive(Clone)]
pub struct VoiceReceiver {
    store: Arc<ReassemblyStore>,
    decoder: PayloadDecoder,
    events: mpsc::Sender<ReceiverEvent>,
}

impl VoiceReceiver {
    pub fn new(store: Arc<ReassemblyStore>) -> (Self, mpsc::Receiver<ReceiverEvent>) {
        let (events, rx) = mpsc::channel();
        let receiver = Self {
            store,
            decoder: PayloadDecoder::new(),
            events,
        };
        (receiver, rx)
    }

    pub fn store(&self) -> &Arc<ReassemblyStore> {
        &self.store
    }

    pub fn into_handler(self) -> PacketHandler {
        Arc::new(move |packet: &InboundPacket| self.handle_packet(packet))
    }

    pub fn handle_packet(&self, packet: &InboundPacket) {
        match packet.port {
            PortNum::TextMessage => {
                let text = String::from_utf8_lossy(&packet.payload).into_owned();
                info!("Text from {}: {}", packet.from, text);
                self.emit(ReceiverEvent::Text { from: packet.from.clone(), text });
            }
            PortNum::PrivateApp => self.handle_private(packet),
            PortNum::Other(n) => debug!("Ignoring packet from {} on port {}", packet.from, n),
        }
    }

    fn handle_private(&self, packet: &InboundPacket) {
        let message = match WireMessage::from_bytes(&packet.payload) {
            Ok(message) => message,
            Err(e) => {
                self.drop_packet(&packet.from, format!("unparseable message: {}", e));
                return;
            }
        };

        match message {
            WireMessage::Chunk { chunk_id, chunk_num, total_chunks, data } => {
                let chunk = Chunk {
                    transfer_id: chunk_id,
                    sequence_number: chunk_num,
                    total_count: total_chunks,
                    text_data: data,
                };
                self.handle_chunk(&chunk, &packet.from);
            }
            WireMessage::Voice { voice_data, timestamp } => {
                match self.decode_single(&voice_data, &timestamp, &packet.from) {
                    Ok(voice) => {
                        info!("Voice message from {} ({:.2}s)", voice.origin, voice.clip.duration().as_secs_f32());
                        self.emit(ReceiverEvent::Voice(voice));
                    }
                    Err(e) => self.drop_packet(&packet.from, format!("voice packet did not decode: {}", e)),
                }
            }
            WireMessage::Test { test } => {
                info!("Test probe from {}: {}", packet.from, test);
                self.emit(ReceiverEvent::TestProbe { from: packet.from.clone(), text: test });
            }
        }
    }

    fn handle_chunk(&self, chunk: &Chunk, from: &str) {
        match self.store.ingest_chunk(chunk, from, Instant::now()) {
            IngestOutcome::Pending { transfer_id, have, total } => self.emit(ReceiverEvent::Progress {
                transfer_id,
                from: from.to_string(),
                have,
                total,
            }),
            IngestOutcome::Complete(voice) => self.emit(ReceiverEvent::Voice(voice)),
            IngestOutcome::Rejected(reason) => self.drop_packet(from, reason),
            IngestOutcome::Failed { transfer_id, error } => {
                self.drop_packet(from, format!("transfer {} did not decode: {}", transfer_id, error))
            }
        }
    }

    /// Single-packet messages skip the reassembly store
    fn decode_single(&self, voice_data: &str, timestamp: &str, from: &str) -> Result<ReceivedVoice, DecodeError> {
        let (payload, clip) = self.decoder.decode_base64(voice_data)?;
        Ok(ReceivedVoice {
            origin: from.to_string(),
            transfer_id: None,
            timestamp: timestamp.to_string(),
            payload,
            clip,
        })
    }

    fn drop_packet(&self, from: &str, reason: String) {
        warn!("Dropped message from {}: {}", from, reason);
        self.emit(ReceiverEvent::Dropped { from: from.to_string(), reason });
    }

    fn emit(&self, event: ReceiverEvent) {
        if self.events.send(event).is_err() {
            debug!("Receiver event channel closed");
        }
    }
}

/// Background thread that periodically reaps idle transfers.
///
/// Stops and joins when dropped.
pub struct Reaper {
    stop: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl Reaper {
    pub fn start(
        store: Arc<ReassemblyStore>,
        timeout: Duration,
        interval: Duration,
        events: Option<mpsc::Sender<ReceiverEvent>>,
    ) -> std::io::Result<Self> {
        let stop = CancellationToken::new();
        let token = stop.clone();
        let poll = interval.min(Duration::from_millis(100));

        let worker = thread::Builder::new().name("meshvoice-reaper".to_string()).spawn(move || {
            debug!("Reaper started: timeout {:?}, interval {:?}", timeout, interval);
            while token.sleep(interval, poll) {
                for id in store.reap(Instant::now(), timeout) {
                    if let Some(events) = &events {
                        let _ = events.send(ReceiverEvent::Reaped(id));
                    }
                }
            }
            debug!("Reaper stopped");
        })?;

        Ok(Self { stop, worker: Some(worker) })
    }

    pub fn stop(&mut self) {
        self.stop.cancel();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Reaper thread panicked");
            }
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.stop();
    }
}
