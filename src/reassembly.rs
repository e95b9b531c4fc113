//! Receive-side session table for fragmented transfers.
//!
//! Sessions are keyed only by transfer id; arrival order does not matter and
//! fragments from different transfers may interleave freely. All access to
//! the table goes through one mutex, so the packet callback and the reaper
//! can run on different threads.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::audio::AudioClip;
use crate::codec::EncodedPayload;
use crate::decoder::PayloadDecoder;
use crate::error::DecodeError;
use crate::fragment::{Chunk, MAX_TRANSFER_CHUNKS};
use crate::wire;

/// Idle time after which an incomplete transfer is discarded
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(180);

/// Missing sequence numbers listed when a transfer is reaped
const REAP_LOG_MISSING: usize = 8;

/// Fragments collected so far for one transfer
#[derive(Debug, Clone)]
pub struct TransferSession {
    pub transfer_id: String,
    pub origin: String,
    pub total: u32,
    /// Capture time label used when the clip is archived
    pub timestamp: String,
    pub last_activity: Instant,
    chunks: BTreeMap<u32, String>,
}

impl TransferSession {
    fn new(transfer_id: &str, origin: &str, total: u32, now: Instant) -> Self {
        Self {
            transfer_id: transfer_id.to_string(),
            origin: origin.to_string(),
            total,
            timestamp: wire::timestamp_now(),
            last_activity: now,
            chunks: BTreeMap::new(),
        }
    }

    pub fn have(&self) -> u32 {
        self.chunks.len() as u32
    }

    pub fn is_complete(&self) -> bool {
        self.have() == self.total && (1..=self.total).all(|seq| self.chunks.contains_key(&seq))
    }

    pub fn missing(&self) -> Vec<u32> {
        self.missing_iter().collect()
    }

    fn missing_iter(&self) -> impl Iterator<Item = u32> + '_ {
        (1..=self.total).filter(|seq| !self.chunks.contains_key(seq))
    }

    /// Concatenated text in sequence order, if every fragment is present
    pub fn assemble(&self) -> Option<String> {
        if !self.is_complete() {
            return None;
        }
        Some(self.chunks.values().map(String::as_str).collect())
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }
}

/// A decoded voice message ready for playback or archiving
#[derive(Debug, Clone)]
pub struct ReceivedVoice {
    pub origin: String,
    /// `None` for single-packet messages
    pub transfer_id: Option<String>,
    pub timestamp: String,
    pub payload: EncodedPayload,
    pub clip: AudioClip,
}

#[derive(Debug)]
pub enum IngestOutcome {
    /// Stored; still waiting for more fragments
    Pending { transfer_id: String, have: u32, total: u32 },
    Complete(ReceivedVoice),
    /// Fragment not accepted; open sessions are untouched
    Rejected(String),
    /// All fragments arrived but the payload did not decode; session dropped
    Failed { transfer_id: String, error: DecodeError },
}

pub struct ReassemblyStore {
    sessions: Mutex<HashMap<String, TransferSession>>,
    decoder: PayloadDecoder,
}

impl Default for ReassemblyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReassemblyStore {
    pub fn new() -> Self {
        Self::with_decoder(PayloadDecoder::new())
    }

    pub fn with_decoder(decoder: PayloadDecoder) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            decoder,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TransferSession>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the reconstructed message once the last missing fragment lands
    pub fn ingest(
        &self,
        transfer_id: &str,
        sequence_number: u32,
        total_count: u32,
        text_data: &str,
        origin: &str,
    ) -> Option<ReceivedVoice> {
        let chunk = Chunk {
            transfer_id: transfer_id.to_string(),
            sequence_number,
            total_count,
            text_data: text_data.to_string(),
        };
        match self.ingest_chunk(&chunk, origin, Instant::now()) {
            IngestOutcome::Complete(voice) => Some(voice),
            _ => None,
        }
    }

    pub fn ingest_chunk(&self, chunk: &Chunk, origin: &str, now: Instant) -> IngestOutcome {
        if let Some(reason) = check_chunk(chunk) {
            warn!("Rejected chunk from {}: {}", origin, reason);
            return IngestOutcome::Rejected(reason);
        }

        let completed = {
            let mut sessions = self.lock();
            let session = sessions
                .entry(chunk.transfer_id.clone())
                .or_insert_with(|| {
                    info!(
                        "New transfer {} from {} ({} chunks)",
                        chunk.transfer_id, origin, chunk.total_count
                    );
                    TransferSession::new(&chunk.transfer_id, origin, chunk.total_count, now)
                });

            if session.total != chunk.total_count || session.origin != origin {
                let reason = format!(
                    "transfer id {} collides with open session ({} chunks from {})",
                    chunk.transfer_id, session.total, session.origin
                );
                warn!("Rejected chunk from {}: {}", origin, reason);
                return IngestOutcome::Rejected(reason);
            }

            if session
                .chunks
                .insert(chunk.sequence_number, chunk.text_data.clone())
                .is_some()
            {
                debug!("Duplicate chunk {} for {}", chunk.sequence_number, chunk.transfer_id);
            }
            session.last_activity = now;

            let have = session.have();
            info!("Have {}/{} chunks for {}", have, session.total, chunk.transfer_id);

            if !session.is_complete() {
                return IngestOutcome::Pending {
                    transfer_id: chunk.transfer_id.clone(),
                    have,
                    total: session.total,
                };
            }
            sessions.remove(&chunk.transfer_id)
        };

        match completed {
            Some(session) => self.finish(session),
            None => IngestOutcome::Rejected(format!("session {} vanished", chunk.transfer_id)),
        }
    }

    fn finish(&self, session: TransferSession) -> IngestOutcome {
        let transfer_id = session.transfer_id.clone();
        let decoded = session
            .assemble()
            .ok_or_else(|| DecodeError::MalformedHeader("incomplete transfer".to_string()))
            .and_then(|text| self.decoder.decode_base64(&text));

        match decoded {
            Ok((payload, clip)) => {
                info!(
                    "Reassembled transfer {} from {}: {} bytes, {:.2}s",
                    transfer_id,
                    session.origin,
                    payload.len(),
                    clip.duration().as_secs_f32()
                );
                IngestOutcome::Complete(ReceivedVoice {
                    origin: session.origin,
                    transfer_id: Some(transfer_id),
                    timestamp: session.timestamp,
                    payload,
                    clip,
                })
            }
            Err(e) => {
                error!("Dropping transfer {} from {}: {}", transfer_id, session.origin, e);
                IngestOutcome::Failed { transfer_id, error: e }
            }
        }
    }

    /// Remove sessions idle for longer than `timeout`
    pub fn reap(&self, now: Instant, timeout: Duration) -> Vec<String> {
        let mut sessions = self.lock();
        let expired: Vec<String> = sessions
            .values()
            .filter(|s| s.idle_for(now) > timeout)
            .map(|s| s.transfer_id.clone())
            .collect();

        for id in &expired {
            if let Some(session) = sessions.remove(id) {
                let first_missing: Vec<u32> =
                    session.missing_iter().take(REAP_LOG_MISSING).collect();
                warn!(
                    "Reaped transfer {} from {}: {}/{} chunks, first missing {:?}",
                    id,
                    session.origin,
                    session.have(),
                    session.total,
                    first_missing
                );
            }
        }
        expired
    }

    /// `(have, total)` for an open transfer
    pub fn progress(&self, transfer_id: &str) -> Option<(u32, u32)> {
        self.lock().get(transfer_id).map(|s| (s.have(), s.total))
    }

    pub fn pending_transfers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn session(&self, transfer_id: &str) -> Option<TransferSession> {
        self.lock().get(transfer_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn check_chunk(chunk: &Chunk) -> Option<String> {
    if chunk.transfer_id.is_empty() {
        Some("empty transfer id".to_string())
    } else if chunk.total_count == 0 {
        Some(format!("transfer {} declares zero chunks", chunk.transfer_id))
    } else if chunk.total_count > MAX_TRANSFER_CHUNKS {
        Some(format!(
            "transfer {} declares {} chunks, limit is {}",
            chunk.transfer_id, chunk.total_count, MAX_TRANSFER_CHUNKS
        ))
    } else if chunk.sequence_number == 0 || chunk.sequence_number > chunk.total_count {
        Some(format!(
            "chunk {} outside 1..={} for {}",
            chunk.sequence_number, chunk.total_count, chunk.transfer_id
        ))
    } else {
        None
    }
}
