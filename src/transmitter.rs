//! Fragmenting sender.
//!
//! A payload is base64-armoured; if the text fits one chunk budget it goes
//! out as a single voice message, otherwise it is split into sequence
//! numbered fragments under a fresh transfer id. Each packet gets a bounded
//! number of attempts, fragments are paced, and every wait is cancellable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::cancel::CancellationToken;
use crate::codec::EncodedPayload;
use crate::error::{SendError, TransmitError};
use crate::fragment::{self, Chunk, MAX_TRANSFER_CHUNKS};
use crate::transport::{Destination, MeshTransport, PortNum};
use crate::wire::WireMessage;

#[derive(Debug, Clone)]
pub struct TransmitterConfig {
    /// Total attempts per packet, first try included
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// Pause between consecutive fragments
    pub chunk_interval: Duration,
    /// Granularity at which waits observe cancellation
    pub cancel_poll: Duration,
    pub destination: Destination,
    pub port: PortNum,
    pub want_ack: bool,
}

impl Default for TransmitterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
            chunk_interval: Duration::from_secs(1),
            cancel_poll: Duration::from_millis(50),
            destination: Destination::Broadcast,
            port: PortNum::PrivateApp,
            want_ack: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransmitStats {
    pub single_packets: u64,
    pub transfers: u64,
    pub chunks_sent: u64,
    pub chunks_failed: u64,
    pub retries: u64,
    pub cancelled: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Every packet was accepted by the transport
    Completed,
    /// Some chunks exhausted their attempts
    Partial,
    /// Nothing was accepted
    Failed,
    Cancelled,
}

/// What happened to each packet of one send request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    /// Set only for fragmented transfers
    pub transfer_id: Option<String>,
    pub total_chunks: u32,
    pub sent: Vec<u32>,
    pub failed: Vec<u32>,
    pub retries: u32,
    pub cancelled: bool,
}

impl SendReport {
    fn new(transfer_id: Option<String>, total_chunks: u32) -> Self {
        Self {
            transfer_id,
            total_chunks,
            sent: Vec::new(),
            failed: Vec::new(),
            retries: 0,
            cancelled: false,
        }
    }

    pub fn is_fragmented(&self) -> bool {
        self.transfer_id.is_some()
    }

    pub fn outcome(&self) -> SendOutcome {
        if self.cancelled {
            SendOutcome::Cancelled
        } else if self.failed.is_empty() && self.sent.len() as u32 == self.total_chunks {
            SendOutcome::Completed
        } else if self.sent.is_empty() {
            SendOutcome::Failed
        } else {
            SendOutcome::Partial
        }
    }
}

enum Delivery {
    Delivered,
    Exhausted(SendError),
    Cancelled,
}

/// Holds the transmitter's in-flight flag; clears it on drop
struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self, TransmitError> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| TransmitError::Busy)?;
        Ok(Self(flag.clone()))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Handle to a send running on its own worker thread
pub struct SendHandle {
    cancel: CancellationToken,
    worker: JoinHandle<Result<SendReport, TransmitError>>,
}

impl SendHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Block until the worker returns its report
    pub fn join(self) -> Result<SendReport, TransmitError> {
        self.worker.join().map_err(|_| TransmitError::WorkerPanicked)?
    }
}

#[derive(Clone)]
pub struct FragmentationTransmitter {
    transport: Arc<dyn MeshTransport>,
    config: TransmitterConfig,
    busy: Arc<AtomicBool>,
    stats: Arc<Mutex<TransmitStats>>,
}

impl FragmentationTransmitter {
    pub fn new(transport: Arc<dyn MeshTransport>, config: TransmitterConfig) -> Self {
        Self {
            transport,
            config,
            busy: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(Mutex::new(TransmitStats::default())),
        }
    }

    pub fn config(&self) -> &TransmitterConfig {
        &self.config
    }

    /// True while a send request is in flight
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> TransmitStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Send on the calling thread; blocks for the whole transfer
    pub fn send(
        &self,
        payload: &EncodedPayload,
        chunk_budget: usize,
        cancel: &CancellationToken,
    ) -> Result<SendReport, TransmitError> {
        check_request(payload, chunk_budget)?;
        let _guard = BusyGuard::acquire(&self.busy)?;
        self.run(payload, chunk_budget, cancel)
    }

    /// Send on a dedicated worker thread.
    ///
    /// The busy flag is taken before the worker starts, so a second call
    /// fails with [`TransmitError::Busy`] immediately.
    pub fn spawn(
        &self,
        payload: EncodedPayload,
        chunk_budget: usize,
    ) -> Result<SendHandle, TransmitError> {
        check_request(&payload, chunk_budget)?;
        let guard = BusyGuard::acquire(&self.busy)?;
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let this = self.clone();

        let worker = thread::Builder::new()
            .name("meshvoice-send".to_string())
            .spawn(move || {
                let _guard = guard;
                this.run(&payload, chunk_budget, &worker_cancel)
            })
            .map_err(TransmitError::Worker)?;

        Ok(SendHandle { cancel, worker })
    }

    /// One-shot probe message, a single attempt
    pub fn send_test(&self, text: &str) -> Result<(), TransmitError> {
        let bytes = WireMessage::Test { test: text.to_string() }.to_bytes()?;
        self.transport
            .send(&bytes, &self.config.destination, self.config.port, self.config.want_ack)?;
        info!("Sent test probe ({} bytes)", bytes.len());
        Ok(())
    }

    fn run(
        &self,
        payload: &EncodedPayload,
        chunk_budget: usize,
        cancel: &CancellationToken,
    ) -> Result<SendReport, TransmitError> {
        let text = payload.to_base64();
        let report = if text.len() <= chunk_budget {
            self.send_single(text, cancel)?
        } else {
            self.send_fragmented(&text, chunk_budget, cancel)?
        };

        if let Ok(mut stats) = self.stats.lock() {
            if report.is_fragmented() {
                stats.transfers += 1;
                stats.chunks_sent += report.sent.len() as u64;
                stats.chunks_failed += report.failed.len() as u64;
            } else {
                stats.single_packets += 1;
            }
            stats.retries += report.retries as u64;
            if report.cancelled {
                stats.cancelled += 1;
            }
        }

        info!(
            "Send finished: {:?} ({}/{} sent)",
            report.outcome(),
            report.sent.len(),
            report.total_chunks
        );
        Ok(report)
    }

    fn send_single(
        &self,
        text: String,
        cancel: &CancellationToken,
    ) -> Result<SendReport, TransmitError> {
        info!("Sending voice message as a single packet ({} bytes base64)", text.len());
        let bytes = WireMessage::voice(text).to_bytes()?;
        let mut report = SendReport::new(None, 1);

        match self.send_with_retry(&bytes, "voice packet", cancel, &mut report.retries) {
            Delivery::Delivered => report.sent.push(1),
            Delivery::Exhausted(e) => {
                error!("Voice packet failed after {} attempts: {}", self.config.max_attempts, e);
                report.failed.push(1);
            }
            Delivery::Cancelled => report.cancelled = true,
        }
        Ok(report)
    }

    fn send_fragmented(
        &self,
        text: &str,
        chunk_budget: usize,
        cancel: &CancellationToken,
    ) -> Result<SendReport, TransmitError> {
        let transfer_id = fragment::new_transfer_id();
        let chunks = fragment::fragment(&transfer_id, text, chunk_budget);
        let total = chunks.len() as u32;
        info!(
            "Splitting {} bytes of base64 into {} chunks of up to {} (transfer {})",
            text.len(),
            total,
            chunk_budget,
            transfer_id
        );

        let mut report = SendReport::new(Some(transfer_id), total);
        for chunk in &chunks {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            match self.send_chunk(chunk, cancel, &mut report.retries)? {
                Delivery::Delivered => {
                    debug!("Sent chunk {}/{}", chunk.sequence_number, total);
                    report.sent.push(chunk.sequence_number);
                }
                Delivery::Exhausted(e) => {
                    error!(
                        "Chunk {}/{} failed after {} attempts: {}",
                        chunk.sequence_number, total, self.config.max_attempts, e
                    );
                    report.failed.push(chunk.sequence_number);
                }
                Delivery::Cancelled => {
                    report.cancelled = true;
                    break;
                }
            }

            let more = chunk.sequence_number < total;
            if more && !cancel.sleep(self.config.chunk_interval, self.config.cancel_poll) {
                report.cancelled = true;
                break;
            }
        }

        if report.cancelled {
            warn!(
                "Transfer {} cancelled after {} of {} chunks",
                report.transfer_id.as_deref().unwrap_or("-"),
                report.sent.len() + report.failed.len(),
                total
            );
        }
        Ok(report)
    }

    fn send_chunk(
        &self,
        chunk: &Chunk,
        cancel: &CancellationToken,
        retries: &mut u32,
    ) -> Result<Delivery, TransmitError> {
        let bytes = WireMessage::from(chunk).to_bytes()?;
        let label = format!("chunk {}/{}", chunk.sequence_number, chunk.total_count);
        Ok(self.send_with_retry(&bytes, &label, cancel, retries))
    }

    fn send_with_retry(
        &self,
        bytes: &[u8],
        label: &str,
        cancel: &CancellationToken,
        retries: &mut u32,
    ) -> Delivery {
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = SendError::NotConnected;

        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                return Delivery::Cancelled;
            }
            if attempt > 1 {
                *retries += 1;
            }

            match self
                .transport
                .send(bytes, &self.config.destination, self.config.port, self.config.want_ack)
            {
                Ok(()) => return Delivery::Delivered,
                Err(e) => {
                    warn!("Attempt {}/{} for {} failed: {}", attempt, attempts, label, e);
                    last_error = e;
                }
            }

            let again = attempt < attempts;
            if again && !cancel.sleep(self.config.retry_delay, self.config.cancel_poll) {
                return Delivery::Cancelled;
            }
        }

        Delivery::Exhausted(last_error)
    }
}

/// Reject budgets and payloads a receiver could never reassemble
fn check_request(payload: &EncodedPayload, chunk_budget: usize) -> Result<(), TransmitError> {
    if chunk_budget == 0 {
        return Err(TransmitError::InvalidChunkBudget);
    }
    let text_len = payload.len().div_ceil(3) * 4;
    let chunks = fragment::chunk_count(text_len, chunk_budget);
    if chunks > MAX_TRANSFER_CHUNKS as usize {
        return Err(TransmitError::TooManyChunks { chunks, limit: MAX_TRANSFER_CHUNKS });
    }
    Ok(())
}
