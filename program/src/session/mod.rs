mod events;
mod transfer;

use alloc::string::{String, ToString};
use core::fmt;

use log::{debug, error, info, warn};
use protocol::{Chunk, FirmwareDescriptor, FirmwareState, Message};

use events::EventQueue;
pub(crate) use events::SessionEvent;
pub use transfer::{AcceptResult, ChunkAssembler};

use crate::retry::{RetryLedger, RetryOutcome};
use crate::{ApplyError, Error, Flash, ImageSink, Transport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    RetryExhausted { chunk_index: u32 },
    ChecksumMismatch,
    Sink(String),
    Apply(ApplyError),
    Aborted,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::RetryExhausted { chunk_index } => {
                write!(f, "retries exhausted on chunk {}", chunk_index)
            }
            FailureReason::ChecksumMismatch => f.write_str("checksum mismatch"),
            FailureReason::Sink(e) => write!(f, "sink failure: {}", e),
            FailureReason::Apply(e) => write!(f, "apply failure: {}", e),
            FailureReason::Aborted => f.write_str("aborted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Announced(FirmwareDescriptor),
    Downloading {
        descriptor: FirmwareDescriptor,
        progress: (u32, u32),
    },
    Verifying,
    Applying,
    Updated,
    Failed(FailureReason),
}

enum Phase {
    RequestingChunks,
    Verifying,
    Applying,
    Updated,
    Failed(FailureReason),
}

#[derive(Debug, Clone, Copy)]
struct PendingRequest {
    request_id: u32,
    chunk_index: u32,
    issued_at: u64,
}

pub struct UpdateSession<S: ImageSink> {
    descriptor: FirmwareDescriptor,
    assembler: Option<ChunkAssembler<S>>,
    ledger: RetryLedger,
    phase: Phase,
    pending: Option<PendingRequest>,
    next_request_id: u32,
    requests_sent: u32,
    chunk_timeout_ms: u64,
    events: EventQueue,
}

impl<S: ImageSink> UpdateSession<S> {
    pub fn new(descriptor: FirmwareDescriptor, sink: S, retry_ceiling: u8, chunk_timeout_ms: u64) -> Self {
        info!(
            "Starting update to {} {} ({} bytes in {} chunks)",
            descriptor.title,
            descriptor.version,
            descriptor.total_size,
            descriptor.total_chunks()
        );

        let assembler = ChunkAssembler::new(&descriptor, sink);
        let mut events = EventQueue::new();
        events.transition(FirmwareState::Downloading);

        Self {
            descriptor,
            assembler: Some(assembler),
            ledger: RetryLedger::new(retry_ceiling),
            phase: Phase::RequestingChunks,
            pending: None,
            next_request_id: 0,
            requests_sent: 0,
            chunk_timeout_ms,
            events,
        }
    }

    pub fn descriptor(&self) -> &FirmwareDescriptor {
        &self.descriptor
    }

    pub fn ledger(&self) -> &RetryLedger {
        &self.ledger
    }

    pub fn progress(&self) -> (u32, u32) {
        let total = self.descriptor.total_chunks();
        self.assembler
            .as_ref()
            .map(|assembler| assembler.progress())
            .unwrap_or((total, total))
    }

    pub fn status(&self) -> SessionStatus {
        match &self.phase {
            Phase::RequestingChunks if self.requests_sent == 0 && self.progress().0 == 0 => {
                SessionStatus::Announced(self.descriptor.clone())
            }
            Phase::RequestingChunks => SessionStatus::Downloading {
                descriptor: self.descriptor.clone(),
                progress: self.progress(),
            },
            Phase::Verifying => SessionStatus::Verifying,
            Phase::Applying => SessionStatus::Applying,
            Phase::Updated => SessionStatus::Updated,
            Phase::Failed(reason) => SessionStatus::Failed(reason.clone()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, Phase::Updated | Phase::Failed(_))
    }

    pub(crate) fn pop_event(&mut self) -> Option<SessionEvent> {
        self.events.next()
    }

    pub fn on_chunk(&mut self, chunk: Chunk) {
        if !matches!(self.phase, Phase::RequestingChunks) {
            debug!("Chunk {} arrived outside of download, ignored", chunk.index);
            return;
        }
        let Some(assembler) = self.assembler.as_mut() else {
            return;
        };

        let result = assembler.accept(&chunk, &self.descriptor);
        match result {
            Ok(AcceptResult::Accepted) => {
                self.settle(chunk.index);
                self.push_progress();
            }
            Ok(AcceptResult::DuplicateIgnored) => {
                debug!("Chunk {} already received, duplicate ignored", chunk.index);
                self.settle(chunk.index);
            }
            Ok(AcceptResult::OutOfRange) => {
                warn!(
                    "Chunk {} out of range for {} chunks, ignored",
                    chunk.index,
                    self.descriptor.total_chunks()
                );
            }
            Ok(AcceptResult::Complete) => {
                self.settle(chunk.index);
                self.push_progress();
                info!("All {} chunks received, verifying", self.descriptor.total_chunks());
                self.phase = Phase::Verifying;
                self.events.transition(FirmwareState::Downloaded);
            }
            Err(Error::InvalidChunk) => {
                warn!("Chunk {} rejected: malformed payload", chunk.index);
                self.record_failed_delivery(chunk.index);
            }
            Err(e) => {
                error!("Writing chunk {} failed: {}", chunk.index, e);
                self.fail(FailureReason::Sink(e.to_string()));
            }
        }
    }

    pub fn advance<T, F>(&mut self, now: u64, transport: &mut T, flash: &mut F) -> Result<(), Error>
    where
        T: Transport,
        F: Flash<Sink = S>,
    {
        match self.phase {
            Phase::RequestingChunks => self.request_next(now, transport),
            Phase::Verifying => {
                self.verify();
                Ok(())
            }
            Phase::Applying => {
                self.apply(flash);
                Ok(())
            }
            Phase::Updated | Phase::Failed(_) => Ok(()),
        }
    }

    /// Drops the outstanding request without charging it, so it is re-sent on the next advance.
    pub fn pause(&mut self) {
        if let Some(pending) = self.pending.take() {
            info!(
                "Request {} for chunk {} dropped, download resumes on reconnect",
                pending.request_id, pending.chunk_index
            );
        }
    }

    pub fn abort(&mut self) {
        self.fail(FailureReason::Aborted);
    }

    fn request_next<T: Transport>(&mut self, now: u64, transport: &mut T) -> Result<(), Error> {
        if let Some(pending) = self.pending {
            if now.saturating_sub(pending.issued_at) < self.chunk_timeout_ms {
                return Ok(());
            }

            warn!(
                "Request {} for chunk {} timed out",
                pending.request_id, pending.chunk_index
            );
            self.pending = None;
            self.record_failed_delivery(pending.chunk_index);
            if !matches!(self.phase, Phase::RequestingChunks) {
                return Ok(());
            }
        }

        let Some(chunk_index) = self.assembler.as_ref().and_then(|a| a.first_missing()) else {
            return Ok(());
        };

        let request_id = self.next_request_id;
        let message = Message::ClientChunkRequest {
            request_id,
            chunk_index,
            chunk_size: self.descriptor.chunk_size,
        };
        transport
            .publish(message.topic(), &message)
            .map_err(|e| Error::Transport(e.to_string()))?;

        debug!("Requested chunk {} (request {})", chunk_index, request_id);
        self.next_request_id = self.next_request_id.wrapping_add(1);
        self.requests_sent += 1;
        self.pending = Some(PendingRequest {
            request_id,
            chunk_index,
            issued_at: now,
        });
        Ok(())
    }

    fn verify(&mut self) {
        let Some(assembler) = self.assembler.as_ref() else {
            return;
        };

        if assembler.running_checksum() == self.descriptor.checksum {
            info!("Checksum verified for {} {}", self.descriptor.title, self.descriptor.version);
            self.phase = Phase::Applying;
            self.events.transition(FirmwareState::Updating);
        } else {
            error!("Checksum mismatch for {} {}", self.descriptor.title, self.descriptor.version);
            self.fail(FailureReason::ChecksumMismatch);
        }
    }

    fn apply<F: Flash<Sink = S>>(&mut self, flash: &mut F) {
        let Some(assembler) = self.assembler.take() else {
            return;
        };

        match flash.apply(assembler.into_sink()) {
            Ok(()) => {
                info!("Firmware {} {} applied", self.descriptor.title, self.descriptor.version);
                self.ledger.reset();
                self.phase = Phase::Updated;
                self.events.transition(FirmwareState::Updated);
                self.events.completed(true);
            }
            Err(e) => {
                error!("Applying firmware failed: {}", e);
                self.fail(FailureReason::Apply(e));
            }
        }
    }

    fn settle(&mut self, chunk_index: u32) {
        if self.pending.is_some_and(|pending| pending.chunk_index == chunk_index) {
            self.pending = None;
        }
    }

    fn record_failed_delivery(&mut self, chunk_index: u32) {
        match self.ledger.record_attempt(chunk_index) {
            RetryOutcome::Proceed => {
                warn!(
                    "Chunk {} delivery failed ({}/{})",
                    chunk_index,
                    self.ledger.attempts(chunk_index),
                    self.ledger.ceiling()
                );
                self.settle(chunk_index);
            }
            RetryOutcome::Exhausted => {
                error!("Chunk {} exceeded {} retries", chunk_index, self.ledger.ceiling());
                self.fail(FailureReason::RetryExhausted { chunk_index });
            }
        }
    }

    fn push_progress(&mut self) {
        let progress = self.progress();
        self.events.progress(progress);
    }

    fn fail(&mut self, reason: FailureReason) {
        if self.is_terminal() {
            return;
        }

        warn!("Update to {} failed: {}", self.descriptor.version, reason);
        self.pending = None;
        self.ledger.reset();
        self.phase = Phase::Failed(reason);
        self.events.transition(FirmwareState::Failed);
        self.events.completed(false);
    }
}
