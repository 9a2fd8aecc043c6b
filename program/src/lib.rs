#![no_std]

#[macro_use]
extern crate alloc;

mod checksum;
mod descriptor;
mod orchestrator;
mod reporter;
mod retry;
mod session;
mod sink;

use alloc::string::String;

pub use checksum::compute_checksum;
pub use descriptor::is_update_needed;
pub use orchestrator::{OrchestratorAction, UpdateOrchestrator};
pub use protocol::{
    ChecksumAlgorithm, Chunk, Config, FirmwareDescriptor, FirmwareIdentity, FirmwareState,
    Message, Topic,
};
pub use reporter::StateReporter;
pub use retry::{RetryLedger, RetryOutcome};
pub use session::{AcceptResult, ChunkAssembler, FailureReason, SessionStatus, UpdateSession};
pub use sink::{ImageSink, MemorySink, MemorySinkError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Protocol error: {0}")]
    Protocol(#[from] protocol::Error),
    #[error("Connect error: {0}")]
    Connect(#[from] ConnectError),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Invalid chunk")]
    InvalidChunk,
    #[error("Sink error: {0}")]
    Sink(String),
    #[error("Apply error: {0}")]
    Apply(#[from] ApplyError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ConnectError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ApplyError(pub String);

pub trait Connectivity {
    fn is_connected(&self) -> bool;

    fn ensure_connected(&mut self) -> Result<(), ConnectError>;
}

pub trait Transport {
    type Error: core::error::Error;

    fn publish(&mut self, topic: Topic, message: &Message) -> Result<(), Self::Error>;
}

pub trait Flash {
    type Sink: ImageSink;

    fn begin(&mut self, descriptor: &FirmwareDescriptor) -> Result<Self::Sink, ApplyError>;

    /// Marks a verified image for boot. Must leave the running image bootable on error.
    fn apply(&mut self, image: Self::Sink) -> Result<(), ApplyError>;

    fn restart(&mut self);
}

pub trait Observer {
    fn on_progress(&mut self, _received: u32, _total: u32) {}

    fn on_complete(&mut self, _success: bool) {}
}

impl Observer for () {}
