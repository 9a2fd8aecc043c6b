#![no_std]

extern crate alloc;

mod config;

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

pub use config::Config;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Insufficient data")]
    InsufficientData,
    #[error("Invalid message")]
    InvalidMessage,
    #[error("Decode error: {0:?}")]
    DecodeError(bincode::error::DecodeError),
    #[error("Encode error: {0:?}")]
    EncodeError(bincode::error::EncodeError),
}

#[derive(bincode::Encode, bincode::Decode, Debug, Clone, PartialEq, Eq)]
pub struct FirmwareIdentity {
    pub title: String,
    pub version: String,
}

impl FirmwareIdentity {
    pub fn new(title: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            version: version.into(),
        }
    }
}

#[derive(bincode::Encode, bincode::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Sha256,
    Sha512,
}

impl ChecksumAlgorithm {
    pub fn digest_len(&self) -> usize {
        match self {
            ChecksumAlgorithm::Sha256 => 32,
            ChecksumAlgorithm::Sha512 => 64,
        }
    }
}

#[derive(bincode::Encode, bincode::Decode, Debug, Clone, PartialEq, Eq)]
pub struct FirmwareDescriptor {
    pub title: String,
    pub version: String,
    pub total_size: u32,
    pub checksum: Vec<u8>,
    pub checksum_algorithm: ChecksumAlgorithm,
    pub chunk_size: u32,
}

impl FirmwareDescriptor {
    pub fn total_chunks(&self) -> u32 {
        if self.chunk_size == 0 {
            return 0;
        }
        self.total_size.div_ceil(self.chunk_size)
    }

    /// Length the payload of chunk `index` must have, `None` if the index is past the end.
    pub fn chunk_len(&self, index: u32) -> Option<u32> {
        let total_chunks = self.total_chunks();
        if index >= total_chunks {
            return None;
        }
        if index == total_chunks - 1 {
            Some(self.total_size - self.chunk_size * index)
        } else {
            Some(self.chunk_size)
        }
    }

    pub fn identity(&self) -> FirmwareIdentity {
        FirmwareIdentity::new(self.title.as_str(), self.version.as_str())
    }
}

#[derive(bincode::Encode, bincode::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: u32,
    pub offset: u32,
    pub payload: Vec<u8>,
}

impl Chunk {
    pub fn new(index: u32, chunk_size: u32, payload: Vec<u8>) -> Self {
        Self {
            index,
            offset: index * chunk_size,
            payload,
        }
    }
}

#[derive(bincode::Encode, bincode::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareState {
    Idle,
    Downloading,
    Downloaded,
    Updating,
    Updated,
    Failed,
}

impl FirmwareState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FirmwareState::Idle => "IDLE",
            FirmwareState::Downloading => "DOWNLOADING",
            FirmwareState::Downloaded => "DOWNLOADED",
            FirmwareState::Updating => "UPDATING",
            FirmwareState::Updated => "UPDATED",
            FirmwareState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for FirmwareState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Attributes,
    Telemetry,
    FirmwareRequest,
    FirmwareResponse,
    Heartbeat,
}

#[derive(bincode::Encode, bincode::Decode, Debug, Clone, PartialEq)]
pub enum Message {
    ClientInfo {
        identity: FirmwareIdentity,
    },
    ClientState {
        state: FirmwareState,
    },
    ClientSubscribe,
    ClientChunkRequest {
        request_id: u32,
        chunk_index: u32,
        chunk_size: u32,
    },
    ServerFirmware {
        descriptor: FirmwareDescriptor,
    },
    ServerChunk {
        request_id: u32,
        chunk: Chunk,
    },
    Heartbeat {
        timestamp: u64,
    },
}

impl Message {
    pub const HEADER_SIZE: usize = 2;

    pub fn topic(&self) -> Topic {
        match self {
            Message::ClientInfo { .. } | Message::ClientSubscribe => Topic::Attributes,
            Message::ClientState { .. } => Topic::Telemetry,
            Message::ClientChunkRequest { .. } => Topic::FirmwareRequest,
            Message::ServerFirmware { .. } | Message::ServerChunk { .. } => Topic::FirmwareResponse,
            Message::Heartbeat { .. } => Topic::Heartbeat,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let payload = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(Error::EncodeError)?;
        let payload_len = payload.len();

        if payload_len > u16::MAX as usize {
            return Err(Error::InvalidMessage);
        }

        let mut output = Vec::with_capacity(Self::HEADER_SIZE + payload_len);
        output.extend_from_slice(&(payload_len as u16).to_be_bytes());
        output.extend(payload);

        Ok(output)
    }

    /// Decodes one frame from the front of `data`, returning the message and the bytes consumed.
    pub fn decode(data: &[u8]) -> Result<(Self, usize), Error> {
        if data.len() < Self::HEADER_SIZE {
            return Err(Error::InsufficientData);
        }

        let payload_len = u16::from_be_bytes([data[0], data[1]]) as usize;
        let frame_len = Self::HEADER_SIZE + payload_len;
        if data.len() < frame_len {
            return Err(Error::InsufficientData);
        }

        let (message, size) = bincode::decode_from_slice(
            &data[Self::HEADER_SIZE..frame_len],
            bincode::config::standard(),
        )
        .map_err(Error::DecodeError)?;

        if size != payload_len {
            return Err(Error::InvalidMessage);
        }

        Ok((message, frame_len))
    }
}
