use std::collections::HashMap;

use program::{
    compute_checksum, ChecksumAlgorithm, Chunk, FirmwareDescriptor, FirmwareIdentity,
    FirmwareState, Message,
};

use super::MockLink;

/// Management service double that answers whatever the device published.
pub struct MockService {
    pub image: Vec<u8>,
    pub descriptor: FirmwareDescriptor,
    pub corrupt: HashMap<u32, usize>,
    pub dropped: HashMap<u32, usize>,
    pub duplicate: bool,
    pub reverse_tail: bool,
    pub identity: Option<FirmwareIdentity>,
    pub states: Vec<FirmwareState>,
}

impl MockService {
    pub fn new(title: &str, version: &str, image: Vec<u8>) -> Self {
        let descriptor = FirmwareDescriptor {
            title: title.into(),
            version: version.into(),
            total_size: image.len() as u32,
            checksum: compute_checksum(ChecksumAlgorithm::Sha256, &image),
            checksum_algorithm: ChecksumAlgorithm::Sha256,
            chunk_size: 0,
        };

        Self {
            image,
            descriptor,
            corrupt: HashMap::new(),
            dropped: HashMap::new(),
            duplicate: false,
            reverse_tail: false,
            identity: None,
            states: Vec::new(),
        }
    }

    pub fn serve(&mut self, link: &MockLink) -> Vec<Message> {
        let mut replies = Vec::new();

        for message in link.take_outbox() {
            match message {
                Message::ClientInfo { identity } => self.identity = Some(identity),
                Message::ClientState { state } => self.states.push(state),
                Message::ClientSubscribe => replies.push(Message::ServerFirmware {
                    descriptor: self.descriptor.clone(),
                }),
                Message::ClientChunkRequest {
                    request_id,
                    chunk_index,
                    chunk_size,
                } => {
                    if Self::consume(&mut self.dropped, chunk_index) {
                        continue;
                    }

                    let mut chunk = self.chunk(chunk_index, chunk_size);
                    if Self::consume(&mut self.corrupt, chunk_index) {
                        chunk.payload.truncate(chunk.payload.len() / 2);
                    }

                    if self.reverse_tail {
                        let last = self.descriptor.total_size.div_ceil(chunk_size) - 1;
                        if chunk_index + 1 < last {
                            replies.push(Message::ServerChunk {
                                request_id,
                                chunk: self.chunk(last, chunk_size),
                            });
                        }
                    }

                    if self.duplicate {
                        replies.push(Message::ServerChunk {
                            request_id,
                            chunk: chunk.clone(),
                        });
                    }
                    replies.push(Message::ServerChunk { request_id, chunk });
                }
                _ => {}
            }
        }

        replies
    }

    fn chunk(&self, index: u32, chunk_size: u32) -> Chunk {
        let start = (index * chunk_size) as usize;
        let end = (start + chunk_size as usize).min(self.image.len());
        Chunk::new(index, chunk_size, self.image[start..end].to_vec())
    }

    fn consume(faults: &mut HashMap<u32, usize>, index: u32) -> bool {
        match faults.get_mut(&index) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}
