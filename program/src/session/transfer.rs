use alloc::string::ToString;
use alloc::vec::Vec;

use bitvec::vec::BitVec;
use protocol::{Chunk, FirmwareDescriptor};

use crate::checksum::RunningChecksum;
use crate::{Error, ImageSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptResult {
    Accepted,
    DuplicateIgnored,
    OutOfRange,
    Complete,
}

/// Reassembles an image from chunks delivered in any order.
///
/// The running checksum covers the contiguous prefix of received chunks. A chunk that
/// lands ahead of the prefix is hashed later by reading it back from the sink.
pub struct ChunkAssembler<S: ImageSink> {
    received_chunks: BitVec,
    hashed_chunks: usize,
    bytes_written: u32,
    checksum: RunningChecksum,
    sink: S,
}

impl<S: ImageSink> ChunkAssembler<S> {
    pub fn new(descriptor: &FirmwareDescriptor, sink: S) -> Self {
        Self {
            received_chunks: BitVec::repeat(false, descriptor.total_chunks() as usize),
            hashed_chunks: 0,
            bytes_written: 0,
            checksum: RunningChecksum::new(descriptor.checksum_algorithm),
            sink,
        }
    }

    pub fn accept(
        &mut self,
        chunk: &Chunk,
        descriptor: &FirmwareDescriptor,
    ) -> Result<AcceptResult, Error> {
        let idx = chunk.index as usize;

        let Some(expected_len) = descriptor.chunk_len(chunk.index) else {
            return Ok(AcceptResult::OutOfRange);
        };
        if idx >= self.received_chunks.len() {
            return Ok(AcceptResult::OutOfRange);
        }

        if self.received_chunks[idx] {
            return Ok(AcceptResult::DuplicateIgnored);
        }

        if chunk.offset != chunk.index * descriptor.chunk_size
            || chunk.payload.len() != expected_len as usize
        {
            return Err(Error::InvalidChunk);
        }

        self.sink
            .write_at(chunk.offset, &chunk.payload)
            .map_err(|e| Error::Sink(e.to_string()))?;
        self.received_chunks.set(idx, true);
        self.bytes_written += expected_len;
        self.advance_checksum(chunk, descriptor)?;

        if self.is_complete() {
            Ok(AcceptResult::Complete)
        } else {
            Ok(AcceptResult::Accepted)
        }
    }

    fn advance_checksum(&mut self, latest: &Chunk, descriptor: &FirmwareDescriptor) -> Result<(), Error> {
        let mut scratch = Vec::new();

        while self.hashed_chunks < self.received_chunks.len() && self.received_chunks[self.hashed_chunks] {
            let index = self.hashed_chunks as u32;

            if index == latest.index {
                self.checksum.update(&latest.payload);
            } else {
                let len = descriptor.chunk_len(index).ok_or(Error::InvalidChunk)?;
                scratch.resize(len as usize, 0);
                self.sink
                    .read_at(index * descriptor.chunk_size, &mut scratch)
                    .map_err(|e| Error::Sink(e.to_string()))?;
                self.checksum.update(&scratch);
            }

            self.hashed_chunks += 1;
        }

        Ok(())
    }

    pub fn progress(&self) -> (u32, u32) {
        (
            self.received_chunks.count_ones() as u32,
            self.received_chunks.len() as u32,
        )
    }

    pub fn is_complete(&self) -> bool {
        self.received_chunks.all()
    }

    pub fn first_missing(&self) -> Option<u32> {
        self.received_chunks.first_zero().map(|idx| idx as u32)
    }

    pub fn bytes_written(&self) -> u32 {
        self.bytes_written
    }

    pub fn running_checksum(&self) -> Vec<u8> {
        self.checksum.snapshot()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
