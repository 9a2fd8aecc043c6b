use alloc::vec::Vec;

pub trait ImageSink {
    type Error: core::error::Error;

    fn write_at(&mut self, offset: u32, data: &[u8]) -> Result<(), Self::Error>;

    fn read_at(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), Self::Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum MemorySinkError {
    #[error("Range {start}..{end} exceeds capacity {capacity}")]
    OutOfBounds {
        start: usize,
        end: usize,
        capacity: usize,
    },
}

#[derive(Debug, Clone)]
pub struct MemorySink {
    buffer: Vec<u8>,
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0u8; capacity],
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    fn range(&self, offset: u32, len: usize) -> Result<core::ops::Range<usize>, MemorySinkError> {
        let start = offset as usize;
        let end = start + len;
        if end > self.buffer.len() {
            return Err(MemorySinkError::OutOfBounds {
                start,
                end,
                capacity: self.buffer.len(),
            });
        }
        Ok(start..end)
    }
}

impl ImageSink for MemorySink {
    type Error = MemorySinkError;

    fn write_at(&mut self, offset: u32, data: &[u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, data.len())?;
        self.buffer[range].copy_from_slice(data);
        Ok(())
    }

    fn read_at(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.buffer[range]);
        Ok(())
    }
}
