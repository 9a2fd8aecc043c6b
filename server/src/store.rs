use bytes::Bytes;
use protocol::{ChecksumAlgorithm, Chunk, FirmwareDescriptor};
use sha2::{Digest, Sha256, Sha512};

use crate::Error;

#[derive(Debug, Clone)]
pub struct FirmwareStore {
    descriptor: FirmwareDescriptor,
    image: Bytes,
}

impl FirmwareStore {
    pub fn new(
        title: impl Into<String>,
        version: impl Into<String>,
        image: impl Into<Bytes>,
        chunk_size: u32,
        algorithm: ChecksumAlgorithm,
    ) -> Result<Self, Error> {
        let image = image.into();
        let total_size = u32::try_from(image.len()).map_err(|_| Error::ImageTooLarge(image.len()))?;

        let checksum = match algorithm {
            ChecksumAlgorithm::Sha256 => Sha256::digest(&image).to_vec(),
            ChecksumAlgorithm::Sha512 => Sha512::digest(&image).to_vec(),
        };

        Ok(Self {
            descriptor: FirmwareDescriptor {
                title: title.into(),
                version: version.into(),
                total_size,
                checksum,
                checksum_algorithm: algorithm,
                chunk_size,
            },
            image,
        })
    }

    pub fn descriptor(&self) -> &FirmwareDescriptor {
        &self.descriptor
    }

    /// Slices chunk `index` at the geometry the device asked for.
    pub fn chunk(&self, index: u32, chunk_size: u32) -> Option<Chunk> {
        if chunk_size == 0 {
            return None;
        }

        let start = index as usize * chunk_size as usize;
        if start >= self.image.len() {
            return None;
        }
        let end = (start + chunk_size as usize).min(self.image.len());

        Some(Chunk::new(index, chunk_size, self.image.slice(start..end).to_vec()))
    }
}
