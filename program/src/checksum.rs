use alloc::vec::Vec;

use protocol::ChecksumAlgorithm;
use sha2::{Digest, Sha256, Sha512};

#[derive(Clone)]
pub(crate) enum RunningChecksum {
    Sha256(Sha256),
    Sha512(Sha512),
}

impl RunningChecksum {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Sha256 => RunningChecksum::Sha256(Sha256::new()),
            ChecksumAlgorithm::Sha512 => RunningChecksum::Sha512(Sha512::new()),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            RunningChecksum::Sha256(hasher) => hasher.update(data),
            RunningChecksum::Sha512(hasher) => hasher.update(data),
        }
    }

    pub fn snapshot(&self) -> Vec<u8> {
        match self.clone() {
            RunningChecksum::Sha256(hasher) => hasher.finalize().to_vec(),
            RunningChecksum::Sha512(hasher) => hasher.finalize().to_vec(),
        }
    }
}

pub fn compute_checksum(algorithm: ChecksumAlgorithm, data: &[u8]) -> Vec<u8> {
    let mut checksum = RunningChecksum::new(algorithm);
    checksum.update(data);
    checksum.snapshot()
}
