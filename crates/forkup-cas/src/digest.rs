//! Chunk digests for optional content verification.

use forkup_types::{ChunkLocation, DigestAlgorithm};
use sha2::{Digest, Sha256};

use crate::error::CasError;

/// Hash `data` with the given algorithm.
pub fn digest(algorithm: DigestAlgorithm, data: &[u8]) -> Vec<u8> {
    match algorithm {
        DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
        DigestAlgorithm::Blake3 => blake3::hash(data).as_bytes().to_vec(),
    }
}

/// Hash `data` and hex-encode the result (lowercase).
pub fn hex_digest(algorithm: DigestAlgorithm, data: &[u8]) -> String {
    hex::encode(digest(algorithm, data))
}

/// Check that `data` hashes to the manifest hash of `chunk`.
pub fn verify_chunk(
    algorithm: DigestAlgorithm,
    chunk: &ChunkLocation,
    data: &[u8],
) -> Result<(), CasError> {
    let computed = digest(algorithm, data);
    if chunk.hash.matches_digest(&computed) {
        Ok(())
    } else {
        Err(CasError::HashMismatch {
            offset: chunk.offset,
            expected: chunk.hash.clone(),
            actual: hex::encode(computed),
        })
    }
}
