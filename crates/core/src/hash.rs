//! SHA-256 hashing helpers.
//!
//! Mirrored files record the lowercase hex SHA-256 of the exact bytes that
//! were written to blob storage. [`StreamingHasher`] supports hashing while
//! a download is still in flight, without buffering the whole payload.

use sha2::{Digest, Sha256};

/// Incremental SHA-256 hasher.
pub struct StreamingHasher {
    inner: Sha256,
}

impl StreamingHasher {
    pub fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    /// Feed a chunk of data into the hash.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Consume the hasher and return the lowercase hex digest.
    pub fn finalize_hex(self) -> String {
        hex::encode(self.inner.finalize())
    }
}

impl Default for StreamingHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA-256 of a complete buffer, as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
