//! Transcript hash for handshake messages.
//!
//! Keeps the raw message bytes so the hash can be snapshotted at any point and
//! rolled back to an earlier message boundary.

use super::HashAlgorithm;

/// Running transcript over handshake messages.
///
/// `current_hash()` replays the buffered bytes into a fresh hasher; the buffer
/// itself is never finalized, so later `update()` calls keep working.
pub struct TranscriptHash {
    hash: HashAlgorithm,
    message_buffer: Vec<u8>,
}

impl TranscriptHash {
    pub fn new(hash: HashAlgorithm) -> Self {
        Self {
            hash,
            message_buffer: Vec::new(),
        }
    }

    /// Feed handshake message data into the transcript.
    pub fn update(&mut self, data: &[u8]) {
        self.message_buffer.extend_from_slice(data);
    }

    /// Hash of everything fed so far.
    pub fn current_hash(&self) -> Vec<u8> {
        self.hash.digest(&self.message_buffer)
    }

    /// Hash of the first `len` bytes of the transcript.
    pub fn hash_prefix(&self, len: usize) -> Vec<u8> {
        let len = len.min(self.message_buffer.len());
        self.hash.digest(&self.message_buffer[..len])
    }

    /// Number of bytes recorded; usable as a rollback mark.
    pub fn len(&self) -> usize {
        self.message_buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.message_buffer.is_empty()
    }

    /// Roll the transcript back to a mark previously returned by `len()`.
    pub fn truncate(&mut self, mark: usize) {
        self.message_buffer.truncate(mark);
    }

    /// Switch the hash function, keeping the recorded messages.
    ///
    /// The client only learns the PRF hash from the ServerHello.
    pub fn set_hash(&mut self, hash: HashAlgorithm) {
        self.hash = hash;
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash
    }

    pub fn hash_len(&self) -> usize {
        self.hash.output_len()
    }
}
