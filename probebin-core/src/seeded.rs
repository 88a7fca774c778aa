//! Reproducible pseudo-random payloads.
//!
//! A seeded source is ChaCha8 (`rand_chacha::ChaCha8Rng`) keyed with
//! `SeedableRng::seed_from_u64(seed)`. Output bytes are the little-endian
//! bytes of consecutive `next_u32` words, handed out one byte at a time, so
//! the sequence does not depend on how callers slice it.

use bytes::Bytes;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::model::{BodyStream, Response};

pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024;

#[derive(Debug, Clone)]
pub struct ByteSource {
    rng: ChaCha8Rng,
    word: [u8; 4],
    used: usize,
}

impl ByteSource {
    /// Without a seed the generator is keyed from OS entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            rng,
            word: [0; 4],
            used: 4,
        }
    }

    pub fn fill(&mut self, out: &mut [u8]) {
        for byte in out.iter_mut() {
            if self.used == self.word.len() {
                self.word = self.rng.next_u32().to_le_bytes();
                self.used = 0;
            }
            *byte = self.word[self.used];
            self.used += 1;
        }
    }

    pub fn take(&mut self, length: usize) -> Vec<u8> {
        let mut out = vec![0; length];
        self.fill(&mut out);
        out
    }
}

pub fn generate(length: usize, seed: Option<u64>) -> Vec<u8> {
    ByteSource::new(seed).take(length)
}

pub fn random_bytes(length: usize, seed: Option<u64>) -> Response {
    Response::with_body(200, "application/octet-stream", generate(length, seed))
}

/// Same bytes as [`random_bytes`], delivered in `chunk_size` pieces with no
/// declared length.
pub fn stream_random_bytes(length: usize, chunk_size: usize, seed: Option<u64>) -> Response {
    let chunk_size = chunk_size.max(1);
    let mut source = ByteSource::new(seed);
    let chunks = async_stream::stream! {
        let mut remaining = length;
        while remaining > 0 {
            let size = remaining.min(chunk_size);
            remaining -= size;
            yield Bytes::from(source.take(size));
        }
    };
    Response::streaming(
        200,
        "application/octet-stream",
        BodyStream::new(Box::pin(chunks), None),
    )
}
