//! Deterministic test-pattern generation and digest helpers
//!
//! Chunk `n` of a run is a pure function of `(seed, n)`, so the verifier can
//! regenerate what was written instead of holding it in memory.

use sha2::{Digest, Sha256};
use std::io::{self, Read};

/// SplitMix64 step
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Generates the pattern bytes for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternGenerator {
    seed: u64,
}

impl PatternGenerator {
    /// Create a generator for the given run seed
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Derive a seed from the current time and process id
    pub fn from_entropy() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let mut state = nanos ^ (u64::from(std::process::id()) << 32);
        Self::new(splitmix64(&mut state))
    }

    /// Run seed
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Fill `buf` with the pattern for chunk `index`
    pub fn fill(&self, index: u64, buf: &mut [u8]) {
        let mut state = self.seed ^ index.wrapping_mul(0xD6E8_FEB8_6659_FD93);
        let mut words = buf.chunks_exact_mut(8);
        for word in &mut words {
            word.copy_from_slice(&splitmix64(&mut state).to_le_bytes());
        }
        let tail = words.into_remainder();
        if !tail.is_empty() {
            let last = splitmix64(&mut state).to_le_bytes();
            tail.copy_from_slice(&last[..tail.len()]);
        }
    }
}

/// Hex-encode a digest
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// SHA-256 of a byte slice as lowercase hex
pub fn sha256_hex(data: &[u8]) -> String {
    to_hex(&Sha256::digest(data))
}

/// SHA-256 of everything a reader yields, streamed in `buf_size` pieces.
///
/// Returns the digest and the number of bytes read.
pub fn sha256_reader<R: Read>(mut reader: R, buf_size: usize) -> io::Result<(String, u64)> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; buf_size.max(1)];
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
        total += n as u64;
    }

    Ok((to_hex(&hasher.finalize()), total))
}
