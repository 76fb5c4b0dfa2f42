//! Deterministic byte stream keyed by (server seed, client seed, nonce).
//!
//! Block `i` of the stream is
//! `HMAC-SHA256(key = server seed bytes, msg = "{client_seed}:{nonce}:{i}")`
//! with the nonce and counter written as plain decimal. Blocks are
//! concatenated in counter order; readers pull bytes from the front.

use crate::seed_vault::ServerSeed;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Bytes produced per HMAC block
pub const BLOCK_LEN: usize = 32;

/// Human-readable description of the construction, published with every recipe.
pub const CONSTRUCTION: &str = "block[i] = HMAC-SHA256(key = 32 raw bytes of hex-decoded serverSeed, \
message = ASCII(clientSeed + \":\" + decimal(roundNumber) + \":\" + decimal(i))) for i = 0, 1, 2, ...; \
stream = block[0] || block[1] || ...";

/// How multi-byte integers are read from the stream.
pub const BYTE_ORDER: &str = "Bytes are consumed from the start of the stream in order. \
Each 32-bit draw reads the next 4 bytes as an unsigned big-endian integer.";

/// Reproducible, unbounded pseudo-random byte stream
pub struct ByteStream {
    mac: HmacSha256,
    client_seed: String,
    nonce: u64,
    counter: u64,
    block: [u8; BLOCK_LEN],
    offset: usize,
    consumed: usize,
}

impl ByteStream {
    pub fn derive(server_seed: &ServerSeed, client_seed: &str, nonce: u64) -> Self {
        let mac = <HmacSha256 as Mac>::new_from_slice(server_seed.as_bytes())
            .expect("hmac accepts any key length");
        let mut stream = Self {
            mac,
            client_seed: client_seed.to_string(),
            nonce,
            counter: 0,
            block: [0u8; BLOCK_LEN],
            offset: 0,
            consumed: 0,
        };
        stream.refill();
        stream
    }

    fn refill(&mut self) {
        let mut mac = self.mac.clone();
        let message = format!("{}:{}:{}", self.client_seed, self.nonce, self.counter);
        mac.update(message.as_bytes());
        self.block = mac.finalize().into_bytes().into();
        self.offset = 0;
        self.counter += 1;
    }

    fn next_byte(&mut self) -> u8 {
        if self.offset == BLOCK_LEN {
            self.refill();
        }
        let byte = self.block[self.offset];
        self.offset += 1;
        self.consumed += 1;
        byte
    }

    /// Return the next `n` bytes and advance the cursor
    pub fn next(&mut self, n: usize) -> Vec<u8> {
        (0..n).map(|_| self.next_byte()).collect()
    }

    /// Next 4 bytes as a big-endian u32
    pub fn next_u32(&mut self) -> u32 {
        let bytes = [
            self.next_byte(),
            self.next_byte(),
            self.next_byte(),
            self.next_byte(),
        ];
        u32::from_be_bytes(bytes)
    }

    /// Uniform integer in `[0, bound)` via rejection sampling on 32-bit draws.
    ///
    /// Draws at or above the largest multiple of `bound` that fits in 2^32
    /// are discarded, so no residue class is favoured.
    pub fn uniform_below(&mut self, bound: u32) -> u32 {
        assert!(bound > 0, "uniform_below requires a non-zero bound");
        let space = 1u64 << 32;
        let zone = (space / bound as u64) * bound as u64;
        loop {
            let draw = self.next_u32() as u64;
            if draw < zone {
                return (draw % bound as u64) as u32;
            }
        }
    }

    /// Total bytes handed out so far
    pub fn bytes_consumed(&self) -> usize {
        self.consumed
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }
}
