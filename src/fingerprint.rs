//! Rabin fingerprints
//!
//! Table-driven (Broder) implementation of Rabin's fingerprinting scheme: the
//! input is read as a polynomial over GF(2) and reduced modulo a fixed
//! irreducible polynomial of degree 64. For two distinct inputs `s1` and `s2`
//! the collision probability is bounded by `max(|s1|, |s2|) / 2^63`, where
//! `|s|` is the length in bits.
//!
//! Fingerprints are not a cryptographic digest. They are cheap, deterministic
//! across processes and platforms, and good enough to derive identifiers from
//! schema names.
//!
//! Every entry point performs the same reduction, so hashing a sequence of
//! wider units (UTF-16 code units, `u32`, `u64`) yields the same value as
//! hashing its big-endian byte encoding, and [`RabinHasher::hash_reader`]
//! yields the same value as [`RabinHasher::hash_bytes`] over the concatenated
//! input regardless of how the reads are split.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Low 64 coefficients of the reduction polynomial; the `x^64` term is implicit.
const POLYNOMIAL: u64 = 0x804A_E120_2C30_6041;
const DEGREE: usize = 64;
const TOP_BIT: u64 = 1 << (DEGREE - 1);
const READ_BUFFER_SIZE: usize = 2048;

/// Fingerprint hasher with its reduction tables precomputed at construction.
///
/// The tables are read-only after [`RabinHasher::new`], so one instance can be
/// shared freely between threads.
#[derive(Clone)]
pub struct RabinHasher {
    /// `tables[k][b]` is `b * x^(64 + 8k) mod P`, one table per byte lane
    /// of the 64-bit accumulator.
    tables: Box<[[u64; 256]; 8]>,
}

impl RabinHasher {
    /// Build the eight lookup tables for the fixed polynomial.
    pub fn new() -> Self {
        // mods[i] = x^(64 + i) mod P
        let mut mods = [0u64; DEGREE];
        mods[0] = POLYNOMIAL;
        for i in 1..DEGREE {
            mods[i] = mods[i - 1] << 1;
            if mods[i - 1] & TOP_BIT != 0 {
                mods[i] ^= POLYNOMIAL;
            }
        }

        let mut tables = Box::new([[0u64; 256]; 8]);
        for byte in 0..256usize {
            for bit in 0..8 {
                if (byte >> bit) & 1 == 0 {
                    continue;
                }
                for (lane, table) in tables.iter_mut().enumerate() {
                    table[byte] ^= mods[bit + 8 * lane];
                }
            }
        }

        Self { tables }
    }

    /// Fingerprint a byte slice. Empty input hashes to 0.
    pub fn hash_bytes(&self, bytes: &[u8]) -> i64 {
        self.fold_bytes(0, bytes) as i64
    }

    /// Fingerprint a string as its sequence of UTF-16 code units.
    pub fn hash_str(&self, s: &str) -> i64 {
        let units: Vec<u16> = s.encode_utf16().collect();
        self.hash_chars(&units)
    }

    /// Fingerprint a sequence of 16-bit characters.
    pub fn hash_chars(&self, chars: &[u16]) -> i64 {
        let (head, blocks) = chars.split_at(chars.len() % 4);
        let mut w = head
            .iter()
            .fold(0u64, |w, &c| self.push_bytes(w, &c.to_be_bytes()));
        for block in blocks.chunks_exact(4) {
            let word = block.iter().fold(0u64, |acc, &c| (acc << 16) | u64::from(c));
            w = self.shift64(w) ^ word;
        }
        w as i64
    }

    /// Fingerprint a sequence of 32-bit integers.
    pub fn hash_ints(&self, ints: &[u32]) -> i64 {
        let (head, blocks) = ints.split_at(ints.len() % 2);
        let mut w = head
            .iter()
            .fold(0u64, |w, &i| self.push_bytes(w, &i.to_be_bytes()));
        for block in blocks.chunks_exact(2) {
            w = self.shift64(w) ^ (u64::from(block[0]) << 32 | u64::from(block[1]));
        }
        w as i64
    }

    /// Fingerprint a sequence of 64-bit integers. Each value is one block,
    /// which makes this the cheapest entry point.
    pub fn hash_longs(&self, longs: &[u64]) -> i64 {
        longs.iter().fold(0u64, |w, &l| self.shift64(w) ^ l) as i64
    }

    /// Fingerprint everything readable from `reader`, consuming it in
    /// fixed-size chunks.
    pub fn hash_reader<R: Read>(&self, mut reader: R) -> io::Result<i64> {
        let mut buffer = [0u8; READ_BUFFER_SIZE];
        let mut w = 0u64;
        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            w = self.fold_bytes(w, &buffer[..read]);
        }
        Ok(w as i64)
    }

    /// Fingerprint the contents of a file.
    pub fn hash_file(&self, path: impl AsRef<Path>) -> io::Result<i64> {
        self.hash_reader(File::open(path)?)
    }

    /// Continue the fingerprint `w` over `bytes`: leading bytes one at a time
    /// until the remainder is a whole number of 8-byte blocks.
    fn fold_bytes(&self, w: u64, bytes: &[u8]) -> u64 {
        let (head, blocks) = bytes.split_at(bytes.len() % 8);
        let mut w = self.push_bytes(w, head);
        for block in blocks.chunks_exact(8) {
            let word = block.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
            w = self.shift64(w) ^ word;
        }
        w
    }

    fn push_bytes(&self, w: u64, bytes: &[u8]) -> u64 {
        bytes
            .iter()
            .fold(w, |w, &b| (w << 8) ^ self.tables[0][(w >> 56) as usize] ^ u64::from(b))
    }

    /// `w * x^64 mod P`
    fn shift64(&self, w: u64) -> u64 {
        self.tables
            .iter()
            .enumerate()
            .fold(0u64, |acc, (lane, table)| {
                acc ^ table[((w >> (8 * lane)) & 0xFF) as usize]
            })
    }
}

impl Default for RabinHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RabinHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RabinHasher")
            .field("polynomial", &format_args!("{:#018x}", POLYNOMIAL))
            .finish()
    }
}
