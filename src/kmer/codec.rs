use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest k-mer that fits the packed 64-bit representation (2 bits per base).
pub const MAX_K: usize = 32;

/// A single nucleotide, 2-bit encoded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Base {
    A,
    C,
    G,
    T,
}

impl Base {
    pub fn from_ascii(ch: u8) -> Result<Self> {
        match ch {
            b'A' | b'a' => Ok(Base::A),
            b'C' | b'c' => Ok(Base::C),
            b'G' | b'g' => Ok(Base::G),
            b'T' | b't' => Ok(Base::T),
            other => bail!("invalid base character: {:?}", other as char),
        }
    }

    pub fn to_ascii(self) -> u8 {
        match self {
            Base::A => b'A',
            Base::C => b'C',
            Base::G => b'G',
            Base::T => b'T',
        }
    }

    fn code(self) -> u64 {
        match self {
            Base::A => 0,
            Base::C => 1,
            Base::G => 2,
            Base::T => 3,
        }
    }

    fn from_code(code: u64) -> Self {
        match code & 0b11 {
            0 => Base::A,
            1 => Base::C,
            2 => Base::G,
            _ => Base::T,
        }
    }
}

/// Immutable fixed-width encoding of a k-mer.
///
/// Two equal base sequences always produce bit-identical keys; equality is
/// exact bit equality and hashing is deterministic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct KmerKey {
    packed: u64,
    k: u8,
}

impl KmerKey {
    /// Encodes a textual k-mer. Rejects empty, over-long and non-ACGT input.
    pub fn from_bases(bases: &str) -> Result<Self> {
        if bases.is_empty() {
            bail!("k-mer must not be empty");
        }
        if bases.len() > MAX_K {
            bail!("k-mer length {} exceeds maximum {}", bases.len(), MAX_K);
        }

        let mut packed = 0u64;
        for &ch in bases.as_bytes() {
            packed = (packed << 2) | Base::from_ascii(ch)?.code();
        }

        Ok(Self {
            packed,
            k: bases.len() as u8,
        })
    }

    /// Builds a key directly from a packed word. Bits above `2 * k` are
    /// masked off so equal sequences stay bit-identical.
    pub fn from_packed(packed: u64, k: usize) -> Result<Self> {
        if k == 0 || k > MAX_K {
            bail!("k must be in 1..={}, got {}", MAX_K, k);
        }
        let mask = if k == MAX_K { u64::MAX } else { (1u64 << (2 * k)) - 1 };
        Ok(Self {
            packed: packed & mask,
            k: k as u8,
        })
    }

    pub fn k(&self) -> usize {
        self.k as usize
    }

    /// Recovers the base sequence, most significant base first.
    pub fn bases(&self) -> Vec<Base> {
        (0..self.k as usize)
            .rev()
            .map(|i| Base::from_code(self.packed >> (2 * i)))
            .collect()
    }

    /// Well-distributed 64-bit hash of the key.
    ///
    /// splitmix64 finalizer over the packed word, with the length mixed in so
    /// prefixes of different lengths do not collide trivially.
    pub fn hash(&self) -> u64 {
        splitmix64(self.packed ^ ((self.k as u64) << 56))
    }
}

impl fmt::Display for KmerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for base in self.bases() {
            write!(f, "{}", base.to_ascii() as char)?;
        }
        Ok(())
    }
}

#[inline]
fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E3779B97F4A7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// The base adjoining a k-mer on one side, or `Boundary` when the k-mer
/// coincides with the start/end of its source sequence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Extension {
    Base(Base),
    Boundary,
}

/// The value stored in a table slot: the key (re-checked on lookup) plus the
/// left/right extensions. Immutable once inserted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KmerRecord {
    key: KmerKey,
    left: Extension,
    right: Extension,
}

impl KmerRecord {
    pub fn new(key: KmerKey, left: Extension, right: Extension) -> Self {
        Self { key, left, right }
    }

    pub fn key(&self) -> &KmerKey {
        &self.key
    }

    pub fn left(&self) -> Extension {
        self.left
    }

    pub fn right(&self) -> Extension {
        self.right
    }

    /// True when the k-mer is the first of its source sequence.
    pub fn is_sequence_start(&self) -> bool {
        self.left == Extension::Boundary
    }

    /// True when the k-mer is the last of its source sequence.
    pub fn is_sequence_end(&self) -> bool {
        self.right == Extension::Boundary
    }
}
