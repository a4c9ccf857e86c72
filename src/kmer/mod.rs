//! K-mer Codec Module
//!
//! Fixed-width encoding of short DNA substrings (k-mers) and the records
//! stored in the distributed table.
//!
//! ## Core Concepts
//! - **Packing**: Each base is 2 bits; a k-mer of up to 32 bases fits one `u64`.
//! - **Hashing**: A splitmix64 finalizer over the packed word drives slot
//!   placement; its uniformity keeps probe chains short.
//! - **Extensions**: A record carries the single base extending the k-mer on
//!   each side, or a `Boundary` marker when the k-mer starts or ends its
//!   source sequence.

pub mod codec;
