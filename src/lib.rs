//! Distributed K-mer Hash Table Library
//!
//! A fixed-capacity, open-addressing hash table for k-mer records, spread
//! across cooperating ranks that each own one contiguous partition of the
//! slot array and reach every other partition through one-sided operations
//! (atomic claim/peek on occupancy counters, payload reads and writes).
//!
//! ## Architecture Modules
//! - **`kmer`**: The key/record codec. Packs base sequences into fixed-width
//!   keys, hashes them for slot placement, and models the left/right
//!   extensions and sequence-boundary flags carried by each record.
//! - **`table`**: The table core. Partition layout and probe routing, the
//!   atomic slot reservation protocol, the loopback and HTTP transports, and
//!   the collective construction/teardown of a multi-rank table.
//!
//! Parsing sequence files into k-mers and assembling contigs from found
//! records are the callers' concern; the table's contract is `insert(record)`
//! and `find(key)` only.

pub mod kmer;
pub mod table;

pub use kmer::codec::{Base, Extension, KmerKey, KmerRecord, MAX_K};
pub use table::cluster::{BoundTable, ClusterTable};
pub use table::layout::{SlotAddr, TableLayout};
pub use table::map::KmerHashMap;
