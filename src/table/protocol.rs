//! Slot Transport Network Protocol
//!
//! Defines the API endpoints and Data Transfer Objects (DTOs) used for the
//! one-sided slot operations between ranks (claim, peek, payload read/write)
//! and for the construction-time handle exchange.
//!
//! These structures are serialized as JSON and sent over HTTP to the rank
//! that owns the targeted partition.

use serde::{Deserialize, Serialize};

use crate::kmer::codec::KmerRecord;

// --- API Endpoints ---

/// Endpoint publishing this rank's partition handle during construction.
pub const ENDPOINT_HANDLE: &str = "/internal/handle";
/// Endpoint for the atomic fetch-add claim on an occupancy counter.
pub const ENDPOINT_CLAIM: &str = "/internal/slot/claim";
/// Endpoint for the atomic load of an occupancy counter.
pub const ENDPOINT_PEEK: &str = "/internal/slot/peek";
/// Endpoint for reading a slot's payload cell.
pub const ENDPOINT_READ: &str = "/internal/slot/record";
/// Endpoint for writing a slot's payload cell.
pub const ENDPOINT_WRITE: &str = "/internal/slot/write";

// --- Data Transfer Objects ---

/// A rank's remotely usable description of its partition.
///
/// Exchanged once during construction; every rank must hold the handle of
/// every partition before any insert or find is issued. `capacity` and
/// `partitions` let peers detect a construction mismatch early.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionHandle {
    /// The owning rank (equals the partition index).
    pub rank: u32,
    /// Global table capacity this rank was constructed with.
    pub capacity: u64,
    /// Total partition count this rank was constructed with.
    pub partitions: u32,
    /// Number of slots physically present in this partition.
    pub len: u64,
}

/// Request for the atomic fetch-add claim of one slot.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClaimRequest {
    /// Unique Operation ID (UUID) for deduplication: a retried request must
    /// not increment the counter a second time.
    pub op_id: String,
    /// Slot offset within the receiving rank's partition.
    pub offset: u32,
}

/// Response to a claim: the counter value before the increment.
/// Zero means the requester won the slot exclusively.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClaimResponse {
    pub previous: u64,
}

/// Response to a peek: the current counter value (0 = free).
#[derive(Debug, Serialize, Deserialize)]
pub struct PeekResponse {
    pub count: u64,
}

/// Response to a payload read. `None` when the cell has not been written,
/// which a prober treats as a key mismatch and moves past.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadResponse {
    pub record: Option<KmerRecord>,
}

/// Request writing a claimed slot's payload cell.
#[derive(Debug, Serialize, Deserialize)]
pub struct WriteRequest {
    /// Slot offset within the receiving rank's partition.
    pub offset: u32,
    /// The record to store.
    pub record: KmerRecord,
}

/// Standard acknowledgment for the payload write.
#[derive(Debug, Serialize, Deserialize)]
pub struct WriteResponse {
    pub success: bool,
}
