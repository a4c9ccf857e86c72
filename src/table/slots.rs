use anyhow::{Result, bail};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::kmer::codec::KmerRecord;

/// The block of slots one rank physically owns.
///
/// Each slot is two independently addressable cells: an occupancy counter
/// (monotonically non-decreasing, moved only by `claim`) and a payload cell.
/// The payload is meaningful only after a writer has claimed the slot and
/// completed its write; readers must verify the stored key themselves.
///
/// Allocated once at table construction and never resized.
pub struct PartitionSlots {
    rank: u32,
    occupancy: Vec<AtomicU64>,
    records: DashMap<u32, KmerRecord>,
    claims: DashMap<String, u64>,
}

impl PartitionSlots {
    pub fn new(rank: u32, len: u64) -> Self {
        let occupancy = (0..len).map(|_| AtomicU64::new(0)).collect();
        Self {
            rank,
            occupancy,
            records: DashMap::new(),
            claims: DashMap::new(),
        }
    }

    pub fn rank(&self) -> u32 {
        self.rank
    }

    pub fn len(&self) -> u64 {
        self.occupancy.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.occupancy.is_empty()
    }

    fn counter(&self, offset: u32) -> Result<&AtomicU64> {
        match self.occupancy.get(offset as usize) {
            Some(counter) => Ok(counter),
            None => bail!(
                "slot offset {} out of range for partition {} (len {})",
                offset,
                self.rank,
                self.occupancy.len()
            ),
        }
    }

    /// Atomic fetch-add(1) on the occupancy counter. Returns the
    /// pre-increment value: 0 means the caller won the slot exclusively.
    pub fn claim(&self, offset: u32) -> Result<u64> {
        Ok(self.counter(offset)?.fetch_add(1, Ordering::AcqRel))
    }

    /// Claim keyed by an operation id, for requests that may be retried in
    /// transit. The fetch-add is not idempotent: a retry of a request whose
    /// response was lost must observe the original pre-increment value, not
    /// increment again and void the winner's claim.
    pub fn claim_with_op(&self, op_id: &str, offset: u32) -> Result<u64> {
        if let Some(previous) = self.claims.get(op_id) {
            return Ok(*previous);
        }
        if self.claims.len() > 10_000 {
            self.claims.clear();
        }
        let counter = self.counter(offset)?;
        Ok(*self
            .claims
            .entry(op_id.to_string())
            .or_insert_with(|| counter.fetch_add(1, Ordering::AcqRel)))
    }

    /// Atomic load of the occupancy counter; never modifies it.
    pub fn peek(&self, offset: u32) -> Result<u64> {
        Ok(self.counter(offset)?.load(Ordering::Acquire))
    }

    /// Reads the payload cell. `None` when no write has completed yet, which
    /// can be observed transiently for a slot whose claim has landed but
    /// whose payload write is still in flight.
    pub fn read(&self, offset: u32) -> Result<Option<KmerRecord>> {
        self.counter(offset)?;
        Ok(self.records.get(&offset).map(|entry| entry.value().clone()))
    }

    /// Writes the payload cell. Callers only write a slot they have claimed,
    /// so the cell is written at most once.
    pub fn write(&self, offset: u32, record: KmerRecord) -> Result<()> {
        self.counter(offset)?;
        self.records.insert(offset, record);
        Ok(())
    }
}
