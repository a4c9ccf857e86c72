use anyhow::Result;
use std::sync::Arc;

use super::layout::TableLayout;
use super::slots::PartitionSlots;
use super::transport::{LoopbackTransport, SlotTransport};
use crate::kmer::codec::{KmerKey, KmerRecord};

/// The distributed open-addressing k-mer table.
///
/// Probing is driven entirely through a [`SlotTransport`]; the same driver
/// serves a single-process table (loopback) and a cluster table (HTTP).
///
/// Write ordering: a slot is claimed first (the atomic fetch-add is the
/// linearization point), then its payload is written. A concurrent lookup
/// can therefore observe an occupied slot whose payload is not yet visible;
/// lookups treat such a slot as a key mismatch and keep probing, so a racing
/// find may miss a record whose insert has not returned yet. Once `insert`
/// returns, the record is visible to every rank.
pub struct KmerHashMap<T: SlotTransport> {
    layout: TableLayout,
    transport: T,
}

impl KmerHashMap<LoopbackTransport> {
    /// Builds a table whose partitions all live in the calling process.
    pub fn local(capacity: u64, partitions: u32) -> Result<Self> {
        let layout = TableLayout::new(capacity, partitions)?;
        let slots = (0..partitions)
            .map(|rank| Arc::new(PartitionSlots::new(rank, layout.partition_len(rank))))
            .collect();
        Ok(Self::new(layout, LoopbackTransport::new(slots)))
    }
}

impl<T: SlotTransport> KmerHashMap<T> {
    pub fn new(layout: TableLayout, transport: T) -> Self {
        Self { layout, transport }
    }

    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Claims the first free slot along the key's probe sequence and writes
    /// the record there.
    ///
    /// Returns `Ok(false)` when every slot in the table has been probed
    /// without winning one: the table is full for this key. Re-inserting an
    /// existing key is not deduplicated; it claims a fresh slot.
    pub async fn insert(&self, record: KmerRecord) -> Result<bool> {
        let hash = record.key().hash();

        for addr in self.layout.probe_sequence(hash) {
            let previous = self.transport.claim(addr).await?;
            if previous == 0 {
                tracing::debug!(
                    "Claimed partition {} offset {} for {}",
                    addr.partition,
                    addr.offset,
                    record.key()
                );
                self.transport.write_record(addr, record).await?;
                return Ok(true);
            }
        }

        tracing::warn!("Table full: probe sequence exhausted for hash {:#x}", hash);
        Ok(false)
    }

    /// Walks the key's probe sequence and returns the first record whose
    /// stored key matches exactly.
    ///
    /// Occupied slots holding a different key are collision-chain neighbors
    /// and are skipped. Never claims a slot.
    pub async fn find(&self, key: &KmerKey) -> Result<Option<KmerRecord>> {
        for addr in self.layout.probe_sequence(key.hash()) {
            if self.transport.peek(addr).await? == 0 {
                continue;
            }

            if let Some(record) = self.transport.read_record(addr).await?
                && record.key() == key
            {
                return Ok(Some(record));
            }
        }

        Ok(None)
    }
}
