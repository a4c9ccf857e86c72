use anyhow::{Result, bail};

/// Fixed geometry of the partitioned slot array.
///
/// Capacity and partition count never change for the lifetime of a table;
/// every rank must construct the same layout for routing to agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLayout {
    capacity: u64,
    partitions: u32,
    slots_per_partition: u64,
}

/// Address of one slot: the owning partition and the offset inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotAddr {
    pub partition: u32,
    pub offset: u32,
}

impl TableLayout {
    pub fn new(capacity: u64, partitions: u32) -> Result<Self> {
        if capacity == 0 {
            bail!("table capacity must be at least 1");
        }
        if partitions == 0 {
            bail!("partition count must be at least 1");
        }

        // Slot offsets travel as u32; a partition longer than that cannot
        // be addressed remotely.
        let slots_per_partition = capacity.div_ceil(partitions as u64);
        if slots_per_partition > u32::MAX as u64 {
            bail!(
                "{} slots per partition exceeds the addressable range; spread {} slots over more than {} partitions",
                slots_per_partition,
                capacity,
                partitions
            );
        }

        Ok(Self {
            capacity,
            partitions,
            slots_per_partition,
        })
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn partitions(&self) -> u32 {
        self.partitions
    }

    pub fn slots_per_partition(&self) -> u64 {
        self.slots_per_partition
    }

    /// Number of slots physically present in partition `p`. The last
    /// partition is short when the capacity does not divide evenly; with
    /// more partitions than slots, trailing partitions are empty.
    pub fn partition_len(&self, partition: u32) -> u64 {
        let start = partition as u64 * self.slots_per_partition;
        self.capacity
            .saturating_sub(start)
            .min(self.slots_per_partition)
    }

    pub fn home_slot(&self, hash: u64) -> u64 {
        hash % self.capacity
    }

    /// The deterministic slot visitation order for a hash, shared by insert
    /// and find.
    ///
    /// Partition-major: the home partition is scanned from the home offset
    /// to its boundary, then each following partition (wrapping mod P) is
    /// scanned from offset 0. Every partition is visited at most once, so
    /// the order is not a circular scan of the flat slot space.
    pub fn probe_sequence(&self, hash: u64) -> ProbeSequence {
        let home_slot = self.home_slot(hash);
        let home_partition = (home_slot / self.slots_per_partition) as u32;

        ProbeSequence {
            layout: *self,
            home_partition,
            round: 0,
            offset: home_slot % self.slots_per_partition,
        }
    }
}

/// Iterator over the `(partition, offset)` pairs probed for one hash.
/// Pure; yields each of the table's slots at most once.
pub struct ProbeSequence {
    layout: TableLayout,
    home_partition: u32,
    round: u32,
    offset: u64,
}

impl Iterator for ProbeSequence {
    type Item = SlotAddr;

    fn next(&mut self) -> Option<SlotAddr> {
        while self.round < self.layout.partitions {
            let partition =
                (self.home_partition + self.round) % self.layout.partitions;

            if self.offset < self.layout.partition_len(partition) {
                let addr = SlotAddr {
                    partition,
                    offset: self.offset as u32,
                };
                self.offset += 1;
                return Some(addr);
            }

            self.round += 1;
            self.offset = 0;
        }

        None
    }
}
