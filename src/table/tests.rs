//! Table Module Tests
//!
//! Validates the routing math, the reservation protocol and the probe
//! driver over the loopback transport.
//!
//! ## Test Scopes
//! - **Layout**: Partition geometry and the partition-major probe order.
//! - **Reservation**: Claim uniqueness under concurrency, peek passivity.
//! - **Map**: Insert/find round trips, exhaustion, duplicate-key policy.
//!
//! *Note: Socket-level operations (HTTP transport, construction collective)
//! are tested in the integration tests.*

#[cfg(test)]
mod tests {
    use crate::kmer::codec::{Base, Extension, KmerKey, KmerRecord};
    use crate::table::layout::{SlotAddr, TableLayout};
    use crate::table::map::KmerHashMap;
    use crate::table::slots::PartitionSlots;
    use crate::table::transport::SlotTransport;
    use std::sync::Arc;

    fn record(key: KmerKey) -> KmerRecord {
        KmerRecord::new(key, Extension::Base(Base::A), Extension::Base(Base::T))
    }

    /// First key (scanning packed words upward from `start`) whose hash
    /// lands on `target` modulo `capacity`.
    fn key_homed_at(capacity: u64, target: u64, start: u64) -> KmerKey {
        let mut packed = start;
        loop {
            let key = KmerKey::from_packed(packed, 16).unwrap();
            if key.hash() % capacity == target {
                return key;
            }
            packed += 1;
        }
    }

    // ============================================================
    // LAYOUT TESTS
    // ============================================================

    #[test]
    fn test_layout_rejects_degenerate_geometry() {
        assert!(TableLayout::new(0, 3).is_err());
        assert!(TableLayout::new(8, 0).is_err());
    }

    #[test]
    fn test_layout_rejects_partitions_beyond_offset_range() {
        // Offsets travel as u32, so a single partition may hold at most
        // u32::MAX slots.
        assert!(TableLayout::new(1 << 40, 1).is_err());
        assert!(TableLayout::new(u64::MAX, 2).is_err());

        // The same capacity is fine once spread across enough partitions.
        let layout = TableLayout::new(1 << 40, 1 << 12).unwrap();
        assert_eq!(layout.slots_per_partition(), 1 << 28);
    }

    #[test]
    fn test_partition_lengths_round_up() {
        let layout = TableLayout::new(10, 3).unwrap();
        assert_eq!(layout.slots_per_partition(), 4);
        assert_eq!(layout.partition_len(0), 4);
        assert_eq!(layout.partition_len(1), 4);
        assert_eq!(layout.partition_len(2), 2);
    }

    #[test]
    fn test_trailing_partitions_may_be_empty() {
        // More partitions than slots: ranks past the capacity own nothing.
        let layout = TableLayout::new(2, 4).unwrap();
        assert_eq!(layout.partition_len(0), 1);
        assert_eq!(layout.partition_len(1), 1);
        assert_eq!(layout.partition_len(2), 0);
        assert_eq!(layout.partition_len(3), 0);

        let visited: Vec<SlotAddr> = layout.probe_sequence(0).collect();
        assert_eq!(visited.len(), 2);
    }

    #[test]
    fn test_probe_order_is_partition_major() {
        let layout = TableLayout::new(10, 3).unwrap();

        // Home slot 5 lives in partition 1 at offset 1. The home partition
        // is scanned from there to its boundary; every other partition is
        // scanned from offset 0. Slot (1, 0) is never visited.
        let visited: Vec<(u32, u32)> = layout
            .probe_sequence(5)
            .map(|addr| (addr.partition, addr.offset))
            .collect();

        assert_eq!(
            visited,
            vec![
                (1, 1),
                (1, 2),
                (1, 3),
                (2, 0),
                (2, 1),
                (0, 0),
                (0, 1),
                (0, 2),
                (0, 3),
            ]
        );
    }

    #[test]
    fn test_probe_order_is_deterministic() {
        let layout = TableLayout::new(97, 5).unwrap();
        let key = KmerKey::from_bases("ACGTACGTACGT").unwrap();

        let first: Vec<SlotAddr> = layout.probe_sequence(key.hash()).collect();
        let second: Vec<SlotAddr> = layout.probe_sequence(key.hash()).collect();

        assert_eq!(first, second, "Same key must always probe the same slots");
        assert_eq!(first[0].partition as u64, layout.home_slot(key.hash()) / layout.slots_per_partition());
    }

    #[test]
    fn test_probe_order_visits_each_slot_at_most_once() {
        let layout = TableLayout::new(23, 4).unwrap();

        for hash in [0u64, 7, 22, 0xDEADBEEF] {
            let visited: Vec<SlotAddr> = layout.probe_sequence(hash).collect();
            let mut deduped = visited.clone();
            deduped.sort_by_key(|addr| (addr.partition, addr.offset));
            deduped.dedup();
            assert_eq!(visited.len(), deduped.len(), "Duplicate slot in probe order");
        }
    }

    // ============================================================
    // RESERVATION TESTS
    // ============================================================

    #[test]
    fn test_claim_returns_pre_increment_value() {
        let slots = PartitionSlots::new(0, 4);
        assert_eq!(slots.claim(2).unwrap(), 0);
        assert_eq!(slots.claim(2).unwrap(), 1);
        assert_eq!(slots.claim(2).unwrap(), 2);
        assert_eq!(slots.peek(2).unwrap(), 3);
    }

    #[test]
    fn test_peek_never_claims() {
        let slots = PartitionSlots::new(0, 4);
        for _ in 0..10 {
            assert_eq!(slots.peek(1).unwrap(), 0);
        }
        assert_eq!(slots.claim(1).unwrap(), 0, "Slot must still be free");
    }

    #[test]
    fn test_out_of_range_offset_is_an_error() {
        let slots = PartitionSlots::new(0, 4);
        assert!(slots.claim(4).is_err());
        assert!(slots.peek(99).is_err());
        assert!(slots.read(4).is_err());
        assert!(slots.claim_with_op("op-oob", 4).is_err());
    }

    #[test]
    fn test_retried_claim_with_same_op_id_does_not_leak_the_slot() {
        // A claim request whose response was lost in transit gets re-sent
        // with the same op id. The re-send must observe the original
        // pre-increment value: a second fetch-add would tell the true
        // winner it lost, leaving the slot claimed but never written.
        let slots = PartitionSlots::new(0, 2);

        assert_eq!(slots.claim_with_op("op-1", 0).unwrap(), 0);
        assert_eq!(slots.claim_with_op("op-1", 0).unwrap(), 0, "retry must win too");
        assert_eq!(slots.peek(0).unwrap(), 1, "counter moved once, not twice");

        // A distinct operation on the same slot claims normally and loses.
        assert_eq!(slots.claim_with_op("op-2", 0).unwrap(), 1);
        assert_eq!(slots.peek(0).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_exactly_one_concurrent_claim_wins() {
        let slots = Arc::new(PartitionSlots::new(0, 1));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let slots = slots.clone();
            handles.push(tokio::spawn(async move { slots.claim(0).unwrap() }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() == 0 {
                winners += 1;
            }
        }

        assert_eq!(winners, 1, "Exactly one claimer must observe 0");
        assert_eq!(slots.peek(0).unwrap(), 16);
    }

    // ============================================================
    // MAP TESTS
    // ============================================================

    #[tokio::test]
    async fn test_insert_then_find_round_trip() {
        let map = KmerHashMap::local(64, 4).unwrap();

        for bases in ["ACGTACGT", "TTTTACGT", "GATTACAG", "CCCCCCCC"] {
            let key = KmerKey::from_bases(bases).unwrap();
            assert!(map.insert(record(key)).await.unwrap());

            let found = map.find(&key).await.unwrap().expect("record must be found");
            assert_eq!(found.key(), &key);
        }
    }

    #[tokio::test]
    async fn test_find_on_empty_table_is_none() {
        let map = KmerHashMap::local(16, 2).unwrap();
        let key = KmerKey::from_bases("ACGTACGT").unwrap();
        assert!(map.find(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_collision_chain_within_one_partition() {
        // Both keys home at slot 2 of a capacity-4, single-partition table:
        // the first claims slot 2, the second spills into slot 3, and each
        // find walks the chain from slot 2.
        let map = KmerHashMap::local(4, 1).unwrap();

        let k1 = key_homed_at(4, 2, 0);
        let k2 = key_homed_at(4, 2, 10_000);
        assert_ne!(k1, k2);

        let r1 = KmerRecord::new(k1, Extension::Boundary, Extension::Base(Base::G));
        let r2 = KmerRecord::new(k2, Extension::Base(Base::C), Extension::Boundary);

        assert!(map.insert(r1.clone()).await.unwrap());
        assert!(map.insert(r2.clone()).await.unwrap());

        // k1's winning claim plus k2's losing probe both bumped slot 2.
        let addr2 = SlotAddr { partition: 0, offset: 2 };
        let addr3 = SlotAddr { partition: 0, offset: 3 };
        assert_eq!(map.transport().peek(addr2).await.unwrap(), 2);
        assert_eq!(map.transport().peek(addr3).await.unwrap(), 1);

        assert_eq!(map.find(&k1).await.unwrap().unwrap(), r1);
        assert_eq!(map.find(&k2).await.unwrap().unwrap(), r2);
    }

    #[tokio::test]
    async fn test_probing_crosses_partition_boundaries() {
        // Capacity 4 over 2 partitions, all four slots forced into use: the
        // keys home at slot 2 (partition 1, offset 0), so later inserts
        // spill across the partition boundary into partition 0.
        let map = KmerHashMap::local(4, 2).unwrap();

        for i in 0..4 {
            let key = key_homed_at(4, 2, i * 1_000_000);
            assert!(map.insert(record(key)).await.unwrap(), "insert {} failed", i);

            let found = map.find(&key).await.unwrap().expect("record must be found");
            assert_eq!(found.key(), &key);
        }
    }

    #[tokio::test]
    async fn test_exhaustion_is_deterministic() {
        // Keys homed at slot 0 probe the entire table, so eight of them
        // fill all eight slots and the ninth is rejected.
        let map = KmerHashMap::local(8, 2).unwrap();

        let keys: Vec<KmerKey> = (0..9u64).map(|i| key_homed_at(8, 0, i * 1_000_000)).collect();

        for (i, key) in keys.iter().take(8).enumerate() {
            assert!(map.insert(record(*key)).await.unwrap(), "insert {} failed", i);
        }

        assert!(
            !map.insert(record(keys[8])).await.unwrap(),
            "A full table must reject the next distinct key"
        );
        // Still answers lookups after the failed insert.
        assert!(map.find(&keys[3]).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_key_first_write_wins_for_reads() {
        let map = KmerHashMap::local(8, 1).unwrap();
        // Homed at slot 0 so the whole partition is ahead of the home slot.
        let key = key_homed_at(8, 0, 0);

        let first = KmerRecord::new(key, Extension::Boundary, Extension::Base(Base::G));
        let second = KmerRecord::new(key, Extension::Base(Base::T), Extension::Boundary);

        assert!(map.insert(first.clone()).await.unwrap());
        assert!(map.insert(second.clone()).await.unwrap());

        // Two distinct slots claimed.
        let mut occupied = 0;
        for addr in map.layout().probe_sequence(key.hash()) {
            if map.transport().peek(addr).await.unwrap() > 0 {
                occupied += 1;
            }
        }
        assert_eq!(occupied, 2, "Duplicate insert must claim a fresh slot");

        // Reads consistently return the earlier record in probe order.
        for _ in 0..5 {
            let found = map.find(&key).await.unwrap().unwrap();
            assert_eq!(found, first);
        }
    }

    #[tokio::test]
    async fn test_find_skips_claimed_but_unwritten_slot() {
        // A claim whose payload write never landed looks occupied but holds
        // no record; lookups must move past it rather than match on
        // occupancy alone.
        let map = KmerHashMap::local(8, 1).unwrap();
        let key = key_homed_at(8, 0, 500_000);

        let head = map.layout().probe_sequence(key.hash()).next().unwrap();
        assert_eq!(map.transport().claim(head).await.unwrap(), 0);

        let rec = record(key);
        assert!(map.insert(rec.clone()).await.unwrap());

        let found = map.find(&key).await.unwrap().expect("record must be found");
        assert_eq!(found, rec);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_of_distinct_keys() {
        let map = Arc::new(KmerHashMap::local(64, 4).unwrap());

        let mut handles = Vec::new();
        for i in 0..32u64 {
            let map = map.clone();
            handles.push(tokio::spawn(async move {
                let key = KmerKey::from_packed(i, 12).unwrap();
                map.insert(record(key)).await.unwrap()
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap(), "All 32 inserts must fit 64 slots");
        }

        for i in 0..32u64 {
            let key = KmerKey::from_packed(i, 12).unwrap();
            assert!(map.find(&key).await.unwrap().is_some(), "key {} lost", i);
        }
    }
}
