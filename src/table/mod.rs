//! Distributed Slot Table Module
//!
//! Implements a fixed-capacity open-addressing hash table whose slot array
//! is split into one contiguous partition per rank.
//!
//! ## Core Concepts
//! - **Partitioning**: `TableLayout` maps slot addresses to `(partition, offset)`
//!   pairs; each rank physically owns exactly one partition (`PartitionSlots`).
//! - **Reservation**: A slot is claimed through an atomic fetch-add on its
//!   occupancy counter; the single caller that observes 0 owns the slot.
//! - **Probing**: Collisions resolve through a partition-major probe sequence
//!   shared by insert and find, crossing partition boundaries deterministically.
//! - **Access**: All remote slot operations are one-sided HTTP requests served
//!   by the owning rank (`handlers`), driven through the `SlotTransport` trait.
//! - **Construction**: A collective bind/join exchange publishes every
//!   partition handle before any rank may issue an insert or find.

pub mod cluster;
pub mod handlers;
pub mod layout;
pub mod map;
pub mod protocol;
pub mod slots;
pub mod transport;

#[cfg(test)]
mod tests;
