//! The per-cluster hash ring.
//!
//! 1024 virtual slots spread over the cluster's nodes. Each slot's position
//! on the ring comes from hashing the owning node's name together with the
//! slot index, so the layout is a pure function of the node-name set: any two
//! nodes that agree on membership agree on ownership.

use crate::hash::murmur3_32;

/// Virtual slots per cluster ring.
pub const RING_SLOTS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    position: u32,
    index: u16,
    node: u16,
}

/// An immutable ring snapshot. Rebuilt from scratch on every membership
/// change and swapped in atomically by the router.
#[derive(Debug, Clone)]
pub struct Ring {
    names: Vec<String>,
    slots: Vec<Slot>,
}

impl Ring {
    /// Builds the ring for a node-name set. Names are sorted first so the
    /// layout is independent of insertion order.
    pub fn build(mut names: Vec<String>) -> Self {
        names.sort();
        names.dedup();

        let mut slots = Vec::new();
        if !names.is_empty() {
            slots.reserve(RING_SLOTS);
            for index in 0..RING_SLOTS {
                let node = index % names.len();
                let mut seed_bytes =
                    Vec::with_capacity(names[node].len() + std::mem::size_of::<u32>());
                seed_bytes.extend_from_slice(names[node].as_bytes());
                seed_bytes.extend_from_slice(&(index as u32).to_le_bytes());
                slots.push(Slot {
                    position: murmur3_32(&seed_bytes, 0),
                    index: index as u16,
                    node: node as u16,
                });
            }
            // equal positions are ordered by slot index
            slots.sort_by_key(|slot| (slot.position, slot.index));
        }

        Self { names, slots }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn node_names(&self) -> &[String] {
        &self.names
    }

    /// The owning node for (bucket, key). Bucket-level lookups pass the
    /// empty key. `None` only when the ring has no nodes.
    pub fn node_for(&self, bucket: &str, key: &str) -> Option<&str> {
        if self.slots.is_empty() {
            return None;
        }
        let mut target_bytes = Vec::with_capacity(bucket.len() + key.len());
        target_bytes.extend_from_slice(bucket.as_bytes());
        target_bytes.extend_from_slice(key.as_bytes());
        let target = murmur3_32(&target_bytes, 0);

        // first slot at or past the target, wrapping to the start
        let found = self
            .slots
            .partition_point(|slot| slot.position < target);
        let slot = self.slots.get(found).unwrap_or(&self.slots[0]);
        Some(&self.names[slot.node as usize])
    }
}
