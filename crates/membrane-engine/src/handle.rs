//! Generation-checked slot table for engine object lifetimes.
//!
//! Host code never holds the engine's raw handle directly. It holds a
//! `u64` key into a [`HandleTable`]; destroying the object bumps the slot's
//! generation, so a stale key resolves to nothing instead of to freed
//! engine memory. Removing twice returns `None` the second time, which
//! callers turn into an invalid-state error without reaching the engine.

/// Lifecycle of a key issued by a [`HandleTable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleState {
    /// The object exists; every operation is permitted.
    Live,
    /// The object was destroyed; only a (rejected) repeat destroy is meaningful.
    Destroyed,
}

/// Key encoding: upper 32 bits = slot index, lower 32 bits = generation.
fn encode(slot: u32, generation: u32) -> u64 {
    ((slot as u64) << 32) | (generation as u64)
}

fn decode(handle: u64) -> (u32, u32) {
    let slot = (handle >> 32) as u32;
    let generation = handle as u32;
    (slot, generation)
}

struct Slot<T> {
    generation: u32,
    data: Option<T>,
}

/// A slot+generation table mapping `u64` keys to owned records.
///
/// Reuses slots via a free list. Generation counters increment on removal,
/// making stale keys detectable.
pub(crate) struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    live: usize,
}

impl<T> HandleTable<T> {
    /// Create an empty table.
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            live: 0,
        }
    }

    /// Insert a record and return its key.
    pub fn insert(&mut self, value: T) -> u64 {
        self.live += 1;
        if let Some(slot_idx) = self.free_list.pop() {
            let slot = &mut self.slots[slot_idx as usize];
            slot.data = Some(value);
            encode(slot_idx, slot.generation)
        } else {
            let slot_idx = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                data: Some(value),
            });
            encode(slot_idx, 0)
        }
    }

    /// The record behind a key, if it is live.
    pub fn get(&self, handle: u64) -> Option<&T> {
        let (slot_idx, generation) = decode(handle);
        let slot = self.slots.get(slot_idx as usize)?;
        if slot.generation != generation {
            return None;
        }
        slot.data.as_ref()
    }

    /// Lifecycle state of a key, or `None` if this table never issued it.
    ///
    /// A key from a retired slot (generation wrapped) reports `Destroyed`.
    pub fn state(&self, handle: u64) -> Option<HandleState> {
        let (slot_idx, generation) = decode(handle);
        let slot = self.slots.get(slot_idx as usize)?;
        if slot.generation == generation {
            return match slot.data {
                Some(_) => Some(HandleState::Live),
                // Empty at generation 0 only after wrapping, and generation 0
                // was the slot's first key.
                None if slot.generation == 0 => Some(HandleState::Destroyed),
                // Freed slot waiting for reuse: this generation is not out yet.
                None => None,
            };
        }
        // Generations only grow (until retirement at wrap), so an older
        // generation was issued and removed; a newer one never existed.
        let retired = slot.generation == 0 && slot.data.is_none();
        (generation < slot.generation || retired).then_some(HandleState::Destroyed)
    }

    /// Remove the record behind a key, returning it.
    ///
    /// Increments the generation counter and adds the slot to the free list.
    /// If the generation has reached `u32::MAX`, the slot is permanently
    /// retired rather than recycled, so a wrapped generation can never
    /// resurrect a stale key. Returns `None` if the key is not live.
    pub fn remove(&mut self, handle: u64) -> Option<T> {
        let (slot_idx, generation) = decode(handle);
        let slot = self.slots.get_mut(slot_idx as usize)?;
        if slot.generation != generation {
            return None;
        }
        let value = slot.data.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        if slot.generation != 0 {
            self.free_list.push(slot_idx);
        }
        self.live -= 1;
        Some(value)
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Keys of every live record, in slot order.
    pub fn keys(&self) -> Vec<u64> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.data.is_some())
            .map(|(idx, slot)| encode(idx as u32, slot.generation))
            .collect()
    }

    /// Remove every live record, returning them with their keys.
    pub fn drain(&mut self) -> Vec<(u64, T)> {
        self.keys()
            .into_iter()
            .filter_map(|key| self.remove(key).map(|value| (key, value)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_round_trip() {
        let mut table = HandleTable::new();
        let h = table.insert(42i32);
        assert_eq!(table.get(h), Some(&42));
        assert_eq!(table.state(h), Some(HandleState::Live));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn remove_returns_value_and_marks_destroyed() {
        let mut table = HandleTable::new();
        let h = table.insert(99i32);
        assert_eq!(table.remove(h), Some(99));
        assert_eq!(table.get(h), None);
        assert_eq!(table.state(h), Some(HandleState::Destroyed));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn double_remove_returns_none() {
        let mut table = HandleTable::new();
        let h = table.insert(1i32);
        assert_eq!(table.remove(h), Some(1));
        assert_eq!(table.remove(h), None);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn free_list_reuses_slots_with_new_generation() {
        let mut table = HandleTable::new();
        let h1 = table.insert(1i32);
        table.remove(h1);
        let h2 = table.insert(2i32);
        let (slot1, gen1) = decode(h1);
        let (slot2, gen2) = decode(h2);
        assert_eq!(slot1, slot2);
        assert_eq!(gen2, gen1 + 1);
        assert_eq!(table.get(h2), Some(&2));
        assert_eq!(table.get(h1), None);
        assert_eq!(table.state(h1), Some(HandleState::Destroyed));
    }

    #[test]
    fn never_issued_keys_have_no_state() {
        let mut table: HandleTable<i32> = HandleTable::new();
        assert_eq!(table.state(encode(999, 0)), None);
        let h = table.insert(5);
        let (slot, generation) = decode(h);
        assert_eq!(table.state(encode(slot, generation + 3)), None);
    }

    #[test]
    fn freed_slot_next_generation_has_no_state() {
        let mut table = HandleTable::new();
        let h = table.insert(7i32);
        table.remove(h);
        let (slot, generation) = decode(h);
        let next = encode(slot, generation + 1);
        assert_eq!(table.state(h), Some(HandleState::Destroyed));
        assert_eq!(table.state(next), None);

        // Once reissued, the same key is live.
        assert_eq!(table.insert(8i32), next);
        assert_eq!(table.state(next), Some(HandleState::Live));
    }

    #[test]
    fn generation_exhaustion_retires_slot() {
        let mut table = HandleTable::new();
        let h = table.insert(1i32);
        table.remove(h);

        table.slots[0].generation = u32::MAX;
        let h2 = table.insert(2i32);
        assert_eq!(decode(h2), (0, u32::MAX));

        // Remove wraps the generation to 0; the slot must not be recycled.
        table.remove(h2);
        assert!(!table.free_list.contains(&0));
        assert_eq!(table.get(encode(0, 0)), None);
        assert_eq!(table.state(h2), Some(HandleState::Destroyed));

        let h3 = table.insert(3i32);
        assert_ne!(decode(h3).0, 0, "retired slot must not be reused");
    }

    #[test]
    fn drain_removes_everything_live() {
        let mut table = HandleTable::new();
        let a = table.insert('a');
        let b = table.insert('b');
        let c = table.insert('c');
        table.remove(b);
        let drained = table.drain();
        assert_eq!(drained, vec![(a, 'a'), (c, 'c')]);
        assert_eq!(table.len(), 0);
        assert!(table.keys().is_empty());
        assert_eq!(table.state(a), Some(HandleState::Destroyed));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn removed_keys_never_resolve(ops in proptest::collection::vec(any::<bool>(), 1..64)) {
                let mut table = HandleTable::new();
                let mut live = Vec::new();
                let mut dead = Vec::new();
                for (i, insert) in ops.into_iter().enumerate() {
                    if insert || live.is_empty() {
                        live.push(table.insert(i));
                    } else {
                        let key = live.swap_remove(i % live.len());
                        prop_assert!(table.remove(key).is_some());
                        dead.push(key);
                    }
                }
                for key in &dead {
                    prop_assert_eq!(table.get(*key), None);
                    prop_assert_eq!(table.state(*key), Some(HandleState::Destroyed));
                }
                prop_assert_eq!(table.len(), live.len());
            }
        }
    }
}
