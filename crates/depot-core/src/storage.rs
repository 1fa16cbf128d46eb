//! Rack-backed local storage read-model.
//!
//! The kernel never owns the real inventory; it reads a rack snapshot the
//! host keeps current. Racks expose the same physical slots through every
//! open face, which is why slot identity is (rack, slot) and not
//! (rack, face, slot).

use std::collections::BTreeMap;

use supplyline_contracts::{Face, ItemKey, ItemStack, RackId};

#[derive(Debug, Clone)]
pub struct Rack {
    slots: Vec<Option<ItemStack>>,
    faces: Vec<Face>,
}

impl Rack {
    pub fn new(slot_count: usize) -> Self {
        Self {
            slots: vec![None; slot_count],
            faces: vec![Face::Interior],
        }
    }

    pub fn with_faces(mut self, faces: Vec<Face>) -> Self {
        self.faces = faces;
        self
    }

    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, index: usize) -> Option<&ItemStack> {
        self.slots.get(index).and_then(|slot| slot.as_ref())
    }

    pub fn set_slot(&mut self, index: usize, stack: Option<ItemStack>) {
        if index < self.slots.len() {
            self.slots[index] = stack.filter(|s| s.count > 0);
        }
    }

    /// Withdraw up to `count` from one slot. Returns what actually came out.
    pub fn withdraw(&mut self, index: usize, count: u64) -> u64 {
        let Some(slot) = self.slots.get_mut(index) else {
            return 0;
        };
        let Some(stack) = slot.as_mut() else {
            return 0;
        };
        let taken = stack.count.min(count);
        stack.count -= taken;
        if stack.count == 0 {
            *slot = None;
        }
        taken
    }

    /// Deposit into matching slots first, then empty slots. Returns the
    /// overflow that did not fit.
    pub fn deposit(&mut self, item: &ItemKey, count: u64) -> u64 {
        let mut remaining = count;
        for slot in self.slots.iter_mut() {
            if remaining == 0 {
                break;
            }
            match slot {
                Some(stack) if &stack.item == item => {
                    stack.count += remaining;
                    remaining = 0;
                }
                None => {
                    *slot = Some(ItemStack {
                        item: item.clone(),
                        count: remaining,
                    });
                    remaining = 0;
                }
                Some(_) => {}
            }
        }
        remaining
    }

    pub fn count_of(&self, item: &ItemKey) -> u64 {
        self.slots
            .iter()
            .flatten()
            .filter(|stack| &stack.item == item)
            .map(|stack| stack.count)
            .sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ItemStorage {
    racks: BTreeMap<RackId, Rack>,
}

impl ItemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_rack(&mut self, id: impl Into<String>, rack: Rack) {
        self.racks.insert(RackId::new(id), rack);
    }

    pub fn rack(&self, id: &RackId) -> Option<&Rack> {
        self.racks.get(id)
    }

    pub fn rack_mut(&mut self, id: &RackId) -> Option<&mut Rack> {
        self.racks.get_mut(id)
    }

    pub fn count_of(&self, racks: &[RackId], item: &ItemKey) -> u64 {
        racks
            .iter()
            .filter_map(|id| self.racks.get(id))
            .map(|rack| rack.count_of(item))
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Inventory signature
// ---------------------------------------------------------------------------

fn mix(hash: u64, value: u64) -> u64 {
    // SplitMix64 finalizer over the running hash.
    let mut z = hash ^ value;
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

fn mix_str(hash: u64, value: &str) -> u64 {
    let mut h = mix(hash, value.len() as u64);
    for chunk in value.as_bytes().chunks(8) {
        let mut word = [0u8; 8];
        word[..chunk.len()].copy_from_slice(chunk);
        h = mix(h, u64::from_le_bytes(word));
    }
    h
}

/// Stable content hash of the named racks, in the given order. Face layout
/// is excluded: opening a face does not change the stock.
pub fn inventory_signature(storage: &ItemStorage, racks: &[RackId]) -> u64 {
    let mut hash = 0x51_7c_c1b7_2722_0a95;
    for id in racks {
        hash = mix_str(hash, &id.0);
        let Some(rack) = storage.rack(id) else {
            continue;
        };
        for index in 0..rack.slot_count() {
            if let Some(stack) = rack.slot(index) {
                hash = mix(hash, index as u64);
                hash = mix_str(hash, stack.item.as_str());
                hash = mix(hash, stack.count);
            }
        }
    }
    hash
}
