use std::collections::BTreeMap;

use proptest::prelude::*;

use supplyline_contracts::{Face, ItemKey, ItemStack, RackId};
use supplyline_depot_core::allocator::{pick_exact, picks_total};
use supplyline_depot_core::storage::{ItemStorage, Rack};

const ITEMS: [&str; 3] = ["stone", "oak_plank", "coal"];

fn build_storage(slots: &[(u8, u8, u64)], extra_faces: bool) -> (ItemStorage, Vec<RackId>) {
    let mut racks: BTreeMap<u8, Vec<(String, u64)>> = BTreeMap::new();
    for (rack, item, count) in slots {
        racks
            .entry(rack % 3)
            .or_default()
            .push((ITEMS[(*item as usize) % ITEMS.len()].to_string(), *count));
    }
    let mut storage = ItemStorage::new();
    let mut order = Vec::new();
    for (rack_idx, entries) in racks {
        let id = format!("rack-{rack_idx}");
        let mut rack = Rack::new(entries.len());
        if extra_faces {
            rack = rack.with_faces(vec![Face::Interior, Face::Up, Face::North]);
        }
        for (slot, (item, count)) in entries.into_iter().enumerate() {
            rack.set_slot(slot, Some(ItemStack::new(item, count)));
        }
        storage.insert_rack(id.clone(), rack);
        order.push(RackId::new(id));
    }
    (storage, order)
}

fn available(slots: &[(u8, u8, u64)], item: &str) -> u64 {
    slots
        .iter()
        .filter(|(_, i, _)| ITEMS[(*i as usize) % ITEMS.len()] == item)
        .map(|(_, _, count)| count)
        .sum()
}

proptest! {
    #[test]
    fn picks_cover_exactly_the_min_of_need_and_availability(
        slots in prop::collection::vec((0_u8..3, 0_u8..3, 1_u64..100), 0..24),
        need in 0_u64..400,
    ) {
        let (storage, order) = build_storage(&slots, false);
        let picks = pick_exact(&storage, &order, &ItemKey::new("stone"), need);
        prop_assert_eq!(picks_total(&picks), need.min(available(&slots, "stone")));
    }

    #[test]
    fn no_slot_is_picked_twice_and_no_pick_exceeds_its_slot(
        slots in prop::collection::vec((0_u8..3, 0_u8..3, 1_u64..100), 0..24),
        need in 1_u64..400,
    ) {
        let (storage, order) = build_storage(&slots, false);
        let picks = pick_exact(&storage, &order, &ItemKey::new("stone"), need);
        let mut seen = std::collections::BTreeSet::new();
        for pick in &picks {
            prop_assert!(pick.count > 0);
            prop_assert!(seen.insert((pick.source.rack.clone(), pick.source.slot)));
            let slot = storage
                .rack(&pick.source.rack)
                .and_then(|rack| rack.slot(pick.source.slot))
                .expect("pick points at an occupied slot");
            prop_assert!(pick.count <= slot.count);
            prop_assert_eq!(&pick.item, &slot.item);
        }
    }

    #[test]
    fn planning_is_deterministic(
        slots in prop::collection::vec((0_u8..3, 0_u8..3, 1_u64..100), 0..24),
        need in 0_u64..400,
    ) {
        let (storage, order) = build_storage(&slots, false);
        let first = pick_exact(&storage, &order, &ItemKey::new("stone"), need);
        let second = pick_exact(&storage, &order, &ItemKey::new("stone"), need);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn extra_faces_never_change_the_allocated_total(
        slots in prop::collection::vec((0_u8..3, 0_u8..3, 1_u64..100), 0..24),
        need in 0_u64..400,
    ) {
        let (plain, order) = build_storage(&slots, false);
        let (faced, faced_order) = build_storage(&slots, true);
        let from_plain = pick_exact(&plain, &order, &ItemKey::new("stone"), need);
        let from_faced = pick_exact(&faced, &faced_order, &ItemKey::new("stone"), need);
        prop_assert_eq!(picks_total(&from_plain), picks_total(&from_faced));
    }
}
