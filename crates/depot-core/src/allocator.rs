//! Greedy deterministic pick planner.
//!
//! Walks racks in the caller's order, faces in [`Face::SCAN_ORDER`] as the
//! rack exposes them, slots by index, and takes from every matching slot
//! until the need is met. Because several faces reach the same physical
//! slots, visited slots are deduplicated by (rack, slot); a slot contributes
//! to at most one pick per call. The planner only reads storage — callers
//! decide whether to act on the plan.

use std::collections::BTreeSet;

use supplyline_contracts::{ItemKey, Pick, RackId, RequestKind, Requestable, SlotRef};

use crate::catalog::ItemCatalog;
use crate::storage::ItemStorage;

/// Plan picks satisfying `wanted` from the named racks. Partial cover is a
/// normal result; the caller compares [`picks_total`] against the need.
pub fn pick_from_racks(
    storage: &ItemStorage,
    rack_order: &[RackId],
    catalog: &ItemCatalog,
    wanted: &Requestable,
) -> Vec<Pick> {
    pick_internal(
        storage,
        rack_order,
        |item| catalog.matches(wanted, item),
        wanted.required_count(),
        wanted.kind() == RequestKind::Tool,
    )
}

/// Plan picks for an exact item and quantity, ignoring catalog predicates.
pub fn pick_exact(
    storage: &ItemStorage,
    rack_order: &[RackId],
    item: &ItemKey,
    quantity: u64,
) -> Vec<Pick> {
    pick_internal(storage, rack_order, |candidate| candidate == item, quantity, false)
}

pub fn picks_total(picks: &[Pick]) -> u64 {
    picks.iter().map(|pick| pick.count).sum()
}

fn pick_internal(
    storage: &ItemStorage,
    rack_order: &[RackId],
    mut matches: impl FnMut(&ItemKey) -> bool,
    total_needed: u64,
    single_item: bool,
) -> Vec<Pick> {
    let mut picks = Vec::new();
    if total_needed == 0 {
        return picks;
    }
    let mut remaining = total_needed;
    let mut visited: BTreeSet<(RackId, usize)> = BTreeSet::new();

    for rack_id in rack_order {
        let Some(rack) = storage.rack(rack_id) else {
            continue;
        };
        for face in rack.faces() {
            for slot in 0..rack.slot_count() {
                if remaining == 0 {
                    return picks;
                }
                if !visited.insert((rack_id.clone(), slot)) {
                    continue;
                }
                let Some(stack) = rack.slot(slot) else {
                    continue;
                };
                if !matches(&stack.item) {
                    continue;
                }
                if single_item {
                    picks.push(Pick {
                        source: SlotRef {
                            rack: rack_id.clone(),
                            face: *face,
                            slot,
                        },
                        item: stack.item.clone(),
                        count: 1,
                        reservation: None,
                    });
                    return picks;
                }
                let take = stack.count.min(remaining);
                remaining -= take;
                picks.push(Pick {
                    source: SlotRef {
                        rack: rack_id.clone(),
                        face: *face,
                        slot,
                    },
                    item: stack.item.clone(),
                    count: take,
                    reservation: None,
                });
            }
        }
    }
    picks
}
