//! Speculative ordering: buy ahead of need.
//!
//! Open requests that boil down to one concrete item are tracked from the
//! moment they appear on the board. When one stays unfulfilled past the
//! delay gate and the home network still cannot cover it, a single-item
//! order goes to the best speculative supplier, so the stock is already in
//! transit by the time the resolver would otherwise order it. At most one
//! speculative order is ever placed per tracked request.

use std::collections::BTreeMap;

use tracing::debug;

use supplyline_contracts::{
    DepotConfig, IncomingOrder, ItemKey, ItemStack, RequestState, RequestToken, SupplierEntry,
};

use crate::collaborators::{LogisticsNetwork, RequestBoard};
use crate::stock::StockSnapshot;

#[derive(Debug, Clone)]
struct TrackedRequest {
    first_seen_tick: u64,
    item: ItemKey,
    quantity: u64,
    order_placed: bool,
}

/// What one speculative cycle did.
#[derive(Debug, Default)]
pub struct SpeculativeReport {
    pub placed: Vec<IncomingOrder>,
    /// Tracked requests that left the board after an order had been placed
    /// for them; the embedding layer may want to reconcile the shipment.
    pub reconciled: Vec<RequestToken>,
}

#[derive(Debug, Default)]
pub struct SpeculativeEngine {
    tracked: BTreeMap<RequestToken, TrackedRequest>,
    next_order_id: u64,
    last_check_tick: Option<u64>,
}

fn is_trackable(state: RequestState) -> bool {
    matches!(state, RequestState::Assigning | RequestState::InProgress)
}

impl SpeculativeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    /// Tracked requests whose speculative order is still in transit.
    pub fn orders_in_flight(&self) -> usize {
        self.tracked.values().filter(|t| t.order_placed).count()
    }

    /// Run one speculative cycle when due. Requires the master switch and at
    /// least one speculative supplier; otherwise all tracking is dropped.
    pub fn process_if_due(
        &mut self,
        now: u64,
        config: &DepotConfig,
        suppliers: &[SupplierEntry],
        stock: &StockSnapshot,
        board: &mut dyn RequestBoard,
        network: &mut dyn LogisticsNetwork,
    ) -> Option<SpeculativeReport> {
        if !config.speculative_enabled {
            self.tracked.clear();
            return None;
        }
        if let Some(last) = self.last_check_tick {
            if now.saturating_sub(last) < config.speculative_interval_ticks {
                return None;
            }
        }
        self.last_check_tick = Some(now);

        if !suppliers.iter().any(|s| s.allow_speculative) {
            self.tracked.clear();
            return Some(SpeculativeReport::default());
        }
        let mut candidates: Vec<&SupplierEntry> = suppliers
            .iter()
            .filter(|s| s.allow_speculative && s.has_valid_address())
            .collect();
        candidates.sort_by(|a, b| (a.priority, &a.network).cmp(&(b.priority, &b.network)));

        // Phase 1: pick up newly visible requests with a concrete order.
        let tracked = &mut self.tracked;
        board.on_colony_update(&mut |view| {
            if is_trackable(view.state) {
                if let Some(order) = view.requestable.concrete_order() {
                    tracked.entry(view.token).or_insert(TrackedRequest {
                        first_seen_tick: now,
                        item: order.item,
                        quantity: order.count,
                        order_placed: false,
                    });
                }
            }
            false
        });

        let mut report = SpeculativeReport::default();

        // Phase 2: order for requests past the delay that stock won't cover.
        for (token, request) in self.tracked.iter_mut() {
            if request.order_placed {
                continue;
            }
            if now.saturating_sub(request.first_seen_tick) < config.speculative_delay_ticks {
                continue;
            }
            if stock.level(&request.item) >= request.quantity {
                continue;
            }
            for supplier in &candidates {
                let Ok(summary) = network.summary(&supplier.network) else {
                    continue;
                };
                let available: u64 = summary
                    .iter()
                    .filter(|stack| stack.item == request.item)
                    .map(|stack| stack.count)
                    .sum();
                if available == 0 {
                    continue;
                }
                let line = ItemStack {
                    item: request.item.clone(),
                    count: request.quantity.min(available),
                };
                if !network.broadcast_order(
                    &supplier.network,
                    std::slice::from_ref(&line),
                    &supplier.address,
                ) {
                    continue;
                }
                self.next_order_id += 1;
                let order = IncomingOrder {
                    order_id: self.next_order_id,
                    item: line.item,
                    quantity: line.count,
                    requested_at_tick: now,
                    network: supplier.network.clone(),
                    eta_tick: now.saturating_add(config.assumed_transit_ticks),
                };
                debug!(target: "ordering", %token, %order, "speculative order placed");
                request.order_placed = true;
                report.placed.push(order);
                break;
            }
        }

        // Phase 3: drop requests that left the board or their open states.
        let tokens: Vec<RequestToken> = self.tracked.keys().copied().collect();
        for token in tokens {
            let still_open = board
                .request(token)
                .is_some_and(|view| is_trackable(view.state));
            if still_open {
                continue;
            }
            if let Some(request) = self.tracked.remove(&token) {
                if request.order_placed {
                    debug!(target: "ordering", %token, "tracked request closed with order in flight");
                    report.reconciled.push(token);
                }
            }
        }

        Some(report)
    }
}
