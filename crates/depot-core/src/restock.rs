//! Policy-driven restocking.
//!
//! Operators set a target quantity per item; on the restock cadence the
//! engine compares targets against the home-network stock snapshot, walks
//! suppliers in priority order for each deficit, and places one batched
//! broadcast per supplier. Placed orders are tracked per item until a stock
//! arrival matches them or they expire past their ETA grace window.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use supplyline_contracts::{
    DepotConfig, IncomingOrder, ItemKey, ItemStack, NetworkId, PolicyEntry, SupplierEntry,
};

use crate::collaborators::LogisticsNetwork;
use crate::stock::StockSnapshot;

/// What one restock cycle did.
#[derive(Debug, Default)]
pub struct RestockReport {
    pub placed: Vec<IncomingOrder>,
    pub expired: Vec<IncomingOrder>,
    /// Operator-facing complaints, e.g. a stocked supplier with no address.
    pub warnings: Vec<String>,
}

#[derive(Debug, Default)]
pub struct RestockEngine {
    /// Active orders per item, oldest first.
    active: BTreeMap<ItemKey, Vec<IncomingOrder>>,
    next_order_id: u64,
    last_check_tick: Option<u64>,
}

impl RestockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_order_count(&self) -> usize {
        self.active.values().map(Vec::len).sum()
    }

    pub fn orders(&self) -> impl Iterator<Item = &IncomingOrder> {
        self.active.values().flatten()
    }

    /// Run one restock cycle when the interval has elapsed.
    pub fn process_if_due(
        &mut self,
        now: u64,
        config: &DepotConfig,
        policies: &[PolicyEntry],
        suppliers: &[SupplierEntry],
        stock: &StockSnapshot,
        network: &mut dyn LogisticsNetwork,
    ) -> Option<RestockReport> {
        if let Some(last) = self.last_check_tick {
            if now.saturating_sub(last) < config.restock_interval_ticks {
                return None;
            }
        }
        self.last_check_tick = Some(now);

        let mut report = RestockReport {
            expired: self.cleanup_expired(now, config),
            ..RestockReport::default()
        };
        if policies.is_empty() || suppliers.is_empty() {
            return Some(report);
        }

        let mut by_priority: Vec<&SupplierEntry> = suppliers.iter().collect();
        by_priority.sort_by(|a, b| (a.priority, &a.network).cmp(&(b.priority, &b.network)));

        // One warning per supplier per cycle, however many items it blocks.
        let mut warned: BTreeSet<NetworkId> = BTreeSet::new();
        // Lines batched per supplier network: (address, order lines).
        let mut planned: BTreeMap<NetworkId, (String, Vec<ItemStack>)> = BTreeMap::new();

        for policy in policies {
            let local = stock.level(&policy.item);
            if local >= policy.target_quantity {
                // Target met; any completed order chain is done with.
                self.active.remove(&policy.item);
                continue;
            }
            if self.active.contains_key(&policy.item) {
                debug!(
                    target: "dispatch",
                    item = %policy.item,
                    "restock order already active, skipping"
                );
                continue;
            }
            let deficit = policy.target_quantity - local;

            for supplier in &by_priority {
                let summary = match network.summary(&supplier.network) {
                    Ok(summary) => summary,
                    Err(err) => {
                        debug!(target: "dispatch", network = %supplier.network, %err, "supplier summary unavailable");
                        continue;
                    }
                };
                let available: u64 = summary
                    .iter()
                    .filter(|stack| stack.item == policy.item)
                    .map(|stack| stack.count)
                    .sum();
                if available == 0 {
                    continue;
                }
                if !supplier.has_valid_address() {
                    if warned.insert(supplier.network.clone()) {
                        let message = format!(
                            "supplier {} ({}) has stock but no delivery address",
                            supplier.label, supplier.network
                        );
                        warn!(target: "dispatch", "{message}");
                        report.warnings.push(message);
                    }
                    continue;
                }
                let quantity = deficit.min(available);
                planned
                    .entry(supplier.network.clone())
                    .or_insert_with(|| (supplier.address.clone(), Vec::new()))
                    .1
                    .push(ItemStack {
                        item: policy.item.clone(),
                        count: quantity,
                    });
                break;
            }
        }

        for (network_id, (address, lines)) in planned {
            if !network.broadcast_order(&network_id, &lines, &address) {
                debug!(target: "dispatch", network = %network_id, "restock broadcast refused, retrying next cycle");
                continue;
            }
            for line in lines {
                self.next_order_id += 1;
                let order = IncomingOrder {
                    order_id: self.next_order_id,
                    item: line.item.clone(),
                    quantity: line.count,
                    requested_at_tick: now,
                    network: network_id.clone(),
                    eta_tick: now.saturating_add(config.assumed_transit_ticks),
                };
                debug!(target: "dispatch", %order, "restock order placed");
                self.active.entry(line.item).or_default().push(order.clone());
                report.placed.push(order);
            }
        }
        Some(report)
    }

    /// Match a detected stock increase against active orders: an order with
    /// the exact quantity first, otherwise the oldest order for the item
    /// when the arrival covers it. Smaller trickle arrivals leave every
    /// order waiting.
    pub fn on_stock_arrival(&mut self, item: &ItemKey, increase: u64) {
        let Some(orders) = self.active.get_mut(item) else {
            return;
        };
        let index = match orders.iter().position(|order| order.quantity == increase) {
            Some(index) => index,
            None if orders.first().is_some_and(|oldest| increase >= oldest.quantity) => 0,
            None => return,
        };
        let order = orders.remove(index);
        debug!(target: "dispatch", %order, increase, "restock order fulfilled by arrival");
        if orders.is_empty() {
            self.active.remove(item);
        }
    }

    fn cleanup_expired(&mut self, now: u64, config: &DepotConfig) -> Vec<IncomingOrder> {
        let mut expired = Vec::new();
        self.active.retain(|_, orders| {
            orders.retain(|order| {
                if now > order.expiry_tick(config.order_expiry_buffer_ticks) {
                    warn!(target: "dispatch", %order, "restock order expired without arrival");
                    expired.push(order.clone());
                    false
                } else {
                    true
                }
            });
            !orders.is_empty()
        });
        expired
    }
}
