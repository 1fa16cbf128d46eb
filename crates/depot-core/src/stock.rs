//! Cached stock summary of the depot's home remote network.
//!
//! The network is only queried on the snapshot cadence; every availability
//! probe in between reads this cache. Reserve gauges let operators keep a
//! floor of an item on the remote side that predicate-based orders (tag,
//! food, fuel, tool) will not dip into.

use std::collections::BTreeMap;

use tracing::debug;

use supplyline_contracts::{ItemKey, NetworkId, Requestable};

use crate::catalog::ItemCatalog;
use crate::collaborators::LogisticsNetwork;

/// One detected per-item stock increase between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockArrival {
    pub item: ItemKey,
    pub increase: u64,
}

/// Outcome of a snapshot refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotUpdate {
    /// Whether any level moved since the previous snapshot.
    pub changed: bool,
    pub arrivals: Vec<StockArrival>,
}

#[derive(Debug, Clone, Default)]
pub struct StockSnapshot {
    levels: BTreeMap<ItemKey, u64>,
    gauges: BTreeMap<ItemKey, u64>,
    last_refresh_tick: Option<u64>,
    has_snapshot: bool,
}

impl StockSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh from the network when the interval has elapsed. Returns what
    /// moved; `None` when not due or the summary failed (the failure is
    /// swallowed and retried next cycle).
    pub fn refresh_if_due(
        &mut self,
        now: u64,
        interval_ticks: u64,
        network: &dyn LogisticsNetwork,
        home: &NetworkId,
    ) -> Option<SnapshotUpdate> {
        if let Some(last) = self.last_refresh_tick {
            if now.saturating_sub(last) < interval_ticks {
                return None;
            }
        }
        self.last_refresh_tick = Some(now);

        let summary = match network.summary(home) {
            Ok(summary) => summary,
            Err(err) => {
                debug!(target: "inventory", %home, %err, "stock summary unavailable");
                return None;
            }
        };

        let mut fresh: BTreeMap<ItemKey, u64> = BTreeMap::new();
        for stack in summary {
            *fresh.entry(stack.item).or_insert(0) += stack.count;
        }

        let arrivals: Vec<StockArrival> = fresh
            .iter()
            .filter_map(|(item, count)| {
                let before = self.levels.get(item).copied().unwrap_or(0);
                (*count > before).then(|| StockArrival {
                    item: item.clone(),
                    increase: count - before,
                })
            })
            .collect();
        let changed = !self.has_snapshot || fresh != self.levels;

        self.levels = fresh;
        self.has_snapshot = true;
        Some(SnapshotUpdate { changed, arrivals })
    }

    pub fn is_empty(&self) -> bool {
        !self.has_snapshot || self.levels.is_empty()
    }

    pub fn level(&self, item: &ItemKey) -> u64 {
        self.levels.get(item).copied().unwrap_or(0)
    }

    pub fn set_gauge(&mut self, item: impl Into<String>, reserve: u64) {
        self.gauges.insert(ItemKey::new(item), reserve);
    }

    /// Level minus the operator reserve for the item.
    pub fn available_after_reserve(&self, item: &ItemKey) -> u64 {
        self.level(item)
            .saturating_sub(self.gauges.get(item).copied().unwrap_or(0))
    }

    /// Matching items with non-zero reserve-adjusted availability, in key
    /// order.
    pub fn matching_entries(&self, catalog: &ItemCatalog, wanted: &Requestable) -> Vec<(ItemKey, u64)> {
        self.levels
            .keys()
            .filter(|item| catalog.matches(wanted, item))
            .map(|item| (item.clone(), self.available_after_reserve(item)))
            .filter(|(_, available)| *available > 0)
            .collect()
    }

    /// Whether the remote network holds enough of `wanted` to be worth an
    /// order, per the kind's minimum threshold.
    pub fn is_available(&self, catalog: &ItemCatalog, wanted: &Requestable) -> bool {
        if self.is_empty() {
            return false;
        }
        match wanted {
            Requestable::Stack { item, .. } => {
                self.level(item) >= wanted.minimum_required().max(1)
            }
            Requestable::Tool { .. } => !self.matching_entries(catalog, wanted).is_empty(),
            _ => {
                let total: u64 = self
                    .matching_entries(catalog, wanted)
                    .iter()
                    .map(|(_, available)| available)
                    .sum();
                total >= wanted.minimum_required().max(1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ItemInfo;
    use crate::collaborators::NetworkError;
    use supplyline_contracts::ItemStack;

    struct FixedNetwork {
        summary: Result<Vec<ItemStack>, NetworkError>,
    }

    impl LogisticsNetwork for FixedNetwork {
        fn summary(&self, _network: &NetworkId) -> Result<Vec<ItemStack>, NetworkError> {
            self.summary.clone()
        }

        fn broadcast_order(
            &mut self,
            _network: &NetworkId,
            _lines: &[ItemStack],
            _address: &str,
        ) -> bool {
            true
        }
    }

    fn home() -> NetworkId {
        NetworkId::new("home")
    }

    #[test]
    fn refresh_respects_interval_and_detects_increases() {
        let mut snapshot = StockSnapshot::new();
        let mut network = FixedNetwork {
            summary: Ok(vec![ItemStack::new("stone", 10)]),
        };
        let update = snapshot
            .refresh_if_due(0, 200, &network, &home())
            .expect("first refresh runs");
        assert!(update.changed);
        assert_eq!(update.arrivals.len(), 1);

        assert!(snapshot.refresh_if_due(100, 200, &network, &home()).is_none());

        network.summary = Ok(vec![ItemStack::new("stone", 25)]);
        let update = snapshot
            .refresh_if_due(200, 200, &network, &home())
            .expect("due again");
        assert!(update.changed);
        assert_eq!(
            update.arrivals,
            vec![StockArrival {
                item: ItemKey::new("stone"),
                increase: 15
            }]
        );
    }

    #[test]
    fn unchanged_summary_reports_no_change() {
        let mut snapshot = StockSnapshot::new();
        let network = FixedNetwork {
            summary: Ok(vec![ItemStack::new("stone", 10)]),
        };
        snapshot.refresh_if_due(0, 200, &network, &home());
        let update = snapshot
            .refresh_if_due(200, 200, &network, &home())
            .expect("due");
        assert!(!update.changed);
        assert!(update.arrivals.is_empty());
    }

    #[test]
    fn failed_summary_keeps_previous_levels() {
        let mut snapshot = StockSnapshot::new();
        let ok = FixedNetwork {
            summary: Ok(vec![ItemStack::new("stone", 10)]),
        };
        snapshot.refresh_if_due(0, 200, &ok, &home());
        let failing = FixedNetwork {
            summary: Err(NetworkError::Unreachable(home())),
        };
        assert!(snapshot.refresh_if_due(200, 200, &failing, &home()).is_none());
        assert_eq!(snapshot.level(&ItemKey::new("stone")), 10);
    }

    #[test]
    fn gauges_reserve_stock_from_predicate_matching() {
        let mut snapshot = StockSnapshot::new();
        let network = FixedNetwork {
            summary: Ok(vec![ItemStack::new("coal", 10)]),
        };
        snapshot.refresh_if_due(0, 200, &network, &home());
        snapshot.set_gauge("coal", 8);

        let mut catalog = ItemCatalog::new();
        catalog.insert(
            "coal",
            ItemInfo {
                burn_ticks: 1600,
                ..ItemInfo::default()
            },
        );
        let fuel = Requestable::Fuel { count: 5 };
        assert_eq!(snapshot.available_after_reserve(&ItemKey::new("coal")), 2);
        assert!(!snapshot.is_available(&catalog, &fuel));
        // Exact stack requests see the raw level.
        assert!(snapshot.is_available(&catalog, &Requestable::stack("coal", 5)));
    }
}
