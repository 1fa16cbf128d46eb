//! The per-building depot orchestrator.
//!
//! One `Depot` owns every piece of coordination state for one building:
//! resolver, staging, stock snapshot, restock and speculative engines, the
//! operator notice buffer, and accumulated skill progress. Nothing is
//! global; two depots in the same colony never share state. The embedding
//! host drives it with `server_tick` once per tick and routes board polls
//! to the resolver entry points.

use std::collections::VecDeque;

use tracing::debug;

use supplyline_contracts::{
    DepotConfig, DepotStatus, NetworkId, PolicyEntry, RackId, RequestState, RequestToken,
    RequestView, SupplierEntry, SCHEMA_VERSION_V1,
};

use crate::catalog::ItemCatalog;
use crate::collaborators::{LogisticsNetwork, RequestBoard};
use crate::resolver::{AttemptOutcome, LocalView, Resolver};
use crate::restock::RestockEngine;
use crate::speculative::SpeculativeEngine;
use crate::staging::StagingCoordinator;
use crate::stock::StockSnapshot;
use crate::storage::{self, ItemStorage};

const NOTICE_CAPACITY: usize = 32;

/// Operator-facing complaint, kept in a bounded ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub tick: u64,
    pub message: String,
}

/// Collaborators handed in for one tick. The depot never stores them.
pub struct TickContext<'a> {
    pub storage: &'a ItemStorage,
    pub board: &'a mut dyn RequestBoard,
    pub network: &'a mut dyn LogisticsNetwork,
}

pub struct Depot {
    config: DepotConfig,
    building_level: u32,
    racks: Vec<RackId>,
    home_network: Option<NetworkId>,
    catalog: ItemCatalog,
    policies: Vec<PolicyEntry>,
    suppliers: Vec<SupplierEntry>,
    resolver: Resolver,
    staging: StagingCoordinator,
    stock: StockSnapshot,
    restock: RestockEngine,
    speculative: SpeculativeEngine,
    skill_progress: f64,
    notices: VecDeque<Notice>,
    last_tick: u64,
    last_signature: Option<u64>,
    last_signature_tick: Option<u64>,
}

impl Depot {
    pub fn new(config: DepotConfig, catalog: ItemCatalog) -> Self {
        let resolver = Resolver::new(config.resolver_priority);
        Self {
            config,
            building_level: 1,
            racks: Vec::new(),
            home_network: None,
            catalog,
            policies: Vec::new(),
            suppliers: Vec::new(),
            resolver,
            staging: StagingCoordinator::new(),
            stock: StockSnapshot::new(),
            restock: RestockEngine::new(),
            speculative: SpeculativeEngine::new(),
            skill_progress: 0.0,
            notices: VecDeque::new(),
            last_tick: 0,
            last_signature: None,
            last_signature_tick: None,
        }
    }

    // -- building wiring ----------------------------------------------------

    pub fn set_building_level(&mut self, level: u32) {
        self.building_level = level;
    }

    pub fn add_rack(&mut self, rack: impl Into<String>) {
        self.racks.push(RackId::new(rack));
    }

    pub fn set_home_network(&mut self, network: Option<NetworkId>) {
        self.home_network = network;
    }

    pub fn add_policy(&mut self, policy: PolicyEntry) {
        self.policies.push(policy);
    }

    pub fn add_supplier(&mut self, supplier: SupplierEntry) {
        self.suppliers.push(supplier);
    }

    pub fn set_stock_gauge(&mut self, item: impl Into<String>, reserve: u64) {
        self.stock.set_gauge(item, reserve);
    }

    pub fn config(&self) -> &DepotConfig {
        &self.config
    }

    pub fn skill_progress(&self) -> f64 {
        self.skill_progress
    }

    pub fn notices(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter()
    }

    /// Remote-network features unlock at the network tier, and only with a
    /// home network wired up.
    pub fn has_network_access(&self) -> bool {
        self.building_level >= self.config.network_access_tier && self.home_network.is_some()
    }

    pub fn can_restock(&self) -> bool {
        self.building_level >= self.config.restock_tier
    }

    pub fn status(&self) -> DepotStatus {
        DepotStatus {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            tick: self.last_tick,
            building_level: self.building_level,
            home_network: self.home_network.clone(),
            pending_staging: self.staging.pending_count(),
            buffered_staging: self.staging.buffered_count(),
            active_restock_orders: self.restock.active_order_count(),
            tracked_speculative: self.speculative.tracked_count(),
            incoming_orders: self.restock.active_order_count() + self.speculative.orders_in_flight(),
            skill_progress: self.skill_progress,
        }
    }

    // -- tick loop ----------------------------------------------------------

    /// One server tick. `worker_active` reflects whether the building's
    /// worker is present; network work pauses without them, inventory
    /// observation does not.
    pub fn server_tick(&mut self, now: u64, worker_active: bool, ctx: &mut TickContext<'_>) {
        self.last_tick = now;
        self.refresh_signature_if_due(now, ctx);
        if !worker_active {
            return;
        }
        if self.has_network_access() {
            self.refresh_stock_if_due(now, ctx);
            self.process_staging_if_due(now, ctx);
            self.process_speculative_if_due(now, ctx);
            if self.can_restock() {
                self.process_restock_if_due(now, ctx);
            }
        }
    }

    fn refresh_signature_if_due(&mut self, now: u64, ctx: &mut TickContext<'_>) {
        if let Some(last) = self.last_signature_tick {
            if now.saturating_sub(last) < self.config.inventory_signature_interval_ticks {
                return;
            }
        }
        self.last_signature_tick = Some(now);
        let signature = storage::inventory_signature(ctx.storage, &self.racks);
        if self.last_signature == Some(signature) {
            return;
        }
        let first = self.last_signature.is_none();
        self.last_signature = Some(signature);
        if !first {
            debug!(target: "inventory", signature, "rack contents changed");
            Self::reevaluate_open_requests(ctx.board);
        }
    }

    /// Re-offer open, childless requests to resolvers after anything that
    /// might newly satisfy them (rack change, stock change, staged arrival).
    fn reevaluate_open_requests(board: &mut dyn RequestBoard) {
        board.on_colony_update(&mut |view| {
            !view.has_children
                && matches!(
                    view.state,
                    RequestState::Assigning | RequestState::InProgress
                )
        });
    }

    fn refresh_stock_if_due(&mut self, now: u64, ctx: &mut TickContext<'_>) {
        let Some(home) = self.home_network.clone() else {
            return;
        };
        let Some(update) = self.stock.refresh_if_due(
            now,
            self.config.stock_snapshot_interval_ticks,
            ctx.network,
            &home,
        ) else {
            return;
        };
        for arrival in &update.arrivals {
            self.restock.on_stock_arrival(&arrival.item, arrival.increase);
        }
        if update.changed {
            Self::reevaluate_open_requests(ctx.board);
        }
    }

    fn process_staging_if_due(&mut self, now: u64, ctx: &mut TickContext<'_>) {
        let home = self.home_network.clone();
        let mut completed = 0usize;
        self.staging.process_if_due(
            now,
            &self.config,
            ctx.storage,
            &self.racks,
            ctx.network,
            home.as_ref(),
            |_token| completed += 1,
        );
        if completed > 0 {
            Self::reevaluate_open_requests(ctx.board);
        }
    }

    fn process_speculative_if_due(&mut self, now: u64, ctx: &mut TickContext<'_>) {
        self.speculative.process_if_due(
            now,
            &self.config,
            &self.suppliers,
            &self.stock,
            ctx.board,
            ctx.network,
        );
    }

    fn process_restock_if_due(&mut self, now: u64, ctx: &mut TickContext<'_>) {
        let Some(report) = self.restock.process_if_due(
            now,
            &self.config,
            &self.policies,
            &self.suppliers,
            &self.stock,
            ctx.network,
        ) else {
            return;
        };
        for warning in report.warnings {
            self.push_notice(now, warning);
        }
        for order in report.expired {
            self.push_notice(now, format!("{order} never arrived"));
        }
    }

    fn push_notice(&mut self, tick: u64, message: String) {
        if self.notices.len() == NOTICE_CAPACITY {
            self.notices.pop_front();
        }
        self.notices.push_back(Notice { tick, message });
    }

    // -- resolver protocol surface ------------------------------------------

    fn local_view<'a>(&'a self, storage: &'a ItemStorage) -> LocalView<'a> {
        LocalView {
            storage,
            racks: &self.racks,
            catalog: &self.catalog,
        }
    }

    pub fn can_resolve(&self, view: &RequestView, storage: &ItemStorage) -> bool {
        self.resolver.can_resolve(
            view,
            &self.local_view(storage),
            &self.stock,
            self.has_network_access(),
        )
    }

    pub fn attempt_resolve(
        &mut self,
        view: &RequestView,
        storage: &ItemStorage,
        now: u64,
    ) -> AttemptOutcome {
        let network_access = self.has_network_access();
        let local = LocalView {
            storage,
            racks: &self.racks,
            catalog: &self.catalog,
        };
        self.resolver
            .attempt_resolve(view, &local, &self.stock, &mut self.staging, network_access, now)
    }

    pub fn on_request_assigned(&mut self, view: &RequestView, storage: &ItemStorage) {
        let local = LocalView {
            storage,
            racks: &self.racks,
            catalog: &self.catalog,
        };
        self.resolver.on_request_assigned(view, &local);
    }

    pub fn on_assigned_request_cancelled(&mut self, token: RequestToken) {
        self.resolver
            .on_assigned_request_cancelled(token, &mut self.staging);
    }

    /// Spawn the delivery children for a resolved request. Returns the child
    /// tokens; skill progress accrues on the depot.
    pub fn followup_for_completion(
        &mut self,
        view: &RequestView,
        storage: &ItemStorage,
        board: &mut dyn RequestBoard,
    ) -> Vec<RequestToken> {
        let local = LocalView {
            storage,
            racks: &self.racks,
            catalog: &self.catalog,
        };
        let result = self.resolver.followup_for_completion(
            view,
            &local,
            &mut self.staging,
            board,
            &self.config.xp,
        );
        self.skill_progress += result.xp_awarded;
        result.children
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::NetworkError;
    use crate::storage::Rack;
    use std::collections::BTreeMap;
    use supplyline_contracts::{DeliveryOrder, ItemStack, Requestable};

    #[derive(Default)]
    struct CountingBoard {
        reevaluations: usize,
    }

    impl RequestBoard for CountingBoard {
        fn on_colony_update(&mut self, _p: &mut dyn FnMut(&RequestView) -> bool) {
            self.reevaluations += 1;
        }

        fn create_child_request(
            &mut self,
            _parent: RequestToken,
            _delivery: DeliveryOrder,
        ) -> RequestToken {
            RequestToken(0)
        }

        fn request(&self, _token: RequestToken) -> Option<RequestView> {
            None
        }

        fn update_request_state(&mut self, _token: RequestToken, _state: RequestState) {}
    }

    #[derive(Default)]
    struct StubNetwork {
        stock: BTreeMap<NetworkId, Vec<ItemStack>>,
        summaries: std::cell::Cell<usize>,
        broadcasts: usize,
    }

    impl LogisticsNetwork for StubNetwork {
        fn summary(&self, network: &NetworkId) -> Result<Vec<ItemStack>, NetworkError> {
            self.summaries.set(self.summaries.get() + 1);
            self.stock
                .get(network)
                .cloned()
                .ok_or_else(|| NetworkError::Unreachable(network.clone()))
        }

        fn broadcast_order(
            &mut self,
            _network: &NetworkId,
            _lines: &[ItemStack],
            _address: &str,
        ) -> bool {
            self.broadcasts += 1;
            true
        }
    }

    fn depot_at_level(level: u32) -> Depot {
        let mut depot = Depot::new(DepotConfig::default(), ItemCatalog::new());
        depot.set_building_level(level);
        depot.add_rack("rack");
        depot.set_home_network(Some(NetworkId::new("home")));
        depot
    }

    fn storage_with_stone(count: u64) -> ItemStorage {
        let mut storage = ItemStorage::new();
        let mut rack = Rack::new(4);
        if count > 0 {
            rack.set_slot(0, Some(ItemStack::new("stone", count)));
        }
        storage.insert_rack("rack", rack);
        storage
    }

    #[test]
    fn network_work_requires_tier_and_worker() {
        let storage = storage_with_stone(0);
        let mut network = StubNetwork::default();
        network
            .stock
            .insert(NetworkId::new("home"), vec![ItemStack::new("stone", 10)]);

        let mut low = depot_at_level(3);
        let mut board = CountingBoard::default();
        low.server_tick(
            0,
            true,
            &mut TickContext {
                storage: &storage,
                board: &mut board,
                network: &mut network,
            },
        );
        assert_eq!(network.summaries.get(), 0, "below tier: no network traffic");

        let mut high = depot_at_level(4);
        high.server_tick(
            0,
            false,
            &mut TickContext {
                storage: &storage,
                board: &mut board,
                network: &mut network,
            },
        );
        assert_eq!(network.summaries.get(), 0, "no worker: no network traffic");

        high.server_tick(
            1,
            true,
            &mut TickContext {
                storage: &storage,
                board: &mut board,
                network: &mut network,
            },
        );
        assert!(network.summaries.get() > 0);
    }

    #[test]
    fn rack_changes_reevaluate_open_requests_on_the_signature_cadence() {
        let mut depot = depot_at_level(1);
        let mut board = CountingBoard::default();
        let mut network = StubNetwork::default();

        let storage = storage_with_stone(10);
        depot.server_tick(
            0,
            true,
            &mut TickContext {
                storage: &storage,
                board: &mut board,
                network: &mut network,
            },
        );
        // Baseline signature; no re-evaluation for the first observation.
        assert_eq!(board.reevaluations, 0);

        let changed = storage_with_stone(5);
        let interval = depot.config.inventory_signature_interval_ticks;
        depot.server_tick(
            interval,
            true,
            &mut TickContext {
                storage: &changed,
                board: &mut board,
                network: &mut network,
            },
        );
        assert_eq!(board.reevaluations, 1);

        // Unchanged contents stay quiet.
        depot.server_tick(
            2 * interval,
            true,
            &mut TickContext {
                storage: &changed,
                board: &mut board,
                network: &mut network,
            },
        );
        assert_eq!(board.reevaluations, 1);
    }

    #[test]
    fn stock_arrivals_feed_restock_matching_and_reevaluation() {
        let mut depot = depot_at_level(5);
        depot.add_policy(PolicyEntry::new("stone", 64));
        depot.add_supplier(SupplierEntry {
            network: NetworkId::new("mill"),
            priority: 1,
            address: "mill-dock".to_string(),
            label: "Mill".to_string(),
            allow_speculative: false,
        });
        let mut board = CountingBoard::default();
        let mut network = StubNetwork::default();
        network
            .stock
            .insert(NetworkId::new("home"), vec![ItemStack::new("stone", 1)]);
        network
            .stock
            .insert(NetworkId::new("mill"), vec![ItemStack::new("stone", 500)]);
        let storage = storage_with_stone(0);

        depot.server_tick(
            0,
            true,
            &mut TickContext {
                storage: &storage,
                board: &mut board,
                network: &mut network,
            },
        );
        assert_eq!(depot.status().active_restock_orders, 1);
        let first_reevals = board.reevaluations;

        // The ordered stock lands on the home network.
        network
            .stock
            .insert(NetworkId::new("home"), vec![ItemStack::new("stone", 64)]);
        depot.server_tick(
            depot.config.stock_snapshot_interval_ticks,
            true,
            &mut TickContext {
                storage: &storage,
                board: &mut board,
                network: &mut network,
            },
        );
        assert_eq!(depot.status().active_restock_orders, 0);
        assert!(board.reevaluations > first_reevals);
    }

    #[test]
    fn followup_accrues_skill_progress() {
        let mut depot = depot_at_level(1);
        let storage = storage_with_stone(64);
        let view = RequestView {
            token: RequestToken(1),
            state: RequestState::InProgress,
            requestable: Requestable::stack("stone", 32),
            has_children: false,
        };
        depot.on_request_assigned(&view, &storage);
        let mut board = CountingBoard::default();
        let children = depot.followup_for_completion(&view, &storage, &mut board);
        assert_eq!(children.len(), 1);
        assert!(depot.skill_progress() > 0.0);
    }

    #[test]
    fn status_reflects_component_counters() {
        let depot = depot_at_level(4);
        let status = depot.status();
        assert_eq!(status.building_level, 4);
        assert_eq!(status.pending_staging, 0);
        assert_eq!(status.home_network, Some(NetworkId::new("home")));
        assert!(!depot.can_restock());
    }
}
