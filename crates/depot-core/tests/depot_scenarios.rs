//! Scripted end-to-end scenarios against the simulation harness.

use supplyline_contracts::{
    DepotConfig, ItemKey, NetworkId, PolicyEntry, RackId, RequestState, Requestable, SupplierEntry,
};
use supplyline_depot_core::catalog::{ItemCatalog, ItemInfo, ToolInfo};
use supplyline_depot_core::sim::{SimNetwork, SimWorld};
use supplyline_depot_core::storage::{ItemStorage, Rack};
use supplyline_depot_core::Depot;

const TRANSIT: u64 = 400;

fn catalog() -> ItemCatalog {
    let mut catalog = ItemCatalog::new();
    catalog.insert("stone", ItemInfo::default());
    catalog.insert(
        "bread",
        ItemInfo {
            edible: true,
            ..ItemInfo::default()
        },
    );
    catalog.insert(
        "coal",
        ItemInfo {
            burn_ticks: 1600,
            ..ItemInfo::default()
        },
    );
    catalog.insert(
        "iron_pickaxe",
        ItemInfo {
            tool: Some(ToolInfo {
                class: "pickaxe".to_string(),
                level: 2,
                damaged: false,
            }),
            ..ItemInfo::default()
        },
    );
    catalog
}

struct WorldBuilder {
    level: u32,
    warehouse: Vec<(&'static str, u64)>,
    local: Vec<(&'static str, u64)>,
    suppliers: Vec<SupplierEntry>,
    policies: Vec<PolicyEntry>,
    staging_lands_in_depot: bool,
}

impl WorldBuilder {
    fn new(level: u32) -> Self {
        Self {
            level,
            warehouse: Vec::new(),
            local: Vec::new(),
            suppliers: Vec::new(),
            policies: Vec::new(),
            staging_lands_in_depot: true,
        }
    }

    fn warehouse(mut self, item: &'static str, count: u64) -> Self {
        self.warehouse.push((item, count));
        self
    }

    fn local(mut self, item: &'static str, count: u64) -> Self {
        self.local.push((item, count));
        self
    }

    fn supplier(mut self, network: &str, priority: u8, speculative: bool) -> Self {
        self.suppliers.push(SupplierEntry {
            network: NetworkId::new(network),
            priority,
            address: format!("{network}-dock"),
            label: network.to_string(),
            allow_speculative: speculative,
        });
        self
    }

    fn policy(mut self, item: &'static str, target: u64) -> Self {
        self.policies.push(PolicyEntry::new(item, target));
        self
    }

    /// Ship staged orders into the void instead of the depot's racks.
    fn lose_staged_shipments(mut self) -> Self {
        self.staging_lands_in_depot = false;
        self
    }

    fn build(self) -> SimWorld {
        let config = DepotConfig::default();
        let staging_address = config.staging_address.clone();

        let mut depot = Depot::new(config, catalog());
        depot.set_building_level(self.level);
        depot.add_rack("rack-a");
        depot.add_rack("rack-b");
        depot.set_home_network(Some(NetworkId::new("warehouse")));
        for supplier in self.suppliers {
            depot.add_supplier(supplier);
        }
        for policy in self.policies {
            depot.add_policy(policy);
        }

        let mut storage = ItemStorage::new();
        let mut rack_a = Rack::new(16);
        for (slot, (item, count)) in self.local.iter().enumerate() {
            rack_a.set_slot(slot, Some(supplyline_contracts::ItemStack::new(*item, *count)));
        }
        storage.insert_rack("rack-a", rack_a);
        storage.insert_rack("rack-b", Rack::new(16));

        let mut network = SimNetwork::new(TRANSIT);
        for (item, count) in self.warehouse {
            network.set_stock("warehouse", item, count);
        }
        for dock in ["quarry-dock", "provisioner-dock"] {
            network.register_network_address(dock, "warehouse");
        }
        network.set_stock("quarry", "stone", 1000);
        network.set_stock("quarry", "coal", 300);
        network.set_stock("provisioner", "stone", 200);
        if self.staging_lands_in_depot {
            network.register_address(&staging_address, "rack-a");
        } else {
            network.register_address(&staging_address, "void");
        }
        SimWorld::new(depot, storage, network)
    }
}

fn rack_count(world: &SimWorld, item: &str) -> u64 {
    world.storage.count_of(
        &[RackId::new("rack-a"), RackId::new("rack-b")],
        &ItemKey::new(item),
    )
}

#[test]
fn local_stock_fulfills_without_any_network_traffic() {
    let mut world = WorldBuilder::new(1).local("stone", 64).build();
    let token = world.submit(Requestable::stack("stone", 32));
    world.run_ticks(10);

    assert_eq!(world.board.state(token), Some(RequestState::Completed));
    assert_eq!(rack_count(&world, "stone"), 32);
    assert!(world.depot.skill_progress() > 0.0);
    assert_eq!(world.network.stock_of("warehouse", "stone"), 0);
}

#[test]
fn remote_stock_stages_in_and_completes_the_request() {
    let mut world = WorldBuilder::new(4).warehouse("stone", 40).build();
    let token = world.submit(Requestable::stack("stone", 32));
    world.run_ticks(700);

    assert_eq!(world.board.state(token), Some(RequestState::Completed));
    // 32 staged out of the warehouse, then handed to the requester.
    assert_eq!(world.network.stock_of("warehouse", "stone"), 8);
    assert_eq!(rack_count(&world, "stone"), 0);
    let status = world.depot.status();
    assert_eq!(status.pending_staging, 0);
    assert_eq!(status.buffered_staging, 0);
}

#[test]
fn below_network_tier_remote_stock_is_invisible() {
    let mut world = WorldBuilder::new(3).warehouse("stone", 40).build();
    let token = world.submit(Requestable::stack("stone", 32));
    world.run_ticks(300);

    assert_eq!(world.board.state(token), Some(RequestState::Assigning));
    assert_eq!(world.network.stock_of("warehouse", "stone"), 40);
}

#[test]
fn lost_staged_shipment_times_out_and_is_abandoned() {
    let mut world = WorldBuilder::new(4)
        .warehouse("stone", 40)
        .lose_staged_shipments()
        .build();
    let token = world.submit(Requestable::stack("stone", 32));
    world.run_ticks(1500);

    // The broadcast went out and drained the warehouse below the minimum,
    // the shipment never arrived, and the staging request was dropped after
    // the timeout without completing the board request.
    assert_ne!(world.board.state(token), Some(RequestState::Completed));
    assert_eq!(world.network.stock_of("warehouse", "stone"), 8);
    assert_eq!(world.depot.status().pending_staging, 0);
    assert_eq!(rack_count(&world, "stone"), 0);
}

#[test]
fn tool_requests_stage_a_single_item() {
    let mut world = WorldBuilder::new(4).warehouse("iron_pickaxe", 3).build();
    let token = world.submit(Requestable::Tool {
        class: "pickaxe".to_string(),
        min_level: 0,
        max_level: 4,
        exemplar: Some(ItemKey::new("iron_pickaxe")),
    });
    world.run_ticks(700);

    assert_eq!(world.board.state(token), Some(RequestState::Completed));
    assert_eq!(world.network.stock_of("warehouse", "iron_pickaxe"), 2);
}

#[test]
fn food_requests_stage_the_best_available_edible_item() {
    let mut world = WorldBuilder::new(4).warehouse("bread", 24).build();
    let token = world.submit(Requestable::Food { count: 8 });
    world.run_ticks(700);

    assert_eq!(world.board.state(token), Some(RequestState::Completed));
    assert_eq!(world.network.stock_of("warehouse", "bread"), 16);
}

#[test]
fn cancelling_an_assigned_request_purges_staging_and_keeps_the_orphan_shipment() {
    let mut world = WorldBuilder::new(4).warehouse("stone", 40).build();
    let token = world.submit(Requestable::stack("stone", 32));
    // Far enough for assignment, staging, and the bundle broadcast.
    world.run_ticks(150);
    assert_eq!(world.board.state(token), Some(RequestState::InProgress));

    world.cancel(token);
    world.run_ticks(150);
    assert_eq!(world.board.state(token), Some(RequestState::Cancelled));
    assert_eq!(world.depot.status().pending_staging, 0);

    // The shipment was already in transit; it lands as orphan stock.
    world.run_ticks(400);
    assert_eq!(rack_count(&world, "stone"), 32);
    assert_eq!(world.board.state(token), Some(RequestState::Cancelled));
}

#[test]
fn restock_policy_orders_the_deficit_and_matches_the_arrival() {
    let mut world = WorldBuilder::new(5)
        .warehouse("stone", 40)
        .supplier("quarry", 1, false)
        .policy("stone", 128)
        .build();
    world.run_ticks(2);
    assert_eq!(world.depot.status().active_restock_orders, 1);
    assert_eq!(world.network.stock_of("quarry", "stone"), 1000 - 88);

    // Transit plus a snapshot cycle: the arrival clears the order and the
    // met target never reorders.
    world.run_ticks(1300);
    let status = world.depot.status();
    assert_eq!(status.active_restock_orders, 0);
    assert_eq!(world.network.stock_of("warehouse", "stone"), 128);
    assert_eq!(world.network.stock_of("quarry", "stone"), 1000 - 88);
}

#[test]
fn speculative_order_preloads_the_warehouse_for_a_stuck_request() {
    let mut world = WorldBuilder::new(4)
        .supplier("provisioner", 1, true)
        .build();
    let token = world.submit(Requestable::stack("stone", 32));
    // No local stock, empty warehouse: the request is stuck until the
    // speculative engine buys ahead after its delay gate.
    world.run_ticks(500);
    assert_ne!(world.board.state(token), Some(RequestState::Completed));
    assert_eq!(world.network.stock_of("provisioner", "stone"), 200);

    world.run_ticks(1500);
    assert_eq!(world.board.state(token), Some(RequestState::Completed));
    // Exactly one speculative order went out.
    assert_eq!(world.network.stock_of("provisioner", "stone"), 168);
    assert_eq!(world.depot.status().tracked_speculative, 0);
}

#[test]
fn two_depots_share_nothing() {
    let mut first = WorldBuilder::new(4).warehouse("stone", 40).build();
    let second = WorldBuilder::new(4).build();
    let token = first.submit(Requestable::stack("stone", 32));
    first.run_ticks(700);

    assert_eq!(first.board.state(token), Some(RequestState::Completed));
    assert_eq!(second.depot.status().pending_staging, 0);
    assert_eq!(second.depot.skill_progress(), 0.0);
}
