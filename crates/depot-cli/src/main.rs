use std::env;

use tracing_subscriber::EnvFilter;

use supplyline_contracts::{
    DepotConfig, NetworkId, PolicyEntry, Requestable, SupplierEntry,
};
use supplyline_depot_core::catalog::{ItemCatalog, ItemInfo, ToolInfo};
use supplyline_depot_core::sim::{SimNetwork, SimWorld};
use supplyline_depot_core::storage::{ItemStorage, Rack};
use supplyline_depot_core::Depot;

fn print_usage() {
    println!("depot-cli <command>");
    println!("commands:");
    println!("  config");
    println!("    prints the default depot configuration as json");
    println!("  simulate [ticks] [status_every]");
    println!("    runs the scripted depot scenario, printing a json status line");
    println!("    every status_every ticks (defaults: 2400, 400)");
}

fn parse_u64(value: Option<&String>, label: &str, default: u64) -> Result<u64, String> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| format!("invalid {}: {}", label, raw)),
    }
}

fn scenario_catalog() -> ItemCatalog {
    let mut catalog = ItemCatalog::new();
    catalog.insert("stone", ItemInfo::default());
    catalog.insert("oak_plank", ItemInfo {
        burn_ticks: 300,
        ..ItemInfo::default()
    });
    catalog.insert("coal", ItemInfo {
        burn_ticks: 1600,
        ..ItemInfo::default()
    });
    catalog.insert("bread", ItemInfo {
        edible: true,
        ..ItemInfo::default()
    });
    catalog.insert("iron_pickaxe", ItemInfo {
        tool: Some(ToolInfo {
            class: "pickaxe".to_string(),
            level: 2,
            damaged: false,
        }),
        ..ItemInfo::default()
    });
    catalog
}

fn scenario_world() -> SimWorld {
    let config = DepotConfig::default();
    let staging_address = config.staging_address.clone();

    let mut depot = Depot::new(config, scenario_catalog());
    depot.set_building_level(5);
    depot.add_rack("rack-a");
    depot.add_rack("rack-b");
    depot.set_home_network(Some(NetworkId::new("warehouse")));
    depot.add_policy(PolicyEntry::new("stone", 128));
    depot.add_policy(PolicyEntry::new("coal", 64));
    depot.add_supplier(SupplierEntry {
        network: NetworkId::new("quarry"),
        priority: 1,
        address: "quarry-dock".to_string(),
        label: "Quarry Cooperative".to_string(),
        allow_speculative: false,
    });
    depot.add_supplier(SupplierEntry {
        network: NetworkId::new("provisioner"),
        priority: 2,
        address: "provisioner-dock".to_string(),
        label: "Provisioner Guild".to_string(),
        allow_speculative: true,
    });

    let mut storage = ItemStorage::new();
    storage.insert_rack("rack-a", Rack::new(16));
    storage.insert_rack("rack-b", Rack::new(16));

    let mut network = SimNetwork::new(400);
    network.set_stock("warehouse", "stone", 40);
    network.set_stock("warehouse", "bread", 24);
    network.set_stock("warehouse", "iron_pickaxe", 2);
    network.set_stock("quarry", "stone", 1000);
    network.set_stock("quarry", "coal", 300);
    network.set_stock("provisioner", "oak_plank", 400);
    network.set_stock("provisioner", "bread", 100);
    network.register_address(&staging_address, "rack-a");
    network.register_network_address("quarry-dock", "warehouse");
    network.register_network_address("provisioner-dock", "warehouse");

    SimWorld::new(depot, storage, network)
}

fn run_simulation(args: &[String]) -> Result<(), String> {
    let ticks = parse_u64(args.get(2), "ticks", 2400)?;
    let status_every = parse_u64(args.get(3), "status_every", 400)?.max(1);

    let mut world = scenario_world();
    world.submit(Requestable::stack("stone", 32));
    world.submit(Requestable::Tool {
        class: "pickaxe".to_string(),
        min_level: 0,
        max_level: 4,
        exemplar: Some(supplyline_contracts::ItemKey::new("iron_pickaxe")),
    });
    world.submit(Requestable::Fuel { count: 16 });
    world.submit(Requestable::Food { count: 8 });

    for tick in 0..ticks {
        world.tick();
        if tick % status_every == 0 || tick + 1 == ticks {
            let status = world.depot.status();
            let line = serde_json::to_string(&status)
                .map_err(|err| format!("failed to encode status: {err}"))?;
            println!("{line}");
        }
    }

    println!(
        "simulated ticks={} open_requests={} skill={:.2}",
        ticks,
        world.board.open_parents().len(),
        world.depot.skill_progress()
    );
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    match command {
        Some("config") => match serde_json::to_string_pretty(&DepotConfig::default()) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        },
        Some("simulate") => {
            if let Err(err) = run_simulation(&args) {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        }
        _ => {
            print_usage();
        }
    }
}
