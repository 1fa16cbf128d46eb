//! Depot coordination kernel.
//!
//! Single-threaded and tick-driven: the embedding colony calls
//! [`depot::Depot::server_tick`] once per tick and routes board polls to the
//! resolver entry points. All iterated state lives in `BTreeMap`/`BTreeSet`
//! so every run over the same inputs is deterministic.

pub mod allocator;
pub mod catalog;
pub mod collaborators;
pub mod depot;
pub mod resolver;
pub mod restock;
pub mod sim;
pub mod speculative;
pub mod staging;
pub mod stock;
pub mod storage;

pub use depot::{Depot, TickContext};
pub use resolver::AttemptOutcome;
