//! Seams to the embedding colony: the request board and the logistics
//! network. The kernel only ever talks to these traits; the real
//! implementations live host-side, and `sim` provides in-memory ones.

use thiserror::Error;

use supplyline_contracts::{
    DeliveryOrder, ItemStack, NetworkId, RequestState, RequestToken, RequestView,
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("network {0} is unreachable")]
    Unreachable(NetworkId),
    #[error("no stock summary available for network {0}")]
    NoSummary(NetworkId),
}

/// Remote stock networks, reached through whatever transport the host uses.
/// Every operation may fail or lie slightly out of date; the kernel treats
/// failures as "nothing available this cycle" and retries on its own cadence.
pub trait LogisticsNetwork {
    /// Item totals currently stocked by `network`.
    fn summary(&self, network: &NetworkId) -> Result<Vec<ItemStack>, NetworkError>;

    /// Fire-and-forget order broadcast to `network`, shipping to `address`.
    /// Returns whether the network accepted the broadcast. Acceptance is not
    /// a delivery guarantee.
    fn broadcast_order(&mut self, network: &NetworkId, lines: &[ItemStack], address: &str) -> bool;
}

/// The colony request board: the source of request lifecycle truth.
pub trait RequestBoard {
    /// Ask the board to re-evaluate open requests. The predicate inspects a
    /// request and returns whether it should be re-offered to resolvers;
    /// a predicate that always returns `false` is a pure scan.
    fn on_colony_update(&mut self, should_reoffer: &mut dyn FnMut(&RequestView) -> bool);

    /// Create a delivery child under `parent`. The board owns the child's
    /// lifecycle from here.
    fn create_child_request(&mut self, parent: RequestToken, delivery: DeliveryOrder)
        -> RequestToken;

    fn request(&self, token: RequestToken) -> Option<RequestView>;

    fn update_request_state(&mut self, token: RequestToken, state: RequestState);
}
