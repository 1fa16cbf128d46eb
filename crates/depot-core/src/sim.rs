//! In-memory simulation harness.
//!
//! Reference implementations of the collaborator traits plus a small world
//! that drives the resolver lifecycle the way the colony manager does:
//! assign, attempt, resolve, followup, deliver. Deterministic by
//! construction, used by the integration tests and the CLI.

use std::collections::{BTreeMap, BTreeSet};

use supplyline_contracts::{
    DeliveryOrder, ItemKey, ItemStack, NetworkId, RackId, RequestState, RequestToken, RequestView,
    Requestable,
};

use crate::collaborators::{LogisticsNetwork, NetworkError, RequestBoard};
use crate::depot::{Depot, TickContext};
use crate::resolver::AttemptOutcome;
use crate::storage::ItemStorage;

// ---------------------------------------------------------------------------
// SimBoard
// ---------------------------------------------------------------------------

/// Request board with the lifecycle semantics the kernel expects. Parent
/// requests are submitted by tests; delivery children are created through
/// the `RequestBoard` trait.
#[derive(Debug, Default)]
pub struct SimBoard {
    requests: BTreeMap<RequestToken, RequestView>,
    children: BTreeMap<RequestToken, Vec<RequestToken>>,
    child_tokens: BTreeSet<RequestToken>,
    fresh_deliveries: Vec<(RequestToken, DeliveryOrder)>,
    next_token: u64,
    /// How many requests re-offer predicates accepted, across all calls.
    pub reoffer_count: usize,
}

impl SimBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&mut self, wanted: Requestable) -> RequestToken {
        self.next_token += 1;
        let token = RequestToken(self.next_token);
        self.requests.insert(
            token,
            RequestView {
                token,
                state: RequestState::Assigning,
                requestable: wanted,
                has_children: false,
            },
        );
        token
    }

    pub fn state(&self, token: RequestToken) -> Option<RequestState> {
        self.requests.get(&token).map(|view| view.state)
    }

    pub fn children_of(&self, token: RequestToken) -> &[RequestToken] {
        self.children.get(&token).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Parent requests still in a non-terminal state, in token order.
    pub fn open_parents(&self) -> Vec<RequestToken> {
        self.requests
            .values()
            .filter(|view| !view.state.is_terminal() && !self.child_tokens.contains(&view.token))
            .map(|view| view.token)
            .collect()
    }

    /// Delivery orders created since the last call.
    pub fn take_fresh_deliveries(&mut self) -> Vec<(RequestToken, DeliveryOrder)> {
        std::mem::take(&mut self.fresh_deliveries)
    }
}

impl RequestBoard for SimBoard {
    fn on_colony_update(&mut self, should_reoffer: &mut dyn FnMut(&RequestView) -> bool) {
        for view in self.requests.values_mut() {
            if view.state.is_terminal() || self.child_tokens.contains(&view.token) {
                continue;
            }
            if should_reoffer(view) {
                self.reoffer_count += 1;
                // Back onto the assignment queue for the next poll round.
                view.state = RequestState::Assigning;
            }
        }
    }

    fn create_child_request(
        &mut self,
        parent: RequestToken,
        delivery: DeliveryOrder,
    ) -> RequestToken {
        self.next_token += 1;
        let token = RequestToken(self.next_token);
        self.requests.insert(
            token,
            RequestView {
                token,
                state: RequestState::InProgress,
                requestable: Requestable::Stack {
                    item: delivery.item.clone(),
                    count: delivery.count,
                    minimum_count: delivery.count,
                },
                has_children: false,
            },
        );
        self.children.entry(parent).or_default().push(token);
        self.child_tokens.insert(token);
        if let Some(view) = self.requests.get_mut(&parent) {
            view.has_children = true;
        }
        self.fresh_deliveries.push((token, delivery));
        token
    }

    fn request(&self, token: RequestToken) -> Option<RequestView> {
        self.requests.get(&token).cloned()
    }

    fn update_request_state(&mut self, token: RequestToken, state: RequestState) {
        if let Some(view) = self.requests.get_mut(&token) {
            view.state = state;
        }
    }
}

// ---------------------------------------------------------------------------
// SimNetwork
// ---------------------------------------------------------------------------

/// Where shipments for one delivery address land: a depot rack, or another
/// network's stock pool (a warehouse).
#[derive(Debug, Clone)]
pub enum DeliveryTarget {
    Rack(RackId),
    Network(NetworkId),
}

#[derive(Debug)]
struct Shipment {
    deliver_at: u64,
    target: DeliveryTarget,
    item: ItemKey,
    count: u64,
}

/// Logistics networks with per-network stock and a transit queue. Broadcast
/// lines ship to the target registered for the delivery address and arrive
/// after the configured transit time.
#[derive(Debug, Default)]
pub struct SimNetwork {
    stocks: BTreeMap<NetworkId, BTreeMap<ItemKey, u64>>,
    addresses: BTreeMap<String, DeliveryTarget>,
    transit: Vec<Shipment>,
    transit_ticks: u64,
    now: u64,
    pub refuse_broadcasts: bool,
    pub unreachable: BTreeSet<NetworkId>,
}

impl SimNetwork {
    pub fn new(transit_ticks: u64) -> Self {
        Self {
            transit_ticks,
            ..Self::default()
        }
    }

    pub fn set_stock(&mut self, network: &str, item: &str, count: u64) {
        self.stocks
            .entry(NetworkId::new(network))
            .or_default()
            .insert(ItemKey::new(item), count);
    }

    pub fn stock_of(&self, network: &str, item: &str) -> u64 {
        self.stocks
            .get(&NetworkId::new(network))
            .and_then(|stock| stock.get(&ItemKey::new(item)))
            .copied()
            .unwrap_or(0)
    }

    /// Register a delivery address that lands in a depot rack.
    pub fn register_address(&mut self, address: &str, rack: &str) {
        self.addresses
            .insert(address.to_string(), DeliveryTarget::Rack(RackId::new(rack)));
    }

    /// Register a delivery address that lands in another network's stock.
    pub fn register_network_address(&mut self, address: &str, network: &str) {
        self.addresses.insert(
            address.to_string(),
            DeliveryTarget::Network(NetworkId::new(network)),
        );
    }

    pub fn shipments_in_transit(&self) -> usize {
        self.transit.len()
    }

    pub fn set_now(&mut self, now: u64) {
        self.now = now;
    }

    /// Land every shipment whose transit has elapsed.
    pub fn deliver_due(&mut self, now: u64, storage: &mut ItemStorage) {
        let mut landed = Vec::new();
        self.transit.retain(|shipment| {
            if shipment.deliver_at <= now {
                landed.push((
                    shipment.target.clone(),
                    shipment.item.clone(),
                    shipment.count,
                ));
                false
            } else {
                true
            }
        });
        for (target, item, count) in landed {
            match target {
                DeliveryTarget::Rack(rack) => {
                    if let Some(rack) = storage.rack_mut(&rack) {
                        rack.deposit(&item, count);
                    }
                }
                DeliveryTarget::Network(network) => {
                    *self
                        .stocks
                        .entry(network)
                        .or_default()
                        .entry(item)
                        .or_insert(0) += count;
                }
            }
        }
    }
}

impl LogisticsNetwork for SimNetwork {
    fn summary(&self, network: &NetworkId) -> Result<Vec<ItemStack>, NetworkError> {
        if self.unreachable.contains(network) {
            return Err(NetworkError::Unreachable(network.clone()));
        }
        let Some(stock) = self.stocks.get(network) else {
            return Err(NetworkError::NoSummary(network.clone()));
        };
        Ok(stock
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(item, count)| ItemStack {
                item: item.clone(),
                count: *count,
            })
            .collect())
    }

    fn broadcast_order(&mut self, network: &NetworkId, lines: &[ItemStack], address: &str) -> bool {
        if self.refuse_broadcasts || self.unreachable.contains(network) {
            return false;
        }
        let Some(target) = self.addresses.get(address).cloned() else {
            return false;
        };
        let Some(stock) = self.stocks.get_mut(network) else {
            return false;
        };
        for line in lines {
            let held = stock.entry(line.item.clone()).or_insert(0);
            let shipped = line.count.min(*held);
            *held -= shipped;
            if shipped > 0 {
                self.transit.push(Shipment {
                    deliver_at: self.now + self.transit_ticks,
                    target: target.clone(),
                    item: line.item.clone(),
                    count: shipped,
                });
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// SimWorld
// ---------------------------------------------------------------------------

/// A depot, its storage, a board, and the networks, advanced one tick at a
/// time.
pub struct SimWorld {
    pub depot: Depot,
    pub storage: ItemStorage,
    pub board: SimBoard,
    pub network: SimNetwork,
    now: u64,
}

impl SimWorld {
    pub fn new(depot: Depot, storage: ItemStorage, network: SimNetwork) -> Self {
        Self {
            depot,
            storage,
            board: SimBoard::new(),
            network,
            now: 0,
        }
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn submit(&mut self, wanted: Requestable) -> RequestToken {
        self.board.submit(wanted)
    }

    pub fn cancel(&mut self, token: RequestToken) {
        self.board
            .update_request_state(token, RequestState::Cancelled);
        self.depot.on_assigned_request_cancelled(token);
    }

    pub fn run_ticks(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    pub fn tick(&mut self) {
        let now = self.now;
        self.network.set_now(now);
        self.network.deliver_due(now, &mut self.storage);

        self.depot.server_tick(
            now,
            true,
            &mut TickContext {
                storage: &self.storage,
                board: &mut self.board,
                network: &mut self.network,
            },
        );

        self.poll_open_requests(now);
        self.execute_deliveries();
        self.complete_followups();

        self.now += 1;
    }

    /// The colony manager's poll round: offer open requests to the depot's
    /// resolver and walk them through the protocol.
    fn poll_open_requests(&mut self, now: u64) {
        for token in self.board.open_parents() {
            let Some(view) = self.board.request(token) else {
                continue;
            };
            match view.state {
                RequestState::Assigning => {
                    if self.depot.can_resolve(&view, &self.storage) {
                        self.depot.on_request_assigned(&view, &self.storage);
                        self.board
                            .update_request_state(token, RequestState::InProgress);
                    }
                }
                RequestState::InProgress if !view.has_children => {
                    match self.depot.attempt_resolve(&view, &self.storage, now) {
                        AttemptOutcome::Satisfied => {
                            self.board
                                .update_request_state(token, RequestState::Resolved);
                            let children = self.depot.followup_for_completion(
                                &view,
                                &self.storage,
                                &mut self.board,
                            );
                            let next = if children.is_empty() {
                                RequestState::Completed
                            } else {
                                RequestState::FollowupInProgress
                            };
                            self.board.update_request_state(token, next);
                        }
                        AttemptOutcome::Pending | AttemptOutcome::Unfulfillable => {}
                    }
                }
                _ => {}
            }
        }
    }

    /// Hand fresh delivery orders to the courier: withdraw from the planned
    /// slot and complete the child.
    fn execute_deliveries(&mut self) {
        for (child, delivery) in self.board.take_fresh_deliveries() {
            if let Some(rack) = self.storage.rack_mut(&delivery.source.rack) {
                rack.withdraw(delivery.source.slot, delivery.count);
            }
            self.board
                .update_request_state(child, RequestState::Completed);
        }
    }

    fn complete_followups(&mut self) {
        for token in self.board.open_parents() {
            let Some(view) = self.board.request(token) else {
                continue;
            };
            if view.state != RequestState::FollowupInProgress {
                continue;
            }
            let done = self
                .board
                .children_of(token)
                .iter()
                .all(|child| {
                    self.board
                        .state(*child)
                        .is_some_and(|state| state.is_terminal())
                });
            if done {
                self.board
                    .update_request_state(token, RequestState::Completed);
            }
        }
    }
}
