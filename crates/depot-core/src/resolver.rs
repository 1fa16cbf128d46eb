//! The depot's request resolver.
//!
//! One resolver handles every request kind; the `Requestable` variant
//! carries the kind-specific matching, so resolution itself is uniform:
//!
//! 1. `can_resolve` — cheap feasibility poll: full local cover, or remote
//!    availability when the depot has network access.
//! 2. `attempt_resolve` — commit point, returning [`AttemptOutcome`]:
//!    local cover satisfies immediately, otherwise remote stock is staged
//!    in and the request parks until the shipment lands.
//! 3. `followup_for_completion` — turns the (reserved or re-planned) picks
//!    into delivery children on the board and awards skill progress.
//!
//! Between assignment and followup the planned picks sit in a reservation
//! cache so the worker hands off exactly what was promised.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use supplyline_contracts::{
    DeliveryOrder, Pick, RackId, RequestToken, RequestView, XpCurve,
};

use crate::allocator;
use crate::catalog::ItemCatalog;
use crate::collaborators::RequestBoard;
use crate::staging::StagingCoordinator;
use crate::stock::StockSnapshot;
use crate::storage::ItemStorage;

/// Three-valued result of a resolution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Local stock covers the request; proceed to followup.
    Satisfied,
    /// Remote stock is on its way; poll again later.
    Pending,
    /// Nothing local, nothing remote; the request stays open elsewhere.
    Unfulfillable,
}

/// Everything the resolver reads about the depot's own side.
#[derive(Clone, Copy)]
pub struct LocalView<'a> {
    pub storage: &'a ItemStorage,
    pub racks: &'a [RackId],
    pub catalog: &'a ItemCatalog,
}

#[derive(Debug)]
pub struct Resolver {
    priority: u8,
    reserved: BTreeMap<RequestToken, Vec<Pick>>,
}

/// What followup produced for one completed request.
#[derive(Debug, Default)]
pub struct FollowupResult {
    pub children: Vec<RequestToken>,
    pub xp_awarded: f64,
}

impl Resolver {
    pub fn new(priority: u8) -> Self {
        Self {
            priority,
            reserved: BTreeMap::new(),
        }
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn reserved_count(&self) -> usize {
        self.reserved.len()
    }

    pub fn can_resolve(
        &self,
        view: &RequestView,
        local: &LocalView<'_>,
        stock: &StockSnapshot,
        network_access: bool,
    ) -> bool {
        let wanted = &view.requestable;
        let picks = allocator::pick_from_racks(local.storage, local.racks, local.catalog, wanted);
        if allocator::picks_total(&picks) >= wanted.required_count() {
            return true;
        }
        network_access && stock.is_available(local.catalog, wanted)
    }

    pub fn attempt_resolve(
        &mut self,
        view: &RequestView,
        local: &LocalView<'_>,
        stock: &StockSnapshot,
        staging: &mut StagingCoordinator,
        network_access: bool,
        now: u64,
    ) -> AttemptOutcome {
        let wanted = &view.requestable;
        let picks = allocator::pick_from_racks(local.storage, local.racks, local.catalog, wanted);
        if allocator::picks_total(&picks) >= wanted.required_count() {
            // A staged shipment may still be in flight from an earlier
            // attempt; local cover supersedes it.
            staging.cancel(view.token);
            return AttemptOutcome::Satisfied;
        }
        if !network_access {
            return AttemptOutcome::Unfulfillable;
        }
        if staging.is_pending(view.token) {
            return AttemptOutcome::Pending;
        }
        if staging.order_from_network(view.token, wanted, stock, local.catalog, now) {
            AttemptOutcome::Pending
        } else {
            AttemptOutcome::Unfulfillable
        }
    }

    /// Reserve the current pick plan for an assigned request.
    pub fn on_request_assigned(&mut self, view: &RequestView, local: &LocalView<'_>) {
        let mut picks =
            allocator::pick_from_racks(local.storage, local.racks, local.catalog, &view.requestable);
        if picks.is_empty() {
            return;
        }
        for pick in &mut picks {
            pick.reservation = Some(view.token);
        }
        debug!(target: "fulfillment", token = %view.token, picks = picks.len(), "picks reserved");
        self.reserved.insert(view.token, picks);
    }

    /// Drop all bookkeeping for a cancelled assignment. Idempotent.
    pub fn on_assigned_request_cancelled(
        &mut self,
        token: RequestToken,
        staging: &mut StagingCoordinator,
    ) {
        if self.reserved.remove(&token).is_some() {
            debug!(target: "fulfillment", %token, "reservation purged on cancel");
        }
        staging.cancel_all_for_parent(token);
    }

    /// Spawn delivery children for a resolved request and award skill
    /// progress. An empty allocation completes gracefully with no children.
    pub fn followup_for_completion(
        &mut self,
        view: &RequestView,
        local: &LocalView<'_>,
        staging: &mut StagingCoordinator,
        board: &mut dyn RequestBoard,
        xp: &XpCurve,
    ) -> FollowupResult {
        let picks = match self.reserved.remove(&view.token) {
            Some(picks) => picks,
            None => allocator::pick_from_racks(
                local.storage,
                local.racks,
                local.catalog,
                &view.requestable,
            ),
        };
        staging.cancel_all_for_parent(view.token);

        if picks.is_empty() {
            warn!(
                target: "fulfillment",
                token = %view.token,
                wanted = %view.requestable,
                "followup with empty allocation, completing without deliveries"
            );
            return FollowupResult::default();
        }

        let mut result = FollowupResult::default();
        for pick in picks {
            let child = board.create_child_request(
                view.token,
                DeliveryOrder {
                    source: pick.source,
                    item: pick.item,
                    count: pick.count,
                    priority: self.priority,
                },
            );
            result.children.push(child);
        }
        result.xp_awarded = xp.award(view.requestable.required_count());
        debug!(
            target: "fulfillment",
            token = %view.token,
            children = result.children.len(),
            xp = result.xp_awarded,
            "deliveries spawned"
        );
        result
    }
}
