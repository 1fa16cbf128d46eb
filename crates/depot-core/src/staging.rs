//! Staging coordinator: moves remote stock into the depot's own racks.
//!
//! New staging requests sit in a buffer for the bundling window so orders
//! created in the same burst ship together. On flush, the first buffered
//! request becomes the bundle leader and the rest become followers; the
//! leader's broadcast carries every follower's line, so followers mirror the
//! leader's broadcast flag and are removed with their leader. A broadcast
//! request completes when the wanted quantity shows up in local racks, and
//! is silently abandoned after the staging timeout; requests whose broadcast
//! keeps being refused retry indefinitely.

use std::collections::BTreeMap;

use tracing::debug;

use supplyline_contracts::{
    DepotConfig, ItemKey, ItemStack, NetworkId, RackId, RequestToken, Requestable,
};

use crate::allocator;
use crate::catalog::ItemCatalog;
use crate::collaborators::LogisticsNetwork;
use crate::stock::StockSnapshot;
use crate::storage::ItemStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingState {
    Queued,
    Broadcasted,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct StagingRequest {
    pub item: ItemKey,
    pub quantity: u64,
    pub requested_at_tick: u64,
    pub broadcasted: bool,
    pub state: StagingState,
    pub parent_token: RequestToken,
    /// `None` for the bundle leader or a standalone request.
    pub bundle_leader: Option<RequestToken>,
}

#[derive(Debug, Default)]
pub struct StagingCoordinator {
    buffered: BTreeMap<RequestToken, StagingRequest>,
    pending: BTreeMap<RequestToken, StagingRequest>,
    buffered_since: Option<u64>,
    last_process_tick: Option<u64>,
}

impl StagingCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffered_count(&self) -> usize {
        self.buffered.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether `token` has staging in flight (buffered or tracked, not yet
    /// cancelled).
    pub fn is_pending(&self, token: RequestToken) -> bool {
        self.buffered.contains_key(&token)
            || self
                .pending
                .get(&token)
                .is_some_and(|req| req.state != StagingState::Cancelled)
    }

    /// Buffer a staging request unless the token already has one in flight.
    pub fn create_if_absent(
        &mut self,
        token: RequestToken,
        item: ItemKey,
        quantity: u64,
        now: u64,
    ) -> bool {
        if self.is_pending(token) {
            return false;
        }
        debug!(target: "ordering", %token, %item, quantity, "staging request buffered");
        self.buffered_since.get_or_insert(now);
        self.buffered.insert(
            token,
            StagingRequest {
                item,
                quantity,
                requested_at_tick: now,
                broadcasted: false,
                state: StagingState::Queued,
                parent_token: token,
                bundle_leader: None,
            },
        );
        true
    }

    /// Drop any staging for `token`. Safe to call when none exists.
    pub fn cancel(&mut self, token: RequestToken) -> bool {
        let buffered = self.buffered.remove(&token).is_some();
        if self.buffered.is_empty() {
            self.buffered_since = None;
        }
        let pending = match self.pending.get_mut(&token) {
            Some(req) if req.state != StagingState::Cancelled => {
                req.state = StagingState::Cancelled;
                true
            }
            _ => false,
        };
        buffered || pending
    }

    /// Cancel every staging request created for `parent`.
    pub fn cancel_all_for_parent(&mut self, parent: RequestToken) -> usize {
        let buffered: Vec<RequestToken> = self
            .buffered
            .iter()
            .filter(|(_, req)| req.parent_token == parent)
            .map(|(token, _)| *token)
            .collect();
        let pending: Vec<RequestToken> = self
            .pending
            .iter()
            .filter(|(_, req)| req.parent_token == parent && req.state != StagingState::Cancelled)
            .map(|(token, _)| *token)
            .collect();
        let mut cancelled = 0;
        for token in buffered.into_iter().chain(pending) {
            if self.cancel(token) {
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Stage an order against the remote network for whatever concrete item
    /// can cover `wanted`. Returns whether a staging request was buffered.
    pub fn order_from_network(
        &mut self,
        token: RequestToken,
        wanted: &Requestable,
        stock: &StockSnapshot,
        catalog: &ItemCatalog,
        now: u64,
    ) -> bool {
        if self.is_pending(token) {
            return false;
        }
        if stock.is_empty() {
            debug!(target: "ordering", %token, "no stock snapshot, cannot order from network");
            return false;
        }
        let needed = wanted.required_count();
        match wanted {
            Requestable::Stack { item, count, .. } => {
                let available = stock.level(item);
                if available < wanted.minimum_required().max(1) {
                    return false;
                }
                self.create_if_absent(token, item.clone(), (*count).min(available), now)
            }
            Requestable::Tool { .. } => match stock.matching_entries(catalog, wanted).first() {
                Some((item, _)) => self.create_if_absent(token, item.clone(), 1, now),
                None => false,
            },
            _ => {
                // Predicate kinds stage the single best-stocked matching item;
                // any shortfall re-resolves on a later poll.
                let entries = stock.matching_entries(catalog, wanted);
                let mut best: Option<(ItemKey, u64)> = None;
                for (item, available) in entries {
                    if best.as_ref().is_none_or(|(_, b)| available > *b) {
                        best = Some((item, available));
                    }
                }
                match best {
                    Some((item, available)) => {
                        self.create_if_absent(token, item, needed.min(available), now)
                    }
                    None => false,
                }
            }
        }
    }

    /// Run one staging cycle when due: flush the bundle buffer, broadcast
    /// un-broadcast leaders, mirror followers (dropping any whose leader is
    /// gone), complete arrivals, abandon broadcast timeouts. `on_completed`
    /// fires once per completed parent token.
    pub fn process_if_due(
        &mut self,
        now: u64,
        config: &DepotConfig,
        storage: &ItemStorage,
        racks: &[RackId],
        network: &mut dyn LogisticsNetwork,
        home: Option<&NetworkId>,
        mut on_completed: impl FnMut(RequestToken),
    ) {
        if let Some(last) = self.last_process_tick {
            if now.saturating_sub(last) < config.staging_process_interval_ticks {
                return;
            }
        }
        self.last_process_tick = Some(now);
        self.flush_buffer_if_due(now, config.staging_buffer_window_ticks);

        if self.pending.is_empty() {
            return;
        }
        let Some(home) = home else {
            return;
        };

        let tokens: Vec<RequestToken> = self.pending.keys().copied().collect();
        for token in tokens {
            let Some(mut entry) = self.pending.get(&token).cloned() else {
                continue;
            };
            if entry.state == StagingState::Cancelled {
                self.pending.remove(&token);
                continue;
            }

            if let Some(leader) = entry.bundle_leader {
                match self.pending.get(&leader) {
                    Some(lead) => {
                        if lead.broadcasted && !entry.broadcasted {
                            entry.broadcasted = true;
                            entry.state = StagingState::Broadcasted;
                        }
                    }
                    // The follower's line ships and dies with its leader.
                    None => {
                        debug!(target: "ordering", %token, "bundle leader gone, removing follower");
                        self.pending.remove(&token);
                        continue;
                    }
                }
            }

            if entry.bundle_leader.is_none() && !entry.broadcasted {
                let mut lines = vec![ItemStack {
                    item: entry.item.clone(),
                    count: entry.quantity,
                }];
                lines.extend(
                    self.pending
                        .values()
                        .filter(|req| req.bundle_leader == Some(token))
                        .map(|req| ItemStack {
                            item: req.item.clone(),
                            count: req.quantity,
                        }),
                );
                if network.broadcast_order(home, &lines, &config.staging_address) {
                    entry.broadcasted = true;
                    entry.state = StagingState::Broadcasted;
                    debug!(
                        target: "ordering",
                        %token,
                        lines = lines.len(),
                        "staging order broadcast"
                    );
                } else {
                    debug!(target: "ordering", %token, "staging broadcast refused, will retry");
                }
            }

            if entry.broadcasted {
                let picks = allocator::pick_exact(storage, racks, &entry.item, entry.quantity);
                if allocator::picks_total(&picks) >= entry.quantity {
                    debug!(target: "ordering", %token, item = %entry.item, "staging complete");
                    self.pending.remove(&token);
                    on_completed(token);
                    continue;
                }
            }

            if entry.broadcasted
                && now.saturating_sub(entry.requested_at_tick) > config.staging_timeout_ticks
            {
                debug!(target: "ordering", %token, item = %entry.item, "staging timed out");
                self.pending.remove(&token);
                continue;
            }

            self.pending.insert(token, entry);
        }
    }

    fn flush_buffer_if_due(&mut self, now: u64, window_ticks: u64) {
        let Some(since) = self.buffered_since else {
            return;
        };
        if now.saturating_sub(since) < window_ticks {
            return;
        }
        let mut leader: Option<RequestToken> = None;
        let buffered = std::mem::take(&mut self.buffered);
        for (token, mut entry) in buffered {
            match leader {
                None => leader = Some(token),
                Some(lead) => entry.bundle_leader = Some(lead),
            }
            self.pending.insert(token, entry);
        }
        self.buffered_since = None;
        if let Some(lead) = leader {
            debug!(target: "ordering", leader = %lead, pending = self.pending.len(), "staging buffer flushed");
        }
    }
}
