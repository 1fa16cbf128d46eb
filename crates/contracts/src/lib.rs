//! v1 cross-boundary contracts for the depot kernel, persistence, and CLI.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION_V1: &str = "1.0";

// ---------------------------------------------------------------------------
// Item identity
// ---------------------------------------------------------------------------

/// Stable item identity. Ordered so it can key `BTreeMap` state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct ItemKey(pub String);

impl ItemKey {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemStack {
    pub item: ItemKey,
    pub count: u64,
}

impl ItemStack {
    pub fn new(item: impl Into<String>, count: u64) -> Self {
        Self {
            item: ItemKey::new(item),
            count,
        }
    }
}

impl fmt::Display for ItemStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x {}", self.count, self.item)
    }
}

/// Identity of a remote stock network reachable through the logistics layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct NetworkId(pub String);

impl NetworkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one storage rack owned by a depot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct RackId(pub String);

impl RackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for RackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Opaque handle for a request on the colony board.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(transparent)]
pub struct RequestToken(pub u64);

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Stack,
    Tool,
    Tag,
    StackList,
    Food,
    Fuel,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RequestKind::Stack => "stack",
            RequestKind::Tool => "tool",
            RequestKind::Tag => "tag",
            RequestKind::StackList => "stack_list",
            RequestKind::Food => "food",
            RequestKind::Fuel => "fuel",
        };
        f.write_str(label)
    }
}

/// What a request on the board is asking for, one variant per request kind.
///
/// `minimum_count` is the acceptance threshold for partial fulfillment;
/// `count` is the full amount wanted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Requestable {
    Stack {
        item: ItemKey,
        count: u64,
        minimum_count: u64,
    },
    Tool {
        class: String,
        min_level: i32,
        max_level: i32,
        /// Representative concrete item for this tool request, when known.
        exemplar: Option<ItemKey>,
    },
    Tag {
        tag: String,
        count: u64,
        minimum_count: u64,
    },
    StackList {
        items: Vec<ItemKey>,
        count: u64,
        minimum_count: u64,
    },
    Food {
        count: u64,
    },
    Fuel {
        count: u64,
    },
}

impl Requestable {
    pub fn stack(item: impl Into<String>, count: u64) -> Self {
        Requestable::Stack {
            item: ItemKey::new(item),
            count,
            minimum_count: count,
        }
    }

    pub fn kind(&self) -> RequestKind {
        match self {
            Requestable::Stack { .. } => RequestKind::Stack,
            Requestable::Tool { .. } => RequestKind::Tool,
            Requestable::Tag { .. } => RequestKind::Tag,
            Requestable::StackList { .. } => RequestKind::StackList,
            Requestable::Food { .. } => RequestKind::Food,
            Requestable::Fuel { .. } => RequestKind::Fuel,
        }
    }

    /// Quantity a full allocation should deliver. Tools are always one item.
    pub fn required_count(&self) -> u64 {
        match self {
            Requestable::Stack { count, .. } => *count,
            Requestable::Tool { .. } => 1,
            Requestable::Tag { count, .. } => *count,
            Requestable::StackList { count, .. } => *count,
            Requestable::Food { count } => *count,
            Requestable::Fuel { count } => *count,
        }
    }

    /// Smallest remote availability worth staging an order for.
    pub fn minimum_required(&self) -> u64 {
        match self {
            Requestable::Stack { minimum_count, .. } => *minimum_count,
            Requestable::Tool { .. } => 1,
            Requestable::Tag { minimum_count, .. } => *minimum_count,
            Requestable::StackList { minimum_count, .. } => *minimum_count,
            Requestable::Food { count } => *count,
            Requestable::Fuel { count } => *count,
        }
    }

    /// A single concrete item + quantity this request boils down to, when one
    /// exists. Predicate kinds (tag, food, fuel) have none.
    pub fn concrete_order(&self) -> Option<ItemStack> {
        match self {
            Requestable::Stack { item, count, .. } => Some(ItemStack {
                item: item.clone(),
                count: *count,
            }),
            Requestable::Tool { exemplar, .. } => exemplar.as_ref().map(|item| ItemStack {
                item: item.clone(),
                count: 1,
            }),
            Requestable::StackList { items, count, .. } => items.first().map(|item| ItemStack {
                item: item.clone(),
                count: *count,
            }),
            Requestable::Tag { .. } | Requestable::Food { .. } | Requestable::Fuel { .. } => None,
        }
    }
}

impl fmt::Display for Requestable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requestable::Stack { item, count, .. } => write!(f, "{count}x {item}"),
            Requestable::Tool {
                class,
                min_level,
                max_level,
                ..
            } => write!(f, "tool {class} (level {min_level}..={max_level})"),
            Requestable::Tag { tag, count, .. } => write!(f, "{count}x #{tag}"),
            Requestable::StackList { items, count, .. } => {
                write!(f, "{count}x any of {} items", items.len())
            }
            Requestable::Food { count } => write!(f, "{count}x food"),
            Requestable::Fuel { count } => write!(f, "{count}x fuel"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Assigning,
    InProgress,
    FollowupInProgress,
    Resolved,
    Completed,
    Cancelled,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Completed | RequestState::Cancelled)
    }
}

/// Read-only projection of a board request, as seen through `RequestBoard`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestView {
    pub token: RequestToken,
    pub state: RequestState,
    pub requestable: Requestable,
    pub has_children: bool,
}

// ---------------------------------------------------------------------------
// Picks and deliveries
// ---------------------------------------------------------------------------

/// Access face of a rack. Racks expose the same physical slots through every
/// open face; `SCAN_ORDER` fixes the deterministic traversal order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Face {
    Interior,
    Down,
    Up,
    North,
    South,
    West,
    East,
}

impl Face {
    pub const SCAN_ORDER: [Face; 7] = [
        Face::Interior,
        Face::Down,
        Face::Up,
        Face::North,
        Face::South,
        Face::West,
        Face::East,
    ];
}

/// Physical location of one slot: rack, the face it was seen through, and
/// the slot index within the rack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct SlotRef {
    pub rack: RackId,
    pub face: Face,
    pub slot: usize,
}

/// One planned withdrawal produced by the allocator. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pick {
    pub source: SlotRef,
    pub item: ItemKey,
    pub count: u64,
    pub reservation: Option<RequestToken>,
}

/// Child-request payload handed to the colony's delivery subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryOrder {
    pub source: SlotRef,
    pub item: ItemKey,
    pub count: u64,
    pub priority: u8,
}

// ---------------------------------------------------------------------------
// Policies, suppliers, orders
// ---------------------------------------------------------------------------

/// Operator-configured stock target for one item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyEntry {
    pub item: ItemKey,
    pub target_quantity: u64,
}

impl PolicyEntry {
    pub fn new(item: impl Into<String>, target_quantity: u64) -> Self {
        Self {
            item: ItemKey::new(item),
            target_quantity,
        }
    }
}

/// Operator-configured remote supplier, walked in ascending priority order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SupplierEntry {
    pub network: NetworkId,
    pub priority: u8,
    /// Delivery address broadcast orders are sent to. Empty means the
    /// supplier is visible but cannot ship anything.
    pub address: String,
    pub label: String,
    pub allow_speculative: bool,
}

impl SupplierEntry {
    pub fn has_valid_address(&self) -> bool {
        !self.address.trim().is_empty()
    }
}

/// Read-only projection of one placed remote order, for display and
/// arrival/expiry bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncomingOrder {
    pub order_id: u64,
    pub item: ItemKey,
    pub quantity: u64,
    pub requested_at_tick: u64,
    pub network: NetworkId,
    /// Estimated arrival tick, assumed at order time.
    pub eta_tick: u64,
}

impl IncomingOrder {
    pub fn expiry_tick(&self, buffer_ticks: u64) -> u64 {
        self.eta_tick.saturating_add(buffer_ticks)
    }
}

impl fmt::Display for IncomingOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "order #{}: {}x {} from {} (eta tick {})",
            self.order_id, self.quantity, self.item, self.network, self.eta_tick
        )
    }
}

// ---------------------------------------------------------------------------
// Configuration and status
// ---------------------------------------------------------------------------

/// Skill progress curve: `base + min(count / divisor, cap)` per fulfilled
/// request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct XpCurve {
    pub base: f64,
    pub divisor: f64,
    pub cap: f64,
}

impl XpCurve {
    pub fn award(&self, count: u64) -> f64 {
        if self.divisor <= 0.0 {
            return self.base;
        }
        self.base + (count as f64 / self.divisor).min(self.cap)
    }
}

impl Default for XpCurve {
    fn default() -> Self {
        Self {
            base: 1.0,
            divisor: 16.0,
            cap: 4.0,
        }
    }
}

/// All depot tunables. Defaults are the shipped balance values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DepotConfig {
    pub schema_version: String,
    /// Staging requests older than this are abandoned.
    pub staging_timeout_ticks: u64,
    /// How long new staging requests sit buffered so they can bundle.
    pub staging_buffer_window_ticks: u64,
    pub staging_process_interval_ticks: u64,
    pub stock_snapshot_interval_ticks: u64,
    pub restock_interval_ticks: u64,
    pub inventory_signature_interval_ticks: u64,
    pub speculative_interval_ticks: u64,
    /// How long a request must stay unfulfilled before a speculative order.
    pub speculative_delay_ticks: u64,
    pub speculative_enabled: bool,
    /// Assumed shipping time used for order ETAs.
    pub assumed_transit_ticks: u64,
    /// Grace past the ETA before an unmatched order is dropped.
    pub order_expiry_buffer_ticks: u64,
    /// Building tier at which remote-network features unlock.
    pub network_access_tier: u32,
    /// Building tier at which policy-driven restocking unlocks.
    pub restock_tier: u32,
    pub resolver_priority: u8,
    /// Delivery address remote staging shipments are sent to.
    pub staging_address: String,
    pub xp: XpCurve,
}

impl Default for DepotConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            staging_timeout_ticks: 1200,
            staging_buffer_window_ticks: 60,
            staging_process_interval_ticks: 60,
            stock_snapshot_interval_ticks: 200,
            restock_interval_ticks: 600,
            inventory_signature_interval_ticks: 40,
            speculative_interval_ticks: 200,
            speculative_delay_ticks: 600,
            speculative_enabled: true,
            assumed_transit_ticks: 400,
            order_expiry_buffer_ticks: 12000,
            network_access_tier: 4,
            restock_tier: 5,
            resolver_priority: 80,
            staging_address: "staging-intake".to_string(),
            xp: XpCurve::default(),
        }
    }
}

/// Point-in-time snapshot of a depot, for the CLI and inspection surfaces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DepotStatus {
    pub schema_version: String,
    pub tick: u64,
    pub building_level: u32,
    pub home_network: Option<NetworkId>,
    pub pending_staging: usize,
    pub buffered_staging: usize,
    pub active_restock_orders: usize,
    pub tracked_speculative: usize,
    pub incoming_orders: usize,
    pub skill_progress: f64,
}

impl fmt::Display for DepotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tick={} level={} staging={}+{} restock={} speculative={} xp={:.2}",
            self.tick,
            self.building_level,
            self.pending_staging,
            self.buffered_staging,
            self.active_restock_orders,
            self.tracked_speculative,
            self.skill_progress
        )
    }
}
