//! Item metadata and the kind-aware match predicate.
//!
//! The catalog is the kernel's stand-in for whatever item registry the host
//! game exposes: tags, edibility, burn time, and tool classification per
//! item key. Everything that decides "does this physical item satisfy this
//! request" funnels through [`ItemCatalog::matches`].

use std::collections::{BTreeMap, BTreeSet};

use supplyline_contracts::{ItemKey, Requestable};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInfo {
    pub class: String,
    pub level: i32,
    pub damaged: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemInfo {
    pub tags: BTreeSet<String>,
    pub edible: bool,
    /// 0 means the item does not burn.
    pub burn_ticks: u64,
    pub tool: Option<ToolInfo>,
}

#[derive(Debug, Clone, Default)]
pub struct ItemCatalog {
    items: BTreeMap<ItemKey, ItemInfo>,
}

impl ItemCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: impl Into<String>, info: ItemInfo) {
        self.items.insert(ItemKey::new(item), info);
    }

    pub fn info(&self, item: &ItemKey) -> Option<&ItemInfo> {
        self.items.get(item)
    }

    pub fn is_food(&self, item: &ItemKey) -> bool {
        self.info(item).is_some_and(|info| info.edible)
    }

    pub fn is_fuel(&self, item: &ItemKey) -> bool {
        self.info(item).is_some_and(|info| info.burn_ticks > 0)
    }

    pub fn has_tag(&self, item: &ItemKey, tag: &str) -> bool {
        self.info(item).is_some_and(|info| info.tags.contains(tag))
    }

    /// Usable tool of the wanted class within the level band. Damaged tools
    /// never match.
    pub fn tool_matches(&self, item: &ItemKey, class: &str, min_level: i32, max_level: i32) -> bool {
        self.info(item)
            .and_then(|info| info.tool.as_ref())
            .is_some_and(|tool| {
                tool.class == class
                    && !tool.damaged
                    && tool.level >= min_level
                    && tool.level <= max_level
            })
    }

    /// Whether one unit of `item` satisfies `wanted`, regardless of quantity.
    pub fn matches(&self, wanted: &Requestable, item: &ItemKey) -> bool {
        match wanted {
            Requestable::Stack { item: want, .. } => want == item,
            Requestable::Tool {
                class,
                min_level,
                max_level,
                ..
            } => self.tool_matches(item, class, *min_level, *max_level),
            Requestable::Tag { tag, .. } => self.has_tag(item, tag),
            Requestable::StackList { items, .. } => items.contains(item),
            Requestable::Food { .. } => self.is_food(item),
            Requestable::Fuel { .. } => self.is_fuel(item),
        }
    }
}
