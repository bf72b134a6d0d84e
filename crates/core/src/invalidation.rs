//! Mapping from application lifecycle events to cache effects.
//!
//! Call sites report what happened; this module decides which entity
//! classes that touches.

use serde::{Deserialize, Serialize};

use crate::store::EntityClass;

/// Which classes a manual refresh covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshScope {
    All,
    Classes(Vec<EntityClass>),
}

impl RefreshScope {
    /// Build a scope from class names, where `*` selects everything.
    /// Unknown names are ignored.
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut classes = Vec::new();
        for name in names {
            if name == "*" {
                return RefreshScope::All;
            }
            match EntityClass::parse(name) {
                Some(class) if !classes.contains(&class) => classes.push(class),
                Some(_) => {}
                None => tracing::debug!(name, "ignoring unknown entity class in refresh scope"),
            }
        }
        RefreshScope::Classes(classes)
    }
}

/// Application events that affect cached data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationEvent {
    Login,
    Logout,
    TradeExecuted,
    PortfolioUpdated,
    SettingsUpdated,
    ManualRefresh(RefreshScope),
}

/// What the cache must do in response to an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    /// Leave everything as is.
    Nothing,
    /// Wipe in-memory and persistent state for every class.
    ClearAll,
    /// Force the in-memory entries of these classes stale.
    MarkStale(Vec<EntityClass>),
}

impl InvalidationEvent {
    pub fn invalidation(&self) -> Invalidation {
        match self {
            // A new user's keys never collide with cached ones.
            InvalidationEvent::Login => Invalidation::Nothing,
            InvalidationEvent::Logout => Invalidation::ClearAll,
            InvalidationEvent::TradeExecuted => {
                Invalidation::MarkStale(vec![EntityClass::Portfolio, EntityClass::OpenTrades])
            }
            InvalidationEvent::PortfolioUpdated | InvalidationEvent::SettingsUpdated => {
                Invalidation::MarkStale(vec![EntityClass::Portfolio])
            }
            InvalidationEvent::ManualRefresh(RefreshScope::All) => Invalidation::MarkStale(EntityClass::ALL.to_vec()),
            InvalidationEvent::ManualRefresh(RefreshScope::Classes(classes)) => {
                Invalidation::MarkStale(classes.clone())
            }
        }
    }
}
