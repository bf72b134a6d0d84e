//! Entity classes and their typed store keys.

use std::fmt;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// One of the cached data kinds, each with a fixed TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityClass {
    Portfolio,
    Analysis,
    OpenTrades,
    MarketStatus,
    IndexAnalysis,
}

impl EntityClass {
    pub const ALL: [EntityClass; 5] = [
        EntityClass::Portfolio,
        EntityClass::Analysis,
        EntityClass::OpenTrades,
        EntityClass::MarketStatus,
        EntityClass::IndexAnalysis,
    ];

    /// Stable name, used as the `class` column and the first query-key segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityClass::Portfolio => "portfolio",
            EntityClass::Analysis => "analysis",
            EntityClass::OpenTrades => "openTrades",
            EntityClass::MarketStatus => "marketStatus",
            EntityClass::IndexAnalysis => "indexAnalysis",
        }
    }

    /// How long a written entry stays fresh.
    pub fn ttl(&self) -> Duration {
        match self {
            EntityClass::Portfolio => Duration::minutes(5),
            EntityClass::Analysis => Duration::hours(24),
            EntityClass::OpenTrades => Duration::minutes(5),
            EntityClass::MarketStatus => Duration::minutes(10),
            EntityClass::IndexAnalysis => Duration::minutes(30),
        }
    }

    /// Parse a class name. Accepts the stable name and its kebab-case form.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "portfolio" => Some(EntityClass::Portfolio),
            "analysis" => Some(EntityClass::Analysis),
            "openTrades" | "open-trades" => Some(EntityClass::OpenTrades),
            "marketStatus" | "market-status" => Some(EntityClass::MarketStatus),
            "indexAnalysis" | "index-analysis" => Some(EntityClass::IndexAnalysis),
            _ => None,
        }
    }
}

impl fmt::Display for EntityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite identity of a stored record. The variant fixes the class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreKey {
    Portfolio { user_id: String },
    Analysis { ticker: String, trading_day: NaiveDate, user_id: String },
    OpenTrades { user_id: String },
    MarketStatus { date: NaiveDate },
    IndexAnalysis { index_ticker: String, trading_day: NaiveDate },
}

impl StoreKey {
    pub fn portfolio(user_id: impl Into<String>) -> Self {
        StoreKey::Portfolio { user_id: user_id.into() }
    }

    pub fn analysis(ticker: impl Into<String>, trading_day: NaiveDate, user_id: impl Into<String>) -> Self {
        StoreKey::Analysis { ticker: ticker.into(), trading_day, user_id: user_id.into() }
    }

    pub fn open_trades(user_id: impl Into<String>) -> Self {
        StoreKey::OpenTrades { user_id: user_id.into() }
    }

    pub fn market_status(date: NaiveDate) -> Self {
        StoreKey::MarketStatus { date }
    }

    pub fn index_analysis(index_ticker: impl Into<String>, trading_day: NaiveDate) -> Self {
        StoreKey::IndexAnalysis { index_ticker: index_ticker.into(), trading_day }
    }

    pub fn class(&self) -> EntityClass {
        match self {
            StoreKey::Portfolio { .. } => EntityClass::Portfolio,
            StoreKey::Analysis { .. } => EntityClass::Analysis,
            StoreKey::OpenTrades { .. } => EntityClass::OpenTrades,
            StoreKey::MarketStatus { .. } => EntityClass::MarketStatus,
            StoreKey::IndexAnalysis { .. } => EntityClass::IndexAnalysis,
        }
    }

    /// Key segments after the class name, in a fixed order.
    pub fn parts(&self) -> Vec<String> {
        match self {
            StoreKey::Portfolio { user_id } | StoreKey::OpenTrades { user_id } => vec![user_id.clone()],
            StoreKey::Analysis { ticker, trading_day, user_id } => {
                vec![ticker.clone(), trading_day.to_string(), user_id.clone()]
            }
            StoreKey::MarketStatus { date } => vec![date.to_string()],
            StoreKey::IndexAnalysis { index_ticker, trading_day } => {
                vec![index_ticker.clone(), trading_day.to_string()]
            }
        }
    }

    /// Row key within the class, e.g. `INFY|2025-01-02|u1`.
    pub fn encode(&self) -> String {
        self.parts().join("|")
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class(), self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 2).unwrap()
    }

    #[test]
    fn test_ttls() {
        assert_eq!(EntityClass::Portfolio.ttl(), Duration::minutes(5));
        assert_eq!(EntityClass::Analysis.ttl(), Duration::hours(24));
        assert_eq!(EntityClass::OpenTrades.ttl(), Duration::minutes(5));
        assert_eq!(EntityClass::MarketStatus.ttl(), Duration::minutes(10));
        assert_eq!(EntityClass::IndexAnalysis.ttl(), Duration::minutes(30));
    }

    #[test]
    fn test_parse_round_trips_names() {
        for class in EntityClass::ALL {
            assert_eq!(EntityClass::parse(class.as_str()), Some(class));
        }
        assert_eq!(EntityClass::parse("open-trades"), Some(EntityClass::OpenTrades));
        assert_eq!(EntityClass::parse("watchlist"), None);
    }

    #[test]
    fn test_key_class_and_encoding() {
        let key = StoreKey::analysis("INFY", day(), "u1");
        assert_eq!(key.class(), EntityClass::Analysis);
        assert_eq!(key.encode(), "INFY|2025-01-02|u1");
        assert_eq!(key.to_string(), "analysis:INFY|2025-01-02|u1");

        assert_eq!(StoreKey::market_status(day()).encode(), "2025-01-02");
        assert_eq!(StoreKey::index_analysis("NIFTY50", day()).encode(), "NIFTY50|2025-01-02");
    }

    #[test]
    fn test_date_partitions_are_distinct_keys() {
        let today = StoreKey::analysis("INFY", day(), "u1");
        let yesterday = StoreKey::analysis("INFY", day().pred_opt().unwrap(), "u1");
        assert_ne!(today.encode(), yesterday.encode());
    }
}
