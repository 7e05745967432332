use serde::{Deserialize, Serialize};

/// Placeholder used wherever upstream omits a display field.
pub const NOT_AVAILABLE: &str = "N/A";

/// One ranked holder, as reported by the holder-mapping service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolderRecord {
    pub address: String,
    /// Share of supply, 0..=100.
    pub percentage: f64,
}

impl HolderRecord {
    pub fn new(address: impl Into<String>, percentage: f64) -> Self {
        Self {
            address: address.into(),
            percentage,
        }
    }
}

/// Token metadata plus the ranked holder list for a single query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSnapshot {
    pub symbol: String,
    pub full_name: String,
    pub address: String,
    pub last_update: Option<String>,
    /// Descending by percentage; upstream order is trusted as-is.
    pub holders: Vec<HolderRecord>,
}

impl TokenSnapshot {
    pub fn top_holder(&self) -> Option<&HolderRecord> {
        self.holders.first()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub price: Option<f64>,
    pub market_cap: Option<f64>,
    pub volume_24h: Option<f64>,
    pub price_change_pct_24h: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DecentralizationVerdict {
    /// 0 means not enough data; otherwise 1 (concentrated) through 5 (dispersed).
    pub score: u8,
    pub label: &'static str,
}
