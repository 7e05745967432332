use indoc::formatdoc;

use crate::{
    analysis::analyze_decentralization,
    chain::{supported_chains, Chain},
    types::{MarketSnapshot, TokenSnapshot, NOT_AVAILABLE},
    utils::format_thousands,
};

pub const PROCESSING_MESSAGE: &str = "🔄 Processing request...";
pub const NO_MAP_MESSAGE: &str = "❌ Map not computed or error occurred.";
pub const GENERIC_FAILURE_MESSAGE: &str = "❌ Error processing request. Please try again later.";

pub fn start_message() -> String {
    formatdoc! {"
        🔍 *Bubblemaps Bot* 🔍

        Main features:
        1. Generates token bubble map screenshot
        2. Provides detailed token information
        3. Analyzes distribution decentralization
        4. Shows market data (if available)

        Send me token contract address in format:
        `<address> <chain>`

        Example: `0x603c7f932ED1fc6575303D8Fb018fDCBb0f39a95 bsc`
        Or for Solana: `EjpUeZQ3xT2Q35b9t5uAqxcJq1QqykZzBJbJxDoX1eK sol`

        Supported chains: {chains}",
        chains = supported_chains(),
    }
}

pub fn invalid_format_message() -> String {
    formatdoc! {"
        ❌ Invalid format. Use:
        `<address> <chain>`

        Supported chains: {chains}",
        chains = supported_chains(),
    }
}

fn usd(value: Option<f64>, decimals: usize) -> String {
    value
        .map(|v| format!("${}", format_thousands(v, decimals)))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn percent(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}%", v))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

pub fn header_block(snapshot: &TokenSnapshot, chain: Chain) -> Vec<String> {
    vec![
        format!("📊 *{} ({})*", snapshot.full_name, snapshot.symbol),
        String::new(),
        format!("• Network: {}", chain.code().to_uppercase()),
        format!("• Address: `{}`", snapshot.address),
        format!(
            "• Updated: {}",
            snapshot.last_update.as_deref().unwrap_or(NOT_AVAILABLE)
        ),
    ]
}

pub fn market_block(market: &MarketSnapshot) -> Vec<String> {
    vec![
        String::new(),
        "💹 *Market Data:*".to_string(),
        format!("• Price: {}", usd(market.price, 6)),
        format!("• Market Cap: {}", usd(market.market_cap, 2)),
        format!("• Volume (24h): {}", usd(market.volume_24h, 2)),
        format!("• Price Change (24h): {}", percent(market.price_change_pct_24h)),
    ]
}

/// Empty when the snapshot has no holders.
pub fn holder_block(snapshot: &TokenSnapshot) -> Vec<String> {
    let Some(top) = snapshot.top_holder() else {
        return Vec::new();
    };
    let verdict = analyze_decentralization(&snapshot.holders);
    vec![
        String::new(),
        "🏆 *Top Holder:*".to_string(),
        format!("• Address: `{}`", top.address),
        format!("• Percentage: {:.2}%", top.percentage),
        String::new(),
        "🔍 *Decentralization Analysis:*".to_string(),
        format!("• Score: {}/5", verdict.score),
        format!("• Description: {}", verdict.label),
    ]
}

/// Full Markdown report: header, then market data and holder analysis when available.
pub fn render_report(
    snapshot: &TokenSnapshot,
    chain: Chain,
    market: Option<&MarketSnapshot>,
) -> String {
    let mut lines = header_block(snapshot, chain);
    if let Some(market) = market {
        lines.extend(market_block(market));
    }
    lines.extend(holder_block(snapshot));
    lines.join("\n")
}
