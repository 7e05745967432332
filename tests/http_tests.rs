use anyhow::Result;
use bubblemaps_bot::{
    chain::{Chain, TokenQuery},
    config::{BotConfig, RuntimeConfig},
    constants::{TELEGRAM_API_URL, VISUAL_BASE_URL, WEBDRIVER_URL},
    holders::{HolderLookup, HolderMapClient, HolderSource},
    market::{CoinGeckoClient, MarketSource},
    pool::WorkerPool,
};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use warp::{http::StatusCode, Filter};

const MAP_DATA: &str = r#"{
    "full_name": "Pepe",
    "symbol": "PEPE",
    "dt_update": 1714552200,
    "nodes": [
        {"address": "0xf977814e90da44bfa03b6295a0616a897441acec", "percentage": 23.9},
        {"address": "0x5a52e96bacdabb82fd05763e25335261b270efcb", "percentage": 9.6},
        {"address": "0x4a2c786651229175407d3a2d405d1998bcf40614", "percentage": 5.8}
    ]
}"#;

const COIN: &str = r#"{
    "id": "pancakeswap-token",
    "market_data": {
        "current_price": {"usd": 2.41},
        "market_cap": {"usd": 690000000.0},
        "total_volume": {"usd": 51000000.0},
        "price_change_percentage_24h": -1.5
    }
}"#;

/// Serves `/map-data?token=&chain=` and `/coins/{platform}/contract/{address}`,
/// counting every request that reaches it.
fn spawn_upstream() -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = {
        let hits = Arc::clone(&hits);
        warp::any().map(move || Arc::clone(&hits))
    };

    let map_data = warp::get()
        .and(warp::path!("map-data"))
        .and(warp::query::<HashMap<String, String>>())
        .and(counter.clone())
        .map(|params: HashMap<String, String>, hits: Arc<AtomicUsize>| {
            hits.fetch_add(1, Ordering::SeqCst);
            let token = params.get("token").map(String::as_str);
            let chain = params.get("chain").map(String::as_str);
            match (token, chain) {
                (Some("0xpepe"), Some("eth")) => {
                    warp::reply::with_status(MAP_DATA.to_string(), StatusCode::OK)
                }
                (Some("0xfresh"), Some("eth")) => {
                    warp::reply::with_status(String::new(), StatusCode::UNAUTHORIZED)
                }
                (Some("0xflaky"), _) => {
                    warp::reply::with_status(String::new(), StatusCode::SERVICE_UNAVAILABLE)
                }
                _ => warp::reply::with_status(String::new(), StatusCode::NOT_FOUND),
            }
        });

    let coin = warp::get()
        .and(warp::path!("coins" / String / "contract" / String))
        .and(counter)
        .map(|platform: String, address: String, hits: Arc<AtomicUsize>| {
            hits.fetch_add(1, Ordering::SeqCst);
            if platform == "binance-smart-chain" && address == "0xcake" {
                warp::reply::with_status(COIN.to_string(), StatusCode::OK)
            } else {
                warp::reply::with_status(
                    r#"{"error":"coin not found"}"#.to_string(),
                    StatusCode::NOT_FOUND,
                )
            }
        });

    let (addr, server) = warp::serve(map_data.or(coin)).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    (addr, hits)
}

fn config(addr: SocketAddr) -> BotConfig {
    BotConfig {
        bot_token: "123:abc".to_string(),
        telegram_api_url: TELEGRAM_API_URL.to_string(),
        holder_api_url: format!("http://{}/map-data", addr),
        market_api_url: format!("http://{}/", addr),
        visual_base_url: VISUAL_BASE_URL.to_string(),
        webdriver_url: WEBDRIVER_URL.to_string(),
        screenshot_dir: std::env::temp_dir(),
        metrics_port: None,
    }
}

fn holder_client(addr: SocketAddr) -> Result<HolderMapClient> {
    Ok(HolderMapClient::new(
        &config(addr),
        &RuntimeConfig::default(),
        WorkerPool::new(4),
    )?)
}

fn market_client(addr: SocketAddr) -> Result<CoinGeckoClient> {
    Ok(CoinGeckoClient::new(
        &config(addr),
        &RuntimeConfig::default(),
        WorkerPool::new(4),
    )?)
}

#[test_log::test(tokio::test)]
async fn holder_lookup_sends_token_and_chain() -> Result<()> {
    let (addr, _hits) = spawn_upstream();
    let client = holder_client(addr)?;

    let HolderLookup::Found(snapshot) = client.lookup(&TokenQuery::new("0xpepe", Chain::Eth)).await? else {
        panic!("expected a holder snapshot");
    };
    assert_eq!(snapshot.symbol, "PEPE");
    assert_eq!(snapshot.address, "0xpepe");
    assert_eq!(snapshot.last_update.as_deref(), Some("1714552200"));
    assert_eq!(snapshot.holders.len(), 3);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn holder_statuses_map_to_lookups() -> Result<()> {
    let (addr, _hits) = spawn_upstream();
    let client = holder_client(addr)?;

    assert_eq!(
        client.lookup(&TokenQuery::new("0xfresh", Chain::Eth)).await?,
        HolderLookup::NotComputed
    );
    // Same token on another chain is unknown upstream.
    assert_eq!(
        client.lookup(&TokenQuery::new("0xpepe", Chain::Bsc)).await?,
        HolderLookup::UnknownToken
    );
    assert!(client.lookup(&TokenQuery::new("0xflaky", Chain::Eth)).await.is_err());
    assert!(client.fetch_holders(&TokenQuery::new("0xflaky", Chain::Eth)).await.is_none());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn contract_url_joins_platform_and_address() -> Result<()> {
    let (addr, _hits) = spawn_upstream();
    let client = market_client(addr)?;

    assert_eq!(
        client.contract_url("ethereum", "0xabc"),
        format!("http://{}/coins/ethereum/contract/0xabc", addr)
    );
    Ok(())
}

#[test_log::test(tokio::test)]
async fn market_lookup_uses_chain_platform() -> Result<()> {
    let (addr, _hits) = spawn_upstream();
    let client = market_client(addr)?;

    let market = client
        .lookup(&TokenQuery::new("0xcake", Chain::Bsc))
        .await?
        .expect("market data for a tracked contract");
    assert_eq!(market.price, Some(2.41));
    assert_eq!(market.price_change_pct_24h, Some(-1.5));

    assert!(client.lookup(&TokenQuery::new("0xcake", Chain::Eth)).await?.is_none());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn untracked_chains_skip_the_market_service() -> Result<()> {
    let (addr, hits) = spawn_upstream();
    let client = market_client(addr)?;

    for chain in [Chain::Sol, Chain::Sonic] {
        let query = TokenQuery::new("So11111111111111111111111111111111111111112", chain);
        assert!(client.fetch_market(&query).await.is_none());
    }
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    Ok(())
}
