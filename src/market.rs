//! Market data from CoinGecko's contract-address endpoint.

use async_trait::async_trait;
use log::{debug, error, warn};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::AcquireError;

use crate::{
    chain::TokenQuery,
    config::{BotConfig, RuntimeConfig},
    metrics::{record_fetch, Outcome, Source},
    pool::WorkerPool,
    types::MarketSnapshot,
};

#[derive(Debug, Error)]
pub enum MarketError {
    #[error("market data request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed market data payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("worker pool closed")]
    Pool(#[from] AcquireError),
}

#[derive(Debug, Deserialize)]
struct CoinResponse {
    market_data: Option<MarketData>,
}

#[derive(Debug, Deserialize)]
struct MarketData {
    current_price: Option<UsdQuote>,
    market_cap: Option<UsdQuote>,
    total_volume: Option<UsdQuote>,
    price_change_percentage_24h: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct UsdQuote {
    usd: Option<f64>,
}

fn usd(quote: Option<UsdQuote>) -> Option<f64> {
    quote.and_then(|q| q.usd)
}

impl From<MarketData> for MarketSnapshot {
    fn from(data: MarketData) -> Self {
        MarketSnapshot {
            price: usd(data.current_price),
            market_cap: usd(data.market_cap),
            volume_24h: usd(data.total_volume),
            price_change_pct_24h: data.price_change_percentage_24h,
        }
    }
}

/// Non-200 responses carry no market data. A 200 without a `market_data`
/// object yields an all-empty snapshot.
pub fn interpret_market_response(
    status: StatusCode,
    body: &str,
) -> Result<Option<MarketSnapshot>, MarketError> {
    if status != StatusCode::OK {
        return Ok(None);
    }
    let payload: CoinResponse = serde_json::from_str(body)?;
    Ok(Some(payload.market_data.map(Into::into).unwrap_or_default()))
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketSource: Send + Sync {
    async fn fetch_market(&self, query: &TokenQuery) -> Option<MarketSnapshot>;
}

pub struct CoinGeckoClient {
    http: Client,
    base_url: String,
    pool: WorkerPool,
}

impl CoinGeckoClient {
    pub fn new(
        config: &BotConfig,
        runtime: &RuntimeConfig,
        pool: WorkerPool,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(runtime.http_timeout).build()?;
        Ok(Self {
            http,
            base_url: config.market_api_url.trim_end_matches('/').to_string(),
            pool,
        })
    }

    pub fn contract_url(&self, platform: &str, address: &str) -> String {
        format!("{}/coins/{}/contract/{}", self.base_url, platform, address)
    }

    /// `Ok(None)` when the chain is untracked or the service has no data.
    pub async fn lookup(&self, query: &TokenQuery) -> Result<Option<MarketSnapshot>, MarketError> {
        let Some(platform) = query.chain().coingecko_platform() else {
            debug!("No market data platform for {}", query.chain());
            return Ok(None);
        };
        let url = self.contract_url(platform, query.address());

        let (status, body) = self
            .pool
            .run(async {
                let response = self.http.get(&url).send().await?;
                let status = response.status();
                let body = response.text().await?;
                Ok::<_, reqwest::Error>((status, body))
            })
            .await??;

        if status != StatusCode::OK {
            warn!("Market data for {} returned status {}", query, status);
        }
        interpret_market_response(status, &body)
    }
}

#[async_trait]
impl MarketSource for CoinGeckoClient {
    async fn fetch_market(&self, query: &TokenQuery) -> Option<MarketSnapshot> {
        match self.lookup(query).await {
            Ok(Some(snapshot)) => {
                record_fetch(Source::Market, Outcome::Found);
                Some(snapshot)
            }
            Ok(None) => {
                record_fetch(Source::Market, Outcome::Absent);
                None
            }
            Err(e) => {
                error!("Market data error for {}: {}", query, e);
                record_fetch(Source::Market, Outcome::Failed);
                None
            }
        }
    }
}
