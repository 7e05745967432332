//! Holder-distribution lookups against the Bubblemaps `map-data` API.

use async_trait::async_trait;
use log::{error, warn};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::AcquireError;

use crate::{
    chain::TokenQuery,
    config::{BotConfig, RuntimeConfig},
    metrics::{record_fetch, Outcome, Source},
    pool::WorkerPool,
    types::{HolderRecord, TokenSnapshot, NOT_AVAILABLE},
};

#[derive(Debug, Error)]
pub enum HolderError {
    #[error("holder map request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("holder map returned status {0}")]
    Status(StatusCode),
    #[error("malformed holder map payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("worker pool closed")]
    Pool(#[from] AcquireError),
}

/// Result of a successful round trip to the mapping service.
#[derive(Debug, Clone, PartialEq)]
pub enum HolderLookup {
    Found(TokenSnapshot),
    /// 401: the map exists but has not been computed yet.
    NotComputed,
    /// 404: the service does not know this token.
    UnknownToken,
}

#[derive(Debug, Deserialize)]
struct MapDataResponse {
    symbol: Option<String>,
    full_name: Option<String>,
    dt_update: Option<Value>,
    nodes: Option<Vec<MapNode>>,
}

#[derive(Debug, Deserialize)]
struct MapNode {
    address: String,
    percentage: Option<f64>,
}

impl MapDataResponse {
    fn into_snapshot(self, address: &str) -> TokenSnapshot {
        let last_update = match self.dt_update {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(text),
            Some(other) => Some(other.to_string()),
        };

        TokenSnapshot {
            symbol: self.symbol.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            full_name: self.full_name.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            address: address.to_string(),
            last_update,
            holders: self
                .nodes
                .unwrap_or_default()
                .into_iter()
                .map(|node| HolderRecord::new(node.address, node.percentage.unwrap_or(0.0)))
                .collect(),
        }
    }
}

/// Maps a raw response to a lookup outcome. `query` supplies the address echoed back to users.
pub fn interpret_map_response(
    status: StatusCode,
    body: &str,
    query: &TokenQuery,
) -> Result<HolderLookup, HolderError> {
    match status {
        StatusCode::UNAUTHORIZED => Ok(HolderLookup::NotComputed),
        StatusCode::NOT_FOUND => Ok(HolderLookup::UnknownToken),
        status if !status.is_success() => Err(HolderError::Status(status)),
        _ => {
            let payload: MapDataResponse = serde_json::from_str(body)?;
            Ok(HolderLookup::Found(payload.into_snapshot(query.address())))
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HolderSource: Send + Sync {
    /// `None` whenever no snapshot can be shown, whatever the reason.
    async fn fetch_holders(&self, query: &TokenQuery) -> Option<TokenSnapshot>;
}

pub struct HolderMapClient {
    http: Client,
    api_url: String,
    pool: WorkerPool,
}

impl HolderMapClient {
    pub fn new(
        config: &BotConfig,
        runtime: &RuntimeConfig,
        pool: WorkerPool,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(runtime.http_timeout).build()?;
        Ok(Self {
            http,
            api_url: config.holder_api_url.clone(),
            pool,
        })
    }

    pub async fn lookup(&self, query: &TokenQuery) -> Result<HolderLookup, HolderError> {
        let (status, body) = self
            .pool
            .run(async {
                let response = self
                    .http
                    .get(&self.api_url)
                    .query(&[("token", query.address()), ("chain", query.chain().code())])
                    .send()
                    .await?;
                let status = response.status();
                let body = response.text().await?;
                Ok::<_, reqwest::Error>((status, body))
            })
            .await??;

        interpret_map_response(status, &body, query)
    }
}

#[async_trait]
impl HolderSource for HolderMapClient {
    async fn fetch_holders(&self, query: &TokenQuery) -> Option<TokenSnapshot> {
        match self.lookup(query).await {
            Ok(HolderLookup::Found(snapshot)) => {
                record_fetch(Source::Holders, Outcome::Found);
                Some(snapshot)
            }
            Ok(HolderLookup::NotComputed) => {
                warn!("Map not computed for {}", query);
                record_fetch(Source::Holders, Outcome::Absent);
                None
            }
            Ok(HolderLookup::UnknownToken) => {
                warn!("Token not found: {}", query);
                record_fetch(Source::Holders, Outcome::Absent);
                None
            }
            Err(e) => {
                error!("Holder map error for {}: {}", query, e);
                record_fetch(Source::Holders, Outcome::Failed);
                None
            }
        }
    }
}
