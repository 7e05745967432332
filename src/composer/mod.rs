//! Fans a validated query out to the three sources and turns the results into one reply.

pub mod format;

use log::{info, warn};
use std::{sync::Arc, time::Duration};
use tokio::time::{timeout, Instant};

use crate::{
    chain::{InputError, TokenQuery},
    holders::HolderSource,
    market::MarketSource,
    metrics::{record_deadline_exceeded, record_request_duration},
    types::{MarketSnapshot, TokenSnapshot},
    visual::{Screenshot, VisualSource},
};

pub use format::{GENERIC_FAILURE_MESSAGE, NO_MAP_MESSAGE};

/// What the bot should send back for one query.
#[derive(Debug)]
pub enum Reply {
    /// Plain-text failure notice. Never accompanied by data or an image.
    Failure(&'static str),
    /// Markdown report without an image.
    Report(String),
    /// Image with the Markdown report as caption. Dropping it deletes the file.
    Photo { image: Screenshot, caption: String },
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Reply::Failure(text) => text,
            Reply::Report(text) => text,
            Reply::Photo { caption, .. } => caption,
        }
    }
}

/// Whitespace-split `<address> <chain>` validation. No I/O happens before this succeeds.
pub fn parse_request(text: &str) -> Result<TokenQuery, InputError> {
    TokenQuery::parse(text.trim())
}

type Gathered = (
    Option<TokenSnapshot>,
    Option<MarketSnapshot>,
    Option<Screenshot>,
);

pub struct Composer {
    holders: Arc<dyn HolderSource>,
    market: Arc<dyn MarketSource>,
    visual: Arc<dyn VisualSource>,
    request_deadline: Duration,
}

impl Composer {
    pub fn new(
        holders: Arc<dyn HolderSource>,
        market: Arc<dyn MarketSource>,
        visual: Arc<dyn VisualSource>,
        request_deadline: Duration,
    ) -> Self {
        Self {
            holders,
            market,
            visual,
            request_deadline,
        }
    }

    async fn gather(&self, query: &TokenQuery) -> Gathered {
        let market = async {
            if query.chain().is_solana() {
                None
            } else {
                self.market.fetch_market(query).await
            }
        };
        tokio::join!(
            self.holders.fetch_holders(query),
            market,
            self.visual.capture(query)
        )
    }

    pub async fn compose(&self, query: &TokenQuery) -> Reply {
        let started = Instant::now();
        let gathered = timeout(self.request_deadline, self.gather(query)).await;
        record_request_duration(started.elapsed());

        let (snapshot, market, image) = match gathered {
            Ok(gathered) => gathered,
            Err(_) => {
                warn!(
                    "Request for {} exceeded the {:?} deadline; all fetches cancelled",
                    query, self.request_deadline
                );
                record_deadline_exceeded();
                return Reply::Failure(GENERIC_FAILURE_MESSAGE);
            }
        };

        let Some(snapshot) = snapshot else {
            info!("No holder map for {}", query);
            return Reply::Failure(NO_MAP_MESSAGE);
        };

        let caption = format::render_report(&snapshot, query.chain(), market.as_ref());
        match image {
            Some(image) => Reply::Photo { image, caption },
            None => Reply::Report(caption),
        }
    }
}
