use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Networks the holder-mapping service knows how to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Eth,
    Bsc,
    Ftm,
    Avax,
    Cro,
    Arbi,
    Poly,
    Base,
    Sol,
    Sonic,
}

impl Chain {
    /// Every supported chain, in the order shown to users.
    pub const ALL: [Chain; 10] = [
        Chain::Eth,
        Chain::Bsc,
        Chain::Ftm,
        Chain::Avax,
        Chain::Cro,
        Chain::Arbi,
        Chain::Poly,
        Chain::Base,
        Chain::Sol,
        Chain::Sonic,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Chain::Eth => "eth",
            Chain::Bsc => "bsc",
            Chain::Ftm => "ftm",
            Chain::Avax => "avax",
            Chain::Cro => "cro",
            Chain::Arbi => "arbi",
            Chain::Poly => "poly",
            Chain::Base => "base",
            Chain::Sol => "sol",
            Chain::Sonic => "sonic",
        }
    }

    /// CoinGecko asset platform id, when the market-data service tracks this chain.
    pub fn coingecko_platform(&self) -> Option<&'static str> {
        match self {
            Chain::Eth => Some("ethereum"),
            Chain::Bsc => Some("binance-smart-chain"),
            Chain::Ftm => Some("fantom"),
            Chain::Avax => Some("avalanche"),
            Chain::Poly => Some("polygon-pos"),
            Chain::Arbi => Some("arbitrum-one"),
            Chain::Base => Some("base"),
            Chain::Cro => Some("cronos"),
            Chain::Sol | Chain::Sonic => None,
        }
    }

    pub fn is_solana(&self) -> bool {
        matches!(self, Chain::Sol)
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Chain {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        Chain::ALL
            .iter()
            .copied()
            .find(|chain| chain.code() == lowered)
            .ok_or_else(|| InputError::UnsupportedChain(s.to_string()))
    }
}

/// Comma separated list of chain codes for help and rejection messages.
pub fn supported_chains() -> String {
    Chain::ALL
        .iter()
        .map(Chain::code)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("expected `<address> <chain>`, got {0} token(s)")]
    WrongArity(usize),
    #[error("unsupported chain `{0}`")]
    UnsupportedChain(String),
}

/// A validated lookup request. Only [`TokenQuery::parse`] and [`TokenQuery::new`] build one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenQuery {
    address: String,
    chain: Chain,
}

impl TokenQuery {
    pub fn new(address: impl Into<String>, chain: Chain) -> Self {
        Self {
            address: address.into(),
            chain,
        }
    }

    /// Parses a raw chat message of the form `<address> <chain>`.
    pub fn parse(text: &str) -> Result<Self, InputError> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        match tokens.as_slice() {
            [address, chain] => Ok(Self::new(*address, chain.parse()?)),
            other => Err(InputError::WrongArity(other.len())),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }
}

impl fmt::Display for TokenQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.address, self.chain)
    }
}
