pub mod analysis;
pub mod bot;
pub mod chain;
pub mod composer;
pub mod config;
pub mod constants;
pub mod holders;
pub mod market;
pub mod metrics;     // Prometheus counters and exporter
pub mod pool;
pub mod telegram;
pub mod types;
pub mod utils;
pub mod visual;      // Headless browser screenshots
