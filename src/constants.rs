use std::env;

pub const PROJECT_NAME: &str = "bubblemaps_bot";

// Upstream endpoints
pub static HOLDER_API_URL: &str = "https://api-legacy.bubblemaps.io/map-data";
pub static MARKET_API_URL: &str = "https://api.coingecko.com/api/v3";
pub static VISUAL_BASE_URL: &str = "https://app.bubblemaps.io";
pub static TELEGRAM_API_URL: &str = "https://api.telegram.org";
pub static WEBDRIVER_URL: &str = "http://localhost:9515";

// Timings, in seconds
pub const HTTP_TIMEOUT_SECS: u64 = 5;
pub const PAGE_LOAD_TIMEOUT_SECS: u64 = 20;
pub const RENDER_SETTLE_SECS: u64 = 4;
pub const SCREENSHOT_TIMEOUT_SECS: u64 = 30;
pub const REQUEST_DEADLINE_SECS: u64 = 45;
pub const LONG_POLL_TIMEOUT_SECS: u64 = 30;

pub const WORKER_POOL_SIZE: usize = 4;

/// Chrome flags for the visualization capture session.
pub const CHROME_ARGS: [&str; 7] = [
    "--headless=new",
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--window-size=1200,800",
    "--disable-gpu",
    "--disable-extensions",
    "--blink-settings=imagesEnabled=false",
];

pub fn get_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Raw process environment, read once at startup.
#[derive(Debug, Clone)]
pub struct Env {
    pub bot_token: Option<String>,
    pub telegram_api_url: String,
    pub holder_api_url: String,
    pub market_api_url: String,
    pub visual_base_url: String,
    pub webdriver_url: String,
    pub screenshot_dir: Option<String>,
    pub metrics_port: Option<String>,
    pub log_level: String,
}

impl Env {
    pub fn new() -> Self {
        Env {
            bot_token: get_env("TELEGRAM_BOT_TOKEN"),
            telegram_api_url: get_env("TELEGRAM_API_URL")
                .unwrap_or_else(|| TELEGRAM_API_URL.to_string()),
            holder_api_url: get_env("HOLDER_API_URL")
                .unwrap_or_else(|| HOLDER_API_URL.to_string()),
            market_api_url: get_env("MARKET_API_URL")
                .unwrap_or_else(|| MARKET_API_URL.to_string()),
            visual_base_url: get_env("VISUAL_BASE_URL")
                .unwrap_or_else(|| VISUAL_BASE_URL.to_string()),
            webdriver_url: get_env("WEBDRIVER_URL").unwrap_or_else(|| WEBDRIVER_URL.to_string()),
            screenshot_dir: get_env("SCREENSHOT_DIR"),
            metrics_port: get_env("METRICS_PORT"),
            log_level: get_env("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        }
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}
