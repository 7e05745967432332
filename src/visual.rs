//! Bubble-map screenshots captured through a WebDriver endpoint (e.g. chromedriver).

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, error, info, warn};
use reqwest::{Client, Method};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tokio::{
    sync::{AcquireError, Mutex},
    task::JoinError,
    time::{error::Elapsed, timeout_at, Instant},
};
use url::Url;

use crate::{
    chain::TokenQuery,
    config::{BotConfig, RuntimeConfig},
    constants::CHROME_ARGS,
    metrics::{record_fetch, Outcome, Source},
    pool::WorkerPool,
};

#[derive(Debug, Error)]
pub enum VisualError {
    #[error("webdriver request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("webdriver error `{error}`: {message}")]
    WebDriver { error: String, message: String },
    #[error("malformed webdriver payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("screenshot is not valid base64: {0}")]
    Image(#[from] base64::DecodeError),
    #[error("could not write screenshot: {0}")]
    Io(#[from] io::Error),
    #[error("screenshot writer failed: {0}")]
    Writer(#[from] JoinError),
    #[error("invalid visualization url: {0}")]
    Url(String),
    #[error("capture exceeded {0:?}")]
    Timeout(Duration),
    #[error("worker pool closed")]
    Pool(#[from] AcquireError),
}

/// A captured PNG on disk. The file is removed when this value drops.
#[derive(Debug)]
pub struct Screenshot {
    path: PathBuf,
}

impl Screenshot {
    /// Takes ownership of `path`; whatever is there is deleted on drop.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "visualization.png".to_string())
    }

    pub async fn read(&self) -> io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}

impl Drop for Screenshot {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed screenshot {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove screenshot {}: {}", self.path.display(), e),
        }
    }
}

/// `temp_<address>.png`, with anything but ASCII alphanumerics stripped from the address.
pub fn screenshot_path(dir: &Path, address: &str) -> PathBuf {
    let stem: String = address
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    dir.join(format!("temp_{}.png", stem))
}

/// Writes `png` on the blocking pool. The guard owns `path` before the
/// write starts, so a cancelled caller still gets the file removed once
/// the write returns.
async fn write_screenshot(path: PathBuf, png: Vec<u8>) -> Result<Screenshot, VisualError> {
    let shot = tokio::task::spawn_blocking(move || {
        let shot = Screenshot::new(path);
        std::fs::write(shot.path(), &png)?;
        Ok::<_, io::Error>(shot)
    })
    .await??;
    Ok(shot)
}

/// `{base}/{chain}/token/{address}`
pub fn visualization_url(base: &str, query: &TokenQuery) -> Result<Url, VisualError> {
    let mut url = Url::parse(base).map_err(|e| VisualError::Url(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| VisualError::Url(base.to_string()))?
        .pop_if_empty()
        .extend(&[query.chain().code(), "token", query.address()]);
    Ok(url)
}

#[derive(Debug, Deserialize)]
struct WireResponse<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewSession {
    session_id: String,
}

/// Minimal W3C WebDriver client: the handful of commands a capture needs.
#[derive(Clone)]
struct WebDriver {
    http: Client,
    base_url: String,
}

impl WebDriver {
    async fn command<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, VisualError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let err = serde_json::from_str::<WireResponse<WireError>>(&text)
                .map(|wire| wire.value)
                .unwrap_or(WireError {
                    error: status.to_string(),
                    message: text,
                });
            return Err(VisualError::WebDriver {
                error: err.error,
                message: err.message,
            });
        }

        Ok(serde_json::from_str::<WireResponse<T>>(&text)?.value)
    }

    async fn new_session(&self, page_load_timeout: Duration) -> Result<String, VisualError> {
        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": CHROME_ARGS },
                }
            }
        });
        let session: NewSession = self
            .command(Method::POST, "/session", Some(capabilities))
            .await?;

        let timeouts = json!({ "pageLoad": page_load_timeout.as_millis() as u64 });
        self.command::<Value>(
            Method::POST,
            &format!("/session/{}/timeouts", session.session_id),
            Some(timeouts),
        )
        .await?;

        Ok(session.session_id)
    }

    async fn navigate(&self, session_id: &str, url: &Url) -> Result<(), VisualError> {
        self.command::<Value>(
            Method::POST,
            &format!("/session/{}/url", session_id),
            Some(json!({ "url": url.as_str() })),
        )
        .await?;
        Ok(())
    }

    async fn screenshot_png(&self, session_id: &str) -> Result<Vec<u8>, VisualError> {
        let encoded: String = self
            .command(
                Method::GET,
                &format!("/session/{}/screenshot", session_id),
                None,
            )
            .await?;
        Ok(STANDARD.decode(encoded)?)
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), VisualError> {
        self.command::<Value>(Method::DELETE, &format!("/session/{}", session_id), None)
            .await?;
        Ok(())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VisualSource: Send + Sync {
    async fn capture(&self, query: &TokenQuery) -> Option<Screenshot>;
}

/// One long-lived browser session shared by every request. The mutex
/// ensures a single capture drives it at a time.
pub struct BrowserSession {
    driver: WebDriver,
    session: Mutex<Option<String>>,
    pool: WorkerPool,
    visual_base_url: String,
    screenshot_dir: PathBuf,
    page_load_timeout: Duration,
    render_settle: Duration,
    capture_timeout: Duration,
}

impl BrowserSession {
    pub fn new(
        config: &BotConfig,
        runtime: &RuntimeConfig,
        pool: WorkerPool,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(runtime.screenshot_timeout).build()?;
        Ok(Self {
            driver: WebDriver {
                http,
                base_url: config.webdriver_url.trim_end_matches('/').to_string(),
            },
            session: Mutex::new(None),
            pool,
            visual_base_url: config.visual_base_url.clone(),
            screenshot_dir: config.screenshot_dir.clone(),
            page_load_timeout: runtime.page_load_timeout,
            render_settle: runtime.render_settle,
            capture_timeout: runtime.screenshot_timeout,
        })
    }

    /// Captures `query` within `budget`, time spent queued for the browser
    /// included. Only the capture holding the browser may discard its session.
    pub async fn capture_screenshot(
        &self,
        query: &TokenQuery,
        budget: Duration,
    ) -> Result<Screenshot, VisualError> {
        let deadline = Instant::now() + budget;
        let expired = |_: Elapsed| VisualError::Timeout(budget);
        let url = visualization_url(&self.visual_base_url, query)?;

        let mut session = timeout_at(deadline, self.session.lock())
            .await
            .map_err(expired)?;
        let _permit = timeout_at(deadline, self.pool.acquire())
            .await
            .map_err(expired)??;

        let outcome = timeout_at(deadline, self.drive(&mut session, &url, query)).await;
        match outcome {
            Ok(Ok(shot)) => Ok(shot),
            Ok(Err(e)) => {
                // A failed command may have wedged the browser; start over next time.
                self.discard(session.take());
                Err(e)
            }
            Err(elapsed) => {
                self.discard(session.take());
                Err(expired(elapsed))
            }
        }
    }

    async fn drive(
        &self,
        session: &mut Option<String>,
        url: &Url,
        query: &TokenQuery,
    ) -> Result<Screenshot, VisualError> {
        let session_id = match session.clone() {
            Some(id) => id,
            None => {
                let id = self.driver.new_session(self.page_load_timeout).await?;
                info!("Started browser session {}", id);
                *session = Some(id.clone());
                id
            }
        };
        self.render_and_save(&session_id, url, query).await
    }

    async fn render_and_save(
        &self,
        session_id: &str,
        url: &Url,
        query: &TokenQuery,
    ) -> Result<Screenshot, VisualError> {
        self.driver.navigate(session_id, url).await?;
        tokio::time::sleep(self.render_settle).await;
        let png = self.driver.screenshot_png(session_id).await?;

        write_screenshot(screenshot_path(&self.screenshot_dir, query.address()), png).await
    }

    /// Deletes `session_id` on a background task.
    fn discard(&self, session_id: Option<String>) {
        let Some(id) = session_id else {
            return;
        };
        let driver = self.driver.clone();
        tokio::spawn(async move {
            match driver.delete_session(&id).await {
                Ok(()) => debug!("Discarded browser session {}", id),
                Err(e) => debug!("Discarding browser session {}: {}", id, e),
            }
        });
    }

    /// Closes the browser. Called once on process shutdown.
    pub async fn shutdown(&self) {
        if let Some(id) = self.session.lock().await.take() {
            match self.driver.delete_session(&id).await {
                Ok(()) => info!("Closed browser session {}", id),
                Err(e) => warn!("Failed to close browser session {}: {}", id, e),
            }
        }
    }
}

#[async_trait]
impl VisualSource for BrowserSession {
    async fn capture(&self, query: &TokenQuery) -> Option<Screenshot> {
        match self.capture_screenshot(query, self.capture_timeout).await {
            Ok(shot) => {
                record_fetch(Source::Visual, Outcome::Found);
                Some(shot)
            }
            Err(e) => {
                error!("Screenshot error for {}: {}", query, e);
                record_fetch(Source::Visual, Outcome::Failed);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;

    #[test]
    fn url_is_chain_then_token() {
        let query = TokenQuery::new("0xAbC", Chain::Bsc);
        let url = visualization_url("https://app.bubblemaps.io", &query).unwrap();
        assert_eq!(url.as_str(), "https://app.bubblemaps.io/bsc/token/0xAbC");

        let url = visualization_url("https://app.bubblemaps.io/", &query).unwrap();
        assert_eq!(url.as_str(), "https://app.bubblemaps.io/bsc/token/0xAbC");
    }

    #[test]
    fn url_escapes_address() {
        let query = TokenQuery::new("../../etc", Chain::Eth);
        let url = visualization_url("https://app.bubblemaps.io", &query).unwrap();
        assert!(url.as_str().starts_with("https://app.bubblemaps.io/eth/token/"));
        assert!(!url.path().contains("/etc"));
    }

    #[test]
    fn path_is_deterministic_and_sanitized() {
        let dir = Path::new("/tmp/shots");
        assert_eq!(
            screenshot_path(dir, "0xAbC"),
            PathBuf::from("/tmp/shots/temp_0xAbC.png")
        );
        assert_eq!(
            screenshot_path(dir, "../evil/0x1"),
            PathBuf::from("/tmp/shots/temp_evil0x1.png")
        );
    }

    #[test]
    fn drop_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp_0x1.png");
        std::fs::write(&path, b"png").unwrap();

        let shot = Screenshot::new(&path);
        assert!(path.exists());
        drop(shot);
        assert!(!path.exists());
    }

    #[test]
    fn drop_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let shot = Screenshot::new(dir.path().join("never_written.png"));
        assert_eq!(shot.file_name(), "never_written.png");
        drop(shot);
    }

    #[tokio::test]
    async fn written_screenshot_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let shot = write_screenshot(dir.path().join("temp_0x1.png"), b"png".to_vec())
            .await
            .unwrap();
        assert_eq!(shot.read().await.unwrap(), b"png");
    }

    #[tokio::test]
    async fn cancelled_write_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp_0x2.png");

        let write = write_screenshot(path.clone(), vec![0u8; 4 << 20]);
        let _ = tokio::time::timeout(Duration::ZERO, write).await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!path.exists());
    }

    #[test]
    fn parses_webdriver_error_body() {
        let body = r#"{"value": {"error": "invalid session id", "message": "session deleted", "stacktrace": ""}}"#;
        let wire: WireResponse<WireError> = serde_json::from_str(body).unwrap();
        assert_eq!(wire.value.error, "invalid session id");
        assert_eq!(wire.value.message, "session deleted");
    }

    #[test]
    fn parses_new_session() {
        let body = r#"{"value": {"sessionId": "abc123", "capabilities": {"browserName": "chrome"}}}"#;
        let wire: WireResponse<NewSession> = serde_json::from_str(body).unwrap();
        assert_eq!(wire.value.session_id, "abc123");
    }
}
