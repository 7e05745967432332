use anyhow::Result;
use log::{debug, error, info, warn};
use std::{sync::Arc, time::Duration};

use crate::{
    composer::{
        format::{invalid_format_message, start_message, PROCESSING_MESSAGE},
        parse_request, Composer, Reply, GENERIC_FAILURE_MESSAGE,
    },
    metrics::{record_rejected, record_request, record_send_failure},
    telegram::{Messenger, TelegramClient, TelegramError, TextMode},
};

/// Pause after a failed `getUpdates` before polling again.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Help,
    /// Some other slash command; ignored.
    UnknownCommand,
    Query(&'a str),
}

/// `/start` and `/help` (optionally `@botname`-suffixed) show usage; any
/// other slash command is ignored; everything else is a query.
pub fn route(text: &str) -> Route<'_> {
    let trimmed = text.trim();
    let Some(command) = trimmed.strip_prefix('/') else {
        return Route::Query(trimmed);
    };
    let name = command
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .split('@')
        .next()
        .unwrap_or_default();
    match name.to_ascii_lowercase().as_str() {
        "start" | "help" => Route::Help,
        _ => Route::UnknownCommand,
    }
}

pub struct Bot {
    messenger: Arc<dyn Messenger>,
    composer: Arc<Composer>,
}

impl Bot {
    pub fn new(messenger: Arc<dyn Messenger>, composer: Arc<Composer>) -> Self {
        Self {
            messenger,
            composer,
        }
    }

    /// Handles one chat message on its own task. Errors and panics from
    /// the handler become the generic failure message.
    pub async fn dispatch(self: &Arc<Self>, chat_id: i64, text: String) {
        let bot = Arc::clone(self);
        let outcome = tokio::spawn(async move { bot.handle_text(chat_id, &text).await }).await;

        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => format!("{:#}", e),
            Err(e) => format!("request task aborted: {}", e),
        };
        error!("Processing error for chat {}: {}", chat_id, failure);
        if let Err(e) = self
            .messenger
            .send_text(chat_id, GENERIC_FAILURE_MESSAGE, TextMode::Plain)
            .await
        {
            record_send_failure();
            error!("Could not report failure to chat {}: {}", chat_id, e);
        }
    }

    pub async fn handle_text(&self, chat_id: i64, text: &str) -> Result<()> {
        match route(text) {
            Route::Help => {
                self.messenger
                    .send_text(chat_id, &start_message(), TextMode::Markdown)
                    .await?;
            }
            Route::UnknownCommand => debug!("Ignoring command {:?} from chat {}", text, chat_id),
            Route::Query(raw) => {
                let query = match parse_request(raw) {
                    Ok(query) => query,
                    Err(e) => {
                        warn!("Rejected input from chat {}: {}", chat_id, e);
                        record_rejected();
                        self.messenger
                            .send_text(chat_id, &invalid_format_message(), TextMode::Markdown)
                            .await?;
                        return Ok(());
                    }
                };

                info!("Processing contract: {}", query);
                record_request();
                self.messenger
                    .send_text(chat_id, PROCESSING_MESSAGE, TextMode::Plain)
                    .await?;

                let reply = self.composer.compose(&query).await;
                self.deliver(chat_id, reply).await?;
            }
        }
        Ok(())
    }

    /// Sends `reply`. A photo's file is deleted when `reply` drops at the
    /// end of this call, whether or not the upload succeeded. If the file
    /// is gone before upload, the caption goes out as a text report.
    pub async fn deliver(&self, chat_id: i64, reply: Reply) -> Result<()> {
        match &reply {
            Reply::Failure(text) => {
                self.messenger
                    .send_text(chat_id, text, TextMode::Plain)
                    .await?
            }
            Reply::Report(text) => {
                self.messenger
                    .send_text(chat_id, text, TextMode::Markdown)
                    .await?
            }
            Reply::Photo { image, caption } => {
                match self.messenger.send_photo(chat_id, image, caption).await {
                    Err(TelegramError::Photo(e)) => {
                        warn!(
                            "Screenshot {} unreadable ({}); sending text report",
                            image.file_name(),
                            e
                        );
                        self.messenger
                            .send_text(chat_id, caption, TextMode::Markdown)
                            .await?
                    }
                    result => result?,
                }
            }
        }
        Ok(())
    }
}

/// Long-polls Telegram and hands each text message to [`Bot::dispatch`] on a
/// separate task. Runs until the surrounding future is dropped.
pub async fn run_polling(client: Arc<TelegramClient>, bot: Arc<Bot>) -> Result<()> {
    let mut offset = 0;
    info!("Polling for updates");

    loop {
        let updates = match client.get_updates(offset).await {
            Ok(updates) => updates,
            Err(e) => {
                error!("getUpdates failed: {}", e);
                tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };
            let Some(text) = message.text else {
                continue;
            };
            let bot = Arc::clone(&bot);
            tokio::spawn(async move { bot.dispatch(message.chat.id, text).await });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chain::TokenQuery,
        holders::MockHolderSource,
        market::MockMarketSource,
        telegram::{MockMessenger, TelegramError},
        types::{HolderRecord, TokenSnapshot},
        visual::{MockVisualSource, Screenshot},
    };
    use std::path::PathBuf;

    fn idle_composer() -> Arc<Composer> {
        let mut holders = MockHolderSource::new();
        holders.expect_fetch_holders().never();
        let mut market = MockMarketSource::new();
        market.expect_fetch_market().never();
        let mut visual = MockVisualSource::new();
        visual.expect_capture().never();
        Arc::new(Composer::new(
            Arc::new(holders),
            Arc::new(market),
            Arc::new(visual),
            Duration::from_secs(45),
        ))
    }

    fn composer_with_photo(path: PathBuf) -> Arc<Composer> {
        let mut holders = MockHolderSource::new();
        holders.expect_fetch_holders().returning(|query: &TokenQuery| {
            Some(TokenSnapshot {
                symbol: "TKN".to_string(),
                full_name: "Token".to_string(),
                address: query.address().to_string(),
                last_update: None,
                holders: vec![
                    HolderRecord::new("0x1", 90.0),
                    HolderRecord::new("0x2", 3.0),
                    HolderRecord::new("0x3", 2.0),
                ],
            })
        });
        let mut market = MockMarketSource::new();
        market.expect_fetch_market().returning(|_| None);
        let mut visual = MockVisualSource::new();
        visual
            .expect_capture()
            .returning(move |_| Some(Screenshot::new(path.clone())));
        Arc::new(Composer::new(
            Arc::new(holders),
            Arc::new(market),
            Arc::new(visual),
            Duration::from_secs(45),
        ))
    }

    #[test]
    fn routes_commands() {
        assert_eq!(route("/start"), Route::Help);
        assert_eq!(route("/help"), Route::Help);
        assert_eq!(route("/start@BubbleBot"), Route::Help);
        assert_eq!(route("  /HELP extra"), Route::Help);
        assert_eq!(route("/stats"), Route::UnknownCommand);
        assert_eq!(route(" 0xabc eth "), Route::Query("0xabc eth"));
    }

    #[test_log::test(tokio::test)]
    async fn start_sends_usage() {
        let mut messenger = MockMessenger::new();
        messenger
            .expect_send_text()
            .withf(|chat, text, mode| {
                *chat == 1 && text.contains("Supported chains:") && *mode == TextMode::Markdown
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let bot = Bot::new(Arc::new(messenger), idle_composer());
        bot.handle_text(1, "/start").await.unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn bad_input_is_rejected_without_fetching() {
        let mut messenger = MockMessenger::new();
        messenger
            .expect_send_text()
            .withf(|_, text, _| text.starts_with("❌ Invalid format."))
            .times(3)
            .returning(|_, _, _| Ok(()));

        let bot = Bot::new(Arc::new(messenger), idle_composer());
        bot.handle_text(5, "0xabc").await.unwrap();
        bot.handle_text(5, "0xabc eth extra").await.unwrap();
        bot.handle_text(5, "0xabc matic").await.unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn photo_file_removed_after_send() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp_0xabc.png");
        std::fs::write(&path, b"png").unwrap();

        let mut messenger = MockMessenger::new();
        messenger
            .expect_send_text()
            .withf(|chat, text, mode| *chat == 9 && text == PROCESSING_MESSAGE && *mode == TextMode::Plain)
            .times(1)
            .returning(|_, _, _| Ok(()));
        let seen = path.clone();
        messenger
            .expect_send_photo()
            .withf(move |chat, image, caption| {
                *chat == 9 && image.path() == seen.as_path() && caption.contains("Score: 1/5")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let bot = Bot::new(Arc::new(messenger), composer_with_photo(path.clone()));
        bot.handle_text(9, "0xabc ETH").await.unwrap();
        assert!(!path.exists());
    }

    #[test_log::test(tokio::test)]
    async fn photo_file_removed_when_send_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp_0xabc.png");
        std::fs::write(&path, b"png").unwrap();

        let mut messenger = MockMessenger::new();
        messenger
            .expect_send_text()
            .withf(|chat, text, mode| *chat == 9 && text == PROCESSING_MESSAGE && *mode == TextMode::Plain)
            .times(1)
            .returning(|_, _, _| Ok(()));
        messenger.expect_send_photo().times(1).returning(|_, _, _| {
            Err(TelegramError::Api {
                description: "Bad Request: wrong file".to_string(),
            })
        });
        messenger
            .expect_send_text()
            .withf(|chat, text, mode| *chat == 9 && text == GENERIC_FAILURE_MESSAGE && *mode == TextMode::Plain)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let bot = Arc::new(Bot::new(
            Arc::new(messenger),
            composer_with_photo(path.clone()),
        ));
        bot.dispatch(9, "0xabc eth".to_string()).await;
        assert!(!path.exists());
    }

    #[test_log::test(tokio::test)]
    async fn unreadable_photo_falls_back_to_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp_0xabc.png");

        let mut messenger = MockMessenger::new();
        messenger.expect_send_photo().times(1).returning(|_, _, _| {
            Err(TelegramError::Photo(std::io::Error::from(
                std::io::ErrorKind::NotFound,
            )))
        });
        messenger
            .expect_send_text()
            .withf(|chat, text, mode| {
                *chat == 4 && text.starts_with("📊 *Token (TKN)*") && *mode == TextMode::Markdown
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let bot = Bot::new(Arc::new(messenger), idle_composer());
        let reply = Reply::Photo {
            image: Screenshot::new(&path),
            caption: "📊 *Token (TKN)*\n\n• Network: ETH".to_string(),
        };
        bot.deliver(4, reply).await.unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn other_photo_errors_propagate() {
        let mut messenger = MockMessenger::new();
        messenger.expect_send_photo().times(1).returning(|_, _, _| {
            Err(TelegramError::Api {
                description: "Bad Request: PHOTO_INVALID_DIMENSIONS".to_string(),
            })
        });
        messenger.expect_send_text().never();

        let bot = Bot::new(Arc::new(messenger), idle_composer());
        let reply = Reply::Photo {
            image: Screenshot::new("/nonexistent/temp_0x1.png"),
            caption: "caption".to_string(),
        };
        assert!(bot.deliver(4, reply).await.is_err());
    }

    #[test_log::test(tokio::test)]
    async fn failure_reply_is_plain_text() {
        let mut messenger = MockMessenger::new();
        messenger
            .expect_send_text()
            .withf(|chat, text, mode| *chat == 3 && text == GENERIC_FAILURE_MESSAGE && *mode == TextMode::Plain)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let bot = Bot::new(Arc::new(messenger), idle_composer());
        bot.deliver(3, Reply::Failure(GENERIC_FAILURE_MESSAGE))
            .await
            .unwrap();
    }
}
