// src/notify/telegram.rs
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{AlertPayload, Notifier};
use crate::types::AlertKind;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API transport. Watchlist alerts ring; trending alerts are
/// delivered silently.
#[derive(Clone)]
pub struct TelegramNotifier {
    api_base: String,
    bot_token: String,
    chat_id: String,
    client: Client,
    timeout: Duration,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            bot_token,
            chat_id,
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Build from `TELEGRAM_BOT_TOKEN` / `TELEGRAM_CHAT_ID`; `None` when
    /// either is missing so the caller can fall back to log-only mode.
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("TELEGRAM_BOT_TOKEN").ok()?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID").ok()?;
        if token.trim().is_empty() || chat_id.trim().is_empty() {
            return None;
        }
        Some(Self::new(token, chat_id))
    }

    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    fn format_text(alert: &AlertPayload) -> String {
        let price = alert.price.as_deref().unwrap_or("N/A");
        match alert.kind {
            AlertKind::Watchlist => format!(
                "<b>🚨 ALERT: Watched Tag Found!</b>\n\n\
                 <b>Matching:</b> {}\n\
                 <b>Deal:</b> <a href='{}'>{}</a>\n\
                 <b>Price:</b> {}",
                alert.matched_tags.join(", "),
                alert.url,
                alert.title,
                price
            ),
            AlertKind::Trending => format!(
                "<b>🔥 POPULAR DEAL!</b> (Score: {:.0})\n\n\
                 <a href='{}'>{}</a>\n\
                 <b>Price:</b> {}\n\
                 <b>Votes:</b> {}",
                alert.heat_score.unwrap_or_default(),
                alert.url,
                alert.title,
                price,
                alert.votes
            ),
        }
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_notification: bool,
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, alert: &AlertPayload) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let text = Self::format_text(alert);
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text: &text,
            parse_mode: "HTML",
            disable_notification: alert.kind == AlertKind::Trending,
        };

        let rsp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("Telegram request failed: {e}"))?;

        rsp.error_for_status_ref()
            .map_err(|e| anyhow!("Telegram HTTP error: {e}"))?;
        Ok(())
    }
}
