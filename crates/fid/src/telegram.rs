//! Telegram Bot API で通知を送信する。

use anyhow::{Context as _, Result, bail};
use serde_json::json;
use tracing::info;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API クライアントのラッパー。
pub struct TelegramClient {
    client: reqwest::Client,
    token: String,
    chat_id: String,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.into(),
            chat_id: chat_id.into(),
        }
    }

    /// メッセージを送信する。HTML パースモードを使う。
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let url = format!("{TELEGRAM_API_BASE}/bot{}/sendMessage", self.token);
        let payload = json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
        });

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .context("Failed to reach Telegram API")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Telegram API returned {status}: {body}");
        }

        info!(chat_id = %self.chat_id, "Message sent");
        Ok(())
    }
}
