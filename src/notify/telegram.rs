//! Notification sink posting to the Telegram Bot API.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde::Serialize;

use super::{update_message, Notifier};
use crate::error::NotifyError;
use crate::types::ContainerRecord;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

pub struct TelegramNotifier {
    client: reqwest::Client,
    api_url: String,
    chat_id: String,
    bot_token: String,
}

impl TelegramNotifier {
    pub fn new(
        api_url: &str,
        chat_id: impl Into<String>,
        bot_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(NotifyError::Http)?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            chat_id: chat_id.into(),
            bot_token: bot_token.into(),
        })
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_url, self.bot_token)
    }
}

// The bot token is a credential; keep it out of logs.
impl fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("api_url", &self.api_url)
            .field("chat_id", &self.chat_id)
            .field("bot_token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn create_notification(&self, record: &ContainerRecord) -> Result<(), NotifyError> {
        let text = update_message(record);
        let body = SendMessage {
            chat_id: &self.chat_id,
            text: &text,
        };

        // reqwest errors carry the request URL, which embeds the token.
        let resp = self
            .client
            .post(self.send_message_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Http(e.without_url()))?;

        let status = resp.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(NotifyError::BadStatus(status));
        }

        debug!("Telegram accepted notification for {} ({})", record.name, status);
        Ok(())
    }
}
