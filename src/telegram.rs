//! Telegram Bot API client
//!
//! One small client shared by the outbound notifier (`sendMessage`) and the
//! inbound command channel (`getUpdates` long-poll).

use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::TelegramConfig;
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

/// One entry from getUpdates
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub text: Option<String>,
    pub chat: Chat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

pub struct TelegramClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
    chat_id: i64,
}

impl TelegramClient {
    /// Build from TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID. Both are required
    /// when Telegram is enabled.
    pub fn from_env(config: &TelegramConfig) -> Result<Self> {
        let token = std::env::var("TELEGRAM_BOT_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::MissingCredential("TELEGRAM_BOT_TOKEN".to_string()))?;

        let chat_id = std::env::var("TELEGRAM_CHAT_ID")
            .ok()
            .and_then(|id| id.trim().parse::<i64>().ok())
            .ok_or_else(|| Error::MissingCredential("TELEGRAM_CHAT_ID".to_string()))?;

        let http = reqwest::Client::builder()
            // Long-poll timeout plus headroom
            .timeout(Duration::from_secs(config.poll_timeout_secs + 10))
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token,
            chat_id,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    /// Send a text message to the configured chat
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let response = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": text,
            }))
            .send()
            .await?;

        let envelope: ApiResponse<serde_json::Value> = response.json().await?;
        if !envelope.ok {
            return Err(Error::Http(format!(
                "sendMessage failed: {}",
                envelope.description.unwrap_or_default()
            )));
        }
        Ok(())
    }

    /// Long-poll for updates past `offset`. Returns raw updates; the caller
    /// advances the offset with [`Update::update_id`] + 1.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let response = self
            .http
            .get(self.method_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", timeout_secs.to_string()),
            ])
            .send()
            .await?;

        let envelope: ApiResponse<Vec<Update>> = response.json().await?;
        if !envelope.ok {
            return Err(Error::Http(format!(
                "getUpdates failed: {}",
                envelope.description.unwrap_or_default()
            )));
        }

        let updates = envelope.result.unwrap_or_default();
        debug!("getUpdates returned {} updates", updates.len());
        Ok(updates)
    }

    /// Only messages from the configured chat are commands; anything else
    /// (other chats, stickers, joins) is dropped.
    pub fn command_text(&self, update: &Update) -> Option<String> {
        let message = update.message.as_ref()?;
        if message.chat.id != self.chat_id {
            return None;
        }
        message.text.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_parsing() {
        let payload = r#"{
            "ok": true,
            "result": [
                {"update_id": 7, "message": {"text": "pause", "chat": {"id": 42}}},
                {"update_id": 8, "message": {"chat": {"id": 42}}}
            ]
        }"#;

        let envelope: ApiResponse<Vec<Update>> = serde_json::from_str(payload).unwrap();
        assert!(envelope.ok);

        let updates = envelope.result.unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].update_id, 7);
        assert_eq!(updates[0].message.as_ref().unwrap().text.as_deref(), Some("pause"));
        assert!(updates[1].message.as_ref().unwrap().text.is_none());
    }

    #[test]
    fn test_error_envelope_parsing() {
        let payload = r#"{"ok": false, "description": "Unauthorized"}"#;
        let envelope: ApiResponse<Vec<Update>> = serde_json::from_str(payload).unwrap();
        assert!(!envelope.ok);
        assert_eq!(envelope.description.as_deref(), Some("Unauthorized"));
    }
}
