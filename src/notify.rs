//! Outbound notifications
//!
//! `notify` is fire-and-forget and best-effort: a dropped message must never
//! stall or fail the trading loop. Every outbound path goes through
//! [`DedupNotifier`], which suppresses a message identical to the immediately
//! preceding one - the single rule that keeps flaky-market chatter and
//! repeated command rejections from flooding the channel.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::telegram::TelegramClient;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str);
}

/// Telegram-backed notifier. The HTTP send runs on its own task so the
/// caller never waits on Telegram.
pub struct TelegramNotifier {
    client: Arc<TelegramClient>,
}

impl TelegramNotifier {
    pub fn new(client: Arc<TelegramClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) {
        let client = self.client.clone();
        let text = text.to_string();

        tokio::spawn(async move {
            if let Err(e) = client.send_message(&text).await {
                warn!("Notification send failed: {}", e);
            }
        });
    }
}

/// Log-only notifier for dry runs and when Telegram is disabled
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str) {
        info!("[notify] {}", text);
    }
}

/// Suppresses consecutive duplicate messages
pub struct DedupNotifier<N> {
    inner: N,
    last_sent: Mutex<Option<String>>,
}

impl<N: Notifier> DedupNotifier<N> {
    pub fn new(inner: N) -> Self {
        Self {
            inner,
            last_sent: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<N: Notifier> Notifier for DedupNotifier<N> {
    async fn notify(&self, text: &str) {
        let mut last_sent = self.last_sent.lock().await;
        if last_sent.as_deref() == Some(text) {
            debug!("Suppressed duplicate notification: {}", text);
            return;
        }
        *last_sent = Some(text.to_string());
        drop(last_sent);

        self.inner.notify(text).await;
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Records every delivered message; shared across clones.
    #[derive(Clone, Default)]
    pub struct RecordingNotifier {
        pub sent: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingNotifier {
        pub async fn messages(&self) -> Vec<String> {
            self.sent.lock().await.clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, text: &str) {
            self.sent.lock().await.push(text.to_string());
        }
    }
}
