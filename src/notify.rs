//! Change notifications delivered through a chat bot HTTP API.

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde_json::json;
use std::fmt::Write as _;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use time::{format_description::well_known, OffsetDateTime};
use tracing::{error, info, warn};

use crate::config::{
    DEFAULT_API_BASE, DEFAULT_HTTP_TIMEOUT, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY,
};
use crate::diff::ChangeSet;

/// Longest `sendMessage` text the bot API accepts, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Ports listed per direction before the rest is summarised as a count.
const MAX_LISTED_PORTS: usize = 100;

/// One delivery attempt of a free-text message.
pub trait Notifier: Send + Sync {
    fn send<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Credentials and endpoint for [`TelegramNotifier`].
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub api_base: String,
    pub bot_token: String,
    pub chat_id: String,
    pub http_timeout: Duration,
}

impl NotifierConfig {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

/// Posts messages to a Telegram-compatible `sendMessage` endpoint.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: Client,
    config: NotifierConfig,
}

impl TelegramNotifier {
    pub fn new(config: NotifierConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        )
    }
}

impl Notifier for TelegramNotifier {
    fn send<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let response = self
                .client
                .post(self.endpoint())
                .json(&json!({
                    "chat_id": self.config.chat_id,
                    "text": text,
                }))
                .send()
                .await
                // the URL embeds the bot token, keep it out of logs
                .map_err(|e| anyhow!("Failed to call bot API: {}", e.without_url()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(anyhow!("Bot API request failed with {}: {}", status, body));
            }
            Ok(())
        })
    }
}

/// Attempt budget for [`deliver_with_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Failed { attempts: u32 },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

/// Send `text`, retrying with a fixed delay. Failure is logged, never returned.
pub async fn deliver_with_retry<N: Notifier + ?Sized>(
    notifier: &N,
    text: &str,
    policy: RetryPolicy,
) -> DeliveryOutcome {
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        match notifier.send(text).await {
            Ok(()) => {
                info!("notification delivered (attempt {attempt}/{attempts})");
                return DeliveryOutcome::Delivered { attempts: attempt };
            }
            Err(e) => {
                warn!("notification attempt {attempt}/{attempts} failed: {e:#}");
                if attempt < attempts {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }
    error!("giving up on notification after {attempts} attempts");
    DeliveryOutcome::Failed { attempts }
}

/// Human-readable summary of a change for one host, at most
/// [`MAX_MESSAGE_CHARS`] characters long.
pub fn format_change_message(host: &str, changes: &ChangeSet, at: OffsetDateTime) -> String {
    let mut msg = format!("Port changes detected on {host}");
    if !changes.opened.is_empty() {
        let _ = write!(msg, "\nOpened: {}", join_ports(&changes.opened));
    }
    if !changes.closed.is_empty() {
        let _ = write!(msg, "\nClosed: {}", join_ports(&changes.closed));
    }
    let stamp = at
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"));
    let _ = write!(msg, "\nDetected at {stamp}");

    if msg.chars().count() > MAX_MESSAGE_CHARS {
        msg = msg.chars().take(MAX_MESSAGE_CHARS - 1).collect();
        msg.push('…');
    }
    msg
}

fn join_ports(ports: &[u16]) -> String {
    let mut out = ports
        .iter()
        .take(MAX_LISTED_PORTS)
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    if ports.len() > MAX_LISTED_PORTS {
        let _ = write!(out, " … and {} more", ports.len() - MAX_LISTED_PORTS);
    }
    out
}
