use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::config::{Config, HTTP_TIMEOUT_SECS, NOTIFICATION_CHUNK_SIZE};
use crate::error::{AppError, Result};
use crate::types::NotificationRow;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str) -> Result<()>;
}

/// Push messages through the Pushover message API.
pub struct PushoverNotifier {
    http: reqwest::Client,
    url: String,
    token: String,
    user: String,
    device: Option<String>,
}

impl PushoverNotifier {
    /// `None` when the token or user key is not configured.
    pub fn from_config(cfg: &Config) -> Result<Option<Self>> {
        let (Some(token), Some(user)) = (cfg.pushover_token.clone(), cfg.pushover_user.clone()) else {
            return Ok(None);
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;

        Ok(Some(Self {
            http,
            url: format!("{}/messages.json", cfg.pushover_api_url.trim_end_matches('/')),
            token,
            user,
            device: cfg.pushover_device.clone(),
        }))
    }
}

#[async_trait]
impl Notifier for PushoverNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        let mut params = vec![
            ("token", self.token.as_str()),
            ("user", self.user.as_str()),
            ("message", message),
        ];
        if let Some(device) = &self.device {
            params.push(("device", device.as_str()));
        }

        let resp = self.http.post(&self.url).form(&params).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Status {
                endpoint: "messages.json".to_string(),
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }
        Ok(())
    }
}

/// One line per row, at most `chunk_size` rows per message.
pub fn chunk_messages(rows: &[NotificationRow], chunk_size: usize) -> Vec<String> {
    rows.chunks(chunk_size.max(1))
        .map(|chunk| chunk.iter().map(|r| format!("{}\n", r.to_line())).collect())
        .collect()
}

/// Send every chunk once. Failed sends are logged and not retried.
pub async fn deliver<N: Notifier + ?Sized>(notifier: &N, rows: &[NotificationRow]) -> usize {
    if rows.is_empty() {
        info!("Nothing to notify");
        return 0;
    }

    let messages = chunk_messages(rows, NOTIFICATION_CHUNK_SIZE);
    let total = messages.len();
    let mut sent = 0;
    for (i, message) in messages.iter().enumerate() {
        match notifier.send(message).await {
            Ok(()) => sent += 1,
            Err(e) => error!(chunk = i + 1, total, "Notification failed: {e}"),
        }
    }

    if sent < total {
        warn!(sent, total, "Some notifications were not delivered");
    } else {
        info!(sent, rows = rows.len(), "Notifications delivered");
    }
    sent
}
