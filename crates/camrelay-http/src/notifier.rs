use std::time::Duration;

use async_trait::async_trait;
use camrelay_core::{Notifier, NotifyError};
use reqwest::{Url, header};
use serde::Serialize;
use tracing::debug;

use crate::{
    config::HttpConfig,
    errors::{EndpointError, notify_error},
};

#[derive(Serialize)]
struct TextMessage<'a> {
    text: &'a str,
}

/// Posts to a generic webhook.
///
/// * `message` → `POST <endpoint>/message` with `{"text": …}`.
/// * `publish` → `POST <endpoint>/photo?caption=…` with the raw image bytes.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(endpoint: &str, cfg: &HttpConfig) -> Result<Self, EndpointError> {
        let endpoint = endpoint.trim().trim_end_matches('/').to_string();
        Url::parse(&endpoint).map_err(|e| EndpointError::InvalidEndpoint {
            endpoint: endpoint.clone(),
            reason: e.to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .user_agent(cfg.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            endpoint,
            timeout: cfg.timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub(crate) fn message_url(&self) -> String {
        format!("{}/message", self.endpoint)
    }

    pub(crate) fn photo_url(&self, caption: &str) -> Result<Url, NotifyError> {
        Url::parse_with_params(&format!("{}/photo", self.endpoint), &[("caption", caption)])
            .map_err(|e| NotifyError::Transport(format!("bad photo url: {e}")))
    }

    fn check(&self, status: reqwest::StatusCode) -> Result<(), NotifyError> {
        if status.is_success() {
            Ok(())
        } else {
            Err(NotifyError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn publish(&self, bytes: Vec<u8>, caption: &str) -> Result<(), NotifyError> {
        let size = bytes.len();
        let response = self
            .client
            .post(self.photo_url(caption)?)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| notify_error(e, self.timeout))?;

        self.check(response.status())?;
        debug!(bytes = size, "photo delivered to webhook");
        Ok(())
    }

    async fn message(&self, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.message_url())
            .json(&TextMessage { text })
            .send()
            .await
            .map_err(|e| notify_error(e, self.timeout))?;

        self.check(response.status())
    }
}
