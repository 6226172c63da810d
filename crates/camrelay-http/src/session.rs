use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use camrelay_core::{FetchError, Fetched, Session, SessionFactory};
use tracing::{debug, trace};

use crate::{config::HttpConfig, errors::fetch_error};

/// Opens a fresh `reqwest::Client` (and with it a fresh connection pool) per session.
#[derive(Debug, Clone, Default)]
pub struct ReqwestSessionFactory {
    cfg: HttpConfig,
}

impl ReqwestSessionFactory {
    pub fn new(cfg: HttpConfig) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl SessionFactory for ReqwestSessionFactory {
    async fn open(&self) -> Result<Arc<dyn Session>, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(self.cfg.timeout)
            .user_agent(self.cfg.user_agent.as_str())
            .build()
            .map_err(|e| FetchError::Session(e.to_string()))?;
        debug!(timeout = ?self.cfg.timeout, "http session opened");
        Ok(Arc::new(ReqwestSession {
            client,
            timeout: self.cfg.timeout,
        }))
    }
}

#[derive(Debug)]
pub struct ReqwestSession {
    client: reqwest::Client,
    timeout: Duration,
}

#[async_trait]
impl Session for ReqwestSession {
    async fn get(&self, url: &str) -> Result<Fetched, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(e, self.timeout))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| fetch_error(e, self.timeout))?;
        trace!(url, status, bytes = body.len(), "fetched");

        Ok(Fetched {
            status,
            body: body.to_vec(),
        })
    }

    // Dropping the client tears down its pool once in-flight requests finish.
    async fn close(&self) {
        debug!("http session released");
    }
}
