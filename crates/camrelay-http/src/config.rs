use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Per-request timeout applied by the client itself.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: concat!("camrelay/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}
