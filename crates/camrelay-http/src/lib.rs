//! `reqwest` implementations of the relay's network collaborators.

mod config;
pub use config::HttpConfig;

mod errors;
pub use errors::EndpointError;

mod notifier;
pub use notifier::WebhookNotifier;

mod session;
pub use session::{ReqwestSession, ReqwestSessionFactory};
