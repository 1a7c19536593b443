//! Slack integration: Web API client, reply transport and Socket Mode.

pub mod client;
pub mod socket;
pub mod transport;
pub mod types;

pub use client::{HistoryLimits, SlackClient};
pub use socket::{ReconnectPolicy, SocketModeListener};
pub use transport::SlackTransport;
pub use types::AuthTest;
