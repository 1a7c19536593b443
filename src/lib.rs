//! Slack Agent: an agentic Slack bot core.
//!
//! Inbound Slack events are deduplicated and routed to a per-thread worker,
//! which runs a bounded reasoning loop against an OpenAI-compatible backend,
//! invoking registered tools, and posts the answer back into the thread.
//!
//! # Quick Start
//!
//! ```no_run
//! use slack_agent::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> slack_agent::error::Result<()> {
//! let config = BotConfig::load()?;
//! let bot = Bot::connect(&config).await?;
//! bot.run(&config, CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod agent_loop;
pub mod backend;
pub mod bot;
pub mod channel;
pub mod config;
pub mod confluence;
pub mod error;
pub mod prelude;
pub mod session;
pub mod slack;
pub mod tools;
pub mod types;
pub mod util;
