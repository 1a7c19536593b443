//! Wires the components together from a [`BotConfig`].

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent_loop::AgentLoop;
use crate::backend::{OpenAiBackend, ReasoningBackend};
use crate::channel::{ChannelAdapter, Transport};
use crate::config::BotConfig;
use crate::error::BotError;
use crate::session::SessionStore;
use crate::slack::{SlackClient, SlackTransport, SocketModeListener};
use crate::confluence::ConfluenceClient;
use crate::tools::{weather_tool, ConfluenceSearchTool, HistorySearchTool, ToolRegistry};

/// Time allowed for in-flight runs to finish on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Tool registry with the built-in tools enabled in `config`.
pub fn build_registry(
    config: &BotConfig,
    history: Option<Arc<SlackClient>>,
) -> Result<ToolRegistry, BotError> {
    let mut builder = ToolRegistry::builder()
        .timeout(config.tools.timeout)
        .retry(config.tools.retry.clone());
    if config.tools.weather {
        builder = builder.register(weather_tool());
    }
    if config.tools.history_search {
        if let Some(client) = history {
            builder = builder.register(Arc::new(HistorySearchTool::new(client)));
        }
    }
    if config.tools.confluence_search {
        let confluence = &config.confluence;
        if confluence.is_configured() {
            let client = ConfluenceClient::new(
                confluence.base_url.clone(),
                confluence.api_token.clone(),
                confluence.page_urls.clone(),
            );
            builder = builder.register(Arc::new(ConfluenceSearchTool::new(Arc::new(client))));
        } else if !confluence.base_url.is_empty() {
            warn!("Confluence URL set but no page URLs configured; document search disabled");
        }
    }
    builder.build()
}

/// Components shared by the running bot.
pub struct Bot {
    pub sessions: SessionStore,
    pub adapter: ChannelAdapter,
    pub slack: Arc<SlackClient>,
}

impl Bot {
    /// Authenticate with Slack and assemble the bot.
    pub async fn connect(config: &BotConfig) -> Result<Self, BotError> {
        let slack = Arc::new(
            SlackClient::new(config.slack.bot_token.clone())
                .with_app_token(config.slack.app_token.clone())
                .with_api_base(config.slack.api_base.clone())
                .with_history_limits(config.slack.history_limits()),
        );
        let identity = slack.auth_test().await?;

        let backend: Arc<dyn ReasoningBackend> = Arc::new(OpenAiBackend::new(
            config.backend.model.clone(),
            config.backend.api_key.clone(),
            config.backend.base_url.clone(),
        ));
        let registry = build_registry(config, Some(slack.clone()))?;
        info!(tools = ?registry.names(), "tool registry ready");

        let agent = Arc::new(AgentLoop::new(backend, registry, config.loop_config()));
        let sessions = SessionStore::new(config.sessions.idle_timeout);
        let transport: Arc<dyn Transport> = Arc::new(SlackTransport::new(slack.clone()));
        let adapter = ChannelAdapter::new(
            config.channel.clone(),
            sessions.clone(),
            agent,
            transport,
            Some(identity.user_id),
        )?;

        Ok(Self {
            sessions,
            adapter,
            slack,
        })
    }

    /// Listen for Slack events until `shutdown` fires, then drain.
    pub async fn run(self, config: &BotConfig, shutdown: CancellationToken) -> Result<(), BotError> {
        let reaper = self
            .sessions
            .spawn_reaper(config.sessions.reap_interval, shutdown.clone());
        let listener = SocketModeListener::new(self.slack.clone(), self.adapter.clone());

        let result = listener.run(shutdown.clone()).await;

        shutdown.cancel();
        self.adapter.shutdown(SHUTDOWN_GRACE).await;
        let _ = reaper.await;
        info!("bot stopped");
        result
    }
}
