//! Configuration (layered: defaults < TOML file < environment).

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent_loop::LoopConfig;
use crate::channel::{BusyPolicy, ChannelConfig};
use crate::error::BotError;
use crate::slack::HistoryLimits;
use crate::util::retry::RetryPolicy;

/// Names the TOML file to load instead of the platform default.
pub const CONFIG_PATH_ENV: &str = "SLACK_AGENT_CONFIG";

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant in a Slack workspace. \
Answer concisely. Use the available tools when they help, and say so when you cannot find an answer.";

#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SlackSettings {
    /// Bot token (`xoxb-…`).
    pub bot_token: String,
    /// App-level token (`xapp-…`) for Socket Mode.
    pub app_token: String,
    pub api_base: String,
    pub history_page_size: u32,
    pub history_max_messages: usize,
    #[serde(with = "crate::util::serde_duration_ms")]
    pub history_page_delay: Duration,
    #[serde(with = "crate::util::serde_duration_ms")]
    pub history_crawl_budget: Duration,
}

impl Default for SlackSettings {
    fn default() -> Self {
        let limits = HistoryLimits::default();
        Self {
            bot_token: String::new(),
            app_token: String::new(),
            api_base: crate::slack::client::DEFAULT_API_BASE.to_string(),
            history_page_size: limits.page_size,
            history_max_messages: limits.max_messages,
            history_page_delay: limits.page_delay,
            history_crawl_budget: limits.crawl_budget,
        }
    }
}

impl SlackSettings {
    pub fn history_limits(&self) -> HistoryLimits {
        HistoryLimits {
            page_size: self.history_page_size,
            max_messages: self.history_max_messages,
            page_delay: self.history_page_delay,
            crawl_budget: self.history_crawl_budget,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendSettings {
    pub api_key: String,
    /// OpenAI-compatible base URL; the public OpenAI API when unset.
    pub base_url: Option<String>,
    pub model: String,
    #[serde(with = "crate::util::serde_duration_ms")]
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: None,
            model: "gpt-4o-mini".to_string(),
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentSettings {
    pub max_iterations: usize,
    pub max_history_turns: usize,
    pub system_prompt: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_history_turns: 50,
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolSettings {
    #[serde(with = "crate::util::serde_duration_ms")]
    pub timeout: Duration,
    /// Applied to idempotent tools only.
    pub retry: RetryPolicy,
    /// Register the `weather` demo tool.
    pub weather: bool,
    /// Register `slack_channel_history_search`.
    pub history_search: bool,
    /// Register `confluence_document_search` when `[confluence]` is filled in.
    pub confluence_search: bool,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            weather: true,
            history_search: true,
            confluence_search: true,
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfluenceSettings {
    /// Site root, e.g. `https://wiki.example.com`.
    pub base_url: String,
    /// Personal access token sent as a bearer token.
    pub api_token: String,
    /// Pages searched by `confluence_document_search`.
    pub page_urls: Vec<String>,
}

impl ConfluenceSettings {
    pub fn is_configured(&self) -> bool {
        !self.base_url.trim().is_empty()
            && !self.api_token.trim().is_empty()
            && !self.page_urls.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionSettings {
    #[serde(with = "crate::util::serde_duration_ms")]
    pub idle_timeout: Duration,
    #[serde(with = "crate::util::serde_duration_ms")]
    pub reap_interval: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(3600),
            reap_interval: Duration::from_secs(300),
        }
    }
}

/// Complete bot configuration.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub slack: SlackSettings,
    pub backend: BackendSettings,
    pub agent: AgentSettings,
    pub tools: ToolSettings,
    pub confluence: ConfluenceSettings,
    pub sessions: SessionSettings,
    pub channel: ChannelConfig,
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl fmt::Debug for SlackSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackSettings")
            .field("bot_token", &redact(&self.bot_token))
            .field("app_token", &redact(&self.app_token))
            .field("api_base", &self.api_base)
            .field("history_page_size", &self.history_page_size)
            .field("history_max_messages", &self.history_max_messages)
            .field("history_page_delay", &self.history_page_delay)
            .field("history_crawl_budget", &self.history_crawl_budget)
            .finish()
    }
}

impl fmt::Debug for BackendSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSettings")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl fmt::Debug for ConfluenceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfluenceSettings")
            .field("base_url", &self.base_url)
            .field("api_token", &redact(&self.api_token))
            .field("page_urls", &self.page_urls)
            .finish()
    }
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("slack", &self.slack)
            .field("backend", &self.backend)
            .field("agent", &self.agent)
            .field("tools", &self.tools)
            .field("confluence", &self.confluence)
            .field("sessions", &self.sessions)
            .field("channel", &self.channel)
            .finish()
    }
}

impl BotConfig {
    /// Load `.env`, then the TOML file, then environment overrides.
    ///
    /// The file is `$SLACK_AGENT_CONFIG` when set (and must exist), else
    /// `config.toml` in the platform config directory (optional).
    pub fn load() -> Result<Self, BotError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error

        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(Path::new(path.trim()))?,
            _ => match default_config_path() {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, BotError> {
        debug!(path = %path.display(), "loading config file");
        let text = std::fs::read_to_string(path).map_err(|e| {
            BotError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, BotError> {
        toml::from_str(text).map_err(|e| BotError::Configuration(format!("invalid config: {e}")))
    }

    /// Apply environment overrides, reading variables through `var`.
    pub fn apply_env<F>(&mut self, var: F) -> Result<(), BotError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("SLACK_BOT_TOKEN") {
            self.slack.bot_token = token;
        }
        if let Some(token) = get("SLACK_APP_TOKEN") {
            self.slack.app_token = token;
        }
        if let Some(key) = get("REASONING_API_KEY") {
            self.backend.api_key = key;
        }
        if let Some(url) = get("REASONING_BASE_URL") {
            self.backend.base_url = Some(url);
        }
        if let Some(model) = get("REASONING_MODEL") {
            self.backend.model = model;
        }
        if let Some(url) = get("CONFLUENCE_URL") {
            self.confluence.base_url = url.trim().to_string();
        }
        if let Some(token) = get("CONFLUENCE_API_TOKEN") {
            self.confluence.api_token = token;
        }
        if let Some(urls) = get("CONFLUENCE_PAGE_URLS") {
            self.confluence.page_urls = urls
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(policy) = get("SLACK_AGENT_BUSY_POLICY") {
            self.channel.busy_policy = policy.trim().parse::<BusyPolicy>().map_err(|_| {
                BotError::Configuration(format!(
                    "SLACK_AGENT_BUSY_POLICY must be 'queue' or 'cancel_and_restart', got '{policy}'"
                ))
            })?;
        }
        if let Some(max) = get("SLACK_AGENT_MAX_ITERATIONS") {
            self.agent.max_iterations = max.trim().parse().map_err(|_| {
                BotError::Configuration(format!(
                    "SLACK_AGENT_MAX_ITERATIONS must be a positive integer, got '{max}'"
                ))
            })?;
        }
        Ok(())
    }

    /// Reject missing credentials, zero bounds and retry or crawl settings
    /// that cannot work together.
    pub fn validate(&self) -> Result<(), BotError> {
        let required = [
            ("slack.bot_token (SLACK_BOT_TOKEN)", &self.slack.bot_token),
            ("slack.app_token (SLACK_APP_TOKEN)", &self.slack.app_token),
            ("backend.api_key (REASONING_API_KEY)", &self.backend.api_key),
            ("backend.model (REASONING_MODEL)", &self.backend.model),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(BotError::Configuration(format!("{name} is required")));
            }
        }

        let bounds = [
            ("agent.max_iterations", self.agent.max_iterations),
            ("agent.max_history_turns", self.agent.max_history_turns),
            ("channel.dedup_capacity", self.channel.dedup_capacity),
            ("slack.history_page_size", self.slack.history_page_size as usize),
        ];
        for (name, value) in bounds {
            if value == 0 {
                return Err(BotError::Configuration(format!("{name} must be greater than zero")));
            }
        }

        let durations = [
            ("backend.timeout", self.backend.timeout),
            ("tools.timeout", self.tools.timeout),
            ("sessions.idle_timeout", self.sessions.idle_timeout),
            ("sessions.reap_interval", self.sessions.reap_interval),
            ("channel.worker_idle_timeout", self.channel.worker_idle_timeout),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(BotError::Configuration(format!("{name} must be greater than zero")));
            }
        }

        if !self.confluence.base_url.trim().is_empty() && self.confluence.api_token.trim().is_empty() {
            return Err(BotError::Configuration(
                "confluence.api_token (CONFLUENCE_API_TOKEN) is required when confluence.base_url is set"
                    .to_string(),
            ));
        }

        self.backend.retry.validate("backend.retry")?;
        self.tools.retry.validate("tools.retry")?;
        self.channel.send_retry.validate("channel.send_retry")?;

        if self.tools.history_search && self.slack.history_crawl_budget >= self.tools.timeout {
            return Err(BotError::Configuration(format!(
                "slack.history_crawl_budget ({}ms) must be shorter than tools.timeout ({}ms)",
                self.slack.history_crawl_budget.as_millis(),
                self.tools.timeout.as_millis()
            )));
        }
        Ok(())
    }

    /// Agent loop settings derived from this config.
    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            max_iterations: self.agent.max_iterations,
            max_history_turns: self.agent.max_history_turns,
            backend_timeout: self.backend.timeout,
            backend_retry: self.backend.retry.clone(),
            system_prompt: self.agent.system_prompt.clone(),
        }
    }
}

/// `config.toml` under the platform config directory.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "slack-agent")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
