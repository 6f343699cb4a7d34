//! Configuration types for a chatlink bridge instance.
//!
//! [`BridgeConfig`] is the top-level configuration. It can be parsed from a
//! TOML file or assembled from the process environment (`CONNECT_SLACK`,
//! `SLACK_BOT_TOKEN`, and friends), and controls the chat target, the Slack
//! credentials, the poll cadence, the shell opt-in and the agent runtime URL.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ChatlinkError;

/// Base URL of a locally running agent runtime server.
pub const DEFAULT_AGENT_URL: &str = "http://127.0.0.1:4096";

/// Where the bridge posts and reads messages.
///
/// Written as a single string: `#name` selects a channel, anything else is a
/// user identity reached through a direct-message conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Target {
    /// A user looked up by name, display name or normalized display name.
    User(String),
    /// A public or private channel, stored without the leading `#`.
    Channel(String),
}

impl Target {
    /// Parse a target specification. Returns `None` for an empty spec.
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim();
        match spec.strip_prefix('#') {
            Some(name) if !name.trim().is_empty() => Some(Target::Channel(name.trim().to_string())),
            Some(_) => None,
            None if spec.is_empty() => None,
            None => Some(Target::User(spec.to_string())),
        }
    }

    pub fn is_channel(&self) -> bool {
        matches!(self, Target::Channel(_))
    }

    /// The bare name (channel name without `#`, or the user identity).
    pub fn name(&self) -> &str {
        match self {
            Target::User(name) | Target::Channel(name) => name,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::User(name) => write!(f, "{name}"),
            Target::Channel(name) => write!(f, "#{name}"),
        }
    }
}

impl TryFrom<String> for Target {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Target::parse(&value).ok_or_else(|| format!("invalid chat target: {value:?}"))
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.to_string()
    }
}

/// Slack credentials and routing.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlackConfig {
    /// Bot token (`xoxb-...`) used for every Web API call.
    pub bot_token: String,
    /// App-level token (`xapp-...`). Enables the Socket Mode listener in
    /// direct-message mode.
    #[serde(default)]
    pub app_token: Option<String>,
    /// Conversation the bridge is attached to.
    pub target: Target,
    /// Only messages from this identity are accepted. In direct-message mode
    /// this defaults to the target user.
    #[serde(default)]
    pub source_user: Option<String>,
}

impl SlackConfig {
    /// The identity whose messages are accepted, if restricted.
    pub fn source_identity(&self) -> Option<&str> {
        match (&self.source_user, &self.target) {
            (Some(user), _) => Some(user.as_str()),
            (None, Target::User(name)) => Some(name.as_str()),
            (None, Target::Channel(_)) => None,
        }
    }

    pub fn channel_mode(&self) -> bool {
        self.target.is_channel()
    }
}

// Tokens never reach logs.
impl fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackConfig")
            .field("bot_token", &"<redacted>")
            .field("app_token", &self.app_token.as_ref().map(|_| "<redacted>"))
            .field("target", &self.target)
            .field("source_user", &self.source_user)
            .finish()
    }
}

/// Location of the agent runtime server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentConfig {
    /// Base URL of the runtime's HTTP API.
    #[serde(default = "default_agent_url")]
    pub base_url: String,
    /// Working directory announced in the startup banner. Defaults to the
    /// current directory.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_agent_url() -> String {
    DEFAULT_AGENT_URL.to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: default_agent_url(),
            directory: None,
        }
    }
}

/// Inbound poll cadence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollConfig {
    /// Delay between polls while the conversation is active.
    pub fast_interval_ms: u64,
    /// Delay between polls once the conversation has gone quiet.
    pub slow_interval_ms: u64,
    /// Quiet period after which the slow interval applies.
    pub idle_after_secs: u64,
    /// Maximum history entries fetched per poll.
    pub page_size: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            fast_interval_ms: 3_000,
            slow_interval_ms: 60_000,
            idle_after_secs: 120,
            page_size: 10,
        }
    }
}

impl PollConfig {
    pub fn fast_interval(&self) -> Duration {
        Duration::from_millis(self.fast_interval_ms)
    }

    pub fn slow_interval(&self) -> Duration {
        Duration::from_millis(self.slow_interval_ms)
    }

    pub fn idle_after(&self) -> Duration {
        Duration::from_secs(self.idle_after_secs)
    }
}

/// Gated shell execution. Off unless explicitly enabled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShellConfig {
    pub enabled: bool,
    pub timeout_secs: u64,
    /// Cap on captured stdout + stderr.
    pub max_output_bytes: usize,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_secs: 30,
            max_output_bytes: 64 * 1024,
        }
    }
}

impl ShellConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Top-level configuration for one bridge instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BridgeConfig {
    pub slack: SlackConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub shell: ShellConfig,
}

impl BridgeConfig {
    /// Parse a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ChatlinkError> {
        toml::from_str(content).map_err(|e| ChatlinkError::ConfigError(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, ChatlinkError> {
        toml::to_string_pretty(self).map_err(|e| ChatlinkError::ConfigError(e.to_string()))
    }

    /// Read and parse a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, ChatlinkError> {
        let content = std::fs::read_to_string(path).map_err(|source| ChatlinkError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Assemble a configuration from the process environment.
    ///
    /// Returns `Ok(None)` when `CONNECT_SLACK` is unset, meaning the bridge
    /// is not enabled for this process.
    pub fn from_env() -> Result<Option<Self>, ChatlinkError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>, ChatlinkError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let Some(connect) = get("CONNECT_SLACK") else {
            return Ok(None);
        };

        let username = get("SLACK_USERNAME");
        let (target, source_user) = if connect.trim_start().starts_with('#') {
            let target = Target::parse(&connect).ok_or_else(|| {
                ChatlinkError::ConfigError(format!("invalid channel in CONNECT_SLACK: {connect:?}"))
            })?;
            (target, username)
        } else {
            let user = username.ok_or_else(|| {
                ChatlinkError::ConfigError(
                    "SLACK_USERNAME is required in direct-message mode".into(),
                )
            })?;
            (Target::User(user), None)
        };

        let bot_token = get("SLACK_BOT_TOKEN")
            .ok_or_else(|| ChatlinkError::ConfigError("SLACK_BOT_TOKEN is not set".into()))?;

        let mut poll = PollConfig::default();
        if let Some(raw) = get("SLACK_POLL_INTERVAL") {
            poll.fast_interval_ms = raw.trim().parse().map_err(|_| {
                ChatlinkError::ConfigError(format!("SLACK_POLL_INTERVAL is not a number: {raw:?}"))
            })?;
        }

        let shell = ShellConfig {
            enabled: get("SLACK_ALLOW_SHELL").is_some_and(|v| is_truthy(&v)),
            ..ShellConfig::default()
        };

        let agent = AgentConfig {
            base_url: get("OPENCODE_URL").unwrap_or_else(default_agent_url),
            directory: None,
        };

        let config = BridgeConfig {
            slack: SlackConfig {
                bot_token,
                app_token: get("SLACK_APP_TOKEN"),
                target,
                source_user,
            },
            agent,
            poll,
            shell,
        };
        config.validate()?;
        Ok(Some(config))
    }

    /// Reject configurations the bridge cannot run with.
    pub fn validate(&self) -> Result<(), ChatlinkError> {
        if self.slack.bot_token.trim().is_empty() {
            return Err(ChatlinkError::ConfigError("slack bot token is empty".into()));
        }
        if self.slack.target.name().trim().is_empty() {
            return Err(ChatlinkError::ConfigError("chat target is empty".into()));
        }
        if self.poll.fast_interval_ms == 0 {
            return Err(ChatlinkError::ConfigError(
                "poll interval must be greater than zero".into(),
            ));
        }
        if self.poll.slow_interval_ms < self.poll.fast_interval_ms {
            return Err(ChatlinkError::ConfigError(format!(
                "slow poll interval ({}ms) is shorter than the fast interval ({}ms)",
                self.poll.slow_interval_ms, self.poll.fast_interval_ms
            )));
        }
        if self.poll.page_size == 0 || self.poll.page_size > 1000 {
            return Err(ChatlinkError::ConfigError(format!(
                "poll page size must be between 1 and 1000, got {}",
                self.poll.page_size
            )));
        }
        if self.shell.enabled && self.shell.timeout_secs == 0 {
            return Err(ChatlinkError::ConfigError(
                "shell timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
