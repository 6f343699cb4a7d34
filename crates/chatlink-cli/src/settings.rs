//! Configuration assembly for the binary: file or environment, then flags.

use std::path::Path;

use anyhow::{bail, Context};
use chatlink_types::{BridgeConfig, Target};
use tracing::info;

/// Command-line values that take precedence over the loaded configuration.
#[derive(Debug, Default)]
pub struct Overrides {
    pub target: Option<String>,
    pub agent_url: Option<String>,
    pub allow_shell: bool,
}

pub fn resolve(path: Option<&Path>, overrides: &Overrides) -> anyhow::Result<BridgeConfig> {
    resolve_with(path, overrides, BridgeConfig::from_env)
}

fn resolve_with<F>(
    path: Option<&Path>,
    overrides: &Overrides,
    from_env: F,
) -> anyhow::Result<BridgeConfig>
where
    F: FnOnce() -> Result<Option<BridgeConfig>, chatlink_types::ChatlinkError>,
{
    let mut config = match path {
        Some(path) => {
            info!(path = %path.display(), "loading configuration file");
            BridgeConfig::load(path)?
        }
        None => match from_env()? {
            Some(config) => config,
            None => bail!("Slack bridge not enabled: set CONNECT_SLACK or pass --config"),
        },
    };

    if let Some(raw) = overrides.target.as_deref() {
        config.slack.target =
            Target::parse(raw).with_context(|| format!("invalid --target {raw:?}"))?;
    }
    if let Some(url) = &overrides.agent_url {
        config.agent.base_url = url.clone();
    }
    if overrides.allow_shell {
        config.shell.enabled = true;
    }

    config.validate()?;
    Ok(config)
}

/// Human-readable summary for `chatlink check`. Secrets are redacted.
pub fn describe(config: &BridgeConfig) -> String {
    let mode = if config.slack.channel_mode() {
        "channel"
    } else if config.slack.app_token.is_some() {
        "direct message (socket mode)"
    } else {
        "direct message"
    };
    let mut out = String::new();
    out.push_str(&format!("target:       {} ({mode})\n", config.slack.target));
    out.push_str(&format!(
        "accepts:      {}\n",
        config.slack.source_identity().unwrap_or("anyone in the channel")
    ));
    out.push_str(&format!("agent:        {}\n", config.agent.base_url));
    out.push_str(&format!(
        "poll:         every {}ms, {}ms after {}s idle\n",
        config.poll.fast_interval_ms, config.poll.slow_interval_ms, config.poll.idle_after_secs
    ));
    out.push_str(&format!(
        "shell:        {}\n",
        if config.shell.enabled { "enabled" } else { "disabled" }
    ));
    out.push_str(&format!("{config:#?}"));
    out
}
