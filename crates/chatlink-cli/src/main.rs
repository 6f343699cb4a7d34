mod settings;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use settings::Overrides;

/// chatlink -- drive an opencode agent from Slack.
#[derive(Parser, Debug)]
#[command(name = "chatlink", version, about)]
struct Cli {
    /// TOML configuration file. Without one, settings come from the environment.
    #[arg(long, global = true, env = "CHATLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Chat target: `#channel` or a user name
    #[arg(long, global = true)]
    target: Option<String>,

    /// Base URL of the opencode server
    #[arg(long, global = true)]
    agent_url: Option<String>,

    /// Allow `!command` messages to run on this host
    #[arg(long, global = true)]
    allow_shell: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the bridge until interrupted (default)
    Run,

    /// Validate the configuration and print the effective settings
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let overrides = Overrides {
        target: cli.target,
        agent_url: cli.agent_url,
        allow_shell: cli.allow_shell,
    };
    let config = settings::resolve(cli.config.as_deref(), &overrides)
        .context("failed to load bridge configuration")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            chatlink_channel::run(config).await;
            Ok(())
        }
        Commands::Check => {
            println!("{}", settings::describe(&config));
            Ok(())
        }
    }
}
