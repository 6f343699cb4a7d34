//! Error types shared across all chatlink crates.

/// Errors raised while assembling the bridge runtime.
///
/// Runtime failures (network, protocol) are owned by the crates that talk to
/// the outside world; this type only covers configuration problems.
#[derive(Debug, thiserror::Error)]
pub enum ChatlinkError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("failed to read config file {}: {source}", .path.display())]
    ConfigRead {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}
