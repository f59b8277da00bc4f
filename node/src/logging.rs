//! # Structured Logging
//!
//! One `tracing` subscriber for the binary and the `zsf_protocol` library it
//! drives. Output goes to stderr; stdout belongs to `init` and `version`.
//!
//! ## Targets
//!
//! | Target                            | Level | Events                                  |
//! |-----------------------------------|-------|-----------------------------------------|
//! | `zsf_protocol::consensus`         | info  | block connected, disconnected, reorg    |
//! | `zsf_protocol::consensus`         | warn  | rejected transaction, failed reorg      |
//! | `zsf_protocol::consensus`         | error | chain supply fault, pipeline halted     |
//! | `zsf_protocol::consensus`         | debug | mempool accept and refresh              |
//! | `zsf_protocol::mempool`           | debug | fee-rate eviction                       |
//! | `zsf_node::node`                  | debug | wallet sends, template skips            |
//! | `tower_http`                      | debug | per-request spans on `/rpc`             |
//!
//! `RUST_LOG` replaces the built-in directives entirely, e.g.
//! `RUST_LOG=zsf_protocol::mempool=debug,zsf_protocol=info`.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Directives for `zsf-node run`: ledger events at info, request spans at
/// debug.
pub const RUN_DIRECTIVES: &str = "zsf_node=info,zsf_protocol=info,tower_http=debug";

/// Directives for one-shot commands, which only report their own progress.
pub const INIT_DIRECTIVES: &str = "zsf_node=info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, with source locations.
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// "json" (any case) selects JSON; everything else is pretty.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// `RUST_LOG` when set and valid, else `directives`.
fn env_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(directives: &str, format: LogFormat) -> Result<()> {
    let registry = tracing_subscriber::registry().with(env_filter(directives));

    let installed = match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_current_span(false),
            )
            .try_init(),
    };
    installed.map_err(|e| anyhow!("failed to install log subscriber: {e}"))?;

    tracing::debug!(?format, directives, "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing_is_lossy() {
        assert_eq!(LogFormat::from_str_lossy("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_str_lossy("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str_lossy("xml"), LogFormat::Pretty);
    }

    #[test]
    fn built_in_directives_parse() {
        for directives in [RUN_DIRECTIVES, INIT_DIRECTIVES] {
            assert!(EnvFilter::try_new(directives).is_ok(), "{directives}");
        }
    }

    #[test]
    fn second_install_is_an_error() {
        let _ = init_logging(INIT_DIRECTIVES, LogFormat::Json);
        assert!(init_logging(INIT_DIRECTIVES, LogFormat::Pretty).is_err());
    }
}
