//! Process configuration (§6): one typed [`Config`], populated by `clap`
//! from CLI flags with `CHAOSD_*` environment-variable fallback.

use clap::Parser;

/// Daemon-wide configuration, built once at process start.
#[derive(Debug, Clone, Parser)]
#[command(name = "chaosd", about = "Host-local fault-injection daemon")]
pub struct Config {
    /// SQLite database path.
    #[arg(long, env = "CHAOSD_DB_PATH", default_value = "chaosd.db")]
    pub db_path: String,

    /// HTTP bind address for the `server` subcommand.
    #[arg(long, env = "CHAOSD_HTTP_ADDR", default_value = "127.0.0.1:31767")]
    pub http_addr: String,

    /// `tracing-subscriber` `EnvFilter` directive.
    #[arg(long, env = "CHAOSD_LOG_FILTER", default_value = "info")]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: crate::cli::Cmd,
}
