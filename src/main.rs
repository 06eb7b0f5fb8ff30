use std::sync::Arc;

use chaosd::agent::LoggingTcAgent;
use chaosd::attacks::stress::StressRunner;
use chaosd::cli::Cmd;
use chaosd::config::Config;
use chaosd::dispatcher::Dispatcher;
use chaosd::registry::AttackRegistry;
use chaosd::store::RuleStore;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Construct the rule store, agent client, and registry in a fixed order and
/// hand the assembled dispatcher to whichever front-end runs (§6, §9: no
/// hidden global state).
async fn build_dispatcher(config: &Config) -> Result<Arc<Dispatcher>, chaosd::error::ChaosError> {
    let store = RuleStore::connect(&config.db_path).await?;
    let agent = Box::new(LoggingTcAgent);
    let registry = AttackRegistry::builtin(StressRunner::new());
    Ok(Arc::new(Dispatcher::new(store, agent, registry)))
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let dispatcher = match build_dispatcher(&config).await {
        Ok(d) => d,
        Err(err) => {
            tracing::error!(%err, "failed to initialize daemon");
            return std::process::ExitCode::from(chaosd::cli::EXIT_ERROR as u8);
        }
    };

    if matches!(config.command, Cmd::Server) {
        let listener = match tokio::net::TcpListener::bind(&config.http_addr).await {
            Ok(l) => l,
            Err(err) => {
                tracing::error!(%err, addr = %config.http_addr, "failed to bind HTTP listener");
                return std::process::ExitCode::from(chaosd::cli::EXIT_ERROR as u8);
            }
        };
        tracing::info!(addr = %config.http_addr, "serving HTTP front-end");
        let app = chaosd::http::router(dispatcher);
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!(%err, "HTTP server exited with an error");
            return std::process::ExitCode::from(chaosd::cli::EXIT_ERROR as u8);
        }
        return std::process::ExitCode::SUCCESS;
    }

    let code = chaosd::cli::run(&dispatcher, config.command).await;
    std::process::ExitCode::from(code as u8)
}
