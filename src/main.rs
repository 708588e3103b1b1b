//! Team check-in service - RS256 token issuer and role-gated check-in API.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use team_checkin::{
    cli::{Cli, Command},
    config::Config,
    server::{ServeMode, Server},
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let mode = match cli.command {
        Some(Command::Serve) | None => ServeMode::All,
        Some(Command::Auth) => ServeMode::Auth,
        Some(Command::Api) => ServeMode::Api,
    };

    run_server(cli, mode).await
}

/// Load configuration, apply CLI overrides and run until shutdown
async fn run_server(cli: Cli, mode: ServeMode) -> ExitCode {
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => apply_overrides(config, cli),
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {e}");
        return ExitCode::FAILURE;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        auth_port = config.auth_server.port,
        api_port = config.api_server.port,
        store = ?config.store.backend,
        "Starting team check-in service"
    );

    if let Err(e) = Server::new(config, mode).run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn apply_overrides(mut config: Config, cli: Cli) -> Config {
    if let Some(port) = cli.port {
        config.api_server.port = port;
    }
    if let Some(port) = cli.auth_port {
        config.auth_server.port = port;
    }
    if let Some(host) = cli.host {
        config.auth_server.host.clone_from(&host);
        config.api_server.host = host;
    }
    if let Some(url) = cli.jwks_url {
        config.verifier.jwks_url = url;
    }
    if let Some(kid) = cli.key_id {
        config.issuer.key_id = kid;
    }
    if let Some(origins) = cli.cors_origins {
        config.cors.origins = origins;
    }
    config
}
