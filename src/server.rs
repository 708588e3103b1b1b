//! Service startup: key generation, store selection, listeners and shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::api::{self, AppState, model::CheckinBoard};
use crate::auth::handler::{self as auth_handler, AuthState};
use crate::auth::{
    AccessGate, AttemptLimiter, CredentialStore, FileUserStore, HttpJwksSource,
    InMemoryUserStore, JwksSource, KeyProvider, TokenIssuer, TokenVerifier, UserStore,
};
use crate::config::{Config, ServerConfig, StoreBackend};
use crate::{Error, Result};

/// Which listeners to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeMode {
    /// Token issuer and resource API in one process
    All,
    /// Token issuer only
    Auth,
    /// Resource API only, verifying against the configured JWKS URL
    Api,
}

impl ServeMode {
    fn runs_auth(self) -> bool {
        matches!(self, Self::All | Self::Auth)
    }

    fn runs_api(self) -> bool {
        matches!(self, Self::All | Self::Api)
    }
}

/// Check-in service
pub struct Server {
    config: Config,
    mode: ServeMode,
}

impl Server {
    /// Create a server for `mode`
    #[must_use]
    pub fn new(config: Config, mode: ServeMode) -> Self {
        Self { config, mode }
    }

    /// Build the routers, bind and serve until a shutdown signal arrives.
    ///
    /// # Errors
    ///
    /// Key generation, store opening or binding failures abort startup.
    pub async fn run(self) -> Result<()> {
        let started_at = Instant::now();
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut listeners: Vec<(&'static str, &ServerConfig, Router)> = Vec::new();

        // Generated before anything binds; no key means no service
        let keys = if self.mode.runs_auth() {
            Some(Arc::new(KeyProvider::generate(&self.config.issuer.key_id)?))
        } else {
            None
        };

        if let Some(keys) = &keys {
            let app = self.auth_router(Arc::clone(keys), started_at).await?;
            listeners.push(("auth", &self.config.auth_server, app));
        }

        if self.mode.runs_api() {
            let source: Arc<dyn JwksSource> = match &keys {
                Some(keys) => Arc::clone(keys) as Arc<dyn JwksSource>,
                None => Arc::new(HttpJwksSource::new(
                    self.config.verifier.jwks_url.clone(),
                    self.config.verifier.fetch_timeout,
                )?),
            };
            listeners.push(("api", &self.config.api_server, self.api_router(source, started_at)));
        }

        let mut tasks = JoinSet::new();
        for (name, server, app) in listeners {
            let addr = server.socket_addr()?;
            let listener = TcpListener::bind(addr).await?;
            info!(service = name, %addr, "Listening");

            let mut shutdown_rx = shutdown_tx.subscribe();
            tasks.spawn(async move {
                axum::serve(
                    listener,
                    app.into_make_service_with_connect_info::<SocketAddr>(),
                )
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .map_err(|e| Error::Internal(format!("{name} server failed: {e}")))
            });
        }

        info!(
            version = env!("CARGO_PKG_VERSION"),
            mode = ?self.mode,
            "Team check-in service started"
        );

        tokio::spawn(shutdown_signal(shutdown_tx));

        while let Some(joined) = tasks.join_next().await {
            joined.map_err(|e| Error::Internal(format!("server task panicked: {e}")))??;
        }

        info!("Shutdown complete");
        Ok(())
    }

    async fn auth_router(&self, keys: Arc<KeyProvider>, started_at: Instant) -> Result<Router> {
        let store: Arc<dyn UserStore> = match self.config.store.backend {
            StoreBackend::Memory => {
                warn!("Using in-memory user store; registrations are lost on restart");
                Arc::new(InMemoryUserStore::new())
            }
            StoreBackend::File => {
                Arc::new(FileUserStore::open(self.config.store.resolved_path()).await?)
            }
        };

        let issuer_config = &self.config.issuer;
        let state = AuthState {
            credentials: Arc::new(CredentialStore::new(store, issuer_config.bcrypt_cost)?),
            issuer: TokenIssuer::new(Arc::clone(&keys), issuer_config.token_ttl),
            keys,
            started_at,
        };

        let limits = &self.config.rate_limit;
        let limiter = Arc::new(AttemptLimiter::for_auth(
            limits.auth_max_attempts,
            limits.auth_window,
        ));

        Ok(auth_handler::create_router(
            state,
            limiter,
            self.config.auth_server.max_body_size,
        ))
    }

    fn api_router(&self, source: Arc<dyn JwksSource>, started_at: Instant) -> Router {
        let verifier = TokenVerifier::new(source, self.config.verifier.refresh_cooldown);
        let state = AppState {
            gate: AccessGate::new(Arc::new(verifier)),
            board: Arc::new(CheckinBoard::new()),
            started_at,
        };

        let limits = &self.config.rate_limit;
        let limiter = Arc::new(AttemptLimiter::for_api(
            limits.api_max_requests,
            limits.api_window,
        ));

        api::create_router(
            state,
            limiter,
            &self.config.cors.origins,
            self.config.api_server.max_body_size,
        )
    }
}

/// Wait for Ctrl+C or SIGTERM, then tell every listener to drain
async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_select_listeners() {
        assert!(ServeMode::All.runs_auth() && ServeMode::All.runs_api());
        assert!(ServeMode::Auth.runs_auth() && !ServeMode::Auth.runs_api());
        assert!(!ServeMode::Api.runs_auth() && ServeMode::Api.runs_api());
    }
}
