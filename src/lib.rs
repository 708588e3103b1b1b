//! Team Check-in Service Library
//!
//! Managers create check-ins (question sets with due dates), members submit one
//! response per check-in, and managers review aggregated responses.
//!
//! # Features
//!
//! - **Token issuance**: signup/login with bcrypt-hashed credentials, RS256
//!   tokens carrying `{sub, email, role}` and a one hour expiry
//! - **JWKS**: the issuer publishes its public key at `/.well-known/jwks.json`
//! - **Verification**: resource servers fetch and cache the issuer key, pin the
//!   algorithm, and check signature and expiry on every request
//! - **Role gating**: every resource route requires a valid bearer token and,
//!   where needed, the `manager` or `member` role
//! - **Failsafes**: per-client attempt limits on signup/login and on the API

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod server;

pub use error::{ApiError, Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Internal(format!("Failed to install subscriber: {e}"))),
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Internal(format!("Failed to install subscriber: {e}"))),
    }
}
