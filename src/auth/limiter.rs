//! Per-client attempt limiting for signup/login and the resource API.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::keyed::DefaultKeyedStateStore,
};
use tracing::warn;

use crate::ApiError;

/// Message returned when signup/login attempts are exhausted
pub const AUTH_LIMIT_MESSAGE: &str = "Too many authentication attempts, please try again later";

/// Message returned when the resource API budget is exhausted
pub const API_LIMIT_MESSAGE: &str = "Too many requests";

/// Above this many tracked clients, idle entries are purged
const MAX_TRACKED_CLIENTS: usize = 10_000;

type KeyedLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Allows at most `max` requests per client IP within any `window`.
///
/// The budget starts full and regains one request per `window`, so a client
/// that drains it waits a whole window for the next attempt.
pub struct AttemptLimiter {
    inner: Option<KeyedLimiter>,
    clock: DefaultClock,
    message: &'static str,
}

impl std::fmt::Debug for AttemptLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttemptLimiter")
            .field("enabled", &self.inner.is_some())
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

impl AttemptLimiter {
    /// Limiter admitting `max` requests per `window`; `max == 0` disables it.
    #[must_use]
    pub fn new(max: u32, window: Duration, message: &'static str) -> Self {
        let clock = DefaultClock::default();
        let inner = NonZeroU32::new(max).and_then(|burst| {
            Quota::with_period(window).map(|quota| {
                RateLimiter::new(
                    quota.allow_burst(burst),
                    DefaultKeyedStateStore::default(),
                    clock.clone(),
                )
            })
        });

        Self {
            inner,
            clock,
            message,
        }
    }

    /// Limiter for signup/login
    #[must_use]
    pub fn for_auth(max: u32, window: Duration) -> Self {
        Self::new(max, window, AUTH_LIMIT_MESSAGE)
    }

    /// Limiter for the resource API
    #[must_use]
    pub fn for_api(max: u32, window: Duration) -> Self {
        Self::new(max, window, API_LIMIT_MESSAGE)
    }

    /// Count one attempt from `client`.
    ///
    /// # Errors
    ///
    /// [`ApiError::RateLimited`] once the client has used its budget.
    pub fn check(&self, client: IpAddr) -> Result<(), ApiError> {
        let Some(limiter) = &self.inner else {
            return Ok(());
        };

        if limiter.len() > MAX_TRACKED_CLIENTS {
            limiter.retain_recent();
        }

        limiter.check_key(&client).map_err(|not_until| {
            let wait = not_until.wait_time_from(self.clock.now());
            warn!(client = %client, retry_after_secs = wait.as_secs(), "Attempt limit reached");
            ApiError::RateLimited {
                message: self.message,
                retry_after_secs: wait.as_secs().max(1),
            }
        })
    }
}

/// Middleware counting every request against the client's budget
pub async fn limit_attempts(
    State(limiter): State<Arc<AttemptLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    limiter.check(client_ip(peer, request.headers()))?;
    Ok(next.run(request).await)
}

/// Socket peer address, else proxy headers, else the unspecified address
fn client_ip(peer: Option<IpAddr>, headers: &HeaderMap) -> IpAddr {
    peer.or_else(|| {
        headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|first| first.trim().parse().ok())
    })
    .or_else(|| {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    })
    .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}
