//! Configuration management

use std::{net::SocketAddr, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default `kid` published in the JWKS and stamped into token headers
pub const DEFAULT_KEY_ID: &str = "team-checkin-system-auth-key";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before anything else reads the environment.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// Listener for the token issuer (signup, login, JWKS)
    #[serde(default = "ServerConfig::auth_default")]
    pub auth_server: ServerConfig,
    /// Listener for the check-in resource API
    #[serde(default = "ServerConfig::api_default")]
    pub api_server: ServerConfig,
    /// Token issuance settings
    pub issuer: IssuerConfig,
    /// Token verification settings
    pub verifier: VerifierConfig,
    /// User store backend
    pub store: StoreConfig,
    /// Per-client request limits
    pub rate_limit: RateLimitConfig,
    /// Cross-origin settings for the resource API
    pub cors: CorsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env_files: Vec::new(),
            auth_server: ServerConfig::auth_default(),
            api_server: ServerConfig::api_default(),
            issuer: IssuerConfig::default(),
            verifier: VerifierConfig::default(),
            store: StoreConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Maximum request body size (bytes)
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_max_body_size() -> usize {
    64 * 1024
}

impl ServerConfig {
    fn auth_default() -> Self {
        Self {
            host: default_host(),
            port: 3001,
            max_body_size: default_max_body_size(),
        }
    }

    fn api_default() -> Self {
        Self {
            host: default_host(),
            port: 4000,
            max_body_size: default_max_body_size(),
        }
    }

    /// Socket address to bind
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip = self
            .host
            .parse()
            .map_err(|e| Error::Config(format!("Invalid host '{}': {e}", self.host)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Token issuance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuerConfig {
    /// Key identifier published in the JWKS and token headers
    pub key_id: String,
    /// Token lifetime
    #[serde(with = "humantime_serde")]
    pub token_ttl: Duration,
    /// bcrypt work factor (4..=31)
    pub bcrypt_cost: u32,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            key_id: DEFAULT_KEY_ID.to_string(),
            token_ttl: Duration::from_secs(3600),
            bcrypt_cost: 12,
        }
    }
}

/// Token verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Issuer JWKS document URL
    pub jwks_url: String,
    /// Bound on a single JWKS fetch
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,
    /// Minimum spacing between JWKS refetches triggered by an unknown `kid`
    #[serde(with = "humantime_serde")]
    pub refresh_cooldown: Duration,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            jwks_url: "http://auth:3001/.well-known/jwks.json".to_string(),
            fetch_timeout: Duration::from_secs(5),
            refresh_cooldown: Duration::from_secs(30),
        }
    }
}

/// Which [`UserStore`](crate::auth::UserStore) implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local map, lost on restart
    #[default]
    Memory,
    /// JSON document file on disk
    File,
}

/// User store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend selection
    pub backend: StoreBackend,
    /// Document path for the `file` backend (supports ~ expansion)
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: "~/.team-checkin/users.json".to_string(),
        }
    }
}

impl StoreConfig {
    /// Document path with ~ expanded
    #[must_use]
    pub fn resolved_path(&self) -> String {
        expand_home(&self.path)
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Signup/login attempts allowed per client within `auth_window` (0 = unlimited)
    pub auth_max_attempts: u32,
    /// Rolling window for signup/login attempts
    #[serde(with = "humantime_serde")]
    pub auth_window: Duration,
    /// Resource API requests allowed per client within `api_window` (0 = unlimited)
    pub api_max_requests: u32,
    /// Rolling window for resource API requests
    #[serde(with = "humantime_serde")]
    pub api_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            auth_max_attempts: 5,
            auth_window: Duration::from_secs(15 * 60),
            api_max_requests: 300,
            api_window: Duration::from_secs(60),
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins
    pub origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or holds out-of-range values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Env files must land in the process environment before CHECKIN_* is read
        let env_files: Vec<String> = figment
            .clone()
            .merge(Env::prefixed("CHECKIN_").split("__"))
            .extract_inner("env_files")
            .unwrap_or_default();
        load_env_files(&env_files);

        // CHECKIN_ISSUER__TOKEN_TTL=30m -> issuer.token_ttl
        figment = figment.merge(Env::prefixed("CHECKIN_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Reject values the services cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(4..=31).contains(&self.issuer.bcrypt_cost) {
            return Err(Error::Config(format!(
                "issuer.bcrypt_cost must be between 4 and 31, got {}",
                self.issuer.bcrypt_cost
            )));
        }
        if self.issuer.token_ttl.is_zero() {
            return Err(Error::Config("issuer.token_ttl must be positive".to_string()));
        }
        if self.issuer.key_id.is_empty() {
            return Err(Error::Config("issuer.key_id must not be empty".to_string()));
        }
        if self.verifier.fetch_timeout.is_zero() {
            return Err(Error::Config(
                "verifier.fetch_timeout must be positive".to_string(),
            ));
        }
        let limits = &self.rate_limit;
        for (name, max, window) in [
            ("auth_window", limits.auth_max_attempts, limits.auth_window),
            ("api_window", limits.api_max_requests, limits.api_window),
        ] {
            if max > 0 && window.is_zero() {
                return Err(Error::Config(format!(
                    "rate_limit.{name} must be positive when its limit is enabled"
                )));
            }
        }
        reqwest::Url::parse(&self.verifier.jwks_url).map_err(|e| {
            Error::Config(format!(
                "verifier.jwks_url '{}' is not a valid URL: {e}",
                self.verifier.jwks_url
            ))
        })?;
        Ok(())
    }

}

/// Load environment files into the process environment.
/// Files that don't exist are silently skipped; variables already set win.
fn load_env_files(paths: &[String]) {
    for path_str in paths {
        let expanded = expand_home(path_str);
        let path = Path::new(&expanded);
        if path.exists() {
            match dotenvy::from_path(path) {
                Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
            }
        } else {
            tracing::debug!("Env file not found (skipped): {expanded}");
        }
    }
}

fn expand_home(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.display().to_string(), 1);
        }
    }
    path.to_string()
}

/// Serde helpers for human-readable durations ("30s", "15m", "1h", "100ms")
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize a Duration using the largest whole unit
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let secs = duration.as_secs();
        let text = if duration.subsec_millis() != 0 || secs == 0 {
            format!("{}ms", duration.as_millis())
        } else if secs % 3600 == 0 {
            format!("{}h", secs / 3600)
        } else if secs % 60 == 0 {
            format!("{}m", secs / 60)
        } else {
            format!("{secs}s")
        };
        serializer.serialize_str(&text)
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    /// Deserialize a duration string or integer; a bare number is seconds
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the value cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(s) => parse(&s).map_err(serde::de::Error::custom),
        }
    }

    pub(crate) fn parse(s: &str) -> Result<Duration, std::num::ParseIntError> {
        let s = s.trim();
        // "ms" before "m" and "s"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>().map(Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>().map(Duration::from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>().map(|m| Duration::from_secs(m * 60))
        } else if let Some(hours) = s.strip_suffix('h') {
            hours.parse::<u64>().map(|h| Duration::from_secs(h * 3600))
        } else {
            s.parse::<u64>().map(Duration::from_secs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_layout() {
        let config = Config::default();
        assert_eq!(config.auth_server.port, 3001);
        assert_eq!(config.api_server.port, 4000);
        assert_eq!(config.issuer.key_id, DEFAULT_KEY_ID);
        assert_eq!(config.issuer.token_ttl, Duration::from_secs(3600));
        assert_eq!(config.issuer.bcrypt_cost, 12);
        assert_eq!(config.verifier.fetch_timeout, Duration::from_secs(5));
        assert_eq!(config.rate_limit.auth_max_attempts, 5);
        assert_eq!(config.rate_limit.auth_window, Duration::from_secs(900));
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn durations_parse_all_units() {
        assert_eq!(humantime_serde::parse("100ms").unwrap(), Duration::from_millis(100));
        assert_eq!(humantime_serde::parse("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(humantime_serde::parse("15m").unwrap(), Duration::from_secs(900));
        assert_eq!(humantime_serde::parse("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(humantime_serde::parse("42").unwrap(), Duration::from_secs(42));
        assert!(humantime_serde::parse("soon").is_err());
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        // Jail serializes every test that reads CHECKIN_* variables
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "checkin.yaml",
                r#"
api_server:
  host: "127.0.0.1"
  port: 4100
issuer:
  token_ttl: 30m
  bcrypt_cost: 10
store:
  backend: file
  path: /tmp/users.json
verifier:
  jwks_url: "http://127.0.0.1:3001/.well-known/jwks.json"
"#,
            )?;

            let config = Config::load(Some(Path::new("checkin.yaml"))).unwrap();

            assert_eq!(config.api_server.port, 4100);
            assert_eq!(config.issuer.token_ttl, Duration::from_secs(1800));
            assert_eq!(config.issuer.bcrypt_cost, 10);
            assert_eq!(config.store.backend, StoreBackend::File);
            // Untouched sections keep their defaults
            assert_eq!(config.auth_server.port, 3001);
            assert_eq!(config.issuer.key_id, DEFAULT_KEY_ID);
            Ok(())
        });
    }

    #[test]
    fn env_vars_override_nested_keys() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("CHECKIN_ISSUER__TOKEN_TTL", "30m");
            jail.set_env("CHECKIN_API_SERVER__PORT", "4200");
            jail.set_env("CHECKIN_STORE__BACKEND", "file");

            let config = Config::load(None).unwrap();

            assert_eq!(config.issuer.token_ttl, Duration::from_secs(1800));
            assert_eq!(config.api_server.port, 4200);
            assert_eq!(config.api_server.host, "0.0.0.0");
            assert_eq!(config.store.backend, StoreBackend::File);
            Ok(())
        });
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/checkin.yaml"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = Config::default();
        config.issuer.bcrypt_cost = 3;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.issuer.token_ttl = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.verifier.jwks_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_window_for_enabled_limit() {
        let mut config = Config::default();
        config.rate_limit.auth_window = Duration::ZERO;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rate_limit.auth_window"));

        let mut config = Config::default();
        config.rate_limit.api_window = Duration::ZERO;
        assert!(config.validate().is_err());

        // A disabled limit may leave its window empty
        let mut config = Config::default();
        config.rate_limit.api_max_requests = 0;
        config.rate_limit.api_window = Duration::ZERO;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_file_feeds_prefixed_variables() {
        figment::Jail::expect_with(|jail| {
            // GIVEN: a config naming an env file that sets a CHECKIN_ key
            jail.create_file("secrets.env", "CHECKIN_API_SERVER__PORT=4300\n")?;
            jail.create_file("checkin.yaml", "env_files:\n  - secrets.env\n")?;

            // WHEN: the config is loaded
            let config = Config::load(Some(Path::new("checkin.yaml"))).unwrap();

            // THEN: the variable from the file took effect
            assert_eq!(config.api_server.port, 4300);
            Ok(())
        });
    }

    #[test]
    fn env_file_does_not_override_process_environment() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("CHECKIN_API_SERVER__PORT", "4400");
            jail.create_file("secrets.env", "CHECKIN_API_SERVER__PORT=4300\n")?;
            jail.create_file("checkin.yaml", "env_files:\n  - secrets.env\n")?;

            let config = Config::load(Some(Path::new("checkin.yaml"))).unwrap();

            assert_eq!(config.api_server.port, 4400);
            Ok(())
        });
    }

    #[test]
    fn integer_durations_are_seconds() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("checkin.yaml", "issuer:\n  token_ttl: 7200\n")?;
            jail.set_env("CHECKIN_VERIFIER__REFRESH_COOLDOWN", "45");

            let config = Config::load(Some(Path::new("checkin.yaml"))).unwrap();

            assert_eq!(config.issuer.token_ttl, Duration::from_secs(7200));
            assert_eq!(config.verifier.refresh_cooldown, Duration::from_secs(45));
            Ok(())
        });
    }

    #[test]
    fn socket_addr_rejects_hostnames() {
        let server = ServerConfig {
            host: "localhost".to_string(),
            port: 1,
            max_body_size: 1,
        };
        assert!(server.socket_addr().is_err());
    }

    #[test]
    fn env_files_deserialized_from_yaml() {
        let yaml = r#"
env_files:
  - ~/.team-checkin/secrets.env
auth_server:
  host: "127.0.0.1"
  port: 3101
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.env_files.len(), 1);
        assert_eq!(config.auth_server.port, 3101);
        assert_eq!(config.auth_server.max_body_size, 64 * 1024);
    }
}
