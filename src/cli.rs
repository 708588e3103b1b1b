//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Team check-in service - token issuer and role-gated check-in API
#[derive(Parser, Debug)]
#[command(name = "team-checkin")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "CHECKIN_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port for the resource API
    #[arg(short, long, env = "PORT", global = true)]
    pub port: Option<u16>,

    /// Port for the token issuer
    #[arg(long, env = "AUTH_PORT", global = true)]
    pub auth_port: Option<u16>,

    /// Host to bind both listeners to
    #[arg(long, env = "CHECKIN_HOST", global = true)]
    pub host: Option<String>,

    /// Issuer JWKS URL used by the resource API
    #[arg(long, env = "JWKS_URL", global = true)]
    pub jwks_url: Option<String>,

    /// Key identifier for the issuer's signing key
    #[arg(long, env = "AUTH_KEY_ID", global = true)]
    pub key_id: Option<String>,

    /// Comma-separated CORS origins for the resource API
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',', global = true)]
    pub cors_origins: Option<Vec<String>>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "CHECKIN_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "CHECKIN_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to running both services)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run the token issuer and the resource API in one process (default)
    Serve,

    /// Run only the token issuer (signup, login, JWKS)
    Auth,

    /// Run only the resource API, verifying tokens against `--jwks-url`
    Api,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subcommand_and_overrides() {
        let cli = Cli::try_parse_from([
            "team-checkin",
            "api",
            "--port",
            "4100",
            "--jwks-url",
            "http://127.0.0.1:3001/.well-known/jwks.json",
            "--cors-origins",
            "http://a.test,http://b.test",
        ])
        .unwrap();

        assert_eq!(cli.command, Some(Command::Api));
        assert_eq!(cli.port, Some(4100));
        assert_eq!(
            cli.cors_origins.unwrap(),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }

    #[test]
    fn no_subcommand_means_serve_everything() {
        let cli = Cli::try_parse_from(["team-checkin"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, "info");
    }
}
