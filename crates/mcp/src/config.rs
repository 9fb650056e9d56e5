use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use reqwest::Url;
use std::env::consts::EXE_SUFFIX;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::providers::{EutilsConfig, DEFAULT_EUTILS_URL};
use crate::transport::Strictness;

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 0;
const DATASETS_EXECUTABLE: &str = "datasets";

#[derive(Parser, Debug)]
#[command(name = "ncbi-mcp", version, about = "MCP server for NCBI gene and genome lookups.")]
struct CliArgs {
    #[arg(long, env = "NCBI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, env = "NCBI_EMAIL")]
    email: Option<String>,

    #[arg(long, env = "NCBI_EUTILS_URL", default_value = DEFAULT_EUTILS_URL)]
    eutils_url: String,

    /// Path to the `datasets` executable. Defaults to `datasets` in the home
    /// directory.
    #[arg(long, env = "NCBI_DATASETS_PATH")]
    datasets_path: Option<PathBuf>,

    #[arg(
        long,
        env = "NCBI_MCP_NO_DATASETS",
        default_value_t = false,
        value_parser = BoolishValueParser::new()
    )]
    no_datasets: bool,

    /// 0 disables the timeout.
    #[arg(
        long,
        env = "NCBI_HTTP_TIMEOUT_SECS",
        default_value_t = DEFAULT_HTTP_TIMEOUT_SECS
    )]
    http_timeout_secs: u64,

    /// Require `"jsonrpc": "2.0"` on every request.
    #[arg(
        long,
        env = "NCBI_MCP_STRICT",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    strict: bool,

    #[arg(long, env = "NCBI_MCP_DEBUG", value_parser = BoolishValueParser::new())]
    debug: bool,
}

/// Runtime configuration loaded from CLI arguments and environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub eutils: EutilsConfig,
    /// `None` when the datasets CLI is disabled or no default location exists.
    pub datasets_path: Option<PathBuf>,
    pub http_timeout: Option<Duration>,
    pub strictness: Strictness,
    pub debug: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {name} value: {value}")]
    InvalidSetting { name: &'static str, value: String },
}

impl ServerConfig {
    pub fn from_args() -> Result<Self, ConfigError> {
        let args = CliArgs::parse();
        Self::try_from(args)
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = ConfigError;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let api_key = args.api_key.filter(|value| !value.trim().is_empty());
        let email = args.email.filter(|value| !value.trim().is_empty());

        if let Some(email) = &email {
            if !email.contains('@') {
                return Err(ConfigError::InvalidSetting {
                    name: "NCBI_EMAIL",
                    value: email.clone(),
                });
            }
        }

        let base_url = args.eutils_url.trim().trim_end_matches('/').to_string();
        let valid_url = Url::parse(&base_url)
            .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
            .unwrap_or(false);
        if !valid_url {
            return Err(ConfigError::InvalidSetting {
                name: "NCBI_EUTILS_URL",
                value: args.eutils_url,
            });
        }

        let datasets_path = if args.no_datasets {
            None
        } else {
            args.datasets_path
                .filter(|path| !path.as_os_str().is_empty())
                .or_else(default_datasets_path)
        };

        let http_timeout = match args.http_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let strictness = if args.strict {
            Strictness::Strict
        } else {
            Strictness::Lenient
        };

        Ok(Self {
            eutils: EutilsConfig {
                base_url,
                api_key,
                email,
            },
            datasets_path,
            http_timeout,
            strictness,
            debug: args.debug,
        })
    }
}

fn default_datasets_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"))?;
    Some(PathBuf::from(home).join(format!("{}{}", DATASETS_EXECUTABLE, EXE_SUFFIX)))
}
