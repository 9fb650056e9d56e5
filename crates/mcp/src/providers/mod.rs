pub mod datasets;
pub mod eutils;
pub mod http;
pub mod process;

use async_trait::async_trait;
use ncbi_mcp_core::NormalizeError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ServerConfig;

pub use datasets::{
    AssemblyFilters, AssemblyQuery, DatasetsCli, FilterError, GeneQuery, GeneTarget, GenomeQuery,
};
pub use eutils::{EutilsClient, EutilsConfig, DEFAULT_EUTILS_URL};
pub use http::ReqwestHttp;
pub use process::{verify_executable, verify_invocable, TokioProcessRunner};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },
    #[error("{origin} returned malformed JSON: {message}")]
    Decode { origin: String, message: String },
    #[error("failed to launch {program}: {message}")]
    Launch { program: String, message: String },
    #[error("{program} exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("executable not found: {}", .0.display())]
    ExecutableNotFound(PathBuf),
    #[error("not an executable file: {}", .0.display())]
    NotExecutable(PathBuf),
    #[error("{} failed its version probe: {message}", path.display())]
    VersionProbe { path: PathBuf, message: String },
    #[error("no results: {0}")]
    NotFound(String),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The one HTTP capability adapters need: a GET returning status and body.
#[async_trait]
pub trait HttpGet: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpReply, ProviderError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn status_text(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {}", code),
            None => "a signal".to_string(),
        }
    }
}

/// Runs a local program to completion, capturing its output.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, program: &Path, args: &[String]) -> Result<ProcessOutput, ProviderError>;
}

/// Adapters shared by every tool handler. Cloning shares the sessions.
#[derive(Clone)]
pub struct Providers {
    pub eutils: Arc<EutilsClient>,
    pub datasets: Option<Arc<DatasetsCli>>,
}

impl Providers {
    /// Builds the real adapters. A datasets CLI that fails verification is
    /// left out with a warning; the E-utilities adapter is always present.
    pub async fn connect(config: &ServerConfig) -> Self {
        let http = Arc::new(ReqwestHttp::new(config.http_timeout));
        let eutils = Arc::new(EutilsClient::new(config.eutils.clone(), http));

        let datasets = match &config.datasets_path {
            None => None,
            Some(path) => {
                let runner = Arc::new(TokioProcessRunner);
                match DatasetsCli::new(path.clone(), config.eutils.api_key.clone(), runner).await {
                    Ok(cli) => {
                        info!(program = %path.display(), "datasets CLI available");
                        Some(Arc::new(cli))
                    }
                    Err(e) => {
                        warn!(error = %e, "datasets CLI unavailable; gene and genome tools disabled");
                        None
                    }
                }
            }
        };

        Self { eutils, datasets }
    }
}

/// Scheme, host and path of `url`, dropping the query string (which may carry
/// the API key).
pub fn endpoint_of(url: &str) -> &str {
    url.split_once('?').map_or(url, |(endpoint, _)| endpoint)
}
