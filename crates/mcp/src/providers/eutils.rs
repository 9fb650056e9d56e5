use ncbi_mcp_core::QueryTerm;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::{endpoint_of, HttpGet, ProviderError};

pub const DEFAULT_EUTILS_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EutilsConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub email: Option<String>,
}

impl Default for EutilsConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_EUTILS_URL.to_string(),
            api_key: None,
            email: None,
        }
    }
}

/// Adapter for the Entrez E-utilities. Each operation is a single GET whose
/// body is read as JSON, except `efetch`, which is read as text.
pub struct EutilsClient {
    config: EutilsConfig,
    http: Arc<dyn HttpGet>,
}

impl EutilsClient {
    pub fn new(config: EutilsConfig, http: Arc<dyn HttpGet>) -> Self {
        Self { config, http }
    }

    pub async fn esearch(
        &self,
        database: &str,
        term: &QueryTerm,
        retstart: u64,
        retmax: u64,
    ) -> Result<Value, ProviderError> {
        let term = term.render();
        let retstart = retstart.to_string();
        let retmax = retmax.to_string();
        let url = self.url(
            "esearch.fcgi",
            &[
                ("db", database),
                ("term", &term),
                ("retstart", &retstart),
                ("retmax", &retmax),
                ("retmode", "json"),
            ],
        );
        self.get_json(&url).await
    }

    pub async fn esummary(&self, database: &str, ids: &[String]) -> Result<Value, ProviderError> {
        let ids = ids.join(",");
        let url = self.url(
            "esummary.fcgi",
            &[("db", database), ("id", &ids), ("retmode", "json")],
        );
        self.get_json(&url).await
    }

    pub async fn efetch(
        &self,
        database: &str,
        ids: &[String],
        rettype: &str,
        retmode: &str,
    ) -> Result<String, ProviderError> {
        let ids = ids.join(",");
        let url = self.url(
            "efetch.fcgi",
            &[
                ("db", database),
                ("id", &ids),
                ("rettype", rettype),
                ("retmode", retmode),
            ],
        );
        self.get_text(&url).await
    }

    pub async fn elink(
        &self,
        database: &str,
        ids: &[String],
        linkname: &str,
    ) -> Result<Value, ProviderError> {
        let ids = ids.join(",");
        let url = self.url(
            "elink.fcgi",
            &[
                ("dbfrom", database),
                ("id", &ids),
                ("linkname", linkname),
                ("retmode", "json"),
            ],
        );
        self.get_json(&url).await
    }

    /// Builds the request URL. Parameters keep their given order, with the
    /// contact email and API key appended last when configured.
    fn url(&self, endpoint: &str, params: &[(&str, &str)]) -> String {
        let credentials = [
            ("email", self.config.email.as_deref()),
            ("api_key", self.config.api_key.as_deref()),
        ];

        let query = params
            .iter()
            .map(|(k, v)| (*k, *v))
            .chain(credentials.iter().filter_map(|(k, v)| v.map(|v| (*k, v))))
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        format!(
            "{}/{}?{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint,
            query
        )
    }

    async fn get_text(&self, url: &str) -> Result<String, ProviderError> {
        let endpoint = endpoint_of(url);
        debug!(endpoint, "eutils request");

        let reply = self.http.get(url).await?;
        if !reply.is_success() {
            return Err(ProviderError::Status {
                endpoint: endpoint.to_string(),
                status: reply.status,
            });
        }
        Ok(reply.body)
    }

    async fn get_json(&self, url: &str) -> Result<Value, ProviderError> {
        let body = self.get_text(url).await?;
        serde_json::from_str(&body).map_err(|e| ProviderError::Decode {
            origin: endpoint_of(url).to_string(),
            message: e.to_string(),
        })
    }
}
