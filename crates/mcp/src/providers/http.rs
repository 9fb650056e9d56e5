use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::{endpoint_of, HttpGet, HttpReply, ProviderError};

const USER_AGENT: &str = concat!("ncbi-mcp/", env!("CARGO_PKG_VERSION"));

/// `HttpGet` over one pooled reqwest client, created once and reused.
pub struct ReqwestHttp {
    client: Client,
}

impl ReqwestHttp {
    pub fn new(timeout: Option<Duration>) -> Self {
        let mut builder = Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Self {
            client: builder.build().unwrap_or_else(|_| Client::new()),
        }
    }
}

impl Default for ReqwestHttp {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl HttpGet for ReqwestHttp {
    async fn get(&self, url: &str) -> Result<HttpReply, ProviderError> {
        let endpoint = endpoint_of(url);
        let transport = |e: reqwest::Error| ProviderError::Transport {
            endpoint: endpoint.to_string(),
            message: e.without_url().to_string(),
        };

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport)?;

        debug!(endpoint, status, bytes = body.len(), "http response");
        Ok(HttpReply { status, body })
    }
}
