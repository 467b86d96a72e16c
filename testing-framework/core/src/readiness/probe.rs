use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, Url};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned status {status}")]
    Status { url: Url, status: u16 },
    #[error("failed to read response body from {url}: {source}")]
    Body {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
}

/// Single HTTP GET used to decide whether an endpoint is up.
#[async_trait]
pub trait HttpProbe: Send + Sync {
    /// Returns the body of a 2xx response; any other status is an error.
    async fn get(&self, url: &Url) -> Result<String, ProbeError>;
}

#[async_trait]
impl<T> HttpProbe for Arc<T>
where
    T: HttpProbe + ?Sized,
{
    async fn get(&self, url: &Url) -> Result<String, ProbeError> {
        (**self).get(url).await
    }
}

/// Probe backed by a shared reqwest client.
#[derive(Clone, Debug)]
pub struct ReqwestProbe {
    client: Client,
    request_timeout: Duration,
}

impl ReqwestProbe {
    /// Probes go straight to the compose host; proxy variables are ignored.
    pub fn new(request_timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().no_proxy().build().inspect_err(|err| {
            warn!(target: "readiness", error = %err, "failed to build readiness http client");
        })?;
        Ok(Self::with_client(client, request_timeout))
    }

    #[must_use]
    pub const fn with_client(client: Client, request_timeout: Duration) -> Self {
        Self {
            client,
            request_timeout,
        }
    }
}

#[async_trait]
impl HttpProbe for ReqwestProbe {
    async fn get(&self, url: &Url) -> Result<String, ProbeError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|source| ProbeError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status {
                url: url.clone(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|source| ProbeError::Body {
            url: url.clone(),
            source,
        })
    }
}
