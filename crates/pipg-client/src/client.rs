use std::time::Duration;

use reqwest::{Client, ClientBuilder, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

use pipg_normalize::PackageName;
use pipg_pypi_types::PackageInfo;

use crate::error::Error;
use crate::{backoff_delay, MAX_ATTEMPTS};

/// The public Python package index.
pub const DEFAULT_INDEX_URL: &str = "https://pypi.org/pypi";

/// A builder for a [`RegistryClient`].
#[derive(Debug, Clone)]
pub struct RegistryClientBuilder {
    index: Url,
    timeout: Duration,
    cancel: CancellationToken,
}

impl Default for RegistryClientBuilder {
    fn default() -> Self {
        Self {
            index: Url::parse(DEFAULT_INDEX_URL).expect("default index URL is valid"),
            timeout: Duration::from_secs(30),
            cancel: CancellationToken::new(),
        }
    }
}

impl RegistryClientBuilder {
    #[must_use]
    pub fn index(mut self, index: Url) -> Self {
        self.index = index;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> RegistryClient {
        let client = ClientBuilder::new()
            .user_agent("pipg")
            .pool_max_idle_per_host(20)
            .timeout(self.timeout)
            .build()
            .expect("Failed to build HTTP client");

        RegistryClient {
            index: self.index,
            client,
            cancel: self.cancel,
        }
    }
}

/// A client for the PyPI JSON API.
///
/// One instance is shared across the resolver and the downloader so they draw
/// from the same connection pool.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    index: Url,
    client: Client,
    cancel: CancellationToken,
}

impl RegistryClient {
    /// The underlying HTTP client, for components that stream file downloads.
    pub fn raw_client(&self) -> &Client {
        &self.client
    }

    /// The cancellation token all requests observe.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fetch metadata for a package: `GET {index}/{name}/json`.
    pub async fn get_package(&self, name: &PackageName) -> Result<PackageInfo, Error> {
        let url = self.endpoint(&[name.as_ref(), "json"])?;
        self.fetch(url, name.as_ref()).await
    }

    /// Fetch metadata for a pinned version: `GET {index}/{name}/{version}/json`.
    pub async fn get_version(
        &self,
        name: &PackageName,
        version: &str,
    ) -> Result<PackageInfo, Error> {
        let url = self.endpoint(&[name.as_ref(), version, "json"])?;
        self.fetch(url, name.as_ref()).await
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.index.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    /// Perform a GET with retry and backoff, then decode the JSON body.
    ///
    /// Only transient failures (network errors, 5xx) are retried; 404 becomes
    /// a terminal "package not found" and other non-2xx statuses and decode
    /// failures are terminal as well.
    async fn fetch(&self, url: Url, name: &str) -> Result<PackageInfo, Error> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.request(&url, name).await {
                Ok(info) => return Ok(info),
                Err(Retry::Terminal(err)) => return Err(err),
                Err(Retry::Transient(err)) if attempt >= MAX_ATTEMPTS => {
                    return Err(match err {
                        Transient::Network(source) => Error::Transport {
                            url,
                            attempts: attempt,
                            source,
                        },
                        Transient::ServerError(status) => Error::ServerError {
                            status,
                            url,
                            attempts: attempt,
                        },
                    });
                }
                Err(Retry::Transient(err)) => {
                    let delay = backoff_delay(attempt);
                    debug!(
                        "Request for {name} failed ({err:?}), retrying in {}ms (attempt {attempt}/{MAX_ATTEMPTS})",
                        delay.as_millis()
                    );
                    tokio::select! {
                        () = self.cancel.cancelled() => return Err(Error::Canceled),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn request(&self, url: &Url, name: &str) -> Result<PackageInfo, Retry> {
        trace!("Fetching metadata from {url}");

        let send = async {
            let response = self
                .client
                .get(url.clone())
                .header("Accept", "application/json")
                .send()
                .await
                .map_err(|err| Retry::Transient(Transient::Network(err)))?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Err(Retry::Terminal(Error::PackageNotFound(name.to_string())));
            }
            if status.is_server_error() {
                return Err(Retry::Transient(Transient::ServerError(status.as_u16())));
            }
            if !status.is_success() {
                return Err(Retry::Terminal(Error::Status {
                    status: status.as_u16(),
                    url: url.clone(),
                }));
            }

            // A truncated body surfaces here as a network error, which is
            // retryable.
            let bytes = response
                .bytes()
                .await
                .map_err(|err| Retry::Transient(Transient::Network(err)))?;

            serde_json::from_slice(&bytes).map_err(|err| {
                Retry::Terminal(Error::BadJson {
                    url: url.clone(),
                    source: err,
                })
            })
        };

        tokio::select! {
            () = self.cancel.cancelled() => Err(Retry::Terminal(Error::Canceled)),
            result = send => result,
        }
    }
}

/// Classification of a failed request: transient failures re-enter the retry
/// loop, terminal ones propagate as-is.
#[derive(Debug)]
enum Retry {
    Transient(Transient),
    Terminal(Error),
}

#[derive(Debug)]
enum Transient {
    Network(reqwest::Error),
    ServerError(u16),
}
