use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum Error {
    /// The package was not found in the registry.
    ///
    /// Make sure the package name is spelled correctly and that you've
    /// configured the right registry to fetch it from.
    #[error("Package `{0}` was not found in the registry")]
    PackageNotFound(String),

    /// A non-retryable HTTP response, i.e. any 4xx other than 404.
    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: Url },

    /// A network-level failure that survived every retry.
    #[error("Request to {url} failed after {attempts} attempts")]
    Transport {
        url: Url,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// A 5xx that survived every retry.
    #[error("Server error {status} from {url} after {attempts} attempts")]
    ServerError {
        status: u16,
        url: Url,
        attempts: u32,
    },

    #[error("Received some unexpected JSON from {url}")]
    BadJson {
        url: Url,
        #[source]
        source: serde_json::Error,
    },

    /// An invalid URL was provided.
    #[error(transparent)]
    UrlParse(#[from] url::ParseError),

    /// A request failed before reaching the retry loop (builder errors).
    #[error(transparent)]
    Request(#[from] reqwest::Error),

    /// Cooperative cancellation.
    #[error("Operation canceled")]
    Canceled,
}
