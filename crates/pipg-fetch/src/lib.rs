//! Select the best wheel per resolved package and download the plan
//! concurrently, verifying integrity and publishing atomically.
//!
//! Each task streams its body into a sibling `.tmp` file while feeding a
//! SHA-256 hasher, verifies the digest, then renames into place, so a partial
//! file is never visible at the target path. Completed downloads are also
//! placed into the wheel cache, where the same rename discipline makes
//! concurrent writers of one key harmless.

use std::cmp::Reverse;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};
use url::Url;

use pipg_cache::Cache;
use pipg_client::{backoff_delay, RegistryClient, MAX_ATTEMPTS};

pub use select::{select_wheel, NoCompatibleWheel};

mod select;

/// A single file to download.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    /// The package name, for error context.
    pub name: String,
    /// The resolved version, for reporting.
    pub version: String,
    /// The direct download URL.
    pub url: Url,
    /// The expected SHA-256 hex digest; empty to skip verification.
    pub sha256: String,
    /// The artifact filename, used verbatim as the cache key and the on-disk
    /// name.
    pub filename: String,
    /// The declared size in bytes, used only to order large downloads first.
    pub size: u64,
}

/// The outcome of one download.
#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub name: String,
    pub version: String,
    /// Absolute path to a readable artifact.
    pub path: PathBuf,
    /// The observed on-disk size.
    pub size: u64,
    /// Whether the artifact was served from the cache without a network
    /// fetch.
    pub cached: bool,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to download `{name}`: unexpected status {status} from {url}")]
    Status {
        name: String,
        status: u16,
        url: Url,
    },

    #[error("Failed to download `{name}` from {url} after {attempts} attempts")]
    Transport {
        name: String,
        url: Url,
        attempts: u32,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The downloaded bytes do not match the declared digest. Terminal: the
    /// same bytes would come back on a retry.
    #[error("Hash mismatch for `{filename}`: expected sha256 {expected}, got {actual}")]
    Integrity {
        filename: String,
        expected: String,
        actual: String,
    },

    #[error("Failed to write `{filename}`")]
    Io {
        filename: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Download canceled")]
    Canceled,
}

/// A bounded-concurrency wheel downloader.
pub struct Downloader<'a> {
    client: &'a RegistryClient,
    cache: Option<&'a Cache>,
    target_dir: &'a Path,
    workers: usize,
}

impl<'a> Downloader<'a> {
    /// A downloader writing artifacts into `target_dir`. The worker count
    /// defaults to the logical CPU count.
    pub fn new(client: &'a RegistryClient, target_dir: &'a Path) -> Self {
        let workers = std::thread::available_parallelism().map_or(4, usize::from);
        Self {
            client,
            cache: None,
            target_dir,
            workers,
        }
    }

    /// Serve from (and publish to) the given cache.
    #[must_use]
    pub fn with_cache(self, cache: &'a Cache) -> Self {
        Self {
            cache: Some(cache),
            ..self
        }
    }

    /// Override the worker count.
    #[must_use]
    pub fn with_workers(self, workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            ..self
        }
    }

    /// Download every task, returning results in the order of the input
    /// plan regardless of completion order. The first terminal failure
    /// cancels the remaining transfers and fails the whole batch.
    pub async fn fetch(&self, tasks: Vec<DownloadTask>) -> Result<Vec<DownloadResult>, Error> {
        let mut results: Vec<Option<DownloadResult>> = Vec::new();
        results.resize_with(tasks.len(), || None);

        // Large downloads first, so the long poles start early.
        let mut indexed: Vec<(usize, DownloadTask)> = tasks.into_iter().enumerate().collect();
        indexed.sort_by_key(|(_, task)| Reverse(task.size));

        let mut downloads = futures::stream::iter(indexed)
            .map(|(index, task)| async move { (index, self.fetch_one(task).await) })
            .buffer_unordered(self.workers);

        while let Some((index, result)) = downloads.next().await {
            // The `?` drops the stream on error, canceling in-flight
            // transfers.
            results[index] = Some(result?);
        }

        Ok(results
            .into_iter()
            .map(|result| result.expect("every task reports a result"))
            .collect())
    }

    /// Fetch a single task: cache probe, then download-with-retry.
    async fn fetch_one(&self, task: DownloadTask) -> Result<DownloadResult, Error> {
        if let Some(cache) = self.cache {
            if let Some(path) = cache.get(&task.filename, &task.sha256) {
                let size = fs_err::metadata(&path)
                    .map_err(|err| Error::Io {
                        filename: task.filename.clone(),
                        source: err,
                    })?
                    .len();
                return Ok(DownloadResult {
                    name: task.name,
                    version: task.version,
                    path,
                    size,
                    cached: true,
                });
            }
        }

        let cancel = self.client.cancel_token();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = tokio::select! {
                () = cancel.cancelled() => return Err(Error::Canceled),
                outcome = self.download(&task) => outcome,
            };
            match outcome {
                Ok(result) => return Ok(result),
                Err(Attempt::Terminal(err)) => return Err(err),
                Err(Attempt::Transient(source)) if attempt >= MAX_ATTEMPTS => {
                    return Err(Error::Transport {
                        name: task.name,
                        url: task.url,
                        attempts: attempt,
                        source,
                    });
                }
                Err(Attempt::Transient(_)) => {
                    let delay = backoff_delay(attempt);
                    debug!(
                        "Download of {} failed, retrying in {}ms (attempt {attempt}/{MAX_ATTEMPTS})",
                        task.filename,
                        delay.as_millis()
                    );
                    tokio::select! {
                        () = cancel.cancelled() => return Err(Error::Canceled),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// One download attempt: GET, stream to a temp file while hashing,
    /// verify, publish.
    async fn download(&self, task: &DownloadTask) -> Result<DownloadResult, Attempt> {
        trace!("Downloading {} from {}", task.filename, task.url);

        let response = self
            .client
            .raw_client()
            .get(task.url.clone())
            .send()
            .await
            .map_err(|err| Attempt::Transient(Some(err)))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(Attempt::Transient(None));
        }
        if status != StatusCode::OK {
            return Err(Attempt::Terminal(Error::Status {
                name: task.name.clone(),
                status: status.as_u16(),
                url: task.url.clone(),
            }));
        }

        let target = self.target_dir.join(&task.filename);
        let temp = self.target_dir.join(format!("{}.tmp", task.filename));
        let io_error = |source| Error::Io {
            filename: task.filename.clone(),
            source,
        };

        let mut file = tokio::fs::File::create(&temp)
            .await
            .map_err(|err| Attempt::Terminal(io_error(err)))?;

        // Stream the body into the temp file and the hasher in one pass.
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    // A failure mid-body is a truncated transfer: retryable.
                    drop(file);
                    let _ = fs_err::remove_file(&temp);
                    return Err(Attempt::Transient(Some(err)));
                }
            };
            hasher.update(&chunk);
            size += chunk.len() as u64;
            if let Err(err) = file.write_all(&chunk).await {
                drop(file);
                let _ = fs_err::remove_file(&temp);
                return Err(Attempt::Terminal(io_error(err)));
            }
        }
        if let Err(err) = file.flush().await {
            drop(file);
            let _ = fs_err::remove_file(&temp);
            return Err(Attempt::Terminal(io_error(err)));
        }
        drop(file);

        // Verify before anything becomes visible at the target path.
        let actual = hex::encode(hasher.finalize());
        if !task.sha256.is_empty() && !actual.eq_ignore_ascii_case(&task.sha256) {
            let _ = fs_err::remove_file(&temp);
            return Err(Attempt::Terminal(Error::Integrity {
                filename: task.filename.clone(),
                expected: task.sha256.clone(),
                actual,
            }));
        }

        if let Err(err) = fs_err::rename(&temp, &target) {
            let _ = fs_err::remove_file(&temp);
            return Err(Attempt::Terminal(io_error(err)));
        }

        // Publishing into the cache is best-effort; a failure downgrades the
        // next run to a re-download.
        if let Some(cache) = self.cache {
            if let Err(err) = cache.put(&target, &task.filename) {
                debug!("Failed to cache {}: {err}", task.filename);
            }
        }

        debug!("Downloaded {} ({size} bytes)", task.filename);
        Ok(DownloadResult {
            name: task.name.clone(),
            version: task.version.clone(),
            path: target,
            size,
            cached: false,
        })
    }
}

/// Classification of one failed attempt.
enum Attempt {
    /// Retry with backoff: network failures and 5xx.
    Transient(Option<reqwest::Error>),
    /// Fail the batch: 4xx, integrity and filesystem errors.
    Terminal(Error),
}
