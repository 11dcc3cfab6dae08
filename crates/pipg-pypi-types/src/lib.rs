//! Serde models for the PyPI JSON API.
//!
//! Endpoints: `GET {base}/{name}/json` and `GET {base}/{name}/{version}/json`.
//! The payloads are deliberately lenient: real index responses omit fields
//! and carry `null` where the documentation promises arrays, so almost
//! everything defaults.

use std::collections::BTreeMap;

use serde::Deserialize;

/// The top-level response for a package (or a pinned package version).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageInfo {
    /// Metadata at the latest (or requested) version.
    #[serde(default)]
    pub info: Metadata,
    /// The downloadable files at the returned version.
    #[serde(default)]
    pub urls: Vec<File>,
    /// All releases, keyed by version string. Only populated on the
    /// package-level endpoint, absent on the per-version endpoint.
    #[serde(default)]
    pub releases: BTreeMap<String, Vec<File>>,
}

/// The `info` block of a package response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub summary: Option<String>,
    /// The raw PEP 508 dependency strings. `null` in the wild for packages
    /// without dependencies.
    #[serde(default, deserialize_with = "deserialize_null_as_default")]
    pub requires_dist: Vec<String>,
    #[serde(default)]
    pub requires_python: Option<String>,
    #[serde(default)]
    pub yanked: bool,
}

/// A single downloadable release file (wheel or sdist).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct File {
    pub filename: String,
    pub url: String,
    #[serde(default)]
    pub size: u64,
    /// `bdist_wheel`, `sdist`, or something more exotic.
    #[serde(default)]
    pub packagetype: String,
    #[serde(default)]
    pub digests: Digests,
    #[serde(default)]
    pub yanked: bool,
}

impl File {
    /// Whether this file is a binary wheel.
    pub fn is_wheel(&self) -> bool {
        self.packagetype == "bdist_wheel"
    }
}

/// Hash digests attached to a release file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Digests {
    #[serde(default)]
    pub sha256: String,
}

fn deserialize_null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    let option = Option::<T>::deserialize(deserializer)?;
    Ok(option.unwrap_or_default())
}
