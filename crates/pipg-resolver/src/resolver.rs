use std::collections::VecDeque;
use std::str::FromStr;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use pipg_client::RegistryClient;
use pipg_normalize::PackageName;
use pipg_pep440::{Version, VersionSpecifiers};
use pipg_pep508::{evaluate_marker, MarkerEnvironment, Requirement};
use pipg_pypi_types::PackageInfo;

use crate::error::ResolveError;

/// A package with its pinned version and the names of its direct
/// dependencies after marker filtering.
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    pub name: PackageName,
    pub version: Version,
    pub dependencies: Vec<PackageName>,
}

/// Breadth-first dependency resolver over the package index.
pub struct Resolver<'a> {
    client: &'a RegistryClient,
    markers: &'a MarkerEnvironment,
    no_deps: bool,
}

impl<'a> Resolver<'a> {
    pub fn new(client: &'a RegistryClient, markers: &'a MarkerEnvironment) -> Self {
        Self {
            client,
            markers,
            no_deps: false,
        }
    }

    /// Resolve only the root requirements, recording (but not following)
    /// their dependencies.
    #[must_use]
    pub fn with_no_deps(self, no_deps: bool) -> Self {
        Self { no_deps, ..self }
    }

    /// Resolve a set of requirements into a pinned package set.
    ///
    /// Requirements are processed in FIFO order. Each package is fetched once;
    /// revisits only recheck the accumulated constraints against the existing
    /// pin and fail on violation.
    pub async fn resolve(
        &self,
        requirements: &[Requirement],
    ) -> Result<Vec<ResolvedPackage>, ResolveError> {
        let mut queue: VecDeque<Requirement> = requirements.iter().cloned().collect();
        let mut resolved: FxHashMap<PackageName, ResolvedPackage> = FxHashMap::default();
        // Insertion order of the final set follows resolution order.
        let mut order: Vec<PackageName> = Vec::new();
        let mut constraints: FxHashMap<PackageName, Vec<String>> = FxHashMap::default();
        let mut processing: FxHashSet<PackageName> = FxHashSet::default();

        while let Some(requirement) = queue.pop_front() {
            let name = requirement.name.clone();

            // Accumulate this edge's constraint.
            if let Some(specifier) = &requirement.specifier {
                constraints
                    .entry(name.clone())
                    .or_default()
                    .push(specifier.clone());
            }

            let specifiers = parse_constraints(&name, constraints.get(&name))?;

            // Already pinned: verify the pin still satisfies everything.
            if let Some(package) = resolved.get(&name) {
                if !specifiers.contains(&package.version) {
                    return Err(ResolveError::Conflict {
                        name,
                        version: package.version.clone(),
                        constraints: constraints.remove(&package.name).unwrap_or_default(),
                    });
                }
                continue;
            }

            // Already fetched and enqueued: nothing further to do.
            if !processing.insert(name.clone()) {
                continue;
            }

            debug!("Resolving {name}");
            let info = self.client.get_package(&name).await?;

            let candidates = available_versions(&info);
            let Some(version) = select_version(&candidates, &specifiers) else {
                return Err(ResolveError::NoCompatibleVersion {
                    name,
                    constraints: constraints.remove(&requirement.name).unwrap_or_default(),
                });
            };
            trace!("Pinned {name} {version}");

            // `requires_dist` in the package response describes the latest
            // version; re-fetch when the pin differs.
            let requires_dist = if info.info.version == version.to_string() {
                info.info.requires_dist
            } else {
                self.client
                    .get_version(&name, &version.to_string())
                    .await?
                    .info
                    .requires_dist
            };

            let mut dependencies = Vec::new();
            for dep in &requires_dist {
                let Ok(dep) = Requirement::from_str(dep) else {
                    // Unparseable metadata lines are dropped, like pip does.
                    debug!("Skipping unparseable dependency of {name}: {dep}");
                    continue;
                };
                if let Some(marker) = &dep.marker {
                    if !evaluate_marker(marker, self.markers) {
                        trace!("Skipping {} (marker not satisfied)", dep.name);
                        continue;
                    }
                }
                dependencies.push(dep.name.clone());
                if !self.no_deps {
                    queue.push_back(dep);
                }
            }

            order.push(name.clone());
            resolved.insert(
                name.clone(),
                ResolvedPackage {
                    name,
                    version,
                    dependencies,
                },
            );
        }

        Ok(order
            .into_iter()
            .map(|name| resolved.remove(&name).expect("resolved set covers order"))
            .collect())
    }
}

/// Parse the accumulated specifier strings for a package into one
/// conjunction. Parsing happens here, at first use, so an unused malformed
/// requirement never fails the run.
fn parse_constraints(
    name: &PackageName,
    constraints: Option<&Vec<String>>,
) -> Result<VersionSpecifiers, ResolveError> {
    let mut specifiers = Vec::new();
    for constraint in constraints.into_iter().flatten() {
        let parsed =
            VersionSpecifiers::from_str(constraint).map_err(|err| ResolveError::Specifier {
                name: name.clone(),
                source: err,
            })?;
        specifiers.extend(parsed.iter().cloned());
    }
    Ok(specifiers.into_iter().collect())
}

/// The candidate versions of a package: every release with at least one
/// non-yanked file, or the single latest version when the releases map is
/// absent (the pinned-version endpoint).
fn available_versions(info: &PackageInfo) -> Vec<Version> {
    if !info.releases.is_empty() {
        let mut versions: Vec<Version> = info
            .releases
            .iter()
            .filter(|(_, files)| files.iter().any(|file| !file.yanked))
            .filter_map(|(version, _)| Version::from_str(version).ok())
            .collect();
        versions.sort();
        return versions;
    }

    Version::from_str(&info.info.version)
        .ok()
        .into_iter()
        .collect()
}

/// The highest candidate satisfying the specifiers. Pre-releases are skipped
/// unless the specifiers ask for one, with a fallback pass when no stable
/// candidate matches.
fn select_version(candidates: &[Version], specifiers: &VersionSpecifiers) -> Option<Version> {
    let allow_prereleases = specifiers.allows_prereleases();

    let stable = candidates
        .iter()
        .rev()
        .filter(|version| allow_prereleases || !version.is_prerelease())
        .find(|version| specifiers.contains(version));

    match stable {
        Some(version) => Some(version.clone()),
        None if !allow_prereleases => candidates
            .iter()
            .rev()
            .find(|version| specifiers.contains(version))
            .cloned(),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use pipg_pep440::{Version, VersionSpecifiers};

    use super::select_version;

    fn versions(raw: &[&str]) -> Vec<Version> {
        let mut versions: Vec<Version> = raw
            .iter()
            .map(|version| Version::from_str(version).unwrap())
            .collect();
        versions.sort();
        versions
    }

    #[test]
    fn picks_highest_matching() {
        let candidates = versions(&["1.15.0", "1.16.0", "1.17.0"]);
        let none = VersionSpecifiers::default();
        assert_eq!(
            select_version(&candidates, &none).unwrap().to_string(),
            "1.17.0"
        );

        let bounded = VersionSpecifiers::from_str("<1.17").unwrap();
        assert_eq!(
            select_version(&candidates, &bounded).unwrap().to_string(),
            "1.16.0"
        );
    }

    #[test]
    fn skips_prereleases_by_default() {
        let candidates = versions(&["1.0.0", "2.0.0rc1"]);
        let none = VersionSpecifiers::default();
        assert_eq!(
            select_version(&candidates, &none).unwrap().to_string(),
            "1.0.0"
        );
    }

    #[test]
    fn explicit_prerelease_pin_opts_in() {
        let candidates = versions(&["1.0.0", "2.0.0rc1"]);
        let pinned = VersionSpecifiers::from_str(">=2.0.0rc1").unwrap();
        assert_eq!(
            select_version(&candidates, &pinned).unwrap().to_string(),
            "2.0.0rc1"
        );
    }

    #[test]
    fn falls_back_to_prerelease_when_nothing_stable_matches() {
        let candidates = versions(&["1.0.0", "2.0.0b1"]);
        let needs_two = VersionSpecifiers::from_str(">=2.0.0b1,<3").unwrap();
        assert_eq!(
            select_version(&candidates, &needs_two).unwrap().to_string(),
            "2.0.0b1"
        );

        // Fallback triggers even without an explicit pre-release pin.
        let only_prereleases = versions(&["1.0.0a1", "1.0.0a2"]);
        let any = VersionSpecifiers::default();
        assert_eq!(
            select_version(&only_prereleases, &any).unwrap().to_string(),
            "1.0.0a2"
        );
    }

    #[test]
    fn no_candidate() {
        let candidates = versions(&["1.0.0"]);
        let impossible = VersionSpecifiers::from_str(">=2.0").unwrap();
        assert!(select_version(&candidates, &impossible).is_none());
    }
}
