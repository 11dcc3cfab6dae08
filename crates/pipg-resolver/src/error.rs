use thiserror::Error;

use pipg_normalize::PackageName;
use pipg_pep440::{Version, VersionSpecifierParseError};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Client(#[from] pipg_client::Error),

    #[error("Failed to parse specifier for `{name}`")]
    Specifier {
        name: PackageName,
        #[source]
        source: VersionSpecifierParseError,
    },

    #[error("No compatible version found for `{name}` matching {constraints:?}")]
    NoCompatibleVersion {
        name: PackageName,
        constraints: Vec<String>,
    },

    /// A later-arriving constraint invalidated an earlier pin. This resolver
    /// does not backtrack; the conflict is fatal.
    #[error(
        "Version conflict for `{name}`: pinned {version}, which does not satisfy {constraints:?}"
    )]
    Conflict {
        name: PackageName,
        version: Version,
        constraints: Vec<String>,
    },
}
