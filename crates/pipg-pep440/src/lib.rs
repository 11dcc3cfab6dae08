//! Python version numbers and specifiers, implementing
//! [PEP 440](https://peps.python.org/pep-0440).
//!
//! ```rust
//! use std::str::FromStr;
//! use pipg_pep440::{Version, VersionSpecifier, VersionSpecifiers};
//!
//! let version = Version::from_str("1.19").unwrap();
//! let specifier = VersionSpecifier::from_str(">=1.16").unwrap();
//! assert!(specifier.contains(&version));
//! let specifiers = VersionSpecifiers::from_str(">=1.16, <2.0").unwrap();
//! assert!(specifiers.contains(&version));
//! ```
//!
//! PEP 440 has a number of unintuitive features that this implementation has to
//! deal with:
//!
//! * an epoch prefix (`1!1.2.3`) that dominates every other segment
//! * post releases and dev releases on top of the pre-release markers, each with
//!   its own position in the ordering
//! * pre-releases being implicitly excluded from specifier matching unless
//!   explicitly requested or nothing else matches (handled by callers through
//!   [`Version::is_prerelease`])
//! * a pseudo-semver tilde (`~=`) instead of a caret, and `==1.2.*` prefix
//!   matching

pub use version::{LocalSegment, PreRelease, Version, VersionParseError};
pub use version_specifier::{
    Operator, VersionSpecifier, VersionSpecifierParseError, VersionSpecifiers,
};

mod version;
mod version_specifier;
