use std::borrow::Cow;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// The normalized name of a package.
///
/// Converts the name to lowercase and collapses any run of the characters `-`, `_` and `.`
/// down to a single `-`, e.g., `---`, `.`, and `__` all get converted to just `-`.
///
/// See: <https://packaging.python.org/en/latest/specifications/name-normalization/>
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PackageName(String);

impl PackageName {
    /// Create a validated, normalized package name.
    pub fn new(name: &str) -> Result<Self, InvalidNameError> {
        if name.is_empty() {
            return Err(InvalidNameError::Empty);
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(InvalidNameError::InvalidCharacters(name.to_string()));
        }

        let mut normalized = String::with_capacity(name.len());
        let mut last_was_separator = false;
        for char in name.chars() {
            match char {
                '-' | '_' | '.' => {
                    if !last_was_separator {
                        normalized.push('-');
                        last_was_separator = true;
                    }
                }
                _ => {
                    normalized.push(char.to_ascii_lowercase());
                    last_was_separator = false;
                }
            }
        }

        Ok(Self(normalized))
    }

    /// Escape this name with underscores (`_`) instead of dashes (`-`), as used in wheel
    /// filenames and `.dist-info` directory names.
    ///
    /// See: <https://packaging.python.org/en/latest/specifications/recording-installed-packages/>
    pub fn as_dist_info_name(&self) -> Cow<'_, str> {
        if self.0.contains('-') {
            Cow::Owned(self.0.replace('-', "_"))
        } else {
            Cow::Borrowed(self.0.as_str())
        }
    }
}

impl FromStr for PackageName {
    type Err = InvalidNameError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::new(name)
    }
}

impl<'de> Deserialize<'de> for PackageName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for PackageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Error)]
pub enum InvalidNameError {
    #[error("Package name must not be empty")]
    Empty,
    #[error(
        "Package name `{0}` contains characters outside ASCII letters, digits, `-`, `_` and `.`"
    )]
    InvalidCharacters(String),
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::PackageName;

    #[test]
    fn normalize() {
        for (input, expected) in [
            ("friendly-bard", "friendly-bard"),
            ("Friendly-Bard", "friendly-bard"),
            ("FRIENDLY-BARD", "friendly-bard"),
            ("friendly.bard", "friendly-bard"),
            ("friendly_bard", "friendly-bard"),
            ("friendly--bard", "friendly-bard"),
            ("FrIeNdLy-._.-bArD", "friendly-bard"),
        ] {
            assert_eq!(PackageName::from_str(input).unwrap().as_ref(), expected);
        }
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = PackageName::from_str("FrIeNdLy-._.-bArD").unwrap();
        let twice = PackageName::from_str(once.as_ref()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn dist_info_name() {
        let name = PackageName::from_str("importlib-metadata").unwrap();
        assert_eq!(name.as_dist_info_name(), "importlib_metadata");
    }

    #[test]
    fn reject_invalid() {
        assert!(PackageName::from_str("").is_err());
        assert!(PackageName::from_str("f!oo").is_err());
        assert!(PackageName::from_str("name with spaces").is_err());
    }
}
