use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

use crate::version::{Version, VersionParseError};

/// One of `~=` `==` `!=` `<=` `>=` `<` `>` `===`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `== 1.2.3`
    Equal,
    /// `== 1.2.*`
    EqualStar,
    /// `===` (discouraged)
    ///
    /// <https://peps.python.org/pep-0440/#arbitrary-equality>
    ExactEqual,
    /// `!= 1.2.3`
    NotEqual,
    /// `!= 1.2.*`
    NotEqualStar,
    /// `~=`
    TildeEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanEqual,
}

impl Display for Operator {
    /// Note that `EqualStar` and `NotEqualStar` print without the star; the
    /// star lives in the version pattern.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let operator = match self {
            Self::Equal | Self::EqualStar => "==",
            Self::ExactEqual => "===",
            Self::NotEqual | Self::NotEqualStar => "!=",
            Self::TildeEqual => "~=",
            Self::LessThan => "<",
            Self::LessThanEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanEqual => ">=",
        };
        f.write_str(operator)
    }
}

/// A single comparison such as `>=1.16` or `==2.8.*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSpecifier {
    /// The comparison operator.
    pub operator: Operator,
    /// The operand version. For star operators, the release holds the prefix
    /// to match.
    pub version: Version,
}

impl VersionSpecifier {
    /// Whether the given version satisfies this comparison.
    pub fn contains(&self, version: &Version) -> bool {
        match self.operator {
            Operator::Equal => {
                // `==1.0` matches `1.0+anything`, but `==1.0+cpu` is exact.
                if self.version.is_local() {
                    version.cmp(&self.version) == Ordering::Equal
                } else {
                    version.without_local().cmp(&self.version) == Ordering::Equal
                }
            }
            Operator::NotEqual => !Self {
                operator: Operator::Equal,
                version: self.version.clone(),
            }
            .contains(version),
            Operator::ExactEqual => version.cmp(&self.version) == Ordering::Equal,
            Operator::EqualStar => {
                version.epoch == self.version.epoch
                    && self
                        .version
                        .release
                        .iter()
                        .enumerate()
                        .all(|(i, expected)| version.release.get(i).copied().unwrap_or(0) == *expected)
            }
            Operator::NotEqualStar => !Self {
                operator: Operator::EqualStar,
                version: self.version.clone(),
            }
            .contains(version),
            Operator::TildeEqual => {
                // `~=X.Y.Z` means `>=X.Y.Z, <X.(Y+1)`: bump the second-to-last
                // release segment and compare against that exclusive bound.
                let mut upper = self.version.release.clone();
                upper.pop();
                if let Some(last) = upper.last_mut() {
                    *last += 1;
                }
                version >= &self.version && version < &Version::from_release(upper)
            }
            Operator::LessThan => version < &self.version,
            Operator::LessThanEqual => version <= &self.version,
            Operator::GreaterThan => version > &self.version,
            Operator::GreaterThanEqual => version >= &self.version,
        }
    }
}

impl FromStr for VersionSpecifier {
    type Err = VersionSpecifierParseError;

    /// Parse a specifier such as `>=1.16`, `== 2.8.*` or `~=3.0`.
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let spec = spec.trim();

        // Longest operators first so `==` doesn't shadow `===`.
        let (operator_str, rest) = ["===", "==", "!=", "<=", ">=", "~=", "<", ">"]
            .iter()
            .find_map(|op| spec.strip_prefix(op).map(|rest| (*op, rest)))
            .ok_or_else(|| VersionSpecifierParseError::MissingOperator(spec.to_string()))?;

        let rest = rest.trim();

        let (operator, version_str) = match (operator_str, rest.strip_suffix(".*")) {
            ("==", Some(prefix)) => (Operator::EqualStar, prefix),
            ("!=", Some(prefix)) => (Operator::NotEqualStar, prefix),
            (_, Some(_)) => {
                return Err(VersionSpecifierParseError::InvalidStar(spec.to_string()));
            }
            ("==", None) => (Operator::Equal, rest),
            ("===", None) => (Operator::ExactEqual, rest),
            ("!=", None) => (Operator::NotEqual, rest),
            ("~=", None) => (Operator::TildeEqual, rest),
            ("<", None) => (Operator::LessThan, rest),
            ("<=", None) => (Operator::LessThanEqual, rest),
            (">", None) => (Operator::GreaterThan, rest),
            (">=", None) => (Operator::GreaterThanEqual, rest),
            _ => unreachable!("operator list is exhaustive"),
        };

        let version = Version::from_str(version_str)?;

        if operator == Operator::TildeEqual && version.release.len() < 2 {
            return Err(VersionSpecifierParseError::TildeWithoutMinor(
                spec.to_string(),
            ));
        }

        Ok(Self { operator, version })
    }
}

impl Display for VersionSpecifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.operator, self.version)?;
        if matches!(self.operator, Operator::EqualStar | Operator::NotEqualStar) {
            f.write_str(".*")?;
        }
        Ok(())
    }
}

/// A malformed version specifier such as `=>1.0` or `~=1`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VersionSpecifierParseError {
    #[error("Specifier `{0}` has no comparison operator, must start with one of ~= == != <= >= < > ===")]
    MissingOperator(String),
    #[error("Star versions are only allowed with `==` and `!=`: `{0}`")]
    InvalidStar(String),
    #[error("The `~=` operator requires at least two release segments: `{0}`")]
    TildeWithoutMinor(String),
    #[error(transparent)]
    Version(#[from] VersionParseError),
}

/// An AND-conjunction of [`VersionSpecifier`]s, such as `>=1.16, <2.0`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionSpecifiers(Vec<VersionSpecifier>);

impl VersionSpecifiers {
    /// Whether the given version satisfies every specifier in the set.
    pub fn contains(&self, version: &Version) -> bool {
        self.0.iter().all(|specifier| specifier.contains(version))
    }

    /// Whether any specifier in the set names a pre-release operand. Used by
    /// candidate selection: an explicit pre-release pin opts the set into
    /// pre-release candidates.
    pub fn allows_prereleases(&self) -> bool {
        self.0.iter().any(|specifier| specifier.version.is_prerelease())
    }

    /// Iterate over the individual specifiers.
    pub fn iter(&self) -> impl Iterator<Item = &VersionSpecifier> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for VersionSpecifiers {
    type Err = VersionSpecifierParseError;

    /// Parse a comma-separated conjunction such as `>=1.16, <2.0`.
    fn from_str(specifiers: &str) -> Result<Self, Self::Err> {
        specifiers
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(VersionSpecifier::from_str)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl Display for VersionSpecifiers {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let specifiers = self
            .0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<String>>()
            .join(", ");
        f.write_str(&specifiers)
    }
}

impl FromIterator<VersionSpecifier> for VersionSpecifiers {
    fn from_iter<I: IntoIterator<Item = VersionSpecifier>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use crate::{Operator, Version, VersionSpecifier, VersionSpecifiers};

    fn version(s: &str) -> Version {
        Version::from_str(s).unwrap()
    }

    fn specifier(s: &str) -> VersionSpecifier {
        VersionSpecifier::from_str(s).unwrap()
    }

    #[test]
    fn parse_operators() {
        assert_eq!(specifier("==1.0").operator, Operator::Equal);
        assert_eq!(specifier("== 1.0.*").operator, Operator::EqualStar);
        assert_eq!(specifier("===1.0").operator, Operator::ExactEqual);
        assert_eq!(specifier("!=1.0").operator, Operator::NotEqual);
        assert_eq!(specifier("~=1.0").operator, Operator::TildeEqual);
        assert_eq!(specifier("<=1.0").operator, Operator::LessThanEqual);
        assert_eq!(specifier(">1.0").operator, Operator::GreaterThan);
    }

    #[test]
    fn parse_errors() {
        assert!(VersionSpecifier::from_str("1.0").is_err());
        assert!(VersionSpecifier::from_str("=>1.0").is_err());
        assert!(VersionSpecifier::from_str(">=1.0.*").is_err());
        assert!(VersionSpecifier::from_str("~=1").is_err());
    }

    #[test]
    fn comparisons() {
        assert!(specifier(">=1.16").contains(&version("1.19")));
        assert!(!specifier(">=1.16").contains(&version("1.15")));
        assert!(specifier("<2.0").contains(&version("1.19")));
        assert!(specifier("!=1.19").contains(&version("1.18")));
        assert!(!specifier("!=1.19").contains(&version("1.19")));
    }

    #[test]
    fn equal_ignores_local() {
        assert!(specifier("==1.0").contains(&version("1.0+cpu")));
        assert!(specifier("===1.0").contains(&version("1.0")));
        assert!(!specifier("===1.0").contains(&version("1.0+cpu")));
    }

    #[test]
    fn star_prefix() {
        let star = specifier("==2.8.*");
        assert!(star.contains(&version("2.8")));
        assert!(star.contains(&version("2.8.1")));
        assert!(star.contains(&version("2.8.9.post1")));
        assert!(!star.contains(&version("2.9")));
        assert!(!star.contains(&version("3.8")));

        let not_star = specifier("!=2.8.*");
        assert!(!not_star.contains(&version("2.8.1")));
        assert!(not_star.contains(&version("2.9")));
    }

    #[test]
    fn tilde_equal() {
        // `~=3.0.4` means `>=3.0.4, <3.1`.
        let patch = specifier("~=3.0.4");
        assert!(patch.contains(&version("3.0.4")));
        assert!(patch.contains(&version("3.0.99")));
        assert!(!patch.contains(&version("3.1")));
        assert!(!patch.contains(&version("3.0.3")));

        // `~=3.0` means `>=3.0, <4`.
        let minor = specifier("~=3.0");
        assert!(minor.contains(&version("3.9")));
        assert!(!minor.contains(&version("4.0")));
        assert!(!minor.contains(&version("2.9")));
    }

    #[test]
    fn specifier_set() {
        let set = VersionSpecifiers::from_str(">=1.16, <2.0").unwrap();
        assert!(set.contains(&version("1.19")));
        assert!(!set.contains(&version("2.0")));
        assert!(!set.contains(&version("1.15")));
    }

    #[test]
    fn specifier_set_prerelease_opt_in() {
        assert!(VersionSpecifiers::from_str(">=2.0.0rc1")
            .unwrap()
            .allows_prereleases());
        assert!(!VersionSpecifiers::from_str(">=2.0.0")
            .unwrap()
            .allows_prereleases());
    }

    #[test]
    fn display_round_trip() {
        for s in ["==1.0", "==2.8.*", ">=1.16", "~=3.0.4", "!=2.8.*"] {
            assert_eq!(specifier(s).to_string(), s);
        }
        assert_eq!(
            VersionSpecifiers::from_str(">=1.16,<2.0").unwrap().to_string(),
            ">=1.16, <2.0"
        );
    }
}
