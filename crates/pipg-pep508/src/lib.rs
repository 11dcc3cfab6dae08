//! Python [dependency specifiers](https://peps.python.org/pep-0508/), better
//! known as PEP 508, in the subset the resolver needs.
//!
//! ```
//! use std::str::FromStr;
//! use pipg_pep508::Requirement;
//!
//! let requirement =
//!     Requirement::from_str(r#"importlib-metadata>=3.6.0; python_version < "3.10""#).unwrap();
//! assert_eq!(requirement.name.as_ref(), "importlib-metadata");
//! assert_eq!(requirement.specifier.as_deref(), Some(">=3.6.0"));
//! ```
//!
//! The version specifier is kept as raw text here. Specifiers coming out of
//! `requires_dist` are frequently malformed in the wild, and a requirement
//! that is never used must not fail the run, so validation happens at the
//! first use rather than at parse time.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

use pipg_normalize::{InvalidNameError, PackageName};

pub use marker::{evaluate_marker, MarkerEnvironment};

mod marker;

/// A PEP 508 dependency specifier: a normalized name, optional extras, an
/// optional version-specifier text and an optional environment-marker text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// The distribution name, such as `requests` in
    /// `requests [security] >= 2.8.1 ; python_version > "3.8"`.
    pub name: PackageName,
    /// The extras, such as `security` above. Parsed but not activated.
    pub extras: Vec<String>,
    /// The raw version-specifier text, such as `>= 2.8.1` above.
    pub specifier: Option<String>,
    /// The raw marker text, such as `python_version > "3.8"` above.
    pub marker: Option<String>,
}

impl FromStr for Requirement {
    type Err = RequirementParseError;

    /// Parse any of `name`, `name[extras]`, `name spec`, `name (spec)`,
    /// `name; marker`, and their combinations.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        // Split the marker off at the first `;`.
        let (name_spec, marker) = match input.split_once(';') {
            Some((name_spec, marker)) => (name_spec.trim(), Some(marker.trim())),
            None => (input.trim(), None),
        };

        // Strip extras: `package[extra1,extra2]`.
        let (name_spec, extras) = match name_spec.split_once('[') {
            Some((before, rest)) => match rest.split_once(']') {
                Some((extras, after)) => {
                    let extras = extras
                        .split(',')
                        .map(str::trim)
                        .filter(|extra| !extra.is_empty())
                        .map(String::from)
                        .collect();
                    (format!("{before}{after}"), extras)
                }
                None => {
                    return Err(RequirementParseError::UnclosedExtras(input.to_string()));
                }
            },
            None => (name_spec.to_string(), Vec::new()),
        };

        // Strip a parenthesized specifier: `package (>=1.0)`.
        let name_spec = name_spec.replace(['(', ')'], "");
        let name_spec = name_spec.trim();

        // Split the name from the specifier at the first operator character.
        let (name, specifier) = match name_spec.find(['<', '>', '=', '!', '~']) {
            Some(index) => {
                let (name, specifier) = name_spec.split_at(index);
                (name.trim(), Some(specifier.trim().to_string()))
            }
            None => (name_spec, None),
        };

        let name = PackageName::new(name)
            .map_err(|err| RequirementParseError::InvalidName(input.to_string(), err))?;

        Ok(Self {
            name,
            extras,
            specifier,
            marker: marker.filter(|marker| !marker.is_empty()).map(String::from),
        })
    }
}

impl Display for Requirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            write!(f, "[{}]", self.extras.join(","))?;
        }
        if let Some(specifier) = &self.specifier {
            write!(f, "{specifier}")?;
        }
        if let Some(marker) = &self.marker {
            write!(f, " ; {marker}")?;
        }
        Ok(())
    }
}

/// A requirement string the parser could not split into name and specifier.
#[derive(Debug, Clone, Error)]
pub enum RequirementParseError {
    #[error("Requirement `{0}` has an invalid package name")]
    InvalidName(String, #[source] InvalidNameError),
    #[error("Requirement `{0}` has an unclosed extras bracket")]
    UnclosedExtras(String),
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::Requirement;

    fn requirement(s: &str) -> Requirement {
        Requirement::from_str(s).unwrap()
    }

    #[test]
    fn bare_name() {
        let req = requirement("flask");
        assert_eq!(req.name.as_ref(), "flask");
        assert!(req.specifier.is_none());
        assert!(req.marker.is_none());
        assert!(req.extras.is_empty());
    }

    #[test]
    fn name_and_specifier() {
        let req = requirement("flask>=3.0,<4.0");
        assert_eq!(req.name.as_ref(), "flask");
        assert_eq!(req.specifier.as_deref(), Some(">=3.0,<4.0"));
    }

    #[test]
    fn parenthesized_specifier() {
        let req = requirement("flask (>=3.0)");
        assert_eq!(req.name.as_ref(), "flask");
        assert_eq!(req.specifier.as_deref(), Some(">=3.0"));
    }

    #[test]
    fn extras_are_stripped() {
        let req = requirement("requests[security,tests]>=2.8.1");
        assert_eq!(req.name.as_ref(), "requests");
        assert_eq!(req.extras, vec!["security", "tests"]);
        assert_eq!(req.specifier.as_deref(), Some(">=2.8.1"));
    }

    #[test]
    fn marker() {
        let req = requirement(r#"importlib-metadata>=3.6.0; python_version < "3.10""#);
        assert_eq!(req.name.as_ref(), "importlib-metadata");
        assert_eq!(req.specifier.as_deref(), Some(">=3.6.0"));
        assert_eq!(req.marker.as_deref(), Some(r#"python_version < "3.10""#));
    }

    #[test]
    fn name_is_normalized() {
        let req = requirement("Flask_Login>=0.6");
        assert_eq!(req.name.as_ref(), "flask-login");
    }

    #[test]
    fn invalid() {
        assert!(Requirement::from_str("").is_err());
        assert!(Requirement::from_str(">=1.0").is_err());
        assert!(Requirement::from_str("requests[security").is_err());
    }
}
