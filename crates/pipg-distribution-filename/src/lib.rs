use std::fmt::{Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

use pipg_normalize::{InvalidNameError, PackageName};
use pipg_pep440::{Version, VersionParseError};

/// A parsed wheel filename:
/// `{distribution}-{version}(-{buildtag})?-{interpreter}-{abi}-{platform}.whl`.
///
/// Each tag component may be compound (dot-separated), meaning the wheel
/// supports the union of the listed values, e.g. `py2.py3-none-any`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WheelFilename {
    pub distribution: PackageName,
    pub version: Version,
    pub python_tag: Vec<String>,
    pub abi_tag: Vec<String>,
    pub platform_tag: Vec<String>,
}

impl FromStr for WheelFilename {
    type Err = WheelFilenameError;

    fn from_str(filename: &str) -> Result<Self, Self::Err> {
        let basename = filename.strip_suffix(".whl").ok_or_else(|| {
            WheelFilenameError::InvalidWheelFileName(
                filename.to_string(),
                "Must end with .whl".to_string(),
            )
        })?;

        // The filename has either five or six hyphenated fields. If six, the
        // third is the build tag, which only breaks ties between otherwise
        // identical wheels and is dropped here. The tag triple is always the
        // last three fields.
        // https://www.python.org/dev/peps/pep-0427/#file-name-convention
        let fields = basename.split('-').collect::<Vec<&str>>();
        let (distribution, version, python_tag, abi_tag, platform_tag) = match fields.as_slice() {
            [distribution, version, python_tag, abi_tag, platform_tag] => {
                (distribution, version, python_tag, abi_tag, platform_tag)
            }
            [distribution, version, _build_tag, python_tag, abi_tag, platform_tag] => {
                (distribution, version, python_tag, abi_tag, platform_tag)
            }
            [_, _, _, _, _, _, _, ..] => {
                return Err(WheelFilenameError::InvalidWheelFileName(
                    filename.to_string(),
                    "Must have 5 or 6 components, but has more".to_string(),
                ));
            }
            _ => {
                return Err(WheelFilenameError::InvalidWheelFileName(
                    filename.to_string(),
                    format!("Expected 5 or 6 components, found {}", fields.len()),
                ));
            }
        };

        let distribution = PackageName::new(distribution)
            .map_err(|err| WheelFilenameError::InvalidPackageName(filename.to_string(), err))?;
        let version = Version::from_str(version)
            .map_err(|err| WheelFilenameError::InvalidVersion(filename.to_string(), err))?;

        Ok(WheelFilename {
            distribution,
            version,
            python_tag: python_tag.split('.').map(String::from).collect(),
            abi_tag: abi_tag.split('.').map(String::from).collect(),
            platform_tag: platform_tag.split('.').map(String::from).collect(),
        })
    }
}

impl Display for WheelFilename {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}-{}.whl",
            self.distribution.as_dist_info_name(),
            self.version,
            self.tag()
        )
    }
}

impl WheelFilename {
    /// The `{interpreter}-{abi}-{platform}` tag of this wheel.
    pub fn tag(&self) -> String {
        format!(
            "{}-{}-{}",
            self.python_tag.join("."),
            self.abi_tag.join("."),
            self.platform_tag.join(".")
        )
    }

    /// The name of the `.dist-info` directory this wheel installs.
    pub fn dist_info_dir(&self) -> String {
        format!(
            "{}-{}.dist-info",
            self.distribution.as_dist_info_name(),
            self.version
        )
    }
}

#[derive(Error, Debug)]
pub enum WheelFilenameError {
    #[error("The wheel filename \"{0}\" is invalid: {1}")]
    InvalidWheelFileName(String, String),
    #[error("The wheel filename \"{0}\" has an invalid version part: {1}")]
    InvalidVersion(String, VersionParseError),
    #[error("The wheel filename \"{0}\" has an invalid package name")]
    InvalidPackageName(String, #[source] InvalidNameError),
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::WheelFilename;

    #[test]
    fn err_not_whl_extension() {
        let err = WheelFilename::from_str("foo.rs").unwrap_err();
        insta::assert_snapshot!(err, @r###"The wheel filename "foo.rs" is invalid: Must end with .whl"###);
    }

    #[test]
    fn err_too_few_parts() {
        let err = WheelFilename::from_str("foo-1.2.3-py3.whl").unwrap_err();
        insta::assert_snapshot!(err, @r###"The wheel filename "foo-1.2.3-py3.whl" is invalid: Expected 5 or 6 components, found 3"###);
    }

    #[test]
    fn err_too_many_parts() {
        let err =
            WheelFilename::from_str("foo-1.2.3-build-python-abi-platform-oops.whl").unwrap_err();
        insta::assert_snapshot!(err, @r###"The wheel filename "foo-1.2.3-build-python-abi-platform-oops.whl" is invalid: Must have 5 or 6 components, but has more"###);
    }

    #[test]
    fn err_invalid_version() {
        let err = WheelFilename::from_str("foo-x.y.z-py3-none-any.whl").unwrap_err();
        insta::assert_snapshot!(err, @r###"The wheel filename "foo-x.y.z-py3-none-any.whl" has an invalid version part: Version `x.y.z` doesn't match PEP 440 rules: expected a number"###);
    }

    #[test]
    fn simple_tags() {
        let wheel = WheelFilename::from_str("six-1.17.0-py2.py3-none-any.whl").unwrap();
        assert_eq!(wheel.distribution.as_ref(), "six");
        assert_eq!(wheel.version.to_string(), "1.17.0");
        assert_eq!(wheel.python_tag, vec!["py2", "py3"]);
        assert_eq!(wheel.abi_tag, vec!["none"]);
        assert_eq!(wheel.platform_tag, vec!["any"]);
    }

    #[test]
    fn build_tag_is_dropped() {
        let wheel =
            WheelFilename::from_str("mypkg-1.0-2-cp312-cp312-manylinux_2_17_x86_64.whl").unwrap();
        assert_eq!(wheel.python_tag, vec!["cp312"]);
        assert_eq!(wheel.abi_tag, vec!["cp312"]);
        assert_eq!(wheel.platform_tag, vec!["manylinux_2_17_x86_64"]);
    }

    #[test]
    fn display_round_trip() {
        for filename in [
            "six-1.17.0-py2.py3-none-any.whl",
            "cryptography-41.0.0-cp37-abi3-macosx_10_12_universal2.whl",
        ] {
            let wheel = WheelFilename::from_str(filename).unwrap();
            assert_eq!(wheel.to_string(), filename);
        }
    }

    #[test]
    fn dist_info_dir() {
        let wheel = WheelFilename::from_str("flask_login-0.6.3-py3-none-any.whl").unwrap();
        assert_eq!(wheel.dist_info_dir(), "flask_login-0.6.3.dist-info");
    }
}
