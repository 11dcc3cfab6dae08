use thiserror::Error;

/// A set of compatible tags for a given Python version and platform, in
/// (`python_tag`, `abi_tag`, `platform_tag`) format, ordered most-preferred
/// first.
#[derive(Debug, Clone)]
pub struct Tags(Vec<(String, String, String)>);

impl Tags {
    /// Build the priority list for an environment, from the wheel-format
    /// platform tag (e.g. `manylinux_2_35_x86_64`, `macosx_14_0_arm64`) and
    /// the compact interpreter version (e.g. `312`).
    ///
    /// The tiers, in order: native C API, stable ABI, CPython without ABI,
    /// generic interpreter, and the platform-independent fallbacks.
    pub fn from_env(platform_tag: &str, python_version: &str) -> Result<Self, PlatformError> {
        if python_version.len() < 2 || !python_version.chars().all(|c| c.is_ascii_digit()) {
            return Err(PlatformError::InvalidPythonVersion(
                python_version.to_string(),
            ));
        }
        let cpython = format!("cp{python_version}");
        let generic = format!("py{}", &python_version[..1]);

        let platforms = expand_platform(platform_tag);
        let mut tags = Vec::with_capacity(4 * platforms.len() + 2);

        // 1. This exact C API version.
        for platform in &platforms {
            tags.push((cpython.clone(), cpython.clone(), platform.clone()));
        }
        // 2. The stable ABI.
        for platform in &platforms {
            tags.push((cpython.clone(), "abi3".to_string(), platform.clone()));
        }
        // 3. CPython without an ABI.
        for platform in &platforms {
            tags.push((cpython.clone(), "none".to_string(), platform.clone()));
        }
        // 4. Pure Python, platform-specific.
        for platform in &platforms {
            tags.push((generic.clone(), "none".to_string(), platform.clone()));
        }
        // 5. Universal.
        tags.push((cpython, "none".to_string(), "any".to_string()));
        tags.push((generic, "none".to_string(), "any".to_string()));

        Ok(Self(tags))
    }

    /// Iterate over the tags, most-preferred first.
    pub fn iter(&self) -> impl Iterator<Item = &(String, String, String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The priority index of the best entry matching a wheel's compound tag
    /// sets, if any. Lower is better.
    pub fn best_match_index(
        &self,
        python_tags: &[String],
        abi_tags: &[String],
        platform_tags: &[String],
    ) -> Option<usize> {
        self.0.iter().position(|(python, abi, platform)| {
            python_tags.iter().any(|tag| tag == python)
                && abi_tags.iter().any(|tag| tag == abi)
                && platform_tags.iter().any(|tag| tag == platform)
        })
    }
}

/// Expand a platform tag into a priority-ordered list of acceptable platform
/// tags.
///
/// On Linux the manylinux variants are appended in descending glibc order; on
/// macOS, `universal2` siblings and older SDK versions down to the
/// architecture minimum (10.9 for x86_64, 11.0 for arm64).
fn expand_platform(platform_tag: &str) -> Vec<String> {
    let mut platforms = vec![platform_tag.to_string()];

    if let Some(arch) = platform_tag.strip_prefix("linux_") {
        for manylinux in [
            "manylinux_2_35",
            "manylinux_2_34",
            "manylinux_2_31",
            "manylinux_2_28",
            "manylinux_2_17",
            "manylinux2014",
        ] {
            platforms.push(format!("{manylinux}_{arch}"));
        }
    }

    if platform_tag.starts_with("macosx_") {
        // macosx_{major}_{minor}_{arch}
        let fields = platform_tag.splitn(4, '_').collect::<Vec<&str>>();
        if let [_, major, minor, arch] = fields.as_slice() {
            if let Ok(major) = major.parse::<u16>() {
                platforms.push(format!("macosx_{major}_{minor}_universal2"));

                // Prior to Mac OS 11 the yearly releases bumped the minor
                // version with the major pinned at 10; the x86_64 floor is
                // 10.9, the arm64 floor is 11.0.
                let min_major = if *arch == "arm64" { 11 } else { 10 };
                for version in (min_major..major).rev() {
                    let minor = if version == 10 { "9" } else { "0" };
                    platforms.push(format!("macosx_{version}_{minor}_{arch}"));
                    platforms.push(format!("macosx_{version}_{minor}_universal2"));
                }
            }
        }
    }

    platforms
}

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Invalid python version `{0}`, expected a compact form like `312`")]
    InvalidPythonVersion(String),
}
