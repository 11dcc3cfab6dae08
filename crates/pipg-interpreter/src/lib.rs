//! Detect the target Python environment by querying the interpreter itself.
//!
//! The probe runs `{python} -c <script>`, where the embedded script prints a
//! single JSON object with the prefix, site-packages path, platform tag,
//! version strings and marker variables. Everything downstream (marker
//! evaluation, tag construction, install layout) derives from that one
//! answer.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use pipg_pep508::MarkerEnvironment;

/// The probed interpreter environment.
#[derive(Debug, Clone, Deserialize)]
pub struct PythonEnvironment {
    /// `sys.prefix`.
    pub prefix: PathBuf,
    /// The site-packages directory installs go into.
    pub site_packages: PathBuf,
    /// `sysconfig.get_platform()`, hyphenated: e.g. `macosx-14.0-arm64`.
    pub platform: String,
    /// The compact interpreter version, e.g. `312`.
    pub python_compact: String,
    /// The dotted `major.minor` version, e.g. `3.12`.
    pub python_version: String,
    /// The full version, e.g. `3.12.1`.
    pub python_full_version: String,
    /// `sys.executable`.
    pub executable: PathBuf,
    /// `sys.platform`, e.g. `linux` or `darwin`.
    pub sys_platform: String,
    /// `os.name`, e.g. `posix`.
    pub os_name: String,
    /// `platform.machine()`, e.g. `x86_64`.
    pub platform_machine: String,
    /// `sys.implementation.name`, e.g. `cpython`.
    pub implementation_name: String,
}

impl PythonEnvironment {
    /// Probe the environment of the given Python binary.
    pub fn query(python: impl AsRef<Path>) -> Result<Self, Error> {
        let python = python.as_ref();
        let output = Command::new(python)
            .args(["-c", include_str!("get_interpreter_info.py")])
            .output()
            .map_err(|err| Error::Launch {
                python: python.to_path_buf(),
                source: err,
            })?;

        if !output.status.success() {
            return Err(Error::Query {
                python: python.to_path_buf(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let environment = Self::parse_probe_output(&output.stdout).map_err(|err| Error::Parse {
            python: python.to_path_buf(),
            source: err,
        })?;
        debug!(
            "Detected Python {} at {}",
            environment.python_full_version,
            environment.executable.display()
        );
        Ok(environment)
    }

    fn parse_probe_output(stdout: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(stdout)
    }

    /// Redirect installs into an explicit target directory.
    #[must_use]
    pub fn with_target(self, target: PathBuf) -> Self {
        Self {
            site_packages: target,
            ..self
        }
    }

    /// The platform in wheel-tag form: `macosx-14.0-arm64` becomes
    /// `macosx_14_0_arm64`.
    pub fn wheel_platform(&self) -> String {
        self.platform.replace(['-', '.'], "_")
    }

    /// The environment-marker values of this interpreter.
    pub fn markers(&self) -> MarkerEnvironment {
        MarkerEnvironment {
            python_version: self.python_version.clone(),
            python_full_version: self.python_full_version.clone(),
            sys_platform: self.sys_platform.clone(),
            os_name: self.os_name.clone(),
            platform_machine: self.platform_machine.clone(),
            implementation_name: self.implementation_name.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to launch `{}`", .python.display())]
    Launch {
        python: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Querying `{}` failed: {stderr}", .python.display())]
    Query { python: PathBuf, stderr: String },
    #[error("Unexpected probe output from `{}`", .python.display())]
    Parse {
        python: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
