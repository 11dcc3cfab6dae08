//! Takes a wheel and installs it into a Python environment.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use zip::result::ZipError;

pub use record::RecordEntry;
pub use script::Script;
pub use wheel::{install_wheel, InstalledWheel};

mod record;
mod script;
mod wheel;

/// The identity written into each `.dist-info/INSTALLER`.
pub const INSTALLER_NAME: &str = "pipg";

/// The layout of the target environment into which a wheel is installed.
#[derive(Debug, Clone)]
pub struct Layout {
    /// The Python interpreter, as returned by `sys.executable`.
    pub sys_executable: PathBuf,
    /// The root prefix; scripts land in `<prefix>/bin`, headers in
    /// `<prefix>/include`, data files directly below it.
    pub prefix: PathBuf,
    /// The site-packages directory.
    pub site_packages: PathBuf,
}

impl Layout {
    /// The directory console-script launchers are written to.
    pub fn scripts_dir(&self) -> PathBuf {
        self.prefix.join("bin")
    }

    /// The directory `.data/headers` entries are routed to.
    pub fn headers_dir(&self) -> PathBuf {
        self.prefix.join("include")
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The wheel is broken.
    #[error("The wheel is invalid: {0}")]
    InvalidWheel(String),
    #[error("Failed to read {0} from zip file")]
    Zip(String, #[source] ZipError),
    /// An archive entry would land outside its destination base.
    #[error("Archive entry `{entry}` resolves outside of {}", .base.display())]
    UnsafeArchive { entry: String, base: PathBuf },
    /// The wheel has no `.dist-info` directory.
    #[error("No .dist-info directory found in {}", .0.display())]
    MissingDistInfo(PathBuf),
    #[error("Failed to write RECORD")]
    RecordCsv(#[from] csv::Error),
}
