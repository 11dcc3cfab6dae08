use std::process::ExitCode;
use std::time::Duration;

pub(crate) use install::install;

mod install;

#[derive(Copy, Clone)]
pub(crate) enum ExitStatus {
    /// The command succeeded.
    Success,
    /// The command failed.
    Error,
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Success => ExitCode::from(0),
            ExitStatus::Error => ExitCode::from(1),
        }
    }
}

/// Format a duration as `N.Ns`.
pub(super) fn elapsed(duration: Duration) -> String {
    format!("{:.1}s", duration.as_secs_f64())
}

/// Format a byte count for humans.
pub(super) fn human_size(bytes: u64) -> String {
    if bytes >= 1 << 20 {
        format!("{:.1} MB", bytes as f64 / f64::from(1u32 << 20))
    } else if bytes >= 1 << 10 {
        format!("{} KB", bytes / (1 << 10))
    } else {
        format!("{bytes} B")
    }
}
