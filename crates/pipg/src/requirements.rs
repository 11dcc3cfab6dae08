use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};

use pipg_pep508::Requirement;

/// Collect requirements from command-line arguments and an optional
/// requirements file.
pub(crate) fn collect(
    packages: &[String],
    requirements_file: Option<&Path>,
) -> Result<Vec<Requirement>> {
    let mut lines: Vec<String> = packages.to_vec();
    if let Some(path) = requirements_file {
        let contents = fs_err::read_to_string(path)?;
        lines.extend(parse_lines(&contents));
    }

    lines
        .iter()
        .map(|line| {
            Requirement::from_str(line).with_context(|| format!("Invalid requirement: {line}"))
        })
        .collect()
}

/// Extract requirement lines from a pip-style requirements file: blank lines
/// and `#` comment lines are skipped, inline `#` comments stripped, and
/// `-`-prefixed pip options (`--index-url`, `-e`, `-c`) ignored.
fn parse_lines(contents: &str) -> Vec<String> {
    contents
        .lines()
        .filter_map(|line| {
            let line = match line.find('#') {
                Some(index) => &line[..index],
                None => line,
            };
            let line = line.trim();
            if line.is_empty() || line.starts_with('-') {
                None
            } else {
                Some(line.to_string())
            }
        })
        .collect()
}
