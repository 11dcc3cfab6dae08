use std::str::FromStr;

use thiserror::Error;

use pipg_distribution_filename::WheelFilename;
use pipg_platform_tags::Tags;
use pipg_pypi_types::File;

/// Pick the best compatible wheel from a version's release files.
///
/// Non-wheel files and unparseable filenames are ignored. Each wheel scores
/// as the lowest priority index it matches in `tags`; the wheel with the
/// smallest score wins, first-seen breaking ties. There is no fallback to
/// source distributions.
pub fn select_wheel<'a>(files: &'a [File], tags: &Tags) -> Result<&'a File, NoCompatibleWheel> {
    let mut best: Option<(usize, &File)> = None;

    for file in files {
        if !file.is_wheel() {
            continue;
        }
        let Ok(filename) = WheelFilename::from_str(&file.filename) else {
            continue;
        };
        let Some(priority) = tags.best_match_index(
            &filename.python_tag,
            &filename.abi_tag,
            &filename.platform_tag,
        ) else {
            continue;
        };
        if best.as_ref().map_or(true, |(current, _)| priority < *current) {
            best = Some((priority, file));
            if priority == 0 {
                break;
            }
        }
    }

    best.map(|(_, file)| file).ok_or(NoCompatibleWheel {
        candidates: files.len(),
    })
}

/// No release file matched any acceptable tag.
#[derive(Debug, Error)]
#[error("No compatible wheel found ({candidates} files considered)")]
pub struct NoCompatibleWheel {
    pub candidates: usize,
}

#[cfg(test)]
mod tests {
    use pipg_platform_tags::Tags;
    use pipg_pypi_types::File;

    use super::select_wheel;

    fn wheel(filename: &str) -> File {
        File {
            filename: filename.to_string(),
            url: format!("https://files.example/{filename}"),
            packagetype: "bdist_wheel".to_string(),
            ..File::default()
        }
    }

    fn sdist(filename: &str) -> File {
        File {
            filename: filename.to_string(),
            packagetype: "sdist".to_string(),
            ..File::default()
        }
    }

    fn tags() -> Tags {
        Tags::from_env("linux_x86_64", "312").unwrap()
    }

    #[test]
    fn prefers_native_over_pure() {
        let files = vec![
            wheel("pkg-1.0-py3-none-any.whl"),
            wheel("pkg-1.0-cp312-cp312-manylinux_2_17_x86_64.whl"),
        ];
        let selected = select_wheel(&files, &tags()).unwrap();
        assert_eq!(
            selected.filename,
            "pkg-1.0-cp312-cp312-manylinux_2_17_x86_64.whl"
        );
    }

    #[test]
    fn compound_tags_match_any_component() {
        let files = vec![wheel("six-1.17.0-py2.py3-none-any.whl")];
        let selected = select_wheel(&files, &tags()).unwrap();
        assert_eq!(selected.filename, "six-1.17.0-py2.py3-none-any.whl");
    }

    #[test]
    fn sdists_are_never_selected() {
        let files = vec![sdist("pkg-1.0.tar.gz"), wheel("pkg-1.0-py3-none-any.whl")];
        let selected = select_wheel(&files, &tags()).unwrap();
        assert!(selected.is_wheel());

        let only_sdist = vec![sdist("pkg-1.0.tar.gz")];
        assert!(select_wheel(&only_sdist, &tags()).is_err());
    }

    #[test]
    fn incompatible_platform_fails() {
        let files = vec![wheel("pkg-1.0-cp312-cp312-win_amd64.whl")];
        let err = select_wheel(&files, &tags()).unwrap_err();
        assert_eq!(err.candidates, 1);
    }

    #[test]
    fn unparseable_filenames_are_ignored() {
        let files = vec![
            wheel("garbage.whl"),
            wheel("pkg-1.0-py3-none-any.whl"),
        ];
        assert!(select_wheel(&files, &tags()).is_ok());
    }

    #[test]
    fn selection_is_deterministic_on_ties() {
        // Two wheels matching the same priority: the first in file order wins.
        let files = vec![
            wheel("pkg-1.0-py3-none-any.whl"),
            wheel("pkg2-1.0-py3-none-any.whl"),
        ];
        let selected = select_wheel(&files, &tags()).unwrap();
        assert_eq!(selected.filename, "pkg-1.0-py3-none-any.whl");
    }
}
