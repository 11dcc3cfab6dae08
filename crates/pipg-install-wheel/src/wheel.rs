use std::io::{self, Read, Write};
use std::iter;
use std::path::{Component, Path, PathBuf};

use fs_err::File;
use sha2::{Digest, Sha256};
use tracing::debug;
use zip::ZipArchive;

use crate::record::{write_record, RecordEntry};
use crate::script::console_scripts;
use crate::{Error, Layout, INSTALLER_NAME};

/// Summary of one installed wheel.
#[derive(Debug)]
pub struct InstalledWheel {
    /// The `.dist-info` directory that was written, relative to
    /// site-packages.
    pub dist_info_dir: String,
    /// The number of files recorded, launchers and metadata included.
    pub file_count: usize,
}

/// Extract a wheel archive into the environment described by `layout`.
///
/// Regular entries land in site-packages. Entries under
/// `{name}-{version}.data/` are routed by their subdirectory: `purelib` and
/// `platlib` to site-packages, `scripts` to `<prefix>/bin` (with the
/// executable bits set), `data` to `<prefix>`, `headers` to
/// `<prefix>/include`; unknown subdirectories are skipped. Afterwards the
/// `INSTALLER` file, the console-script launchers and the `RECORD` are
/// written into the `.dist-info` directory.
pub fn install_wheel(wheel_path: &Path, layout: &Layout) -> Result<InstalledWheel, Error> {
    let mut archive = ZipArchive::new(File::open(wheel_path)?)
        .map_err(|err| Error::Zip(wheel_path.display().to_string(), err))?;

    // First pass: route every entry and reject the whole archive before
    // anything touches the filesystem, so a zip-slip attempt writes nothing.
    let mut plan: Vec<(usize, String, PathBuf, bool)> = Vec::new();
    let mut dist_info_dir: Option<String> = None;
    for index in 0..archive.len() {
        let entry = archive
            .by_index_raw(index)
            .map_err(|err| Error::Zip(format!("(index {index})"), err))?;
        if entry.is_dir() {
            continue;
        }
        let entry_name = entry.name().to_string();

        let Some((destination, base, is_script)) = route_entry(&entry_name, layout)? else {
            debug!("Skipping {entry_name}");
            continue;
        };

        // Zip-slip defense: the joined destination must stay within the base
        // directory of its routing bucket.
        let Some(destination) = normalize_within(&destination, &base) else {
            return Err(Error::UnsafeArchive {
                entry: entry_name,
                base,
            });
        };

        if let Some(dir) = entry_name
            .split_once('/')
            .map(|(first, _)| first)
            .filter(|first| first.ends_with(".dist-info"))
        {
            dist_info_dir = Some(dir.to_string());
        }

        plan.push((index, entry_name, destination, is_script));
    }

    let Some(dist_info_dir) = dist_info_dir else {
        return Err(Error::MissingDistInfo(wheel_path.to_path_buf()));
    };

    // Second pass: extract.
    let mut records: Vec<RecordEntry> = Vec::with_capacity(plan.len() + 2);
    for (index, entry_name, destination, is_script) in plan {
        let mut entry = archive
            .by_index(index)
            .map_err(|err| Error::Zip(entry_name.clone(), err))?;

        if let Some(parent) = destination.parent() {
            fs_err::create_dir_all(parent)?;
        }
        let mut target = File::create(&destination)?;
        let (size, digest) = copy_and_hash(&mut entry, &mut target)?;
        drop(target);

        if is_script {
            set_executable(&destination)?;
        }

        records.push(RecordEntry::new(
            record_path(&destination, &layout.site_packages)?,
            &digest,
            size,
        ));
    }
    let dist_info = layout.site_packages.join(&dist_info_dir);

    // INSTALLER: the tool identity on a single line.
    let installer_path = dist_info.join("INSTALLER");
    let contents = format!("{INSTALLER_NAME}\n");
    fs_err::write(&installer_path, &contents)?;
    records.push(RecordEntry::new(
        format!("{dist_info_dir}/INSTALLER"),
        &hex::encode(Sha256::digest(contents.as_bytes())),
        contents.len() as u64,
    ));

    // Console-script launchers from entry_points.txt, if any.
    let entry_points_path = dist_info.join("entry_points.txt");
    if entry_points_path.is_file() {
        let ini_text = fs_err::read_to_string(&entry_points_path)?;
        let scripts = console_scripts(&ini_text)?;
        if !scripts.is_empty() {
            let bin_dir = layout.scripts_dir();
            fs_err::create_dir_all(&bin_dir)?;
            for script in scripts {
                let launcher = script.launcher(&layout.sys_executable);
                let launcher_path = bin_dir.join(&script.name);
                fs_err::write(&launcher_path, &launcher)?;
                set_executable(&launcher_path)?;
                records.push(RecordEntry::new(
                    record_path(&launcher_path, &layout.site_packages)?,
                    &hex::encode(Sha256::digest(launcher.as_bytes())),
                    launcher.len() as u64,
                ));
                debug!("Installed console script {}", script.name);
            }
        }
    }

    let record_file = File::create(dist_info.join("RECORD"))?;
    let file_count = records.len();
    write_record(record_file, &format!("{dist_info_dir}/RECORD"), &records)?;

    Ok(InstalledWheel {
        dist_info_dir,
        file_count,
    })
}

/// Determine the destination for an archive entry: `(path, containment base,
/// needs executable bits)`, or `None` to skip the entry.
fn route_entry(name: &str, layout: &Layout) -> Result<Option<(PathBuf, PathBuf, bool)>, Error> {
    let Some(data_index) = name.find(".data/") else {
        return Ok(Some((
            layout.site_packages.join(name),
            layout.site_packages.clone(),
            false,
        )));
    };

    // `{name}-{version}.data/{subdir}/{rest}`
    let remainder = &name[data_index + ".data/".len()..];
    let Some((subdir, rest)) = remainder.split_once('/') else {
        return Ok(None);
    };
    if rest.is_empty() {
        return Ok(None);
    }

    let routed = match subdir {
        "purelib" | "platlib" => (
            layout.site_packages.join(rest),
            layout.site_packages.clone(),
            false,
        ),
        "scripts" => (layout.scripts_dir().join(rest), layout.prefix.clone(), true),
        "data" => (layout.prefix.join(rest), layout.prefix.clone(), false),
        "headers" => (
            layout.headers_dir().join(rest),
            layout.prefix.clone(),
            false,
        ),
        _ => return Ok(None),
    };
    Ok(Some(routed))
}

/// Lexically normalize `path` and require it to stay under `base`. Returns
/// the normalized path, or `None` if it escapes.
fn normalize_within(path: &Path, base: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return None;
                }
            }
            Component::CurDir => {}
            component => normalized.push(component),
        }
    }
    normalized.starts_with(base).then_some(normalized)
}

/// Stream `reader` into `writer`, returning the byte count and SHA-256 hex
/// digest of the copied content.
fn copy_and_hash(reader: &mut impl Read, writer: &mut impl Write) -> io::Result<(u64, String)> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0; 8 * 1024];
    let mut written = 0u64;
    loop {
        let length = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(length) => length,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        hasher.update(&buffer[..length]);
        writer.write_all(&buffer[..length])?;
        written += length as u64;
    }
    Ok((written, hex::encode(hasher.finalize())))
}

/// The RECORD path for an installed file: relative to site-packages,
/// traversing up with `..` for files outside it (launchers, data files).
fn record_path(path: &Path, site_packages: &Path) -> Result<String, Error> {
    let relative = relative_to(path, site_packages)?;
    let segments: Vec<String> = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(segments.join("/"))
}

/// Give the path relative to the base directory.
///
/// `lib/python/site-packages/foo/__init__.py` and `lib/python/site-packages`
/// becomes `foo/__init__.py`, while `bin/foo_launcher` against the same base
/// becomes `../../../bin/foo_launcher`.
fn relative_to(path: &Path, base: &Path) -> Result<PathBuf, Error> {
    let (stripped, common_prefix) = base
        .ancestors()
        .find_map(|ancestor| {
            path.strip_prefix(ancestor)
                .ok()
                .map(|stripped| (stripped, ancestor))
        })
        .ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "No common prefix between {} and {}",
                    path.display(),
                    base.display()
                ),
            ))
        })?;

    let levels_up = base.components().count() - common_prefix.components().count();
    let up = iter::repeat("..").take(levels_up).collect::<PathBuf>();
    Ok(up.join(stripped))
}

fn set_executable(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs_err::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
