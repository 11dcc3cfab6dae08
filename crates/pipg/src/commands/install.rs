use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use pipg_cache::Cache;
use pipg_client::{RegistryClient, RegistryClientBuilder};
use pipg_fetch::{select_wheel, DownloadTask, Downloader};
use pipg_install_wheel::{install_wheel, Layout};
use pipg_interpreter::PythonEnvironment;
use pipg_normalize::PackageName;
use pipg_platform_tags::Tags;
use pipg_resolver::{ResolvedPackage, Resolver};

use crate::commands::{elapsed, human_size, ExitStatus};
use crate::requirements;
use crate::InstallArgs;

pub(crate) async fn install(args: InstallArgs) -> Result<ExitStatus> {
    let start = std::time::Instant::now();

    let requirements = requirements::collect(&args.packages, args.requirements.as_deref())?;
    if requirements.is_empty() {
        println!("Nothing to install.");
        return Ok(ExitStatus::Success);
    }

    // One cancellation signal for resolution, downloads and backoff waits.
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    // Probe the target environment.
    let environment = {
        let environment = PythonEnvironment::query(&args.python)?;
        match &args.target {
            Some(target) => {
                let target = fs_err::canonicalize(target).unwrap_or_else(|_| target.clone());
                environment.with_target(target)
            }
            None => environment,
        }
    };
    debug!(
        "Installing into {} (platform {}, python {})",
        environment.site_packages.display(),
        environment.platform,
        environment.python_version
    );

    let markers = environment.markers();
    let tags = Tags::from_env(&environment.wheel_platform(), &environment.python_compact)?;

    let mut builder = RegistryClientBuilder::default().cancel(cancel.clone());
    if let Some(index) = args.index_url.clone() {
        builder = builder.index(index);
    }
    let client = builder.build();

    // Resolve.
    println!("Resolving dependencies...");
    let resolved = Resolver::new(&client, &markers)
        .with_no_deps(args.no_deps)
        .resolve(&requirements)
        .await?;

    let roots: Vec<PackageName> = requirements
        .iter()
        .map(|requirement| requirement.name.clone())
        .collect();
    print_tree(&roots, &resolved);

    // Pick one wheel per resolved package.
    let plan = build_plan(&client, &resolved, &tags, &environment).await?;

    if args.dry_run {
        println!("\nWould download {} packages:", plan.len());
        for task in &plan {
            println!("  {} ({})", task.filename, human_size(task.size));
        }
        println!("\nDry run, no changes made.");
        return Ok(ExitStatus::Success);
    }

    // The scratch directory for downloads is removed when this handle drops,
    // whether or not installation succeeds.
    let download_dir = tempfile::Builder::new().prefix("pipg-downloads-").tempdir()?;

    let cache = if args.no_cache {
        None
    } else {
        match Cache::from_env() {
            Ok(cache) => Some(cache),
            Err(err) => {
                debug!("Cache unavailable, continuing without: {err}");
                None
            }
        }
    };

    let workers = args
        .jobs
        .unwrap_or_else(|| std::thread::available_parallelism().map_or(4, usize::from));
    println!("\nDownloading {} packages ({workers} workers)...", plan.len());

    let mut downloader = Downloader::new(&client, download_dir.path()).with_workers(workers);
    if let Some(cache) = &cache {
        downloader = downloader.with_cache(cache);
    }
    let downloads = downloader.fetch(plan).await?;

    for download in &downloads {
        let suffix = if download.cached { " (cached)" } else { "" };
        println!(
            "  ✓ {} ({}){suffix}",
            download
                .path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy(),
            human_size(download.size)
        );
    }

    // Install sequentially; each wheel is fully written (RECORD included)
    // before the next starts.
    println!("\nInstalling...");
    let layout = Layout {
        sys_executable: environment.executable.clone(),
        prefix: environment.prefix.clone(),
        site_packages: environment.site_packages.clone(),
    };
    fs_err::create_dir_all(&layout.site_packages)?;
    for download in &downloads {
        if cancel.is_cancelled() {
            anyhow::bail!("Installation canceled");
        }
        install_wheel(&download.path, &layout)
            .with_context(|| format!("Failed to install {}", download.name))?;
        debug!("Installed {} {}", download.name, download.version);
    }

    println!("  ✓ {} packages installed", downloads.len());
    println!("\nDone in {}", elapsed(start.elapsed()));

    Ok(ExitStatus::Success)
}

/// Build the download plan: fetch each pinned version's file list and select
/// the best compatible wheel.
async fn build_plan(
    client: &RegistryClient,
    resolved: &[ResolvedPackage],
    tags: &Tags,
    environment: &PythonEnvironment,
) -> Result<Vec<DownloadTask>> {
    let mut plan = Vec::with_capacity(resolved.len());
    for package in resolved {
        let version = package.version.to_string();
        let info = client
            .get_version(&package.name, &version)
            .await
            .with_context(|| format!("Failed to fetch file list for {}", package.name))?;

        let file = select_wheel(&info.urls, tags).with_context(|| {
            format!(
                "No compatible wheel for {} {} (platform: {}, python: cp{})",
                package.name,
                version,
                environment.wheel_platform(),
                environment.python_compact
            )
        })?;

        plan.push(DownloadTask {
            name: package.name.to_string(),
            version,
            url: Url::parse(&file.url)
                .with_context(|| format!("Invalid download URL for {}", package.name))?,
            sha256: file.digests.sha256.clone(),
            filename: file.filename.clone(),
            size: file.size,
        });
    }
    Ok(plan)
}

/// Print the resolved packages as a tree under their roots, cycle-safe.
fn print_tree(roots: &[PackageName], resolved: &[ResolvedPackage]) {
    let by_name: HashMap<&PackageName, &ResolvedPackage> = resolved
        .iter()
        .map(|package| (&package.name, package))
        .collect();
    let mut visited: HashSet<&PackageName> = HashSet::new();

    for root in roots {
        let Some(package) = by_name.get(root) else {
            continue;
        };
        println!("  {} {}", package.name, package.version);
        visited.insert(&package.name);
        print_subtree(&package.dependencies, &by_name, "  ", &mut visited);
    }
}

fn print_subtree<'a>(
    dependencies: &'a [PackageName],
    by_name: &HashMap<&PackageName, &'a ResolvedPackage>,
    prefix: &str,
    visited: &mut HashSet<&'a PackageName>,
) {
    for (index, name) in dependencies.iter().enumerate() {
        let Some(package) = by_name.get(name) else {
            continue;
        };
        let last = index == dependencies.len() - 1;
        let connector = if last { "└── " } else { "├── " };
        println!("{prefix}{connector}{} {}", package.name, package.version);

        if visited.insert(&package.name) && !package.dependencies.is_empty() {
            let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
            print_subtree(&package.dependencies, by_name, &child_prefix, visited);
        }
    }
}
