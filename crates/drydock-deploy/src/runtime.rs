//! Runtime acquisition: resolve, download, verify, and materialize a Java
//! runtime under the versioned runtimes directory.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::archive;
use crate::catalog::{RuntimeCatalog, platform_key};
use crate::download::{Downloader, file_name_from_url};
use crate::error::{DeployError, DeployResult};
use crate::report::Reporter;

/// Name of the java executable on this platform.
pub fn java_exe_name() -> &'static str {
    if cfg!(windows) { "java.exe" } else { "java" }
}

/// Materialize the runtime `runtime_id` into `target_dir` and return the
/// path of its java executable.
///
/// The archive is extracted into a staging directory next to the target;
/// the true runtime root is wherever `bin/<java>` sits (archives usually
/// wrap everything in a top-level `jdk-…` directory). The target is
/// replaced wholesale: delete, then copy the located subtree in.
pub async fn acquire(
    downloader: &Downloader,
    catalog_url: &str,
    runtime_id: &str,
    target_dir: &Path,
    report: &Reporter,
) -> DeployResult<PathBuf> {
    if catalog_url.is_empty() {
        return Err(DeployError::Runtime(
            "runtime catalog URL not configured".to_string(),
        ));
    }

    report.progress(format!("resolving runtime {runtime_id}"), 20);
    let catalog: RuntimeCatalog = downloader.fetch_json(catalog_url).await?;
    let platform = platform_key();
    let artifact = catalog.resolve(runtime_id, &platform).ok_or_else(|| {
        DeployError::Runtime(format!(
            "runtime '{runtime_id}' has no artifact for platform '{platform}'"
        ))
    })?;

    let archive_name = file_name_from_url(&artifact.url)
        .ok_or_else(|| DeployError::Runtime(format!("unusable artifact URL: {}", artifact.url)))?;

    let staging = staging_dir(target_dir);
    if staging.exists() {
        // Leftover from an interrupted run; start clean.
        std::fs::remove_dir_all(&staging)?;
    }
    std::fs::create_dir_all(&staging)?;

    let result = materialize(
        downloader,
        artifact.url.as_str(),
        artifact.sha256.as_deref(),
        &staging.join(&archive_name),
        &staging.join("unpacked"),
        target_dir,
        report,
    )
    .await;

    if let Err(e) = std::fs::remove_dir_all(&staging) {
        debug!(error = %e, "failed to clean runtime staging directory");
    }

    let exe = result?;
    info!(runtime = runtime_id, exe = %exe.display(), "runtime materialized");
    Ok(exe)
}

async fn materialize(
    downloader: &Downloader,
    url: &str,
    sha256: Option<&str>,
    archive_path: &Path,
    unpack_dir: &Path,
    target_dir: &Path,
    report: &Reporter,
) -> DeployResult<PathBuf> {
    report.progress("downloading runtime archive", 25);
    downloader.fetch_verified(url, archive_path, sha256).await?;

    report.progress("extracting runtime archive", 35);
    archive::unpack(archive_path, unpack_dir)?;

    let root = find_runtime_root(unpack_dir).ok_or_else(|| {
        DeployError::Runtime(format!(
            "no {}/bin executable found in runtime archive",
            java_exe_name()
        ))
    })?;

    report.progress("installing runtime", 40);
    if target_dir.exists() {
        std::fs::remove_dir_all(target_dir)?;
    }
    copy_tree(&root, target_dir)?;

    let bin = target_dir.join("bin");
    make_bin_executable(&bin);
    Ok(bin.join(java_exe_name()))
}

/// Mark every file under `bin` executable. Tar archives keep their modes,
/// but zip-packaged runtimes routinely arrive with them stripped.
#[cfg(unix)]
fn make_bin_executable(bin: &Path) {
    use std::os::unix::fs::PermissionsExt;

    for entry in WalkDir::new(bin).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let perms = std::fs::Permissions::from_mode(0o755);
        if let Err(e) = std::fs::set_permissions(entry.path(), perms) {
            warn!(path = %entry.path().display(), error = %e, "chmod failed");
        }
    }
}

#[cfg(not(unix))]
fn make_bin_executable(_bin: &Path) {}

fn staging_dir(target_dir: &Path) -> PathBuf {
    let name = target_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "runtime".to_string());
    target_dir.with_file_name(format!(".{name}.staging"))
}

/// Locate the directory that directly contains `bin/<java executable>`.
pub fn find_runtime_root(dir: &Path) -> Option<PathBuf> {
    let exe = java_exe_name();
    for entry in WalkDir::new(dir).into_iter().filter_map(Result::ok) {
        if entry.file_type().is_file()
            && entry.file_name().to_string_lossy() == exe
            && entry.path().parent().is_some_and(|p| p.ends_with("bin"))
        {
            return entry.path().parent()?.parent().map(Path::to_path_buf);
        }
    }
    None
}

/// Recursive copy preserving the relative layout. `fs::copy` carries file
/// permissions along on Unix.
pub fn copy_tree(src: &Path, dest: &Path) -> DeployResult<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| DeployError::Runtime(e.to_string()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| DeployError::Runtime(e.to_string()))?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        } else {
            warn!(path = %entry.path().display(), "skipping non-regular file in runtime tree");
        }
    }
    Ok(())
}
