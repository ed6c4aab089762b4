//! Deployment pipeline — turns one job into a ready-to-start instance.
//!
//! Four stages: content package unpack, runtime acquisition, core binary
//! acquisition, and the conditional mod-loader install. Stages are
//! retry-free; callers retry by resubmitting the whole job.

use std::path::Path;

use regex::Regex;
use tracing::{debug, info, warn};

use drydock_core::Config;
use drydock_core::types::{CoreSource, DeployJob, InstanceRecord, JavaSpec};
use drydock_store::Store;

use crate::catalog::VanillaCatalog;
use crate::download::{Downloader, file_name_from_url};
use crate::error::{DeployError, DeployResult};
use crate::installer::{self, InstallOutcome, Installer, TEMP_DIR, VANILLA_SERVER_JAR};
use crate::report::Reporter;
use crate::{archive, runtime};

/// Core names that imply a vanilla base jar: `{loader}-{version}.jar`.
const VANILLA_DEPENDENT_CORE: &str = r"^(forge|neoforge|fabric|quilt)-([0-9][0-9.]*)\.jar$";

/// The deployment pipeline. Cheap to clone; shared by the queue worker.
#[derive(Clone)]
pub struct Pipeline {
    store: Store,
    config: Config,
    downloader: Downloader,
    vanilla_core: Regex,
}

impl Pipeline {
    pub fn new(store: Store, config: Config) -> DeployResult<Self> {
        let downloader = Downloader::new(&config.downloads)?;
        let vanilla_core =
            Regex::new(VANILLA_DEPENDENT_CORE).map_err(|e| DeployError::Core(e.to_string()))?;
        Ok(Self {
            store,
            config,
            downloader,
            vanilla_core,
        })
    }

    /// Execute one job. A terminal status (complete or failed) is always
    /// pushed through `report` before this returns.
    pub async fn run(&self, job: &DeployJob, report: &Reporter) -> DeployResult<()> {
        info!(instance = job.instance_id, "deployment started");
        report.progress("deployment started", 0);
        match self.run_stages(job, report).await {
            Ok(()) => {
                report.progress("deployment complete", 100);
                info!(instance = job.instance_id, "deployment complete");
                Ok(())
            }
            Err(e) => {
                report.fail("deployment failed", e.to_string());
                warn!(instance = job.instance_id, error = %e, "deployment failed");
                Err(e)
            }
        }
    }

    async fn run_stages(&self, job: &DeployJob, report: &Reporter) -> DeployResult<()> {
        let mut record = self
            .store
            .get_instance(job.instance_id)?
            .ok_or(DeployError::InstanceNotFound(job.instance_id))?;

        std::fs::create_dir_all(&job.base_dir)?;

        if let Some(key) = &job.package {
            self.unpack_package(key, &job.base_dir, report)?;
        }

        self.acquire_runtime(job, &mut record, report).await?;
        self.acquire_core(job, &mut record, report).await?;

        if installer::needs_install(&record.core_file) {
            self.install_loader(job, &mut record, report).await?;
        }

        let temp = job.base_dir.join(TEMP_DIR);
        if temp.exists() {
            if let Err(e) = std::fs::remove_dir_all(&temp) {
                debug!(error = %e, "failed to remove installer temp directory");
            }
        }
        Ok(())
    }

    // ── Stage 1: content package ───────────────────────────────

    fn unpack_package(&self, key: &str, base_dir: &Path, report: &Reporter) -> DeployResult<()> {
        report.progress("unpacking content package", 5);
        let staged = self.config.upload_path(key);
        if !staged.exists() {
            return Err(DeployError::Package(format!("uploaded package {key} not found")));
        }
        let hoisted = archive::unpack_and_hoist(&staged, base_dir)?;
        if hoisted {
            debug!("hoisted single wrapping directory");
        }
        if let Err(e) = std::fs::remove_file(&staged) {
            warn!(key, error = %e, "failed to remove staged package");
        }
        report.progress("content package unpacked", 15);
        Ok(())
    }

    // ── Stage 2: runtime ───────────────────────────────────────

    async fn acquire_runtime(
        &self,
        job: &DeployJob,
        record: &mut InstanceRecord,
        report: &Reporter,
    ) -> DeployResult<()> {
        let requested = match &job.runtime {
            Some(id) => Some(id.clone()),
            None => match record.java_spec() {
                JavaSpec::Runtime(id) => Some(id),
                // A concrete path or `none` stands as-is.
                JavaSpec::Path(_) | JavaSpec::Shell => None,
            },
        };
        let Some(runtime_id) = requested else {
            debug!("runtime acquisition skipped");
            return Ok(());
        };

        let target = self.config.runtime_dir(&runtime_id);
        let exe = runtime::acquire(
            &self.downloader,
            &self.config.runtimes.catalog_url,
            &runtime_id,
            &target,
            report,
        )
        .await?;
        record.java = exe.to_string_lossy().into_owned();
        self.store.update_instance(record)?;
        report.progress(format!("runtime {runtime_id} ready"), 45);
        Ok(())
    }

    // ── Stage 3: core binary ───────────────────────────────────

    async fn acquire_core(
        &self,
        job: &DeployJob,
        record: &mut InstanceRecord,
        report: &Reporter,
    ) -> DeployResult<()> {
        match &job.core {
            CoreSource::None => {
                debug!("core acquisition skipped");
                return Ok(());
            }
            CoreSource::Upload { key, file_name } => {
                report.progress("installing uploaded core", 50);
                let staged = self.config.upload_path(key);
                if !staged.exists() {
                    return Err(DeployError::Core(format!("uploaded core {key} not found")));
                }
                move_file(&staged, &job.base_dir.join(file_name))?;
                record.core_file = file_name.clone();
            }
            CoreSource::Url {
                url,
                sha256,
                file_name,
            } => {
                report.progress("downloading core", 50);
                let name = match file_name {
                    Some(n) => n.clone(),
                    None => file_name_from_url(url).ok_or_else(|| {
                        DeployError::Core(format!("cannot derive a file name from {url}"))
                    })?,
                };
                self.downloader
                    .fetch_verified(url, &job.base_dir.join(&name), sha256.as_deref())
                    .await?;
                record.core_file = name;
            }
        }
        self.store.update_instance(record)?;
        report.progress(format!("core {} ready", record.core_file), 70);

        self.vanilla_prefetch(&record.core_file, &job.base_dir).await;
        Ok(())
    }

    /// Best-effort: cores named `{loader}-{version}.jar` sit on top of a
    /// vanilla base jar; fetch it ahead of time. Failure is logged, never
    /// fatal.
    async fn vanilla_prefetch(&self, core_file: &str, base_dir: &Path) {
        let Some(caps) = self.vanilla_core.captures(core_file) else {
            return;
        };
        if self.config.vanilla.catalog_url.is_empty() {
            return;
        }
        let version = caps[2].to_string();
        let dest = base_dir.join(VANILLA_SERVER_JAR);
        if dest.exists() {
            return;
        }
        if let Err(e) = self.try_vanilla_prefetch(&version, &dest).await {
            warn!(version, error = %e, "vanilla prefetch failed");
        }
    }

    async fn try_vanilla_prefetch(&self, version: &str, dest: &Path) -> DeployResult<()> {
        let catalog: VanillaCatalog = self
            .downloader
            .fetch_json(&self.config.vanilla.catalog_url)
            .await?;
        let entry = catalog.resolve(version).ok_or_else(|| {
            DeployError::Core(format!("version {version} not in vanilla catalog"))
        })?;
        self.downloader
            .fetch_verified(&entry.server_url, dest, entry.server_sha256.as_deref())
            .await?;
        info!(version, "prefetched vanilla server jar");
        Ok(())
    }

    // ── Stage 4: mod-loader install ────────────────────────────

    async fn install_loader(
        &self,
        job: &DeployJob,
        record: &mut InstanceRecord,
        report: &Reporter,
    ) -> DeployResult<()> {
        report.progress("running mod-loader installer", 75);
        let java_exe = self.java_for_install(record)?;
        let installer = Installer::new(
            &self.downloader,
            &self.config.vanilla.catalog_url,
            &job.base_dir,
            &record.core_file,
            &java_exe,
            report,
        );
        match installer.run().await? {
            InstallOutcome::ArgsFile(path) => {
                record.args_file = Some(path);
            }
            InstallOutcome::PatchedJar(name) => {
                record.core_file = name;
                record.args_file = None;
            }
        }
        self.store.update_instance(record)?;
        report.progress("mod-loader installed", 95);
        Ok(())
    }

    /// The java executable the installer's processors run under.
    fn java_for_install(&self, record: &InstanceRecord) -> DeployResult<String> {
        match record.java_spec() {
            JavaSpec::Path(p) => {
                let abs = if p.is_absolute() {
                    p
                } else {
                    record.base_path.join(p)
                };
                Ok(abs.to_string_lossy().into_owned())
            }
            JavaSpec::Shell => Err(DeployError::Installer(
                "mod-loader install requires a java runtime".to_string(),
            )),
            JavaSpec::Runtime(id) => Err(DeployError::Installer(format!(
                "runtime {id} was not provisioned"
            ))),
        }
    }
}

/// Rename, falling back to copy-and-remove when the uploads directory sits
/// on a different filesystem than the servers tree.
fn move_file(src: &Path, dest: &Path) -> DeployResult<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(src, dest)?;
            std::fs::remove_file(src)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_pipeline(data_dir: &Path) -> Pipeline {
        let mut config = Config::default();
        config.paths.data_dir = data_dir.to_path_buf();
        Pipeline::new(Store::open_in_memory(), config).unwrap()
    }

    fn test_record(base: &Path, java: &str) -> InstanceRecord {
        InstanceRecord {
            id: 1,
            name: "survival".to_string(),
            base_path: base.to_path_buf(),
            java: java.to_string(),
            core_file: "server.jar".to_string(),
            min_memory_mb: 512,
            max_memory_mb: 1024,
            extra_args: vec![],
            args_file: None,
            file_encoding: String::new(),
            stop_command: "stop".to_string(),
        }
    }

    #[test]
    fn test_vanilla_core_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = test_pipeline(dir.path());
        assert!(pipeline.vanilla_core.is_match("fabric-1.20.4.jar"));
        assert!(pipeline.vanilla_core.is_match("forge-1.12.2.jar"));
        assert!(pipeline.vanilla_core.is_match("quilt-1.19.jar"));
        // Installer-style names carry a loader version segment.
        assert!(!pipeline.vanilla_core.is_match("forge-1.20.1-47.2.0-installer.jar"));
        assert!(!pipeline.vanilla_core.is_match("paper-1.20.4.jar"));
        assert!(!pipeline.vanilla_core.is_match("fabric-1.20.4.zip"));
    }

    #[test]
    fn test_move_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("staged");
        std::fs::write(&src, b"core").unwrap();
        let dest = dir.path().join("servers/1/server.jar");
        move_file(&src, &dest).unwrap();
        assert!(!src.exists());
        assert_eq!(std::fs::read(&dest).unwrap(), b"core");
    }

    #[test]
    fn test_java_for_install_resolves_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = test_pipeline(dir.path());
        let record = test_record(&PathBuf::from("/srv/one"), "./jre/bin/java");
        let resolved = pipeline.java_for_install(&record).unwrap();
        assert_eq!(resolved, "/srv/one/./jre/bin/java");
    }

    #[test]
    fn test_java_for_install_rejects_shell_spec() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = test_pipeline(dir.path());
        let record = test_record(&PathBuf::from("/srv/one"), "none");
        assert!(pipeline.java_for_install(&record).is_err());
    }
}
