//! Mod-loader installation — drives the installer state machine.
//!
//! The installer progresses from metadata through era classification,
//! vanilla base, libraries, mappings and declared processors, ending with
//! either a generated args file or a discovered patched server jar. There
//! is no partial resume; a retry starts over from the first state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::archive;
use crate::catalog::{VanillaCatalog, VanillaVersion};
use crate::download::Downloader;
use crate::error::{DeployError, DeployResult};
use crate::maven::MavenCoord;
use crate::profile::{self, InstallProfile, Processor};
use crate::report::Reporter;
use crate::version::{GameVersion, LoaderEra};

/// File name the vanilla base jar is stored under in the instance dir.
pub const VANILLA_SERVER_JAR: &str = "server.jar";

/// Scratch directory for installer intermediates (mappings).
pub const TEMP_DIR: &str = "temp";

/// Where new-style loaders drop their generated args file.
const LOADER_ARGS_DIRS: [&str; 2] = ["net/minecraftforge/forge", "net/neoforged/neoforge"];

/// Whether a core file is a mod-loader installer that needs stage 4.
/// Self-contained builds (`*universal.jar`, `*launcher.jar`) are excluded.
pub fn needs_install(core_file: &str) -> bool {
    let lower = core_file.to_ascii_lowercase();
    lower.ends_with(".jar")
        && lower.contains("forge")
        && !lower.ends_with("universal.jar")
        && !lower.ends_with("launcher.jar")
}

/// Current state of an installation.
#[derive(Debug, Clone, PartialEq, Eq)]
enum InstallState {
    /// Read `install_profile.json` and establish the target game version.
    ReadInstallerMetadata,
    /// Bucket the game version into a loader era.
    ClassifyVersionEra { version: GameVersion },
    /// Ensure the vanilla server jar is on disk.
    DownloadVanillaBase { version: GameVersion, era: LoaderEra },
    /// Old-style path: merge the libraries bundled inside the installer.
    ExtractAndMergeVanillaLibraries { version: GameVersion, era: LoaderEra },
    /// New-style path: download every library the profile declares.
    DownloadDeclaredLibraries { version: GameVersion, era: LoaderEra },
    /// Fetch official name mappings when the era's processors use them.
    ResolveAndDownloadMappings { version: GameVersion, era: LoaderEra },
    /// Run the profile's external build steps.
    RunDeclaredProcessors { version: GameVersion },
    /// All states done; the launch artifact can be discovered.
    Done { version: GameVersion },
}

/// What the installation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Launch via `java @<file>`; path relative to the instance dir.
    ArgsFile(String),
    /// Launch via `-jar <file>`; file name in the instance dir.
    PatchedJar(String),
}

/// One installation run against a single instance directory.
pub struct Installer<'a> {
    downloader: &'a Downloader,
    vanilla_catalog_url: &'a str,
    base_dir: &'a Path,
    installer: PathBuf,
    installer_name: String,
    java_exe: String,
    report: &'a Reporter,
    profile: InstallProfile,
    vanilla: Option<VanillaVersion>,
    mappings: Option<PathBuf>,
}

impl<'a> Installer<'a> {
    pub fn new(
        downloader: &'a Downloader,
        vanilla_catalog_url: &'a str,
        base_dir: &'a Path,
        installer_file: &str,
        java_exe: &str,
        report: &'a Reporter,
    ) -> Self {
        Self {
            downloader,
            vanilla_catalog_url,
            base_dir,
            installer: base_dir.join(installer_file),
            installer_name: installer_file.to_string(),
            java_exe: java_exe.to_string(),
            report,
            profile: InstallProfile::default(),
            vanilla: None,
            mappings: None,
        }
    }

    /// Run the state machine to completion and discover the launch artifact.
    pub async fn run(mut self) -> DeployResult<InstallOutcome> {
        let mut state = InstallState::ReadInstallerMetadata;
        loop {
            state = self.step(state).await?;
            if let InstallState::Done { version } = state {
                return self.discover_outcome(&version);
            }
        }
    }

    async fn step(&mut self, state: InstallState) -> DeployResult<InstallState> {
        match state {
            InstallState::ReadInstallerMetadata => {
                self.report.progress("reading installer metadata", 76);
                self.profile = profile::read_profile(&self.installer)?.unwrap_or_default();
                let version = match &self.profile.minecraft {
                    Some(raw) => GameVersion::parse(raw)?,
                    None => guess_game_version(&self.installer_name).ok_or_else(|| {
                        DeployError::Installer(format!(
                            "cannot determine game version from {}",
                            self.installer_name
                        ))
                    })?,
                };
                debug!(
                    version = %version,
                    libraries = self.profile.libraries.len(),
                    processors = self.profile.processors.len(),
                    "installer metadata read"
                );
                Ok(InstallState::ClassifyVersionEra { version })
            }

            InstallState::ClassifyVersionEra { version } => {
                let era = LoaderEra::classify(&version);
                info!(version = %version, era = %era, "classified loader era");
                Ok(InstallState::DownloadVanillaBase { version, era })
            }

            InstallState::DownloadVanillaBase { version, era } => {
                let server_jar = self.base_dir.join(VANILLA_SERVER_JAR);
                if server_jar.exists() {
                    debug!("vanilla server jar already present");
                } else {
                    self.report.progress("downloading vanilla server jar", 78);
                    let entry = self.vanilla_entry(&version).await?;
                    self.downloader
                        .fetch_verified(&entry.server_url, &server_jar, entry.server_sha256.as_deref())
                        .await?;
                }
                if era.uses_declared_libraries() {
                    Ok(InstallState::DownloadDeclaredLibraries { version, era })
                } else {
                    Ok(InstallState::ExtractAndMergeVanillaLibraries { version, era })
                }
            }

            InstallState::ExtractAndMergeVanillaLibraries { version, era } => {
                self.report.progress("extracting bundled libraries", 82);
                let merged =
                    archive::extract_entries_under(&self.installer, "maven/", &self.libraries_dir())?;
                let mut root_jars = 0;
                for entry in archive::list_entries(&self.installer)? {
                    if !entry.contains('/') && entry.ends_with(".jar") {
                        archive::extract_entry(&self.installer, &entry, &self.base_dir.join(&entry))?;
                        root_jars += 1;
                    }
                }
                info!(libraries = merged, root_jars, "merged installer payload");
                Ok(InstallState::ResolveAndDownloadMappings { version, era })
            }

            InstallState::DownloadDeclaredLibraries { version, era } => {
                let total = self.profile.libraries.len();
                self.report
                    .progress(format!("downloading {total} loader libraries"), 82);
                let libraries_dir = self.libraries_dir();
                for lib in &self.profile.libraries {
                    let coord = MavenCoord::parse(&lib.name)?;
                    let dest = libraries_dir.join(coord.repo_path());
                    if dest.exists() {
                        debug!(library = %lib.name, "library already present");
                        continue;
                    }
                    let url = lib.url.as_deref().ok_or_else(|| {
                        DeployError::Installer(format!("library {} has no download URL", lib.name))
                    })?;
                    self.downloader
                        .fetch_verified(url, &dest, lib.sha256.as_deref())
                        .await?;
                }
                Ok(InstallState::ResolveAndDownloadMappings { version, era })
            }

            InstallState::ResolveAndDownloadMappings { version, era } => {
                if era.needs_mappings() {
                    self.report.progress("downloading server name mappings", 86);
                    let entry = self.vanilla_entry(&version).await?;
                    let url = entry.mappings_url.as_deref().ok_or_else(|| {
                        DeployError::Installer(format!(
                            "no server mappings published for {version}"
                        ))
                    })?;
                    let dest = self.base_dir.join(TEMP_DIR).join("server_mappings.txt");
                    self.downloader
                        .fetch_verified(url, &dest, entry.mappings_sha256.as_deref())
                        .await?;
                    self.mappings = Some(dest);
                }
                Ok(InstallState::RunDeclaredProcessors { version })
            }

            InstallState::RunDeclaredProcessors { version } => {
                let total = self
                    .profile
                    .processors
                    .iter()
                    .filter(|p| p.runs_on_server() && !p.is_dev_mappings_only())
                    .count();
                if total > 0 {
                    self.report
                        .progress(format!("running {total} installer processors"), 90);
                }
                let vars = self.substitution_vars();
                let mut ran = 0;
                for proc in &self.profile.processors {
                    if !proc.runs_on_server() {
                        debug!(jar = %proc.jar, "skipping client-only processor");
                        continue;
                    }
                    if proc.is_dev_mappings_only() {
                        debug!(jar = %proc.jar, "skipping mappings download processor");
                        continue;
                    }
                    ran += 1;
                    self.report
                        .progress(format!("installer processor {ran}/{total}"), 90);
                    self.run_processor(proc, &vars).await?;
                }
                Ok(InstallState::Done { version })
            }

            InstallState::Done { version } => Ok(InstallState::Done { version }),
        }
    }

    /// Resolve (and cache) this version's entry from the vanilla catalog.
    async fn vanilla_entry(&mut self, version: &GameVersion) -> DeployResult<VanillaVersion> {
        if let Some(entry) = &self.vanilla {
            return Ok(entry.clone());
        }
        if self.vanilla_catalog_url.is_empty() {
            return Err(DeployError::Installer(
                "vanilla catalog URL not configured".to_string(),
            ));
        }
        let catalog: VanillaCatalog = self.downloader.fetch_json(self.vanilla_catalog_url).await?;
        let id = version.to_string();
        let entry = catalog.resolve(&id).cloned().ok_or_else(|| {
            DeployError::Installer(format!("game version {id} not in vanilla catalog"))
        })?;
        self.vanilla = Some(entry.clone());
        Ok(entry)
    }

    fn libraries_dir(&self) -> PathBuf {
        self.base_dir.join("libraries")
    }

    /// The fixed token set processors may reference, plus the profile's
    /// own data table (whose values may themselves hold tokens).
    fn substitution_vars(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        vars.insert("ROOT".to_string(), path_str(self.base_dir));
        vars.insert("INSTALLER".to_string(), path_str(&self.installer));
        vars.insert("LIBRARY_DIR".to_string(), path_str(&self.libraries_dir()));
        vars.insert(
            "MINECRAFT_JAR".to_string(),
            path_str(&self.base_dir.join(VANILLA_SERVER_JAR)),
        );
        vars.insert("SIDE".to_string(), "server".to_string());
        if let Some(mappings) = &self.mappings {
            vars.insert("MAPPINGS".to_string(), path_str(mappings));
        }
        let data: Vec<(String, String)> = self
            .profile
            .data
            .iter()
            .map(|(key, value)| (key.clone(), profile::substitute(value, &vars)))
            .collect();
        vars.extend(data);
        vars
    }

    /// Invoke one processor: main class from the jar manifest, token
    /// substitution over its argument list, then a java subprocess.
    async fn run_processor(
        &self,
        proc: &Processor,
        vars: &BTreeMap<String, String>,
    ) -> DeployResult<()> {
        let jar = self.libraries_dir().join(MavenCoord::parse(&proc.jar)?.repo_path());
        let main_class = profile::read_main_class(&jar)?;

        let mut classpath = vec![jar];
        for coord in &proc.classpath {
            classpath.push(self.libraries_dir().join(MavenCoord::parse(coord)?.repo_path()));
        }
        let separator = if cfg!(windows) { ";" } else { ":" };
        let classpath = classpath
            .iter()
            .map(|p| path_str(p))
            .collect::<Vec<_>>()
            .join(separator);

        let args: Vec<String> = proc
            .args
            .iter()
            .map(|a| profile::substitute(a, vars))
            .collect();

        info!(%main_class, "running installer processor");
        let output = tokio::process::Command::new(&self.java_exe)
            .arg("-cp")
            .arg(&classpath)
            .arg(&main_class)
            .args(&args)
            .current_dir(self.base_dir)
            .output()
            .await
            .map_err(|e| {
                DeployError::Installer(format!("failed to spawn {}: {e}", self.java_exe))
            })?;
        if !output.status.success() {
            return Err(DeployError::Installer(format!(
                "processor {main_class} exited with {}: {}",
                output.status,
                stderr_excerpt(&output.stderr)
            )));
        }
        Ok(())
    }

    /// Locate the launch artifact: a generated args file for new-style
    /// loaders, or a patched jar next to the installer for old ones.
    fn discover_outcome(&self, version: &GameVersion) -> DeployResult<InstallOutcome> {
        let args_name = if cfg!(windows) { "win_args.txt" } else { "unix_args.txt" };
        for group in LOADER_ARGS_DIRS {
            let root = self.libraries_dir().join(group);
            let Ok(entries) = std::fs::read_dir(&root) else {
                continue;
            };
            let mut dirs: Vec<PathBuf> = entries
                .filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect();
            dirs.sort();
            for dir in dirs {
                let candidate = dir.join(args_name);
                if candidate.exists() {
                    let rel = candidate.strip_prefix(self.base_dir).unwrap_or(&candidate);
                    info!(args_file = %rel.display(), "found generated args file");
                    return Ok(InstallOutcome::ArgsFile(rel.to_string_lossy().into_owned()));
                }
            }
        }

        let needle = version.to_string();
        let mut names: Vec<String> = std::fs::read_dir(self.base_dir)?
            .filter_map(Result::ok)
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        names.sort();
        for name in names {
            let lower = name.to_ascii_lowercase();
            if lower.ends_with(".jar")
                && lower.contains("forge")
                && name.contains(&needle)
                && name != self.installer_name
            {
                info!(jar = %name, "found patched server jar");
                return Ok(InstallOutcome::PatchedJar(name));
            }
        }

        Err(DeployError::Installer(format!(
            "installer produced no {args_name} and no patched server jar for {version}"
        )))
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Pull the game version out of an installer file name, e.g.
/// `forge-1.12.2-14.23.5.2859-installer.jar`. Fallback for installers
/// whose profile does not name it.
fn guess_game_version(file_name: &str) -> Option<GameVersion> {
    let stem = file_name.strip_suffix(".jar").unwrap_or(file_name);
    for segment in stem.split('-') {
        if !segment.contains('.') {
            continue;
        }
        if let Ok(version) = GameVersion::parse(segment) {
            return Some(version);
        }
    }
    None
}

fn stderr_excerpt(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let mut lines: Vec<&str> = text.lines().rev().take(5).collect();
    lines.reverse();
    lines.join("\n")
}
