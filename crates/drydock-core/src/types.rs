//! Domain types shared across the drydock subsystems.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a managed server instance. Monotonic, unique, allocated by
/// the store and never reused.
pub type InstanceId = u64;

/// Identifier of a scheduled task.
pub type TaskId = u64;

// ── Instances ──────────────────────────────────────────────────

/// One managed game-server installation: identity, files, and launch
/// configuration, independent of whether it is currently running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: InstanceId,
    pub name: String,
    /// Filesystem root of the installation; the core binary, world data,
    /// and mod-loader working files all live under here.
    pub base_path: PathBuf,
    /// Raw java specification string; interpret via [`JavaSpec::parse`].
    pub java: String,
    /// File name of the server core, relative to `base_path`. When `java`
    /// is the literal `none` this holds a shell command line instead.
    pub core_file: String,
    pub min_memory_mb: u32,
    pub max_memory_mb: u32,
    /// Arguments appended after `-jar <core>`, e.g. `nogui`.
    pub extra_args: Vec<String>,
    /// JVM argument file produced by a mod-loader install, relative to
    /// `base_path`. When set the launch command uses `@file` instead of
    /// `-jar <core>`.
    #[serde(default)]
    pub args_file: Option<String>,
    /// Value for the `-Dfile.encoding=` JVM flag; empty disables the flag.
    pub file_encoding: String,
    /// Line written to the process's stdin to request a graceful shutdown.
    pub stop_command: String,
}

impl InstanceRecord {
    /// Parsed form of the `java` field.
    pub fn java_spec(&self) -> JavaSpec {
        JavaSpec::parse(&self.java)
    }

    /// Absolute path of the configured core file.
    pub fn core_path(&self) -> PathBuf {
        self.base_path.join(&self.core_file)
    }
}

/// How an instance's Java runtime is specified.
///
/// The record stores this as a single string: a literal executable path, the
/// literal token `none` ("run the core file as a shell command instead"), or
/// a symbolic runtime identifier to be resolved against the runtime catalog
/// and provisioned by the deployment pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JavaSpec {
    /// Path to a Java executable, absolute or relative to the base path.
    Path(PathBuf),
    /// The literal `none`: no JVM, the core file is a shell command line.
    Shell,
    /// Symbolic identifier, e.g. `temurin-17`, resolved via the catalog.
    Runtime(String),
}

impl JavaSpec {
    /// Classify a raw `java` field. Infallible: anything that is not `none`
    /// and does not look like a path is a symbolic runtime identifier.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("none") {
            JavaSpec::Shell
        } else if raw.contains('/')
            || raw.contains('\\')
            || raw.starts_with('.')
            || raw.ends_with(".exe")
        {
            JavaSpec::Path(PathBuf::from(raw))
        } else {
            JavaSpec::Runtime(raw.to_string())
        }
    }

    /// Render back to the record's string form.
    pub fn as_field(&self) -> String {
        match self {
            JavaSpec::Path(p) => p.display().to_string(),
            JavaSpec::Shell => "none".to_string(),
            JavaSpec::Runtime(id) => id.clone(),
        }
    }
}

// ── Deployment jobs ────────────────────────────────────────────

/// Where the pipeline obtains the server core binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreSource {
    /// A previously-uploaded file staged under the uploads directory,
    /// installed into the instance as `file_name`.
    Upload { key: String, file_name: String },
    /// Remote download with an optional sha256 integrity check. When
    /// `file_name` is absent the last URL path segment is used.
    Url {
        url: String,
        sha256: Option<String>,
        file_name: Option<String>,
    },
    /// Keep whatever core file the instance already has.
    None,
}

/// One unit of provisioning work, consumed exactly once by the queue worker
/// and discarded after its terminal status is reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployJob {
    pub instance_id: InstanceId,
    /// Symbolic runtime identifier to provision; `None` skips runtime
    /// acquisition (the record's existing `java` stands).
    pub runtime: Option<String>,
    pub core: CoreSource,
    /// Upload key of an optional content package to unpack into the base
    /// directory before anything else.
    pub package: Option<String>,
    /// Target directory for unpack and core placement; mirrors the
    /// instance record's `base_path` at submission time.
    pub base_dir: PathBuf,
    /// Ask the supervisor to start the instance once the pipeline succeeds.
    pub start_after: bool,
}

impl DeployJob {
    /// A job that only (re)acquires the core binary for an instance.
    pub fn core_only(instance_id: InstanceId, base_dir: PathBuf, core: CoreSource) -> Self {
        Self {
            instance_id,
            runtime: None,
            core,
            package: None,
            base_dir,
            start_after: false,
        }
    }
}

// ── Scheduled tasks ────────────────────────────────────────────

/// What a scheduled task does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    /// Inject the payload as a console command.
    Command,
    Start,
    Stop,
    /// Announce, stop, wait for exit, start again.
    Restart,
    /// Flush world state and archive the instance directory.
    Backup,
}

/// A declarative recurring task evaluated by the scheduler every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleTask {
    pub id: TaskId,
    pub instance_id: InstanceId,
    /// Seconds-resolution cron expression, evaluated in local time.
    pub cron: String,
    pub action: TaskAction,
    /// Command text for [`TaskAction::Command`]; optional sub-path for
    /// [`TaskAction::Backup`]; ignored otherwise.
    pub payload: String,
    pub enabled: bool,
    /// Last firing instant. The only field the scheduler itself mutates;
    /// moves forward only.
    pub last_run: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_java_spec_none_token() {
        assert_eq!(JavaSpec::parse("none"), JavaSpec::Shell);
        assert_eq!(JavaSpec::parse(" None "), JavaSpec::Shell);
    }

    #[test]
    fn test_java_spec_paths() {
        assert_eq!(
            JavaSpec::parse("/usr/bin/java"),
            JavaSpec::Path(PathBuf::from("/usr/bin/java"))
        );
        assert_eq!(
            JavaSpec::parse("./jdk/bin/java"),
            JavaSpec::Path(PathBuf::from("./jdk/bin/java"))
        );
        assert_eq!(
            JavaSpec::parse("java.exe"),
            JavaSpec::Path(PathBuf::from("java.exe"))
        );
    }

    #[test]
    fn test_java_spec_symbolic() {
        assert_eq!(
            JavaSpec::parse("temurin-17"),
            JavaSpec::Runtime("temurin-17".to_string())
        );
    }

    #[test]
    fn test_java_spec_round_trip() {
        for raw in ["/opt/java/bin/java", "none", "temurin-21"] {
            assert_eq!(JavaSpec::parse(raw).as_field(), raw);
        }
    }

    #[test]
    fn test_core_source_serde_shape() {
        let src = CoreSource::Url {
            url: "https://example.com/server.jar".to_string(),
            sha256: None,
            file_name: None,
        };
        let json = serde_json::to_string(&src).unwrap();
        assert!(json.contains("\"url\""));
        let back: CoreSource = serde_json::from_str(&json).unwrap();
        assert_eq!(back, src);
    }

    #[test]
    fn test_core_path_join() {
        let rec = InstanceRecord {
            id: 1,
            name: "survival".to_string(),
            base_path: PathBuf::from("/srv/drydock/servers/1"),
            java: "temurin-17".to_string(),
            core_file: "server.jar".to_string(),
            min_memory_mb: 1024,
            max_memory_mb: 4096,
            extra_args: vec!["nogui".to_string()],
            args_file: None,
            file_encoding: "UTF-8".to_string(),
            stop_command: "stop".to_string(),
        };
        assert_eq!(
            rec.core_path(),
            PathBuf::from("/srv/drydock/servers/1/server.jar")
        );
    }
}
