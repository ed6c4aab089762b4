//! Launch command construction.
//!
//! Pure translation from an [`InstanceRecord`] to the program and
//! argument vector the supervisor spawns. Filesystem checks stay in the
//! supervisor; everything here is deterministic and unit-testable.

use std::path::{Path, PathBuf};

use drydock_core::{InstanceRecord, JavaSpec};

/// A fully resolved launch command. `program` is either a java executable
/// path or a bare shell name resolved via `PATH`.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchPlan {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Build the launch command for a record.
///
/// Shell specs (`java = "none"`) wrap the core field in `sh -c` (`cmd /C`
/// on Windows). Jar launches take memory flags when non-zero, the
/// optional `-Dfile.encoding` flag, then either `@args_file` (set by a
/// mod-loader install) or `-jar <core>`, then the record's extra args.
///
/// Errors are human-readable lines destined for the instance's console
/// ring. A still-symbolic runtime id is one: it means provisioning never
/// ran, and failing here beats spawning a command that cannot work.
pub fn build_plan(record: &InstanceRecord) -> Result<LaunchPlan, String> {
    let java = match record.java_spec() {
        JavaSpec::Shell => {
            let (shell, flag) = if cfg!(windows) { ("cmd", "/C") } else { ("sh", "-c") };
            return Ok(LaunchPlan {
                program: PathBuf::from(shell),
                args: vec![flag.to_string(), record.core_file.clone()],
            });
        }
        JavaSpec::Path(path) => resolve_relative(&path, &record.base_path),
        JavaSpec::Runtime(id) => {
            return Err(format!(
                "java runtime {id} is not provisioned; deploy the instance first"
            ));
        }
    };

    let mut args = Vec::new();
    if record.min_memory_mb > 0 {
        args.push(format!("-Xms{}M", record.min_memory_mb));
    }
    if record.max_memory_mb > 0 {
        args.push(format!("-Xmx{}M", record.max_memory_mb));
    }
    if !record.file_encoding.is_empty() {
        args.push(format!("-Dfile.encoding={}", record.file_encoding));
    }
    match &record.args_file {
        Some(file) => args.push(format!("@{file}")),
        None => {
            args.push("-jar".to_string());
            args.push(record.core_file.clone());
        }
    }
    args.extend(record.extra_args.iter().cloned());

    Ok(LaunchPlan {
        program: java,
        args,
    })
}

/// Relative java paths are taken relative to the instance directory,
/// matching how the pipeline records a provisioned runtime.
fn resolve_relative(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> InstanceRecord {
        InstanceRecord {
            id: 1,
            name: "survival".to_string(),
            base_path: PathBuf::from("/srv/drydock/servers/1"),
            java: "/opt/java/bin/java".to_string(),
            core_file: "server.jar".to_string(),
            min_memory_mb: 1024,
            max_memory_mb: 4096,
            extra_args: vec!["nogui".to_string()],
            args_file: None,
            file_encoding: "UTF-8".to_string(),
            stop_command: "stop".to_string(),
        }
    }

    #[test]
    fn jar_launch_shape() {
        let plan = build_plan(&record()).unwrap();
        assert_eq!(plan.program, PathBuf::from("/opt/java/bin/java"));
        assert_eq!(
            plan.args,
            vec![
                "-Xms1024M",
                "-Xmx4096M",
                "-Dfile.encoding=UTF-8",
                "-jar",
                "server.jar",
                "nogui",
            ]
        );
    }

    #[test]
    fn zero_memory_omits_the_flags() {
        let mut rec = record();
        rec.min_memory_mb = 0;
        rec.max_memory_mb = 0;
        let plan = build_plan(&rec).unwrap();
        assert!(!plan.args.iter().any(|a| a.starts_with("-Xms")));
        assert!(!plan.args.iter().any(|a| a.starts_with("-Xmx")));
    }

    #[test]
    fn empty_encoding_omits_the_flag() {
        let mut rec = record();
        rec.file_encoding = String::new();
        let plan = build_plan(&rec).unwrap();
        assert!(!plan.args.iter().any(|a| a.starts_with("-Dfile.encoding")));
    }

    #[test]
    fn args_file_replaces_jar_launch() {
        let mut rec = record();
        rec.args_file = Some("libraries/net/neoforged/neoforge/21.1.77/unix_args.txt".to_string());
        let plan = build_plan(&rec).unwrap();
        assert!(
            plan.args
                .contains(&"@libraries/net/neoforged/neoforge/21.1.77/unix_args.txt".to_string())
        );
        assert!(!plan.args.contains(&"-jar".to_string()));
        // Extra args still apply after the args file.
        assert_eq!(plan.args.last().map(String::as_str), Some("nogui"));
    }

    #[test]
    fn shell_spec_wraps_core_as_command_line() {
        let mut rec = record();
        rec.java = "none".to_string();
        rec.core_file = "./start.sh --port 25565".to_string();
        let plan = build_plan(&rec).unwrap();
        if cfg!(windows) {
            assert_eq!(plan.program, PathBuf::from("cmd"));
            assert_eq!(plan.args, vec!["/C".to_string(), rec.core_file.clone()]);
        } else {
            assert_eq!(plan.program, PathBuf::from("sh"));
            assert_eq!(plan.args, vec!["-c".to_string(), rec.core_file.clone()]);
        }
    }

    #[test]
    fn relative_java_resolves_under_the_instance() {
        let mut rec = record();
        rec.java = "./runtime/bin/java".to_string();
        let plan = build_plan(&rec).unwrap();
        assert_eq!(plan.program, rec.base_path.join("./runtime/bin/java"));
    }

    #[test]
    fn symbolic_runtime_is_an_error() {
        let mut rec = record();
        rec.java = "temurin-17".to_string();
        let err = build_plan(&rec).unwrap_err();
        assert!(err.contains("temurin-17"));
        assert!(err.contains("not provisioned"));
    }
}
