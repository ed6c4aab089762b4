//! Installer profile — the `install_profile.json` document carried inside a
//! mod-loader installer jar, plus the token substitution its processor
//! argument lists are written in.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::archive;
use crate::error::{DeployError, DeployResult};

pub const PROFILE_ENTRY: &str = "install_profile.json";
const MANIFEST_ENTRY: &str = "META-INF/MANIFEST.MF";

/// A library the installer expects on disk before processors run.
#[derive(Debug, Clone, Deserialize)]
pub struct Library {
    /// Maven coordinate, `group:artifact:version[:classifier]`.
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
}

/// One external build step declared by the profile.
#[derive(Debug, Clone, Deserialize)]
pub struct Processor {
    /// Coordinate of the jar whose manifest names the main class.
    pub jar: String,
    #[serde(default)]
    pub classpath: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Absent means "all sides".
    #[serde(default)]
    pub sides: Option<Vec<String>>,
    #[serde(default)]
    pub task: Option<String>,
}

impl Processor {
    pub fn runs_on_server(&self) -> bool {
        self.sides
            .as_ref()
            .is_none_or(|sides| sides.iter().any(|s| s == "server"))
    }

    /// True for the processor that only fetches development-time mappings;
    /// its output is produced by the mappings step instead.
    pub fn is_dev_mappings_only(&self) -> bool {
        self.task.as_deref() == Some("DOWNLOAD_MOJMAPS")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstallProfile {
    /// Target game version, e.g. `1.20.1`.
    #[serde(default)]
    pub minecraft: Option<String>,
    /// Loader version, e.g. `47.2.0`.
    #[serde(default)]
    pub loader: Option<String>,
    #[serde(default)]
    pub libraries: Vec<Library>,
    #[serde(default)]
    pub processors: Vec<Processor>,
    /// Extra named values referenced by processor arguments.
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

/// Read the profile out of an installer jar. `None` when the jar carries no
/// profile entry at all (ancient installers); malformed JSON is an error.
pub fn read_profile(installer: &Path) -> DeployResult<Option<InstallProfile>> {
    let present = archive::list_entries(installer)?
        .iter()
        .any(|e| e == PROFILE_ENTRY);
    if !present {
        return Ok(None);
    }
    let bytes = archive::read_entry(installer, PROFILE_ENTRY)?;
    let profile = serde_json::from_slice(&bytes)
        .map_err(|e| DeployError::Installer(format!("malformed {PROFILE_ENTRY}: {e}")))?;
    Ok(Some(profile))
}

/// Resolve the `Main-Class` attribute from a jar's manifest.
pub fn read_main_class(jar: &Path) -> DeployResult<String> {
    let bytes = archive::read_entry(jar, MANIFEST_ENTRY)?;
    main_class_from_manifest(&String::from_utf8_lossy(&bytes)).ok_or_else(|| {
        DeployError::Installer(format!("no Main-Class in manifest of {}", jar.display()))
    })
}

/// Manifest values wrap at 72 bytes; a continuation line starts with a
/// single space that is not part of the value.
fn main_class_from_manifest(text: &str) -> Option<String> {
    let mut value: Option<String> = None;
    for raw in text.lines() {
        let line = raw.trim_end_matches('\r');
        if let Some(v) = value.as_mut() {
            match line.strip_prefix(' ') {
                Some(cont) => v.push_str(cont),
                None => break,
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("Main-Class:") {
            value = Some(rest.trim_start().to_string());
        }
    }
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Replace every `{TOKEN}` in `template` with its value from `vars`.
/// Unknown tokens stay verbatim; no filesystem access, no side effects.
pub fn substitute(template: &str, vars: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match tail.find('}') {
            Some(end) => {
                match vars.get(&tail[1..end]) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&tail[..=end]),
                }
                rest = &tail[end + 1..];
            }
            None => {
                out.push_str(tail);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_substitute_known_tokens() {
        let v = vars(&[("ROOT", "/srv/one"), ("SIDE", "server")]);
        assert_eq!(
            substitute("--out {ROOT}/libs --side {SIDE}", &v),
            "--out /srv/one/libs --side server"
        );
    }

    #[test]
    fn test_substitute_unknown_token_stays_verbatim() {
        let v = vars(&[("ROOT", "/srv")]);
        assert_eq!(substitute("{ROOT}/{MYSTERY}", &v), "/srv/{MYSTERY}");
    }

    #[test]
    fn test_substitute_unclosed_brace() {
        let v = vars(&[("A", "x")]);
        assert_eq!(substitute("{A} and {oops", &v), "x and {oops");
    }

    #[test]
    fn test_main_class_plain() {
        let text = "Manifest-Version: 1.0\r\nMain-Class: net.minecraftforge.installer.Main\r\n";
        assert_eq!(
            main_class_from_manifest(text).unwrap(),
            "net.minecraftforge.installer.Main"
        );
    }

    #[test]
    fn test_main_class_continuation_line() {
        let text = "Main-Class: net.minecraftforge.binarypatcher.Co\r\n nsoleTool\r\nBuild-Jdk: 17\r\n";
        assert_eq!(
            main_class_from_manifest(text).unwrap(),
            "net.minecraftforge.binarypatcher.ConsoleTool"
        );
    }

    #[test]
    fn test_main_class_absent() {
        assert!(main_class_from_manifest("Manifest-Version: 1.0\r\n").is_none());
    }

    #[test]
    fn test_profile_parses_with_defaults() {
        let json = r#"{
            "minecraft": "1.20.1",
            "loader": "47.2.0",
            "libraries": [{"name": "net.minecraftforge:forge:1.20.1-47.2.0:universal",
                           "url": "https://repo.example/forge-universal.jar"}],
            "processors": [
                {"jar": "net.minecraftforge:installertools:1.3.0",
                 "args": ["--task", "DOWNLOAD_MOJMAPS"],
                 "task": "DOWNLOAD_MOJMAPS"},
                {"jar": "net.minecraftforge:binarypatcher:1.1.1",
                 "classpath": ["net.md-5:SpecialSource:1.11.0"],
                 "args": ["--patched", "{ROOT}/server.jar"],
                 "sides": ["client"]}
            ],
            "data": {"MAPPINGS": "{ROOT}/temp/mappings.txt"}
        }"#;
        let profile: InstallProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.minecraft.as_deref(), Some("1.20.1"));
        assert_eq!(profile.libraries.len(), 1);
        assert!(profile.processors[0].is_dev_mappings_only());
        assert!(!profile.processors[1].runs_on_server());
        assert!(!profile.processors[1].is_dev_mappings_only());
    }
}
