//! Maven coordinate parsing for installer libraries and processors.

use std::path::PathBuf;

use crate::error::{DeployError, DeployResult};

/// A `group:artifact:version[:classifier][@ext]` coordinate as used by
/// installer profiles. The extension defaults to `jar`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MavenCoord {
    pub group: String,
    pub artifact: String,
    pub version: String,
    pub classifier: Option<String>,
    pub extension: String,
}

impl MavenCoord {
    pub fn parse(coord: &str) -> DeployResult<Self> {
        let (spec, extension) = match coord.rsplit_once('@') {
            Some((spec, ext)) if !ext.is_empty() => (spec, ext.to_string()),
            _ => (coord, "jar".to_string()),
        };
        let parts: Vec<&str> = spec.split(':').collect();
        if parts.len() < 3 || parts.len() > 4 || parts.iter().any(|p| p.is_empty()) {
            return Err(DeployError::Coordinate(coord.to_string()));
        }
        Ok(Self {
            group: parts[0].to_string(),
            artifact: parts[1].to_string(),
            version: parts[2].to_string(),
            classifier: parts.get(3).map(|c| c.to_string()),
            extension,
        })
    }

    /// `artifact-version[-classifier].ext`
    pub fn file_name(&self) -> String {
        match &self.classifier {
            Some(c) => format!(
                "{}-{}-{}.{}",
                self.artifact, self.version, c, self.extension
            ),
            None => format!("{}-{}.{}", self.artifact, self.version, self.extension),
        }
    }

    /// Repository-relative path: `group/with/slashes/artifact/version/<file>`.
    pub fn repo_path(&self) -> PathBuf {
        let mut path = PathBuf::new();
        for part in self.group.split('.') {
            path.push(part);
        }
        path.push(&self.artifact);
        path.push(&self.version);
        path.push(self.file_name());
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain() {
        let c = MavenCoord::parse("net.minecraftforge:forge:1.20.4-49.0.3").unwrap();
        assert_eq!(c.group, "net.minecraftforge");
        assert_eq!(c.artifact, "forge");
        assert_eq!(c.classifier, None);
        assert_eq!(c.extension, "jar");
        assert_eq!(
            c.repo_path(),
            PathBuf::from("net/minecraftforge/forge/1.20.4-49.0.3/forge-1.20.4-49.0.3.jar")
        );
    }

    #[test]
    fn test_parse_classifier_and_extension() {
        let c = MavenCoord::parse("de.oceanlabs.mcp:mcp_config:1.20.4:mappings@txt").unwrap();
        assert_eq!(c.classifier.as_deref(), Some("mappings"));
        assert_eq!(c.extension, "txt");
        assert_eq!(c.file_name(), "mcp_config-1.20.4-mappings.txt");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(MavenCoord::parse("only:two").is_err());
        assert!(MavenCoord::parse("a:b:c:d:e").is_err());
        assert!(MavenCoord::parse("a::c").is_err());
    }
}
