//! Game-version ordering and installer-era classification.
//!
//! Game versions are dot-separated numeric components with an optional
//! pre-release suffix (`1.20.3-snapshot`). They are not semver: components
//! beyond patch exist, suffixes carry no dotted structure, and ordering is
//! purely numeric with any suffix sorting below the equal release. Each era
//! tier corresponds to a structurally different installer manifest layout,
//! which is why the installer branches on it.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{DeployError, DeployResult};

/// A parsed game version: numeric components plus optional pre-release tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameVersion {
    parts: Vec<u32>,
    pre: Option<String>,
}

impl GameVersion {
    pub fn parse(raw: &str) -> DeployResult<Self> {
        let raw = raw.trim();
        let (numeric, pre) = match raw.split_once('-') {
            Some((n, p)) => (n, Some(p.to_string())),
            None => (raw, None),
        };
        let parts: Result<Vec<u32>, _> = numeric.split('.').map(str::parse).collect();
        match parts {
            Ok(parts) if !parts.is_empty() => Ok(Self { parts, pre }),
            _ => Err(DeployError::Version(raw.to_string())),
        }
    }

    fn release(parts: &[u32]) -> Self {
        Self {
            parts: parts.to_vec(),
            pre: None,
        }
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }
}

impl Ord for GameVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        // Numeric compare with zero-fill: 1.18 == 1.18.0.
        let len = self.parts.len().max(other.parts.len());
        for i in 0..len {
            let a = self.parts.get(i).copied().unwrap_or(0);
            let b = other.parts.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        // Equal numerics: a pre-release sorts below the release.
        match (&self.pre, &other.pre) {
            (None, None) => Ordering::Equal,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for GameVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for GameVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nums: Vec<String> = self.parts.iter().map(u32::to_string).collect();
        write!(f, "{}", nums.join("."))?;
        if let Some(pre) = &self.pre {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

/// Installer manifest era, ordered oldest to newest. Boundaries sit where
/// the manifest layout actually changed: embedded-library installers below
/// 1.17, split library/mapping handling through 1.17, argument files from
/// 1.18, and the reworked argument-file layout from 1.20.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoaderEra {
    /// Below 1.8.
    Ancient,
    /// 1.8 up to (not including) 1.17.
    Legacy,
    /// 1.17.x.
    Transition,
    /// 1.18 up to (not including) 1.20.3.
    Recent,
    /// 1.20.3 and newer.
    Modern,
}

impl LoaderEra {
    pub fn classify(version: &GameVersion) -> Self {
        if *version >= GameVersion::release(&[1, 20, 3]) {
            LoaderEra::Modern
        } else if *version >= GameVersion::release(&[1, 18]) {
            LoaderEra::Recent
        } else if *version >= GameVersion::release(&[1, 17]) {
            LoaderEra::Transition
        } else if *version >= GameVersion::release(&[1, 8]) {
            LoaderEra::Legacy
        } else {
            LoaderEra::Ancient
        }
    }

    /// Newer installers declare downloadable libraries; older ones embed
    /// them in the installer jar.
    pub fn uses_declared_libraries(self) -> bool {
        self >= LoaderEra::Transition
    }

    /// Whether the era's processors need the official server mappings.
    pub fn needs_mappings(self) -> bool {
        self >= LoaderEra::Transition
    }
}

impl fmt::Display for LoaderEra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoaderEra::Ancient => "ancient",
            LoaderEra::Legacy => "legacy",
            LoaderEra::Transition => "transition",
            LoaderEra::Recent => "recent",
            LoaderEra::Modern => "modern",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(raw: &str) -> GameVersion {
        GameVersion::parse(raw).unwrap()
    }

    #[test]
    fn test_era_table() {
        let cases = [
            ("1.20.4", LoaderEra::Modern),
            ("1.20.3", LoaderEra::Modern),
            ("1.20.2", LoaderEra::Recent),
            ("1.19.2", LoaderEra::Recent),
            ("1.18", LoaderEra::Recent),
            ("1.17.1", LoaderEra::Transition),
            ("1.16.5", LoaderEra::Legacy),
            ("1.12.2", LoaderEra::Legacy),
            ("1.8", LoaderEra::Legacy),
            ("1.7.10", LoaderEra::Ancient),
        ];
        for (raw, era) in cases {
            assert_eq!(LoaderEra::classify(&v(raw)), era, "version {raw}");
        }
    }

    #[test]
    fn test_snapshot_sorts_below_release() {
        assert!(v("1.20.3-snapshot") < v("1.20.3"));
        assert!(v("1.20.3") > v("1.20.3-rc1"));
        assert_eq!(v("1.20.3").cmp(&v("1.20.3")), Ordering::Equal);
    }

    #[test]
    fn test_numeric_not_lexicographic() {
        assert!(v("1.9") < v("1.10"));
        assert!(v("1.20.2") < v("1.20.10"));
    }

    #[test]
    fn test_zero_fill() {
        assert_eq!(v("1.18").cmp(&v("1.18.0")), Ordering::Equal);
        assert!(v("1.18") < v("1.18.1"));
    }

    #[test]
    fn test_snapshot_of_boundary_version_drops_an_era() {
        // 1.20.3-snapshot < 1.20.3, so it classifies as the older era.
        assert_eq!(
            LoaderEra::classify(&v("1.20.3-snapshot")),
            LoaderEra::Recent
        );
    }

    #[test]
    fn test_era_capabilities() {
        assert!(LoaderEra::Modern.uses_declared_libraries());
        assert!(LoaderEra::Transition.needs_mappings());
        assert!(!LoaderEra::Legacy.uses_declared_libraries());
        assert!(!LoaderEra::Ancient.needs_mappings());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(GameVersion::parse("latest").is_err());
        assert!(GameVersion::parse("").is_err());
        assert!(GameVersion::parse("1.x.2").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for raw in ["1.20.4", "1.7.10", "1.20.3-snapshot"] {
            assert_eq!(v(raw).to_string(), raw);
        }
    }
}
