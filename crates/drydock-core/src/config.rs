//! drydock.toml configuration parser.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::InstanceId;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub queue: QueueConfig,
    pub supervisor: SupervisorConfig,
    pub scheduler: SchedulerConfig,
    pub runtimes: RuntimesConfig,
    pub vanilla: VanillaConfig,
    pub downloads: DownloadsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root for everything drydock persists: server directories, runtime
    /// trees, upload staging, backups, and the JSON store.
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Bounded capacity of the deployment job queue; submissions beyond
    /// this are rejected with "try again".
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Lines retained per instance console ring.
    pub log_capacity: usize,
    /// Seconds to wait after the graceful shutdown line before force-kill.
    pub stop_timeout_secs: u64,
    /// Collective timeout for the host-shutdown graceful sweep.
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_secs: u64,
    /// How many 1-second polls a restart waits for the old process to die.
    pub restart_poll_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimesConfig {
    /// URL of the runtime catalog JSON; empty means runtime provisioning
    /// is unavailable and symbolic java specs fail deployment.
    pub catalog_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VanillaConfig {
    /// URL of the vanilla version catalog JSON; empty disables vanilla
    /// prefetch and fails installer stages that need a base jar.
    pub catalog_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadsConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/drydock"),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 16 }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            log_capacity: 1000,
            stop_timeout_secs: 10,
            shutdown_timeout_secs: 5,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 1,
            restart_poll_attempts: 30,
        }
    }
}

impl Default for RuntimesConfig {
    fn default() -> Self {
        Self {
            catalog_url: String::new(),
        }
    }
}

impl Default for VanillaConfig {
    fn default() -> Self {
        Self {
            catalog_url: String::new(),
        }
    }
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            user_agent: format!("drydock/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    // ── Data layout ────────────────────────────────────────────
    //
    // servers/<id>/      instance base directories
    // runtimes/<id>/     materialized runtime trees, keyed by catalog id
    // uploads/<key>      staged user uploads
    // backups/<id>/      scheduled archives

    pub fn servers_dir(&self) -> PathBuf {
        self.paths.data_dir.join("servers")
    }

    pub fn server_dir(&self, id: InstanceId) -> PathBuf {
        self.servers_dir().join(id.to_string())
    }

    pub fn runtimes_dir(&self) -> PathBuf {
        self.paths.data_dir.join("runtimes")
    }

    pub fn runtime_dir(&self, runtime_id: &str) -> PathBuf {
        self.runtimes_dir().join(runtime_id)
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.paths.data_dir.join("uploads")
    }

    pub fn upload_path(&self, key: &str) -> PathBuf {
        self.uploads_dir().join(key)
    }

    pub fn backups_dir(&self, id: InstanceId) -> PathBuf {
        self.paths.data_dir.join("backups").join(id.to_string())
    }
}
