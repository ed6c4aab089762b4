//! Execution of fired tasks against the supervisor and the filesystem.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Local;
use drydock_core::{InstanceId, InstanceRecord, ScheduleTask, StatusUpdate, TaskAction};
use tokio::time::sleep;
use tracing::{debug, info};

use crate::error::{ScheduleError, ScheduleResult};
use crate::scheduler::Scheduler;

/// Announcement injected before a scheduled restart stops the process.
const RESTART_ANNOUNCEMENT: &str = "say Server is restarting";

/// Console command that flushes world state ahead of a backup.
const SAVE_COMMAND: &str = "save-all";

/// How long a backup waits after `save-all` before reading the tree.
const SAVE_SETTLE: Duration = Duration::from_secs(2);

impl Scheduler {
    /// Execute one fired task. Runs on a detached task; the spawn
    /// boundary logs the error and nothing propagates further.
    pub(crate) async fn execute(&self, task: &ScheduleTask) -> ScheduleResult<()> {
        match task.action {
            TaskAction::Command => self.run_command(task.instance_id, &task.payload).await,
            TaskAction::Start => self.run_start(task.instance_id).await,
            TaskAction::Stop => self.run_stop(task.instance_id).await,
            TaskAction::Restart => self.run_restart(task.instance_id).await,
            TaskAction::Backup => self.run_backup(task.instance_id, &task.payload).await,
        }
    }

    async fn run_command(&self, id: InstanceId, payload: &str) -> ScheduleResult<()> {
        if self.supervisor.send_command(id, payload).await {
            Ok(())
        } else {
            Err(ScheduleError::NotRunning(id))
        }
    }

    async fn run_start(&self, id: InstanceId) -> ScheduleResult<()> {
        self.supervisor.start(id).await?;
        Ok(())
    }

    async fn run_stop(&self, id: InstanceId) -> ScheduleResult<()> {
        if !self.supervisor.stop(id).await {
            debug!(instance = id, "scheduled stop found nothing running");
        }
        Ok(())
    }

    /// Announce, stop, wait for the old process to die, start again. A
    /// stopped instance is simply started.
    async fn run_restart(&self, id: InstanceId) -> ScheduleResult<()> {
        if !self.supervisor.is_running(id).await {
            self.supervisor.start(id).await?;
            return Ok(());
        }
        self.supervisor.send_command(id, RESTART_ANNOUNCEMENT).await;
        sleep(Duration::from_secs(1)).await;
        self.supervisor.stop(id).await;
        let mut attempts = self.config.scheduler.restart_poll_attempts;
        while attempts > 0 && self.supervisor.is_running(id).await {
            sleep(Duration::from_secs(1)).await;
            attempts -= 1;
        }
        self.supervisor.start(id).await?;
        Ok(())
    }

    /// Flush world state when the instance is running, then zip the
    /// instance directory (or the payload sub-path) into the backups tree.
    async fn run_backup(&self, id: InstanceId, payload: &str) -> ScheduleResult<()> {
        let record = self
            .store
            .get_instance(id)?
            .ok_or(ScheduleError::InstanceNotFound(id))?;
        if self.supervisor.is_running(id).await {
            self.supervisor.send_command(id, SAVE_COMMAND).await;
            sleep(SAVE_SETTLE).await;
        }
        let source = backup_source(&record, payload);
        if !source.is_dir() {
            return Err(ScheduleError::Backup(format!(
                "backup source {} does not exist",
                source.display()
            )));
        }
        let backups = self.config.backups_dir(id);
        std::fs::create_dir_all(&backups)?;
        let stamp = Local::now().format("%Y%m%d-%H%M%S");
        let dest = backups.join(format!("{}-{}.zip", record.name, stamp));
        drydock_deploy::archive::zip_dir(&source, &dest)
            .map_err(|err| ScheduleError::Backup(err.to_string()))?;
        info!(instance = id, archive = %dest.display(), "backup created");
        self.hub.publish(
            id,
            StatusUpdate::info(format!("backup created: {}", dest.display())),
        );
        Ok(())
    }
}

/// Directory a backup task archives: the whole instance tree, or a
/// sub-path of it named by the payload.
fn backup_source(record: &InstanceRecord, payload: &str) -> PathBuf {
    let payload = payload.trim();
    if payload.is_empty() {
        record.base_path.clone()
    } else {
        record.base_path.join(payload)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
