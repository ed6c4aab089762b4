//! Tick loop and dispatch.

use std::time::Duration;

use chrono::{Local, Utc};
use drydock_core::{Config, ScheduleTask, StatusHub};
use drydock_store::Store;
use drydock_supervisor::Supervisor;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::due;

/// The one scheduler per daemon. `Clone` shares the underlying handles;
/// clones are taken per dispatched action.
#[derive(Clone)]
pub struct Scheduler {
    pub(crate) store: Store,
    pub(crate) supervisor: Supervisor,
    pub(crate) hub: StatusHub,
    pub(crate) config: Config,
}

impl Scheduler {
    pub fn new(store: Store, supervisor: Supervisor, hub: StatusHub, config: Config) -> Self {
        Self {
            store,
            supervisor,
            hub,
            config,
        }
    }

    /// Drive the tick loop until `shutdown` flips.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let tick = Duration::from_secs(self.config.scheduler.tick_secs.max(1));
        info!(tick_secs = tick.as_secs(), "scheduler started");
        loop {
            tokio::select! {
                _ = sleep(tick) => self.tick(),
                _ = shutdown.changed() => break,
            }
        }
        info!("scheduler stopped");
    }

    /// One evaluation pass over the task list. Firing persists the new
    /// `last_run` before this returns; the action itself runs detached.
    pub(crate) fn tick(&self) {
        let tasks = match self.store.list_tasks() {
            Ok(tasks) => tasks,
            Err(err) => {
                error!(error = %err, "task listing failed, skipping tick");
                return;
            }
        };
        let now = Local::now();
        for task in tasks {
            if !task.enabled {
                continue;
            }
            match due::is_due(&task.cron, task.last_run, now) {
                Ok(true) => self.fire(task),
                Ok(false) => {}
                Err(err) => {
                    warn!(task = task.id, error = %err, "skipping task with invalid cron");
                }
            }
        }
    }

    /// Persist the firing instant, then dispatch the action.
    fn fire(&self, mut task: ScheduleTask) {
        task.last_run = Some(Utc::now());
        // Persist first: a crash between here and the dispatch under-fires
        // on restart instead of double-firing.
        if let Err(err) = self.store.update_task(&task) {
            error!(task = task.id, error = %err, "could not persist firing instant, skipping dispatch");
            return;
        }
        info!(
            task = task.id,
            instance = task.instance_id,
            action = ?task.action,
            "task fired"
        );
        let scheduler = self.clone();
        tokio::spawn(async move {
            if let Err(err) = scheduler.execute(&task).await {
                error!(
                    task = task.id,
                    instance = task.instance_id,
                    error = %err,
                    "scheduled action failed"
                );
            }
        });
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use drydock_core::{InstanceRecord, TaskAction};
    use tempfile::TempDir;

    use super::*;

    fn test_scheduler() -> (Scheduler, Store, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.data_dir = dir.path().to_path_buf();
        let store = Store::open_in_memory();
        let supervisor = Supervisor::new(store.clone(), &config.supervisor);
        let hub = StatusHub::new(Duration::from_secs(10));
        let scheduler = Scheduler::new(store.clone(), supervisor, hub, config);
        (scheduler, store, dir)
    }

    fn seed_instance(store: &Store) -> InstanceRecord {
        let record = InstanceRecord {
            id: 0,
            name: "alpha".into(),
            base_path: std::path::PathBuf::new(),
            java: "none".into(),
            core_file: "server.jar".into(),
            min_memory_mb: 0,
            max_memory_mb: 0,
            extra_args: Vec::new(),
            args_file: None,
            file_encoding: String::new(),
            stop_command: "stop".into(),
        };
        store.create_instance(record).unwrap()
    }

    fn seed_task(store: &Store, instance_id: u64, cron: &str, enabled: bool) -> ScheduleTask {
        store
            .create_task(ScheduleTask {
                id: 0,
                instance_id,
                cron: cron.into(),
                action: TaskAction::Command,
                payload: "list".into(),
                enabled,
                last_run: None,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn never_run_task_fires_on_first_tick() {
        let (scheduler, store, _dir) = test_scheduler();
        let instance = seed_instance(&store);
        let task = seed_task(&store, instance.id, "* * * * * *", true);

        scheduler.tick();

        // tick() persists last_run before returning, so the firing is
        // observable synchronously even though the action runs detached.
        let stored = store.get_task(task.id).unwrap().unwrap();
        assert!(stored.last_run.is_some());
    }

    #[tokio::test]
    async fn disabled_task_never_fires() {
        let (scheduler, store, _dir) = test_scheduler();
        let instance = seed_instance(&store);
        let task = seed_task(&store, instance.id, "* * * * * *", false);

        scheduler.tick();

        let stored = store.get_task(task.id).unwrap().unwrap();
        assert!(stored.last_run.is_none());
    }

    #[tokio::test]
    async fn malformed_cron_is_skipped_without_stopping_the_pass() {
        let (scheduler, store, _dir) = test_scheduler();
        let instance = seed_instance(&store);
        let bad = seed_task(&store, instance.id, "once in a blue moon", true);
        let good = seed_task(&store, instance.id, "* * * * * *", true);

        scheduler.tick();

        assert!(store.get_task(bad.id).unwrap().unwrap().last_run.is_none());
        assert!(store.get_task(good.id).unwrap().unwrap().last_run.is_some());
    }

    #[tokio::test]
    async fn backup_fires_end_to_end_from_a_tick() {
        let (scheduler, store, dir) = test_scheduler();
        let mut instance = seed_instance(&store);
        instance.base_path = dir.path().join("servers").join(instance.id.to_string());
        std::fs::create_dir_all(&instance.base_path).unwrap();
        std::fs::write(instance.base_path.join("server.properties"), "motd=hi").unwrap();
        store.update_instance(&instance).unwrap();
        store
            .create_task(ScheduleTask {
                id: 0,
                instance_id: instance.id,
                cron: "* * * * * *".into(),
                action: TaskAction::Backup,
                payload: String::new(),
                enabled: true,
                last_run: None,
            })
            .unwrap();

        scheduler.tick();

        // The archive is written by the detached action task; poll for it.
        let backups = scheduler.config.backups_dir(instance.id);
        for _ in 0..50 {
            let found = std::fs::read_dir(&backups)
                .map(|entries| entries.count() > 0)
                .unwrap_or(false);
            if found {
                return;
            }
            sleep(Duration::from_millis(100)).await;
        }
        panic!("no backup archive appeared under {}", backups.display());
    }
}
