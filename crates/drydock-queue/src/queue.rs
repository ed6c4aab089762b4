//! Deployment queue and its single worker.
//!
//! Jobs travel through a bounded mpsc channel in submission order. Exactly
//! one worker consumes them, so at most one deployment runs at a time and
//! every job observes the filesystem state its predecessors left behind.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::watch;
use tracing::{debug, error, info};

use drydock_core::{DeployJob, StatusHub};
use drydock_deploy::{Pipeline, Reporter};
use drydock_supervisor::Supervisor;

use crate::error::{QueueError, QueueResult};

/// Build a queue/worker pair over a channel of the given capacity
/// (clamped to at least one slot).
pub fn channel(
    capacity: usize,
    pipeline: Pipeline,
    supervisor: Supervisor,
    hub: StatusHub,
) -> (DeployQueue, DeployWorker) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (
        DeployQueue { sender },
        DeployWorker {
            receiver,
            pipeline,
            supervisor,
            hub,
        },
    )
}

/// Submission handle for the deployment queue. Cloneable and shareable;
/// all clones feed the same worker.
#[derive(Clone)]
pub struct DeployQueue {
    sender: mpsc::Sender<DeployJob>,
}

impl DeployQueue {
    /// Enqueue a deployment job. Rejected immediately when the queue is
    /// at capacity or the worker is gone.
    pub fn submit(&self, job: DeployJob) -> QueueResult<()> {
        let instance = job.instance_id;
        match self.sender.try_send(job) {
            Ok(()) => {
                info!(instance, "deployment queued");
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(QueueError::Full),
            Err(TrySendError::Closed(_)) => Err(QueueError::Closed),
        }
    }

    /// Queue slots still free.
    pub fn capacity(&self) -> usize {
        self.sender.capacity()
    }
}

/// The queue's single consumer. Owns the receiving end; drives the
/// pipeline one job at a time.
pub struct DeployWorker {
    receiver: mpsc::Receiver<DeployJob>,
    pipeline: Pipeline,
    supervisor: Supervisor,
    hub: StatusHub,
}

impl DeployWorker {
    /// Drive the queue until shutdown. A failed job never stops the
    /// loop; an in-flight job always runs to its terminal status.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("deploy worker started");
        loop {
            tokio::select! {
                job = self.receiver.recv() => {
                    match job {
                        Some(job) => self.process(job).await,
                        None => break,
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("deploy worker stopped");
    }

    async fn process(&self, job: DeployJob) {
        let instance = job.instance_id;
        info!(instance, "deployment dequeued");
        let guard = self.supervisor.begin_deploy(instance);
        let report = Reporter::new(self.hub.reporter(instance));
        let result = self.pipeline.run(&job, &report).await;
        // Terminal status is out; drop the guard before the post-success
        // start so the supervisor does not reject it.
        drop(guard);
        match result {
            Ok(()) if job.start_after => {
                let supervisor = self.supervisor.clone();
                tokio::spawn(async move {
                    if let Err(err) = supervisor.start(instance).await {
                        error!(instance, error = %err, "post-deploy start failed");
                    }
                });
            }
            Ok(()) => {}
            Err(err) => {
                // The pipeline already published the terminal status.
                debug!(instance, error = %err, "deployment job failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::sleep;

    use drydock_core::{Config, CoreSource, InstanceRecord};
    use drydock_store::Store;

    struct Rig {
        queue: DeployQueue,
        worker: DeployWorker,
        store: Store,
        hub: StatusHub,
        supervisor: Supervisor,
        dir: TempDir,
    }

    fn test_rig(capacity: usize) -> Rig {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open_in_memory();
        let mut config = Config::default();
        config.paths.data_dir = dir.path().to_path_buf();
        let hub = StatusHub::new(Duration::from_secs(10));
        let supervisor = Supervisor::new(store.clone(), &config.supervisor);
        let pipeline = Pipeline::new(store.clone(), config).expect("pipeline");
        let (queue, worker) = channel(capacity, pipeline, supervisor.clone(), hub.clone());
        Rig {
            queue,
            worker,
            store,
            hub,
            supervisor,
            dir,
        }
    }

    /// An instance whose deployment touches nothing remote: concrete java
    /// path (skips runtime acquisition), no core source, plain jar name
    /// (skips the installer).
    fn local_instance(rig: &Rig, name: &str) -> InstanceRecord {
        let record = InstanceRecord {
            id: 0,
            name: name.to_string(),
            base_path: PathBuf::new(),
            java: "/usr/bin/java".to_string(),
            core_file: "server.jar".to_string(),
            min_memory_mb: 512,
            max_memory_mb: 1024,
            extra_args: Vec::new(),
            args_file: None,
            file_encoding: String::new(),
            stop_command: "stop".to_string(),
        };
        let mut record = rig.store.create_instance(record).expect("create");
        record.base_path = rig.dir.path().join("servers").join(record.id.to_string());
        rig.store.update_instance(&record).expect("update");
        record
    }

    fn core_only(record: &InstanceRecord) -> DeployJob {
        DeployJob::core_only(record.id, record.base_path.clone(), CoreSource::None)
    }

    async fn wait_percent(hub: &StatusHub, id: u64, percent: i16) -> bool {
        for _ in 0..100 {
            if hub.latest(id).is_some_and(|u| u.percent == Some(percent)) {
                return true;
            }
            sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[tokio::test]
    async fn submit_rejects_when_full() {
        let rig = test_rig(2);
        let record = local_instance(&rig, "a");
        rig.queue.submit(core_only(&record)).expect("first fits");
        rig.queue.submit(core_only(&record)).expect("second fits");
        assert!(matches!(
            rig.queue.submit(core_only(&record)),
            Err(QueueError::Full)
        ));
    }

    #[tokio::test]
    async fn submit_after_worker_dropped_is_closed() {
        let rig = test_rig(2);
        let record = local_instance(&rig, "a");
        drop(rig.worker);
        assert!(matches!(
            rig.queue.submit(core_only(&record)),
            Err(QueueError::Closed)
        ));
    }

    #[tokio::test]
    async fn zero_capacity_is_clamped_to_one() {
        let rig = test_rig(0);
        let record = local_instance(&rig, "a");
        rig.queue.submit(core_only(&record)).expect("one slot");
    }

    #[tokio::test]
    async fn worker_survives_a_failing_job() {
        let rig = test_rig(8);
        let record = local_instance(&rig, "good");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        // A job for an instance that does not exist fails in stage zero.
        rig.queue
            .submit(DeployJob::core_only(
                999,
                rig.dir.path().join("servers/999"),
                CoreSource::None,
            ))
            .expect("submit failing job");
        rig.queue.submit(core_only(&record)).expect("submit good job");
        tokio::spawn(rig.worker.run(shutdown_rx));

        assert!(
            wait_percent(&rig.hub, record.id, 100).await,
            "the job behind the failure still completes"
        );
        let failed = rig.hub.latest(999).expect("failure status published");
        assert!(failed.is_terminal_failure());
        assert!(failed.cause.as_deref().unwrap_or_default().contains("999"));
        shutdown_tx.send(true).expect("signal shutdown");
    }

    #[tokio::test]
    async fn start_after_dispatches_once_the_guard_is_off() {
        let rig = test_rig(4);
        let record = local_instance(&rig, "auto");
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let supervisor = rig.supervisor.clone();

        let mut job = core_only(&record);
        job.start_after = true;
        rig.queue.submit(job).expect("submit");
        tokio::spawn(rig.worker.run(shutdown_rx));

        assert!(wait_percent(&rig.hub, record.id, 100).await);
        // The detached start must be accepted (guard released), then fail
        // validation on the missing core file, leaving a console line.
        let mut seen = false;
        for _ in 0..50 {
            if supervisor
                .logs(record.id)
                .await
                .iter()
                .any(|l| l.contains("missing"))
            {
                seen = true;
                break;
            }
            sleep(Duration::from_millis(50)).await;
        }
        assert!(seen, "post-deploy start reached validation");
    }

    #[tokio::test]
    async fn shutdown_stops_the_worker() {
        let rig = test_rig(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(rig.worker.run(shutdown_rx));
        shutdown_tx.send(true).expect("signal shutdown");
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("worker exits promptly")
            .expect("worker task joins");
    }
}
