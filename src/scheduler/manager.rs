use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ControllerConfig;
use crate::error::{ControllerError, Result};
use crate::scheduler::pipeline::Pipeline;
use crate::scheduler::queue::{task_queue, TaskReceiver, TaskSender};
use crate::scheduler::task::Task;
use crate::synchronizer::SynchronizerManager;

/// Owns the fixed pipeline registry and the dispatch worker.
///
/// Every remote assignment goes through one background worker, so the
/// "read load, pick minimum, call, commit" sequence never overlaps with
/// itself. Other callers only mutate the registry and enqueue tasks.
pub struct PipelineManager {
    pipelines: RwLock<BTreeMap<u64, Pipeline>>,
    synchronizers: Arc<SynchronizerManager>,
    tasks: TaskSender,
    receiver: Mutex<Option<TaskReceiver>>,
    retry_interval: Duration,
    unassigned_warn_after: Duration,
}

impl PipelineManager {
    pub fn new(config: &ControllerConfig, synchronizers: Arc<SynchronizerManager>) -> Self {
        let pipelines: BTreeMap<u64, Pipeline> = (0..config.pipeline_count)
            .map(|id| (id, Pipeline::new(id)))
            .collect();
        let (tasks, receiver) = task_queue(pipelines.len());

        Self {
            pipelines: RwLock::new(pipelines),
            synchronizers,
            tasks,
            receiver: Mutex::new(Some(receiver)),
            retry_interval: config.retry_interval(),
            unassigned_warn_after: config.unassigned_warn_after(),
        }
    }

    /// Adopt recovered ownership and queue every pipeline still unowned.
    pub async fn initialize(&self, recovered: &[(u64, String)]) -> Result<()> {
        let unowned: Vec<u64> = {
            let mut pipelines = self.pipelines.write().await;
            for (pipeline_id, synchronizer_id) in recovered {
                match pipelines.get_mut(pipeline_id) {
                    Some(pipeline) => {
                        pipeline.assign(synchronizer_id);
                    }
                    None => {
                        tracing::warn!(
                            pipeline_id,
                            synchronizer_id = %synchronizer_id,
                            "Recovered assignment for unknown pipeline ignored"
                        );
                    }
                }
            }
            pipelines
                .values()
                .filter(|p| !p.is_assigned())
                .map(|p| p.id)
                .collect()
        };

        tracing::info!(
            pipelines = self.count().await,
            recovered = recovered.len(),
            unowned = unowned.len(),
            "Initialized pipelines"
        );

        for pipeline_id in unowned {
            self.tasks.submit(Task::anywhere(pipeline_id));
        }
        Ok(())
    }

    /// Spawn the dispatch worker. It runs until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker was already started.
    pub async fn start(self: &Arc<Self>, shutdown: CancellationToken) -> Result<JoinHandle<()>> {
        let receiver = self
            .receiver
            .lock()
            .await
            .take()
            .ok_or_else(|| ControllerError::Internal("dispatch worker already started".into()))?;

        let manager = self.clone();
        Ok(tokio::spawn(async move {
            manager.dispatch_loop(receiver, shutdown).await;
        }))
    }

    /// Drain the queue forever, retrying failed tasks at the tail.
    ///
    /// A fixed pause precedes every attempt so that a cluster with no
    /// synchronizers produces a slow retry cycle instead of a hot loop.
    async fn dispatch_loop(&self, mut receiver: TaskReceiver, shutdown: CancellationToken) {
        tracing::info!("Dispatch worker started");

        loop {
            let task = tokio::select! {
                _ = shutdown.cancelled() => break,
                task = receiver.next() => task,
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.retry_interval) => {}
            }

            if !self.handle_task(&task).await {
                tracing::trace!(task = %task, "Placement failed, requeued");
                receiver.requeue(task);
            }
        }

        tracing::info!("Dispatch worker stopped");
    }

    /// Attempt one task. Returns true when the task can be retired.
    pub async fn handle_task(&self, task: &Task) -> bool {
        match &task.target {
            None => self.dispatch_pipeline(task.pipeline_id).await,
            Some(target) => self.reassign(target, task.pipeline_id).await,
        }
    }

    /// Place an unowned pipeline on the least-loaded synchronizer.
    ///
    /// Returns false when no synchronizer is registered or the remote
    /// assignment failed; the caller must keep the task. A pipeline that
    /// already has an owner counts as placed.
    pub async fn dispatch_pipeline(&self, pipeline_id: u64) -> bool {
        {
            let mut pipelines = self.pipelines.write().await;
            let Some(pipeline) = pipelines.get_mut(&pipeline_id) else {
                tracing::warn!(pipeline_id, "Dropping task for unknown pipeline");
                return true;
            };
            if pipeline.is_assigned() {
                return true;
            }
            if pipeline.take_stale_report(self.unassigned_warn_after) {
                tracing::warn!(
                    pipeline_id,
                    unassigned_secs = pipeline.unassigned_for().map_or(0, |d| d.as_secs()),
                    "Pipeline has had no owner for too long"
                );
            }
        }

        let Some(target) = self.synchronizers.least_loaded().await else {
            tracing::debug!(pipeline_id, "No synchronizer available");
            return false;
        };

        tracing::info!(
            pipeline_id,
            synchronizer_id = %target.id,
            load = target.load(),
            "Assigning pipeline"
        );
        self.place(&target.id, pipeline_id).await
    }

    /// Targeted placement. A target that has left degrades the task to
    /// "place anywhere" if the pipeline is unowned, or retires it otherwise.
    async fn reassign(&self, target: &str, pipeline_id: u64) -> bool {
        let owner = match self.pipelines.read().await.get(&pipeline_id) {
            Some(pipeline) => pipeline.owner.clone(),
            None => {
                tracing::warn!(pipeline_id, "Dropping task for unknown pipeline");
                return true;
            }
        };

        if owner.as_deref() == Some(target) {
            return true;
        }

        if !self.synchronizers.contains(target).await {
            if owner.is_some() {
                tracing::info!(
                    pipeline_id,
                    synchronizer_id = target,
                    "Reassignment target is gone, keeping current owner"
                );
                return true;
            }
            return self.dispatch_pipeline(pipeline_id).await;
        }

        tracing::info!(
            pipeline_id,
            synchronizer_id = target,
            previous = ?owner,
            "Reassigning pipeline"
        );
        self.place(target, pipeline_id).await
    }

    /// Remote assignment followed by the local commit.
    async fn place(&self, target: &str, pipeline_id: u64) -> bool {
        if let Err(e) = self
            .synchronizers
            .client(target)
            .assign_pipeline(pipeline_id)
            .await
        {
            tracing::warn!(
                pipeline_id,
                synchronizer_id = target,
                error = %e,
                "Failed to assign pipeline"
            );
            return false;
        }

        // Held until the owner is set so that a release or unregister cannot
        // slip between the two updates. Lock order: pipelines, then
        // synchronizers.
        let mut pipelines = self.pipelines.write().await;
        let Some(pipeline) = pipelines.get_mut(&pipeline_id) else {
            return true;
        };
        let previous = pipeline.owner.clone();

        match self
            .synchronizers
            .commit_assignment(target, pipeline_id, previous.as_deref())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(
                    pipeline_id,
                    synchronizer_id = target,
                    "Synchronizer left before assignment was committed"
                );
                return false;
            }
            Err(e) => {
                tracing::error!(
                    pipeline_id,
                    synchronizer_id = target,
                    error = %e,
                    "Failed to persist assignment"
                );
            }
        }

        pipeline.assign(target);
        drop(pipelines);
        tracing::info!(pipeline_id, synchronizer_id = target, "Pipeline assigned");
        true
    }

    /// Queue a targeted assignment of `pipeline_id` to `synchronizer_id`.
    pub async fn assign_pipeline(&self, synchronizer_id: &str, pipeline_id: u64) -> Result<()> {
        self.check_exists(synchronizer_id, pipeline_id).await?;
        self.tasks.submit(Task::targeted(synchronizer_id, pipeline_id));
        Ok(())
    }

    /// Take `pipeline_id` away from `synchronizer_id` and queue it for
    /// placement. Unknown synchronizers and pipelines it does not own are
    /// already released.
    pub async fn release_pipeline(&self, synchronizer_id: &str, pipeline_id: u64) -> Result<()> {
        if !self
            .synchronizers
            .remove_pipeline(synchronizer_id, pipeline_id)
            .await?
        {
            return Ok(());
        }
        self.requeue_released(synchronizer_id, pipeline_id).await
    }

    /// Release path for pipelines whose synchronizer has already left the
    /// registry.
    pub async fn release_pipelines(&self, synchronizer_id: &str, pipeline_ids: &[u64]) -> Result<()> {
        for &pipeline_id in pipeline_ids {
            self.requeue_released(synchronizer_id, pipeline_id).await?;
        }
        Ok(())
    }

    async fn requeue_released(&self, synchronizer_id: &str, pipeline_id: u64) -> Result<()> {
        {
            let mut pipelines = self.pipelines.write().await;
            let Some(pipeline) = pipelines.get_mut(&pipeline_id) else {
                return Ok(());
            };
            // Already placed elsewhere; nothing to do.
            if pipeline.is_assigned() && !pipeline.is_owned_by(synchronizer_id) {
                return Ok(());
            }
            pipeline.release();
        }

        tracing::info!(pipeline_id, synchronizer_id, "Released pipeline");
        self.tasks.submit(Task::anywhere(pipeline_id));
        Ok(())
    }

    /// Ask a synchronizer to give up a pipeline. Ownership is not touched
    /// and failures are not retried.
    pub async fn revoke_pipeline(&self, synchronizer_id: &str, pipeline_id: u64) -> Result<()> {
        self.check_exists(synchronizer_id, pipeline_id).await?;
        self.synchronizers
            .client(synchronizer_id)
            .revoke_pipeline(pipeline_id)
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    pipeline_id,
                    synchronizer_id,
                    error = %e,
                    "Failed to revoke pipeline"
                );
            })
    }

    async fn check_exists(&self, synchronizer_id: &str, pipeline_id: u64) -> Result<()> {
        if !self.synchronizers.contains(synchronizer_id).await {
            return Err(ControllerError::SynchronizerNotFound(
                synchronizer_id.to_string(),
            ));
        }
        if !self.pipelines.read().await.contains_key(&pipeline_id) {
            return Err(ControllerError::PipelineNotFound(pipeline_id));
        }
        Ok(())
    }

    pub async fn count(&self) -> usize {
        self.pipelines.read().await.len()
    }

    pub async fn pipeline(&self, pipeline_id: u64) -> Option<Pipeline> {
        self.pipelines.read().await.get(&pipeline_id).cloned()
    }

    pub async fn pipelines(&self) -> Vec<Pipeline> {
        self.pipelines.read().await.values().cloned().collect()
    }

    pub async fn unassigned(&self) -> Vec<u64> {
        self.pipelines
            .read()
            .await
            .values()
            .filter(|p| !p.is_assigned())
            .map(|p| p.id)
            .collect()
    }

    /// Pipelines that have had no owner for at least `threshold`.
    pub async fn stale_unassigned(&self, threshold: Duration) -> Vec<u64> {
        self.pipelines
            .read()
            .await
            .values()
            .filter(|p| p.unassigned_for().is_some_and(|age| age >= threshold))
            .map(|p| p.id)
            .collect()
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.pending()
    }
}
