use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ControllerConfig;
use crate::error::{ControllerError, Result};
use crate::scheduler::PipelineManager;
use crate::store::Store;
use crate::synchronizer::{Synchronizer, SynchronizerManager};
use crate::transport::Transport;

/// Point-in-time counters for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub synchronizer_count: usize,
    pub pipeline_count: usize,
    pub unassigned: usize,
    pub stale_unassigned: usize,
    pub pending_tasks: usize,
}

/// Control API facade over the two registries.
///
/// Owns both managers and wires unregistration to the pipeline release
/// path. Nothing here blocks on a remote call except the explicit
/// revoke and subscriber pass-throughs.
pub struct Controller {
    config: ControllerConfig,
    synchronizers: Arc<SynchronizerManager>,
    pipelines: Arc<PipelineManager>,
}

impl Controller {
    pub fn new(
        config: ControllerConfig,
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let synchronizers = Arc::new(SynchronizerManager::new(
            store,
            transport,
            config.request_timeout(),
        ));
        let pipelines = Arc::new(PipelineManager::new(&config, synchronizers.clone()));
        Self {
            config,
            synchronizers,
            pipelines,
        }
    }

    /// Reload durable assignments, queue every unowned pipeline and spawn
    /// the dispatch worker.
    ///
    /// Recovery makes no remote calls: synchronizers are assumed to still
    /// hold what the store says they hold.
    pub async fn start(&self, shutdown: CancellationToken) -> Result<JoinHandle<()>> {
        let recovered = self
            .synchronizers
            .restore(self.config.pipeline_count)
            .await?;
        tracing::info!(
            synchronizers = self.synchronizers.count().await,
            assignments = recovered.len(),
            "Restored synchronizers"
        );

        self.pipelines.initialize(&recovered).await?;
        self.pipelines.start(shutdown).await
    }

    pub async fn register(&self, synchronizer_id: &str) -> Result<Synchronizer> {
        self.synchronizers.register(synchronizer_id).await
    }

    /// Remove a synchronizer and queue everything it owned.
    pub async fn unregister(&self, synchronizer_id: &str) -> Result<()> {
        let released = self.synchronizers.unregister(synchronizer_id).await?;
        self.pipelines
            .release_pipelines(synchronizer_id, &released)
            .await
    }

    pub async fn client_count(&self) -> usize {
        self.synchronizers.count().await
    }

    pub async fn pipeline_count(&self) -> usize {
        self.pipelines.count().await
    }

    pub async fn assign_pipeline(&self, synchronizer_id: &str, pipeline_id: u64) -> Result<()> {
        self.pipelines
            .assign_pipeline(synchronizer_id, pipeline_id)
            .await
    }

    pub async fn revoke_pipeline(&self, synchronizer_id: &str, pipeline_id: u64) -> Result<()> {
        self.pipelines
            .revoke_pipeline(synchronizer_id, pipeline_id)
            .await
    }

    pub async fn release_pipeline(&self, synchronizer_id: &str, pipeline_id: u64) -> Result<()> {
        self.pipelines
            .release_pipeline(synchronizer_id, pipeline_id)
            .await
    }

    /// Pipelines owned by a synchronizer, ascending.
    pub async fn get_pipelines(&self, synchronizer_id: &str) -> Result<Vec<u64>> {
        let synchronizer = self
            .synchronizers
            .synchronizer(synchronizer_id)
            .await
            .ok_or_else(|| ControllerError::SynchronizerNotFound(synchronizer_id.to_string()))?;
        let mut ids = synchronizer.pipeline_ids;
        ids.sort_unstable();
        Ok(ids)
    }

    pub async fn register_subscriber(&self, synchronizer_id: &str, subscriber_id: &str) -> Result<()> {
        self.ensure_registered(synchronizer_id).await?;
        self.synchronizers
            .client(synchronizer_id)
            .register_subscriber(subscriber_id)
            .await
    }

    pub async fn unregister_subscriber(
        &self,
        synchronizer_id: &str,
        subscriber_id: &str,
    ) -> Result<()> {
        self.ensure_registered(synchronizer_id).await?;
        self.synchronizers
            .client(synchronizer_id)
            .unregister_subscriber(subscriber_id)
            .await
    }

    pub async fn status(&self) -> ControllerStatus {
        ControllerStatus {
            synchronizer_count: self.synchronizers.count().await,
            pipeline_count: self.pipelines.count().await,
            unassigned: self.pipelines.unassigned().await.len(),
            stale_unassigned: self
                .pipelines
                .stale_unassigned(self.config.unassigned_warn_after())
                .await
                .len(),
            pending_tasks: self.pipelines.pending_tasks(),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn synchronizers(&self) -> &Arc<SynchronizerManager> {
        &self.synchronizers
    }

    pub fn pipelines(&self) -> &Arc<PipelineManager> {
        &self.pipelines
    }

    async fn ensure_registered(&self, synchronizer_id: &str) -> Result<()> {
        if self.synchronizers.contains(synchronizer_id).await {
            Ok(())
        } else {
            Err(ControllerError::SynchronizerNotFound(
                synchronizer_id.to_string(),
            ))
        }
    }
}
