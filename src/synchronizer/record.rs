use serde::{Deserialize, Serialize};

/// A registered synchronizer and the pipelines it currently owns.
///
/// `pipeline_ids` is the inverse view of pipeline ownership and is only ever
/// changed by the coordinator. Order is insertion order; only its length
/// matters for placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Synchronizer {
    pub id: String,
    #[serde(rename = "pipelines")]
    pub pipeline_ids: Vec<u64>,
}

/// On-disk shape. Older writers could leave `null` entries or omit the list.
#[derive(Deserialize)]
struct StoredSynchronizer {
    #[serde(default)]
    id: String,
    #[serde(default)]
    pipelines: Option<Vec<Option<u64>>>,
}

impl Synchronizer {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pipeline_ids: Vec::new(),
        }
    }

    /// Number of pipelines owned; the placement load metric.
    pub fn load(&self) -> usize {
        self.pipeline_ids.len()
    }

    pub fn owns(&self, pipeline_id: u64) -> bool {
        self.pipeline_ids.contains(&pipeline_id)
    }

    /// Returns false if the pipeline was already owned.
    pub fn add_pipeline(&mut self, pipeline_id: u64) -> bool {
        if self.owns(pipeline_id) {
            return false;
        }
        self.pipeline_ids.push(pipeline_id);
        true
    }

    /// Returns false if the pipeline was not owned.
    pub fn remove_pipeline(&mut self, pipeline_id: u64) -> bool {
        match self.pipeline_ids.iter().position(|&id| id == pipeline_id) {
            Some(idx) => {
                self.pipeline_ids.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn decode(data: &[u8]) -> serde_json::Result<Self> {
        let stored: StoredSynchronizer = serde_json::from_slice(data)?;
        Ok(Self {
            id: stored.id,
            pipeline_ids: stored
                .pipelines
                .unwrap_or_default()
                .into_iter()
                .flatten()
                .collect(),
        })
    }
}
