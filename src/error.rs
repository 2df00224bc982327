use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("No such synchronizer: {0}")]
    SynchronizerNotFound(String),

    #[error("No such pipeline: {0}")]
    PipelineNotFound(u64),

    #[error("Synchronizer {synchronizer} rejected {method}: {reason}")]
    RemoteFailure {
        synchronizer: String,
        method: String,
        reason: String,
    },

    #[error("Request {method} to synchronizer {synchronizer} timed out")]
    Timeout {
        synchronizer: String,
        method: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed reply: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ControllerError {
    /// True for lookups of unknown synchronizers or pipelines.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ControllerError::SynchronizerNotFound(_) | ControllerError::PipelineNotFound(_)
        )
    }

    /// True for anything that went wrong on the far side of the transport.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            ControllerError::RemoteFailure { .. }
                | ControllerError::Timeout { .. }
                | ControllerError::Transport(_)
                | ControllerError::Decode(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ControllerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_variants() {
        assert!(ControllerError::SynchronizerNotFound("a".into()).is_not_found());
        assert!(ControllerError::PipelineNotFound(3).is_not_found());
        assert!(!ControllerError::Internal("x".into()).is_not_found());
    }

    #[test]
    fn remote_variants() {
        let err = ControllerError::Timeout {
            synchronizer: "node-a".into(),
            method: "assignPipeline".into(),
        };
        assert!(err.is_remote());
        assert_eq!(
            err.to_string(),
            "Request assignPipeline to synchronizer node-a timed out"
        );
        assert!(!ControllerError::PipelineNotFound(1).is_remote());
    }

    #[test]
    fn pipeline_not_found_message() {
        assert_eq!(
            ControllerError::PipelineNotFound(42).to_string(),
            "No such pipeline: 42"
        );
    }
}
