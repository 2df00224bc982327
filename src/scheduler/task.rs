use std::fmt;

/// A retriable request to place one pipeline.
///
/// Without a target the pipeline goes to the least-loaded synchronizer;
/// with one it goes to that synchronizer only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub target: Option<String>,
    pub pipeline_id: u64,
}

impl Task {
    pub fn anywhere(pipeline_id: u64) -> Self {
        Self {
            target: None,
            pipeline_id,
        }
    }

    pub fn targeted(synchronizer_id: impl Into<String>, pipeline_id: u64) -> Self {
        Self {
            target: Some(synchronizer_id.into()),
            pipeline_id,
        }
    }

    pub fn is_targeted(&self) -> bool {
        self.target.is_some()
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(f, "pipeline {} -> {}", self.pipeline_id, target),
            None => write!(f, "pipeline {} -> any", self.pipeline_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors() {
        assert!(!Task::anywhere(1).is_targeted());
        let t = Task::targeted("node-a", 2);
        assert!(t.is_targeted());
        assert_eq!(t.target.as_deref(), Some("node-a"));
    }

    #[test]
    fn display() {
        assert_eq!(Task::anywhere(5).to_string(), "pipeline 5 -> any");
        assert_eq!(Task::targeted("b", 6).to_string(), "pipeline 6 -> b");
    }
}
