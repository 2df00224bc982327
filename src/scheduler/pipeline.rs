use std::time::{Duration, Instant};

/// One fixed-ID shard of work and its current owner.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub id: u64,
    pub owner: Option<String>,
    unassigned_since: Option<Instant>,
    stale_reported: bool,
}

impl Pipeline {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            owner: None,
            unassigned_since: Some(Instant::now()),
            stale_reported: false,
        }
    }

    /// Set the owner, returning the previous one.
    pub fn assign(&mut self, synchronizer_id: &str) -> Option<String> {
        self.unassigned_since = None;
        self.stale_reported = false;
        self.owner.replace(synchronizer_id.to_string())
    }

    /// Clear the owner, returning the previous one.
    pub fn release(&mut self) -> Option<String> {
        let previous = self.owner.take();
        if previous.is_some() {
            self.unassigned_since = Some(Instant::now());
            self.stale_reported = false;
        }
        previous
    }

    pub fn is_assigned(&self) -> bool {
        self.owner.is_some()
    }

    pub fn is_owned_by(&self, synchronizer_id: &str) -> bool {
        self.owner.as_deref() == Some(synchronizer_id)
    }

    /// How long the pipeline has been without an owner, `None` if owned.
    pub fn unassigned_for(&self) -> Option<Duration> {
        self.unassigned_since.map(|since| since.elapsed())
    }

    /// Returns true exactly once per unassigned period, after `threshold`.
    pub(crate) fn take_stale_report(&mut self, threshold: Duration) -> bool {
        if self.stale_reported || self.owner.is_some() {
            return false;
        }
        match self.unassigned_for() {
            Some(age) if age >= threshold => {
                self.stale_reported = true;
                true
            }
            _ => false,
        }
    }
}
