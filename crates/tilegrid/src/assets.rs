use std::collections::BTreeSet;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingStatus {
    NotRequested,
    Loading,
    Loaded,
    Failed,
}

/// Image loading collaborator. Completion is reported back through
/// [`crate::world::World::asset_loaded`].
pub trait AssetLoader {
    fn load_image(&mut self, name: &str);
    fn loading_status(&self, name: &str) -> LoadingStatus;
}

/// Outstanding image loads with a single completion signal.
///
/// `complete` is reported exactly once per [`PendingLoads::begin`], after the
/// last pending name finishes (immediately when nothing was pending).
#[derive(Debug, Default)]
pub struct PendingLoads {
    pending: BTreeSet<String>,
    armed: bool,
}

impl PendingLoads {
    /// Starts tracking `names`; returns true when they are already all
    /// complete and the completion fired immediately.
    pub fn begin(&mut self, names: impl IntoIterator<Item = String>) -> bool {
        self.pending = names.into_iter().collect();
        self.armed = true;
        debug!(pending = self.pending.len(), "asset_loads_started");
        self.take_completion()
    }

    /// Marks one name complete (loaded or failed). Returns true on the call
    /// that finishes the batch.
    pub fn finish(&mut self, name: &str) -> bool {
        self.pending.remove(name);
        self.take_completion()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.armed = false;
    }

    fn take_completion(&mut self) -> bool {
        if self.armed && self.pending.is_empty() {
            self.armed = false;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_fires_once_after_the_last_load() {
        let mut loads = PendingLoads::default();
        assert!(!loads.begin(["a".to_string(), "b".to_string()]));
        assert!(!loads.finish("a"));
        assert!(!loads.finish("unknown"));
        assert!(loads.finish("b"));
        assert!(!loads.finish("b"));
        assert!(loads.is_complete());
    }

    #[test]
    fn empty_batch_completes_immediately() {
        let mut loads = PendingLoads::default();
        assert!(loads.begin(Vec::new()));
        assert!(!loads.finish("late"));
    }
}
