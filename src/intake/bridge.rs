//! Persistence bridge — keeps the snapshot slot in step with the UI position.

use super::model::Snapshot;
use super::state::StepState;

/// Tracks what was last written to the snapshot slot.
#[derive(Debug, Default)]
pub struct SnapshotBridge {
    last_emitted: Option<Snapshot>,
    restored: bool,
}

impl SnapshotBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot to write for `state`, or `None` when nothing changed or the
    /// step is not an active, incomplete one.
    pub fn observe(&mut self, state: &StepState) -> Option<Snapshot> {
        if !state.is_mounted() || state.is_completed() {
            return None;
        }
        let next = state.snapshot();
        if self.last_emitted.as_ref() == Some(&next) {
            return None;
        }
        self.last_emitted = Some(next.clone());
        Some(next)
    }

    /// The slot was cleared; the next active state must be written again.
    pub fn mark_cleared(&mut self) {
        self.last_emitted = None;
    }

    /// Hand out the stored snapshot for restoration. Only the first call
    /// yields anything.
    pub fn take_restore(&mut self, stored: Option<Snapshot>) -> Option<Snapshot> {
        if self.restored {
            return None;
        }
        self.restored = true;
        if let Some(ref snapshot) = stored {
            self.last_emitted = Some(snapshot.clone());
        }
        stored
    }
}
