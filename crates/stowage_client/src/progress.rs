use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

/// Percent complete of every upload that has been enqueued and not yet terminated, keyed by the
/// upload's queue id.
///
/// Cheap to clone; clones share the same board. The lock is never held across an `.await`.
#[derive(Debug, Clone, Default)]
pub struct ProgressBoard {
    entries: Arc<Mutex<HashMap<Uuid, u8>>>,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, u8>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start tracking `id` at 0%.
    pub fn insert(&self, id: Uuid) {
        self.lock().insert(id, 0);
    }

    /// Raise the percentage of `id`. Values lower than the current one and ids no longer
    /// tracked are ignored.
    pub fn update(&self, id: Uuid, percent: u8) {
        if let Some(current) = self.lock().get_mut(&id) {
            *current = (*current).max(percent.min(100));
        }
    }

    pub fn remove(&self, id: &Uuid) -> Option<u8> {
        self.lock().remove(id)
    }

    pub fn get(&self, id: &Uuid) -> Option<u8> {
        self.lock().get(id).copied()
    }

    pub fn snapshot(&self) -> HashMap<Uuid, u8> {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Average over every tracked upload rounded to the nearest percent, `None` when nothing is
    /// tracked.
    pub fn overall(&self) -> Option<u8> {
        let entries = self.lock();
        if entries.is_empty() {
            return None;
        }
        let total: usize = entries.values().map(|p| usize::from(*p)).sum();
        let count = entries.len();
        Some(((total + count / 2) / count) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentages_never_go_down() {
        let board = ProgressBoard::new();
        let id = Uuid::new_v4();
        board.insert(id);
        assert_eq!(board.get(&id), Some(0));

        board.update(id, 40);
        board.update(id, 30);
        assert_eq!(board.get(&id), Some(40));

        board.update(id, 250);
        assert_eq!(board.get(&id), Some(100));
    }

    #[test]
    fn removed_entries_are_not_resurrected() {
        let board = ProgressBoard::new();
        let id = Uuid::new_v4();
        board.insert(id);
        assert_eq!(board.remove(&id), Some(0));

        board.update(id, 50);
        assert_eq!(board.get(&id), None);
        assert!(board.is_empty());
    }

    #[test]
    fn overall_is_the_average() {
        let board = ProgressBoard::new();
        assert_eq!(board.overall(), None);

        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        board.insert(a);
        board.insert(b);
        board.update(a, 100);
        board.update(b, 50);
        assert_eq!(board.overall(), Some(75));
        board.update(b, 51);
        assert_eq!(board.overall(), Some(76));

        let clone = board.clone();
        clone.remove(&a);
        assert_eq!(board.snapshot().len(), 1);
    }
}
