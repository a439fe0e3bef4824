use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{AudioError, Result};
use crate::instance::InstanceCell;

/// Identifies a playback instance within its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.0)
    }
}

struct Entry {
    cell: Arc<InstanceCell>,
    transient: bool,
}

/// Transient count below which the implicit sweep never runs.
const SWEEP_FLOOR: usize = 32;

/// A buffer's live instances.
///
/// Holding a cell here does not keep the instance's handle alive; it only lets the
/// buffer reach and stop the instance during teardown.
pub(crate) struct InstanceRegistry {
    disposed: bool,
    next_id: u64,
    entries: HashMap<InstanceId, Entry>,
    transient_count: usize,
    sweep_at: usize,
}

impl InstanceRegistry {
    pub(crate) fn new() -> Self {
        Self {
            disposed: false,
            next_id: 1,
            entries: HashMap::new(),
            transient_count: 0,
            sweep_at: SWEEP_FLOOR,
        }
    }

    /// Track a new instance. Fails once teardown has started.
    pub(crate) fn register(&mut self, transient: bool) -> Result<Arc<InstanceCell>> {
        if self.disposed {
            return Err(AudioError::BufferDisposed);
        }
        let id = InstanceId(self.next_id);
        self.next_id += 1;
        let cell = Arc::new(InstanceCell::new(id));
        self.entries.insert(id, Entry { cell: cell.clone(), transient });
        if transient {
            self.transient_count += 1;
        }
        Ok(cell)
    }

    pub(crate) fn remove(&mut self, id: InstanceId) -> bool {
        match self.entries.remove(&id) {
            Some(entry) => {
                if entry.transient {
                    self.transient_count -= 1;
                }
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub(crate) fn transients(&self) -> Vec<Arc<InstanceCell>> {
        self.entries
            .values()
            .filter(|e| e.transient)
            .map(|e| e.cell.clone())
            .collect()
    }

    /// Transients to sweep, once their count has doubled since the last sweep.
    pub(crate) fn transients_due(&self) -> Option<Vec<Arc<InstanceCell>>> {
        (self.transient_count >= self.sweep_at).then(|| self.transients())
    }

    /// Record a finished sweep; the next implicit one waits for the survivors to double.
    pub(crate) fn swept(&mut self) {
        self.sweep_at = (self.transient_count * 2).max(SWEEP_FLOOR);
    }

    /// Mark the registry disposed and hand back every tracked cell, exactly once.
    pub(crate) fn begin_teardown(&mut self) -> Option<Vec<Arc<InstanceCell>>> {
        if self.disposed {
            return None;
        }
        self.disposed = true;
        self.transient_count = 0;
        let mut cells: Vec<_> = self.entries.drain().map(|(_, e)| e.cell).collect();
        cells.sort_by_key(|c| c.id());
        Some(cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_after_teardown_fails() {
        let mut reg = InstanceRegistry::new();
        let a = reg.register(false).unwrap();
        let b = reg.register(true).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(reg.transients().len(), 1);

        let cells = reg.begin_teardown().unwrap();
        assert_eq!(cells.len(), 2);
        assert_eq!(reg.len(), 0);
        assert!(reg.begin_teardown().is_none());
        match reg.register(false) {
            Err(AudioError::BufferDisposed) => {}
            other => panic!("expected BufferDisposed, got {:?}", other.map(|c| c.id())),
        }
    }

    #[test]
    fn sweep_threshold_doubles_with_survivors() {
        let mut reg = InstanceRegistry::new();
        let cells: Vec<_> = (0..SWEEP_FLOOR).map(|_| reg.register(true).unwrap()).collect();
        reg.register(false).unwrap();
        assert_eq!(reg.transients_due().map(|t| t.len()), Some(SWEEP_FLOOR));

        // Nothing finished: wait for twice as many before looking again.
        reg.swept();
        assert!(reg.transients_due().is_none());
        for _ in 0..SWEEP_FLOOR {
            reg.register(true).unwrap();
        }
        assert_eq!(reg.transients_due().map(|t| t.len()), Some(2 * SWEEP_FLOOR));

        for cell in &cells {
            assert!(reg.remove(cell.id()));
        }
        reg.swept();
        assert!(reg.transients_due().is_none());
        assert_eq!(reg.transients().len(), SWEEP_FLOOR);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut reg = InstanceRegistry::new();
        let a = reg.register(false).unwrap();
        assert!(reg.remove(a.id()));
        assert!(!reg.remove(a.id()));
    }
}
