//! Process-wide exclusivity for backup create and restore.
//!
//! The coordinator is a single mutex-guarded slot holding the name of the
//! in-flight operation. It is owned by [`BackupService`](super::BackupService)
//! and cloned into whatever needs it; there is no global.
//!
//! A present slot means locked, whatever it holds (an empty string included).
//! Acquisition hands back an [`ActiveBackup`] guard whose `Drop` empties the
//! slot, so every exit path of a create or failed restore releases it.

use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

/// Returned by [`BackupCoordinator::try_acquire`] when the slot is taken.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("backup operation already active: {active:?}")]
pub struct Busy {
    pub active: String,
}

#[derive(Clone, Default, Debug)]
pub struct BackupCoordinator {
    slot: Arc<Mutex<Option<String>>>,
}

impl BackupCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claims the slot for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Busy`] if any operation is already recorded.
    pub fn try_acquire(&self, name: &str) -> Result<ActiveBackup, Busy> {
        let mut slot = self.slot.lock();
        if let Some(active) = slot.as_ref() {
            return Err(Busy {
                active: active.clone(),
            });
        }
        *slot = Some(name.to_string());

        Ok(ActiveBackup {
            slot: Arc::clone(&self.slot),
            name: name.to_string(),
            held: false,
        })
    }

    /// Name of the in-flight operation, if any.
    pub fn current(&self) -> Option<String> {
        self.slot.lock().clone()
    }

    pub fn is_active(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// True only when the slot holds exactly `name`.
    pub fn is_active_name(&self, name: &str) -> bool {
        self.slot.lock().as_deref() == Some(name)
    }

    /// Overwrites the slot without handing out a guard.
    ///
    /// Used by tests and operator tooling to simulate or clear a stuck
    /// operation. Normal code paths go through [`try_acquire`](Self::try_acquire).
    pub fn force(&self, name: Option<&str>) {
        *self.slot.lock() = name.map(str::to_string);
    }
}

/// Ownership of the coordinator slot for one operation.
#[derive(Debug)]
pub struct ActiveBackup {
    slot: Arc<Mutex<Option<String>>>,
    name: String,
    held: bool,
}

impl ActiveBackup {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Keeps the slot occupied for the rest of the process lifetime.
    ///
    /// A committed restore ends in a restart; the lock must stay taken
    /// until then and is only reset by the next process start.
    pub fn hold_until_exit(mut self) {
        self.held = true;
    }
}

impl Drop for ActiveBackup {
    fn drop(&mut self) {
        if !self.held {
            *self.slot.lock() = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_release() {
        let coordinator = BackupCoordinator::new();
        {
            let guard = coordinator.try_acquire("a.zip").unwrap();
            assert_eq!(guard.name(), "a.zip");
            assert_eq!(coordinator.current().as_deref(), Some("a.zip"));
            assert!(coordinator.is_active_name("a.zip"));
            assert!(!coordinator.is_active_name("b.zip"));
        }
        assert!(!coordinator.is_active());
    }

    #[test]
    fn test_busy_regardless_of_value() {
        let coordinator = BackupCoordinator::new();
        coordinator.force(Some(""));

        let err = coordinator.try_acquire("a.zip").unwrap_err();
        assert_eq!(err.active, "");
        assert_eq!(coordinator.current().as_deref(), Some(""));
    }

    #[test]
    fn test_same_name_is_also_busy() {
        let coordinator = BackupCoordinator::new();
        let _guard = coordinator.try_acquire("a.zip").unwrap();
        assert!(coordinator.try_acquire("a.zip").is_err());
    }

    #[test]
    fn test_hold_until_exit_keeps_slot() {
        let coordinator = BackupCoordinator::new();
        coordinator.try_acquire("r.zip").unwrap().hold_until_exit();
        assert_eq!(coordinator.current().as_deref(), Some("r.zip"));
    }

    #[test]
    fn test_concurrent_acquire_admits_one() {
        let coordinator = BackupCoordinator::new();
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let coordinator = coordinator.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    // Leak winners so the slot stays taken for the whole race
                    coordinator
                        .try_acquire(&format!("b{i}.zip"))
                        .map(ActiveBackup::hold_until_exit)
                        .is_ok()
                })
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 1);
    }
}
