//! Exclusive-access gate for the external classifier process.
//!
//! Concurrent uploads would otherwise fan out an unbounded number of
//! classifier processes. The gate serializes invocations (one in flight
//! at a time) and exposes what is currently running for observability.

use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

/// Snapshot of the classifier invocation currently in flight.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveInvocation {
    pub panel_id: i64,
    pub test_instance_id: i64,
    /// When the invocation started (ISO 8601).
    pub started_at: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("Internal lock error")]
    LockPoisoned,
}

/// Process-wide bound on classifier fan-out.
pub struct ClassifierGate {
    /// Exclusive access lock — only one invocation at a time.
    lock: Mutex<()>,
    /// What's currently running (observable state).
    current: Mutex<Option<ActiveInvocation>>,
}

impl ClassifierGate {
    pub fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            current: Mutex::new(None),
        }
    }

    /// Acquire exclusive access. Blocks until the classifier is free.
    /// The guard must be held for the entire invocation — dropping it
    /// releases the gate and clears the current invocation state.
    pub fn acquire(
        &self,
        panel_id: i64,
        test_instance_id: i64,
    ) -> Result<GateGuard<'_>, GateError> {
        let guard = self.lock.lock().map_err(|_| GateError::LockPoisoned)?;
        if let Ok(mut current) = self.current.lock() {
            *current = Some(ActiveInvocation {
                panel_id,
                test_instance_id,
                started_at: chrono::Utc::now().to_rfc3339(),
            });
        }
        Ok(GateGuard {
            _guard: guard,
            gate: self,
        })
    }

    /// What invocation is currently running? `None` when idle.
    pub fn current_invocation(&self) -> Option<ActiveInvocation> {
        self.current.lock().ok()?.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    fn clear_current(&self) {
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
    }
}

impl Default for ClassifierGate {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII token for exclusive classifier access.
pub struct GateGuard<'a> {
    _guard: MutexGuard<'a, ()>,
    gate: &'a ClassifierGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.clear_current();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_gate_is_idle() {
        let gate = ClassifierGate::new();
        assert!(!gate.is_busy());
        assert!(gate.current_invocation().is_none());
    }

    #[test]
    fn acquire_sets_current_invocation() {
        let gate = ClassifierGate::new();
        let guard = gate.acquire(1, 42).unwrap();
        assert!(gate.is_busy());

        let current = gate.current_invocation().unwrap();
        assert_eq!(current.panel_id, 1);
        assert_eq!(current.test_instance_id, 42);
        assert!(!current.started_at.is_empty());

        drop(guard);
        assert!(!gate.is_busy());
        assert!(gate.current_invocation().is_none());
    }

    #[test]
    fn acquire_blocks_until_released() {
        use std::sync::Arc;
        use std::thread;

        let gate = Arc::new(ClassifierGate::new());
        let gate2 = Arc::clone(&gate);

        let handle = thread::spawn(move || {
            let _guard = gate2.acquire(1, 1).unwrap();
            thread::sleep(std::time::Duration::from_millis(50));
        });

        thread::sleep(std::time::Duration::from_millis(10));

        let start = std::time::Instant::now();
        let _guard = gate.acquire(2, 2).unwrap();
        let waited = start.elapsed();

        assert!(
            waited.as_millis() >= 20,
            "Expected to block, but only waited {}ms",
            waited.as_millis()
        );

        handle.join().unwrap();
    }
}
