//! In-flight guard keyed by (operation, target id).
//!
//! A second invocation of the same operation against the same target is
//! refused while the first is still running. Unrelated operations, or the
//! same operation on another target, never contend.

use std::collections::HashSet;
use std::sync::Arc;

use leadpilot_core::error::{LeadpilotError, LeadpilotResult};
use parking_lot::Mutex;
use uuid::Uuid;

type Key = (&'static str, Uuid);

#[derive(Debug, Clone, Default)]
pub struct InFlightGuard {
    active: Arc<Mutex<HashSet<Key>>>,
}

impl InFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `(operation, target)` as running. The returned ticket releases
    /// the key when dropped.
    pub fn try_acquire(&self, operation: &'static str, target: Uuid) -> LeadpilotResult<InFlightTicket> {
        let key = (operation, target);
        if !self.active.lock().insert(key) {
            return Err(LeadpilotError::OperationInFlight {
                operation: operation.to_string(),
                target,
            });
        }
        Ok(InFlightTicket {
            active: Arc::clone(&self.active),
            key,
        })
    }

    pub fn is_in_flight(&self, operation: &'static str, target: Uuid) -> bool {
        self.active.lock().contains(&(operation, target))
    }
}

#[derive(Debug)]
#[must_use = "the operation is only guarded while the ticket is alive"]
pub struct InFlightTicket {
    active: Arc<Mutex<HashSet<Key>>>,
    key: Key,
}

impl Drop for InFlightTicket {
    fn drop(&mut self) {
        self.active.lock().remove(&self.key);
    }
}
