//! Guard against evaluating the same automation twice at once.
//!
//! Ticks may overlap when a tick outlives the poll interval. An automation
//! whose previous evaluation is still queued or running is skipped by the
//! newer tick instead of being checked concurrently.

use crate::model::AutomationId;
use dashmap::DashSet;
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub(crate) struct InFlight {
    ids: Arc<DashSet<AutomationId>>,
}

impl InFlight {
    /// Marks `id` as in flight, or returns `None` if it already is.
    pub(crate) fn try_acquire(&self, id: AutomationId) -> Option<InFlightGuard> {
        if self.ids.insert(id) {
            Some(InFlightGuard {
                ids: Arc::clone(&self.ids),
                id,
            })
        } else {
            None
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Releases the automation id on drop, including during a panic unwind.
#[derive(Debug)]
pub(crate) struct InFlightGuard {
    ids: Arc<DashSet<AutomationId>>,
    id: AutomationId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.ids.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_refused_until_release() {
        let in_flight = InFlight::default();

        let guard = in_flight.try_acquire(AutomationId(1)).unwrap();
        assert!(in_flight.try_acquire(AutomationId(1)).is_none());
        assert!(in_flight.try_acquire(AutomationId(2)).is_some());
        assert_eq!(in_flight.len(), 1);

        drop(guard);
        assert_eq!(in_flight.len(), 0);
        assert!(in_flight.try_acquire(AutomationId(1)).is_some());
    }

    #[test]
    fn test_guard_released_on_panic() {
        let in_flight = InFlight::default();
        let cloned = in_flight.clone();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = cloned.try_acquire(AutomationId(7)).unwrap();
            panic!("boom");
        }));

        assert!(result.is_err());
        assert!(in_flight.try_acquire(AutomationId(7)).is_some());
    }
}
