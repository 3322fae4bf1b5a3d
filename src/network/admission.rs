//! Admission Controller
//!
//! Counting gate that bounds the number of concurrently served connections.
//!
//! ## Concurrency Model
//! - Capacity lives behind one `parking_lot::Mutex`
//! - Blocked acquirers park on a `Condvar`; the mutex is eventually fair,
//!   so no waiter starves even though wake-up order is not FIFO
//! - `shutdown()` wakes every waiter with a rejection

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{MarinaError, Result};

struct Gate {
    in_use: usize,
    shut_down: bool,
}

struct Inner {
    capacity: usize,
    gate: Mutex<Gate>,
    released: Condvar,
}

/// Bounded supply of admission permits
#[derive(Clone)]
pub struct AdmissionController {
    inner: Arc<Inner>,
}

impl AdmissionController {
    /// Create a controller with `capacity` permits
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                capacity,
                gate: Mutex::new(Gate {
                    in_use: 0,
                    shut_down: false,
                }),
                released: Condvar::new(),
            }),
        }
    }

    /// Block until a permit is free
    ///
    /// Returns `AdmissionRejected` once the controller is shut down, including
    /// for callers that were already waiting.
    pub fn acquire(&self) -> Result<AdmissionPermit> {
        let mut gate = self.inner.gate.lock();
        loop {
            if gate.shut_down {
                return Err(MarinaError::AdmissionRejected);
            }
            if gate.in_use < self.inner.capacity {
                gate.in_use += 1;
                tracing::debug!(
                    "Admission granted ({}/{})",
                    gate.in_use,
                    self.inner.capacity
                );
                return Ok(self.permit());
            }
            self.inner.released.wait(&mut gate);
        }
    }

    /// Take a permit only if one is free right now
    pub fn try_acquire(&self) -> Option<AdmissionPermit> {
        let mut gate = self.inner.gate.lock();
        if gate.shut_down || gate.in_use >= self.inner.capacity {
            return None;
        }
        gate.in_use += 1;
        Some(self.permit())
    }

    /// Reject all current and future acquisitions
    pub fn shutdown(&self) {
        let mut gate = self.inner.gate.lock();
        if !gate.shut_down {
            gate.shut_down = true;
            tracing::debug!("Admission controller shut down");
        }
        self.inner.released.notify_all();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.gate.lock().shut_down
    }

    /// Permits currently held
    pub fn in_use(&self) -> usize {
        self.inner.gate.lock().in_use
    }

    /// Permits currently free
    pub fn available(&self) -> usize {
        self.inner.capacity - self.in_use()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    fn permit(&self) -> AdmissionPermit {
        AdmissionPermit {
            inner: Arc::clone(&self.inner),
        }
    }

    fn release(inner: &Inner) {
        let mut gate = inner.gate.lock();
        gate.in_use -= 1;
        tracing::debug!("Admission released ({}/{})", gate.in_use, inner.capacity);
        inner.released.notify_one();
    }
}

/// One unit of admission capacity, returned when dropped
pub struct AdmissionPermit {
    inner: Arc<Inner>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        AdmissionController::release(&self.inner);
    }
}

impl std::fmt::Debug for AdmissionPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionPermit").finish_non_exhaustive()
    }
}
