//! Epoch rendezvous between the coordinator and its worker threads.
//!
//! # Protocol
//!
//! Each worker role (training, validation) owns one [`DispatchGate`]. A
//! worker calls [`DispatchGate::park`] between epochs: this registers it as
//! parked and blocks until the coordinator advances the epoch counter. The
//! coordinator calls [`DispatchGate::dispatch`], which first waits until
//! every worker is parked and then releases all of them at once. A worker
//! that is still finishing the previous epoch therefore can never miss a
//! dispatch, and the coordinator can never release a partial quorum.
//!
//! [`DispatchGate::cancel`] wakes all workers with a shutdown signal. The
//! cancellation flag lives under the same mutex as the wait loop, so a
//! worker parking after cancellation observes it immediately; no signal can
//! be lost and no timeout is needed.
//!
//! Results flow back over per-worker `std::sync::mpsc` channels owned by the
//! coordinator, which receives them in fixed ascending thread-index order.

use log::trace;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// What a parked worker was woken for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Compute one epoch, then park again.
    Dispatch,
    /// Exit the worker loop permanently.
    Shutdown,
}

#[derive(Debug)]
struct GateState {
    /// Workers currently blocked in `park`.
    parked: usize,
    /// Incremented once per dispatch; workers wake on a change.
    epoch: u64,
    /// Once set, never cleared.
    cancelled: bool,
}

/// Rendezvous point for one worker role.
///
/// One mutex guards the whole state; `all_parked` wakes a coordinator
/// waiting for quorum, `dispatch` wakes workers waiting for work.
#[derive(Debug)]
pub struct DispatchGate {
    workers: usize,
    state: Mutex<GateState>,
    all_parked: Condvar,
    dispatch: Condvar,
}

fn lock(state: &Mutex<GateState>) -> MutexGuard<'_, GateState> {
    // A poisoned gate only means a worker panicked mid-epoch; the state
    // itself is a few counters and stays coherent.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DispatchGate {
    /// Create a gate for `workers` worker threads.
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            state: Mutex::new(GateState {
                parked: 0,
                epoch: 0,
                cancelled: false,
            }),
            all_parked: Condvar::new(),
            dispatch: Condvar::new(),
        }
    }

    /// Worker side: announce readiness and block until the next dispatch.
    pub fn park(&self) -> Signal {
        let mut state = lock(&self.state);
        let seen = state.epoch;
        state.parked += 1;
        self.all_parked.notify_one();
        while state.epoch == seen && !state.cancelled {
            state = self
                .dispatch
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.cancelled {
            Signal::Shutdown
        } else {
            Signal::Dispatch
        }
    }

    /// Coordinator side: wait until every worker is parked, then release
    /// them all for one epoch.
    ///
    /// The quorum wait is what guarantees that no worker is still computing
    /// the previous epoch when the counter advances; without it a slow
    /// worker would park after the advance and sleep through the epoch.
    pub fn dispatch(&self) {
        let mut state = lock(&self.state);
        while state.parked < self.workers {
            state = self
                .all_parked
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.parked = 0;
        state.epoch += 1;
        trace!("dispatching epoch round {}", state.epoch);
        self.dispatch.notify_all();
    }

    /// Coordinator side: wake every worker with a shutdown signal.
    ///
    /// Idempotent, and safe to call regardless of how many workers ever
    /// reached the gate; late parkers observe the flag under the mutex.
    pub fn cancel(&self) {
        let mut state = lock(&self.state);
        state.cancelled = true;
        self.dispatch.notify_all();
    }
}
