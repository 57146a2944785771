//! Replicated multi-thread epoch coordinator.
//!
//! A [`ReplicatedTrainer`] owns N network replicas and a fixed pool of 2N
//! worker threads (one training and one validation thread per replica),
//! created once at construction and reused for every epoch. Replica 0 is the
//! canonical network supplied by the caller; replicas 1..N-1 are clones that
//! are re-synchronized to replica 0 at the start of every training epoch.
//!
//! An epoch is one rendezvous round: every worker parks on its role's
//! [`DispatchGate`], the coordinator releases them all at once, each worker
//! computes over its [`Stripe`] of the dataset, and the coordinator collects
//! partial errors (and, for training, merges per-replica gradients) in fixed
//! ascending thread-index order. The striped slices are disjoint and
//! together cover every event exactly once, so the epoch error is the total
//! divided by the event count.

use crate::core::{SupervisedNetwork, TrainError, TrainResult};
use crate::data::{SampleSet, Stripe};
use crate::sync::{DispatchGate, Signal};
use log::{debug, trace};
use ndarray::Array1;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

/// Which pass a worker thread computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Training,
    Validation,
}

impl Role {
    fn tag(self) -> &'static str {
        match self {
            Role::Training => "trn",
            Role::Validation => "val",
        }
    }
}

fn lock_replica<N>(replica: &Mutex<N>) -> MutexGuard<'_, N> {
    replica.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Coordinator for replicated training and validation epochs.
///
/// Generic over the network capability; see the module docs for the epoch
/// protocol. Dropping the trainer cancels both rendezvous gates and joins
/// every worker thread.
pub struct ReplicatedTrainer<N: SupervisedNetwork> {
    replicas: Vec<Arc<Mutex<N>>>,
    train_set: Arc<SampleSet>,
    val_set: Arc<SampleSet>,
    train_gate: Arc<DispatchGate>,
    val_gate: Arc<DispatchGate>,
    train_results: Vec<Receiver<f32>>,
    val_results: Vec<Receiver<f32>>,
    handles: Vec<JoinHandle<()>>,
    threads: usize,
}

impl<N: SupervisedNetwork + 'static> ReplicatedTrainer<N> {
    /// Create a trainer with `threads` replicas over the given epoch buffers.
    ///
    /// `network` becomes replica 0 (the canonical network); the remaining
    /// replicas are clones of it. All 2×`threads` worker threads are spawned
    /// here and live until the trainer is dropped.
    ///
    /// # Errors
    /// `InvalidConfig` for zero threads, `ShapeMismatch` if the network's
    /// layer widths disagree with either sample set, `ThreadSpawn` if a
    /// worker thread cannot be created (already-spawned workers are shut
    /// down before returning).
    pub fn new(
        network: N,
        train_set: Arc<SampleSet>,
        val_set: Arc<SampleSet>,
        threads: usize,
    ) -> TrainResult<Self> {
        if threads == 0 {
            return Err(TrainError::InvalidConfig(
                "At least one worker thread is required".to_string(),
            ));
        }
        for (name, set) in [("training", &train_set), ("validation", &val_set)] {
            if network.input_size() != set.input_size() {
                return Err(TrainError::ShapeMismatch(format!(
                    "Network input size {} does not match {} set input size {}",
                    network.input_size(),
                    name,
                    set.input_size()
                )));
            }
            if network.output_size() != set.output_size() {
                return Err(TrainError::ShapeMismatch(format!(
                    "Network output size {} does not match {} set output size {}",
                    network.output_size(),
                    name,
                    set.output_size()
                )));
            }
        }

        debug!(
            "creating replicated trainer: {} threads, {} training events, {} validation events",
            threads,
            train_set.num_events(),
            val_set.num_events()
        );

        let mut replicas = Vec::with_capacity(threads);
        replicas.push(Arc::new(Mutex::new(network)));
        for _ in 1..threads {
            let clone = lock_replica(&replicas[0]).clone();
            replicas.push(Arc::new(Mutex::new(clone)));
        }

        let train_gate = Arc::new(DispatchGate::new(threads));
        let val_gate = Arc::new(DispatchGate::new(threads));
        let mut handles = Vec::with_capacity(2 * threads);

        let spawned = (|| -> TrainResult<(Vec<Receiver<f32>>, Vec<Receiver<f32>>)> {
            let train_results =
                spawn_role(Role::Training, &replicas, &train_gate, &train_set, &mut handles)?;
            let val_results =
                spawn_role(Role::Validation, &replicas, &val_gate, &val_set, &mut handles)?;
            Ok((train_results, val_results))
        })();
        match spawned {
            Ok((train_results, val_results)) => Ok(Self {
                replicas,
                train_set,
                val_set,
                train_gate,
                val_gate,
                train_results,
                val_results,
                handles,
                threads,
            }),
            Err(e) => {
                // Shut down whatever was spawned before the failure.
                train_gate.cancel();
                val_gate.cancel();
                for handle in handles {
                    let _ = handle.join();
                }
                Err(e)
            }
        }
    }

    /// Number of worker replicas.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run one training epoch and return the mean error over all training
    /// events.
    ///
    /// Steps: synchronize every replica's parameters to replica 0, release
    /// all training workers at once, then collect partial errors in
    /// ascending thread-index order, merging each reporting replica's
    /// gradient (threads 1 and up) into replica 0 as it arrives. The merge
    /// order is part of the contract: it makes the accumulated gradient
    /// numerically reproducible.
    pub fn train_epoch(&mut self) -> f32 {
        {
            let canonical = lock_replica(&self.replicas[0]);
            for replica in self.replicas.iter().skip(1) {
                lock_replica(replica).clone_from(&canonical);
            }
        }

        self.train_gate.dispatch();

        let mut total = 0.0f32;
        for index in 0..self.threads {
            trace!("waiting for training thread {}", index);
            let partial = self.train_results[index]
                .recv()
                .expect("training worker terminated unexpectedly");
            total += partial;
            if index > 0 {
                let mut canonical = lock_replica(&self.replicas[0]);
                let other = lock_replica(&self.replicas[index]);
                canonical.merge_gradient(&other);
            }
        }
        total / self.train_set.num_events() as f32
    }

    /// Run one validation epoch and return the mean error over all
    /// validation events. No replica sync, no gradient merge.
    pub fn validate_epoch(&mut self) -> f32 {
        self.val_gate.dispatch();

        let mut total = 0.0f32;
        for index in 0..self.threads {
            trace!("waiting for validation thread {}", index);
            let partial = self.val_results[index]
                .recv()
                .expect("validation worker terminated unexpectedly");
            total += partial;
        }
        total / self.val_set.num_events() as f32
    }

    /// Read access to the canonical network (replica 0) between epochs.
    pub fn with_network<R>(&self, f: impl FnOnce(&N) -> R) -> R {
        let guard = lock_replica(&self.replicas[0]);
        f(&guard)
    }

    /// Mutable access to the canonical network between epochs, e.g. to apply
    /// the merged gradient or reset accumulators.
    pub fn with_network_mut<R>(&mut self, f: impl FnOnce(&mut N) -> R) -> R {
        let mut guard = lock_replica(&self.replicas[0]);
        f(&mut guard)
    }

    /// Clone of replica `index`'s current state (diagnostic access).
    ///
    /// # Panics
    /// If `index >= threads`.
    pub fn replica_snapshot(&self, index: usize) -> N {
        lock_replica(&self.replicas[index]).clone()
    }
}

impl<N: SupervisedNetwork> Drop for ReplicatedTrainer<N> {
    /// Wake every parked worker with a shutdown signal and join them all.
    ///
    /// Workers only ever run between a dispatch and their result send, and
    /// epochs are complete before `drop` can run, so every worker is parked
    /// here and exits without touching its replica again.
    fn drop(&mut self) {
        debug!("shutting down {} worker threads", self.handles.len());
        self.train_gate.cancel();
        self.val_gate.cancel();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Spawn one role's worker threads, one per replica, pushing their join
/// handles and returning their result receivers in thread-index order.
fn spawn_role<N: SupervisedNetwork + 'static>(
    role: Role,
    replicas: &[Arc<Mutex<N>>],
    gate: &Arc<DispatchGate>,
    set: &Arc<SampleSet>,
    handles: &mut Vec<JoinHandle<()>>,
) -> TrainResult<Vec<Receiver<f32>>> {
    let threads = replicas.len();
    let mut receivers = Vec::with_capacity(threads);
    for (index, replica) in replicas.iter().enumerate() {
        let (tx, rx) = mpsc::channel();
        let gate = Arc::clone(gate);
        let replica = Arc::clone(replica);
        let set = Arc::clone(set);
        let stripe = Stripe::of_thread(index, threads);
        let spawned = thread::Builder::new()
            .name(format!("stripetrain-{}-{}", role.tag(), index))
            .spawn(move || worker_loop(&gate, &tx, &replica, &set, stripe, role));
        match spawned {
            Ok(handle) => {
                handles.push(handle);
                receivers.push(rx);
            }
            Err(e) => return Err(TrainError::ThreadSpawn(e.to_string())),
        }
    }
    Ok(receivers)
}

/// Per-thread worker routine, shared by both roles.
///
/// Parks between epochs; on dispatch, computes the striped partial error on
/// its own replica (and, in the training role, accumulates the weight
/// update per sample), then reports the partial on its result channel.
fn worker_loop<N: SupervisedNetwork>(
    gate: &DispatchGate,
    results: &Sender<f32>,
    replica: &Mutex<N>,
    set: &SampleSet,
    stripe: Stripe,
    role: Role,
) {
    let mut output = Array1::zeros(set.output_size());
    loop {
        if gate.park() == Signal::Shutdown {
            trace!("{} worker {} exiting", role.tag(), stripe.offset);
            return;
        }

        let mut partial = 0.0f32;
        {
            let mut net = lock_replica(replica);
            for i in stripe.indices(set.num_events()) {
                let target = set.target(i);
                partial += net.apply_supervised(set.input(i), target, &mut output);
                if role == Role::Training {
                    net.accumulate_update(&output, target, 0);
                }
            }
        }

        if results.send(partial).is_err() {
            return;
        }
    }
}
