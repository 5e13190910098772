//! Strictly ordered execution of work per project.
//!
//! Each key gets its own lane: a worker thread fed by a channel. Work for one
//! key runs one task at a time in submission order, while different keys
//! proceed independently. A task that panics is reported to its own caller
//! and the lane carries on with the next task.
//!
//! Retiring a key closes its lane without cutting queued work short. A lane
//! opened later for the same key waits for the retired worker to drain
//! before running anything, so one key never has two tasks in flight.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, warn};

const SERIALIZER_TARGET: &str = "garnet_host::serializer";

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Errors reported to the submitter of a task.
#[derive(Debug, Clone, Error)]
pub enum SerializerError {
    /// The task panicked before producing a result.
    #[error("task panicked before completing")]
    TaskAbandoned,

    /// The lane shut down before the task ran.
    #[error("lane closed before the task ran")]
    LaneClosed,

    /// The lane's worker thread could not be started.
    #[error("failed to start lane worker: {source}")]
    WorkerSpawn {
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

/// Pending result of an enqueued task.
#[must_use = "a ticket does nothing unless waited on"]
pub struct Ticket<T> {
    receiver: Result<Receiver<thread::Result<T>>, SerializerError>,
}

impl<T> Ticket<T> {
    /// Blocks until the task has run.
    ///
    /// # Errors
    ///
    /// Returns [`SerializerError::TaskAbandoned`] when the task panicked, or
    /// the error that prevented it from being queued.
    pub fn wait(self) -> Result<T, SerializerError> {
        match self.receiver?.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(SerializerError::TaskAbandoned),
            Err(_) => Err(SerializerError::LaneClosed),
        }
    }
}

/// Queue and worker thread serving one key.
struct Lane {
    sender: Sender<Job>,
    worker: JoinHandle<()>,
}

struct Lanes<K> {
    open: HashMap<K, Lane>,
    /// Workers of retired lanes that a successor has not yet taken over.
    retired: HashMap<K, JoinHandle<()>>,
}

/// Runs tasks one at a time per key.
pub struct RequestSerializer<K> {
    lanes: Mutex<Lanes<K>>,
}

impl<K> Default for RequestSerializer<K>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> RequestSerializer<K>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
{
    /// Creates a serializer with no lanes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lanes: Mutex::new(Lanes {
                open: HashMap::new(),
                retired: HashMap::new(),
            }),
        }
    }

    /// Queues `task` on the lane for `key` and returns immediately.
    pub fn enqueue<T, F>(&self, key: &K, task: F) -> Ticket<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (reply, receiver) = mpsc::sync_channel(1);
        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(task));
            if outcome.is_err() {
                warn!(target: SERIALIZER_TARGET, "serialized task panicked");
            }
            if reply.send(outcome).is_err() {
                debug!(target: SERIALIZER_TARGET, "submitter stopped waiting");
            }
        });

        Ticket {
            receiver: self.dispatch(key, job).map(|()| receiver),
        }
    }

    /// Queues `task` on the lane for `key` and waits for its result.
    ///
    /// # Errors
    ///
    /// See [`Ticket::wait`].
    pub fn submit<T, F>(&self, key: &K, task: F) -> Result<T, SerializerError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.enqueue(key, task).wait()
    }

    /// Closes the lane for `key` once its queued tasks have run.
    ///
    /// A later task for the same key starts a fresh lane, which runs only
    /// after the retired one has drained.
    pub fn retire(&self, key: &K) {
        let mut lanes = self.lock_lanes();
        lanes.retired.retain(|_, worker| !worker.is_finished());
        if let Some(Lane { sender, worker }) = lanes.open.remove(key) {
            drop(sender);
            lanes.retired.insert(key.clone(), worker);
            debug!(target: SERIALIZER_TARGET, ?key, "lane retired");
        }
    }

    /// Number of open lanes.
    #[must_use]
    pub fn lane_count(&self) -> usize {
        self.lock_lanes().open.len()
    }

    fn dispatch(&self, key: &K, job: Job) -> Result<(), SerializerError> {
        let mut lanes = self.lock_lanes();

        let pending = match lanes.open.get(key) {
            Some(lane) => match lane.sender.send(job) {
                Ok(()) => return Ok(()),
                Err(mpsc::SendError(returned)) => {
                    if let Some(dead) = lanes.open.remove(key) {
                        lanes.retired.insert(key.clone(), dead.worker);
                    }
                    returned
                }
            },
            None => job,
        };

        let predecessor = lanes.retired.remove(key);
        let lane = spawn_lane(key, predecessor)?;
        lane.sender
            .send(pending)
            .map_err(|_| SerializerError::LaneClosed)?;
        lanes.open.insert(key.clone(), lane);
        Ok(())
    }

    fn lock_lanes(&self) -> MutexGuard<'_, Lanes<K>> {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Starts a worker for `key` that first waits for `predecessor` to finish.
fn spawn_lane<K: Debug>(
    key: &K,
    predecessor: Option<JoinHandle<()>>,
) -> Result<Lane, SerializerError> {
    let (sender, receiver) = mpsc::channel::<Job>();
    let label = format!("{key:?}");

    let worker = thread::Builder::new()
        .name(String::from("garnet-lane"))
        .spawn(move || {
            let drained = predecessor.map_or(Ok(()), JoinHandle::join);
            if drained.is_err() {
                warn!(target: SERIALIZER_TARGET, key = %label, "retired lane panicked");
            }
            for job in receiver {
                job();
            }
            debug!(target: SERIALIZER_TARGET, key = %label, "lane drained");
        })
        .map_err(|source| SerializerError::WorkerSpawn {
            source: Arc::new(source),
        })?;

    debug!(target: SERIALIZER_TARGET, ?key, "lane started");
    Ok(Lane { sender, worker })
}
