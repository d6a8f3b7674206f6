//! Process-scoped lifecycle state shared by the loader and the dispatcher.
//!
//! One [`SharedState`] is built per bridge and handed to both components.
//! The loader phase and the request queue sit behind a single lock, so
//! admission, queuing and the terminal transition are atomic with respect
//! to each other. Nothing in here calls back into user code.

use crate::adapter::EvalFunction;
use crate::request::{Callback, PendingRequest, RequestQueue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Observable phase of the runtime loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderState {
    Idle,
    Loading,
    Ready,
    Failed,
}

impl LoaderState {
    /// `Ready` and `Failed` admit no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for LoaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

enum Phase {
    Idle,
    Loading,
    Ready(Arc<dyn EvalFunction>),
    Failed(String),
}

impl Phase {
    fn state(&self) -> LoaderState {
        match self {
            Self::Idle => LoaderState::Idle,
            Self::Loading => LoaderState::Loading,
            Self::Ready(_) => LoaderState::Ready,
            Self::Failed(_) => LoaderState::Failed,
        }
    }
}

struct Lifecycle {
    phase: Phase,
    queue: RequestQueue,
    next_seq: u64,
}

struct Inner {
    lifecycle: Mutex<Lifecycle>,
    changes: watch::Sender<LoaderState>,
}

/// How [`SharedState::admit`] routed a new submission.
pub(crate) enum Admission {
    /// The runtime is ready; run the request now.
    Execute(PendingRequest, Arc<dyn EvalFunction>),
    /// The runtime is permanently unavailable.
    Reject(PendingRequest),
    /// Queued; `start_load` is set when this submission found the loader idle.
    Queued { seq: u64, start_load: bool },
}

/// Terminal outcome a drain publishes once the queue is observed empty.
#[derive(Clone)]
pub(crate) enum Settlement {
    Ready(Arc<dyn EvalFunction>),
    Failed(String),
}

/// Lifecycle state object: loader phase plus the pending request queue.
#[derive(Clone)]
pub struct SharedState {
    inner: Arc<Inner>,
}

impl SharedState {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(LoaderState::Idle);
        Self {
            inner: Arc::new(Inner {
                lifecycle: Mutex::new(Lifecycle {
                    phase: Phase::Idle,
                    queue: RequestQueue::new(),
                    next_seq: 1,
                }),
                changes,
            }),
        }
    }

    pub fn state(&self) -> LoaderState {
        self.lock().phase.state()
    }

    /// Number of requests currently waiting for the runtime.
    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }

    /// Detailed reason recorded when the load failed.
    pub fn load_error(&self) -> Option<String> {
        match &self.lock().phase {
            Phase::Failed(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Receiver that observes every phase transition.
    pub fn subscribe(&self) -> watch::Receiver<LoaderState> {
        self.inner.changes.subscribe()
    }

    /// `Idle → Loading`. Returns false when a load was already started.
    pub(crate) fn begin_load(&self) -> bool {
        let mut lifecycle = self.lock();
        if !matches!(lifecycle.phase, Phase::Idle) {
            return false;
        }
        lifecycle.phase = Phase::Loading;
        self.inner.changes.send_replace(LoaderState::Loading);
        true
    }

    pub(crate) fn admit(&self, input: String, callback: Callback) -> Admission {
        let mut guard = self.lock();
        let lifecycle = &mut *guard;
        let seq = lifecycle.next_seq;
        lifecycle.next_seq += 1;
        let request = PendingRequest::new(seq, input, callback);

        match &lifecycle.phase {
            Phase::Ready(eval) => Admission::Execute(request, Arc::clone(eval)),
            Phase::Failed(_) => Admission::Reject(request),
            Phase::Idle => {
                lifecycle.queue.push(request);
                Admission::Queued {
                    seq,
                    start_load: true,
                }
            }
            Phase::Loading => {
                lifecycle.queue.push(request);
                Admission::Queued {
                    seq,
                    start_load: false,
                }
            }
        }
    }

    /// Take the whole queue, or, when it is empty, publish `settlement` as
    /// the terminal phase in the same critical section and return `None`.
    pub(crate) fn take_batch_or_settle(
        &self,
        settlement: &Settlement,
    ) -> Option<Vec<PendingRequest>> {
        let mut lifecycle = self.lock();
        if !lifecycle.queue.is_empty() {
            return Some(lifecycle.queue.take_all());
        }

        if matches!(lifecycle.phase, Phase::Loading) {
            lifecycle.phase = match settlement {
                Settlement::Ready(eval) => Phase::Ready(Arc::clone(eval)),
                Settlement::Failed(reason) => Phase::Failed(reason.clone()),
            };
            self.inner.changes.send_replace(lifecycle.phase.state());
        }
        None
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.inner
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SharedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lifecycle = self.lock();
        f.debug_struct("SharedState")
            .field("state", &lifecycle.phase.state())
            .field("queued", &lifecycle.queue.len())
            .finish()
    }
}
