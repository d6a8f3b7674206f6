//! Request routing and queue draining.
//!
//! Every submission is routed under the shared lock:
//! - `Ready`: run through the adapter now
//! - `Failed`: answer with [`RUNTIME_UNAVAILABLE_MESSAGE`]
//! - `Idle` / `Loading`: queue, and trigger the loader when idle
//!
//! The loader's completion hook is [`Dispatcher::drain`]. It takes the queue
//! batch by batch until it finds it empty, and only then publishes the
//! terminal state, so a request submitted during the drain is queued behind
//! the ones already taken instead of overtaking them.

use crate::adapter::invoke;
use crate::loader::{LoadOutcome, Loader};
use crate::request::{EvalOutput, PendingRequest};
use crate::state::{Admission, LoaderState, Settlement, SharedState};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, info};

/// Fixed answer for every request once the runtime failed to load.
pub const RUNTIME_UNAVAILABLE_MESSAGE: &str =
    "evaluation runtime failed to load; reload to try again";

#[derive(Debug, Clone)]
pub struct Dispatcher {
    shared: SharedState,
    loader: Loader,
}

impl Dispatcher {
    pub fn new(shared: SharedState, loader: Loader) -> Self {
        Self { shared, loader }
    }

    pub fn state(&self) -> LoaderState {
        self.shared.state()
    }

    /// Fire-and-forget submission. `callback` runs exactly once, either
    /// before this returns (terminal state) or from the drain.
    pub fn submit<F>(&self, input: impl Into<String>, callback: F)
    where
        F: FnOnce(EvalOutput) + Send + 'static,
    {
        match self.shared.admit(input.into(), Box::new(callback)) {
            Admission::Execute(request, eval) => {
                debug!(seq = request.seq, "runtime ready; evaluating immediately");
                let output = invoke(eval.as_ref(), &request.input);
                request.deliver(output);
            }
            Admission::Reject(request) => {
                debug!(seq = request.seq, "runtime unavailable; rejecting request");
                request.deliver(EvalOutput::error(RUNTIME_UNAVAILABLE_MESSAGE));
            }
            Admission::Queued { seq, start_load } => {
                debug!(seq, "runtime not ready; request queued");
                if start_load {
                    self.start_load();
                }
            }
        }
    }

    /// Trigger the load without submitting anything.
    pub fn preload(&self) {
        self.start_load();
    }

    fn start_load(&self) {
        let dispatcher = self.clone();
        self.loader
            .request_load(move |outcome| dispatcher.drain(outcome));
    }

    fn drain(&self, outcome: LoadOutcome) {
        let settlement = match outcome {
            LoadOutcome::Ready(eval) => Settlement::Ready(eval),
            LoadOutcome::Failed(err) => Settlement::Failed(err.to_string()),
        };

        let mut drained = 0usize;
        while let Some(batch) = self.shared.take_batch_or_settle(&settlement) {
            debug!(batch = batch.len(), "draining queued requests");
            for request in batch {
                drained += 1;
                let output = match &settlement {
                    Settlement::Ready(eval) => invoke(eval.as_ref(), &request.input),
                    Settlement::Failed(_) => EvalOutput::error(RUNTIME_UNAVAILABLE_MESSAGE),
                };
                deliver_isolated(request, output);
            }
        }

        info!(drained, state = %self.shared.state(), "request queue drained");
    }
}

// A panicking callback must not strand the requests queued behind it.
fn deliver_isolated(request: PendingRequest, output: EvalOutput) {
    let seq = request.seq;
    if panic::catch_unwind(AssertUnwindSafe(move || request.deliver(output))).is_err() {
        error!(seq, "request callback panicked during drain");
    }
}
