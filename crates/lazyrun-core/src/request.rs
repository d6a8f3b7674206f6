//! Requests waiting for the runtime and the result shape delivered to callers.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Result of one evaluation: the `(output, isError)` pair every callback receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalOutput {
    pub output: String,
    pub is_error: bool,
}

impl EvalOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            output: message.into(),
            is_error: true,
        }
    }
}

/// Result delivery for one submission. `FnOnce` makes double delivery unrepresentable.
pub type Callback = Box<dyn FnOnce(EvalOutput) + Send + 'static>;

/// A submission made before the runtime reached a terminal state.
pub struct PendingRequest {
    pub seq: u64,
    pub input: String,
    callback: Callback,
}

impl PendingRequest {
    pub fn new(seq: u64, input: String, callback: Callback) -> Self {
        Self {
            seq,
            input,
            callback,
        }
    }

    /// Consume the request, handing `output` to its callback.
    pub fn deliver(self, output: EvalOutput) {
        (self.callback)(output)
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("seq", &self.seq)
            .field("input", &self.input)
            .finish_non_exhaustive()
    }
}

/// Strict FIFO of pending requests. Insertion order is drain order.
#[derive(Debug, Default)]
pub struct RequestQueue {
    items: VecDeque<PendingRequest>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: PendingRequest) {
        self.items.push_back(request);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Take every queued request, leaving a fresh empty queue behind.
    pub fn take_all(&mut self) -> Vec<PendingRequest> {
        std::mem::take(&mut self.items).into_iter().collect()
    }
}
