//! Public entry point.
//!
//! A [`Bridge`] owns one lifecycle: it builds the shared state and wires the
//! loader and dispatcher to it. Clones share that lifecycle.

use crate::config::BridgeConfig;
use crate::dispatcher::Dispatcher;
use crate::loader::{LoadSettings, Loader};
use crate::process::ProcessRuntimeSource;
use crate::request::EvalOutput;
use crate::source::RuntimeSource;
use crate::state::{LoaderState, SharedState};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

const DELIVERY_LOST_MESSAGE: &str = "evaluation result was lost before delivery";

#[derive(Debug, Clone)]
pub struct Bridge {
    shared: SharedState,
    dispatcher: Dispatcher,
}

impl Bridge {
    /// Nothing is fetched until the first [`Bridge::run`] or [`Bridge::preload`].
    pub fn new(source: Arc<dyn RuntimeSource>, settings: LoadSettings, handle: Handle) -> Self {
        let shared = SharedState::new();
        let loader = Loader::new(shared.clone(), source, settings, handle);
        let dispatcher = Dispatcher::new(shared.clone(), loader);
        Self { shared, dispatcher }
    }

    /// Bridge over the process runtime described by `config`.
    pub fn from_config(config: &BridgeConfig, handle: Handle) -> Self {
        let source = ProcessRuntimeSource::new(config.module.clone(), config.args.clone());
        Self::new(Arc::new(source), config.load_settings(), handle)
    }

    /// Evaluate `input`; the result arrives through `callback`, exactly once.
    pub fn run<F>(&self, input: impl Into<String>, callback: F)
    where
        F: FnOnce(EvalOutput) + Send + 'static,
    {
        self.dispatcher.submit(input, callback);
    }

    pub async fn run_async(&self, input: impl Into<String>) -> EvalOutput {
        let (tx, rx) = oneshot::channel();
        self.run(input, move |output| {
            let _ = tx.send(output);
        });
        rx.await
            .unwrap_or_else(|_| EvalOutput::error(DELIVERY_LOST_MESSAGE))
    }

    /// Blocking form of [`Bridge::run_async`]. Must not be called from a
    /// thread that is driving an async runtime.
    pub fn run_blocking(&self, input: impl Into<String>) -> EvalOutput {
        let (tx, rx) = oneshot::channel();
        self.run(input, move |output| {
            let _ = tx.send(output);
        });
        rx.blocking_recv()
            .unwrap_or_else(|_| EvalOutput::error(DELIVERY_LOST_MESSAGE))
    }

    /// Start loading the runtime ahead of the first request.
    pub fn preload(&self) {
        self.dispatcher.preload();
    }

    /// Wait until the loader reaches `Ready` or `Failed`. Does not itself
    /// start a load.
    pub async fn settled(&self) -> LoaderState {
        let mut changes = self.shared.subscribe();
        let settled = changes
            .wait_for(|state| state.is_terminal())
            .await
            .map(|state| *state);
        settled.unwrap_or_else(|_| self.shared.state())
    }

    pub fn state(&self) -> LoaderState {
        self.shared.state()
    }

    /// Requests waiting for the runtime.
    pub fn queued(&self) -> usize {
        self.shared.queued()
    }

    /// Detailed load failure, for diagnostics. Callers of [`Bridge::run`]
    /// only ever see the fixed unavailable message.
    pub fn load_error(&self) -> Option<String> {
        self.shared.load_error()
    }
}
