//! Runner surface.
//!
//! This crate models the interactive side of the bridge: runner containers
//! with a *run* and a *clear* trigger, routed by a [`RunnerBoard`]. The
//! bridge stays behind the [`EvalBackend`] seam; runners only ever submit
//! through it, once per run activation.

pub mod http;

use lazyrun_core::{Bridge, Callback, EvalOutput, LoaderState};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Text shown in the result area while a run is in flight.
pub const RUNNING_INDICATION: &str = "Running...";

const NO_RESULT_MESSAGE: &str = "evaluation backend dropped the request";

pub trait EvalBackend: Send + Sync {
    fn submit(&self, input: String, callback: Callback);

    fn state(&self) -> LoaderState;

    /// Submit and wait for the callback on the current thread.
    fn evaluate_blocking(&self, input: String) -> EvalOutput {
        let (tx, rx) = mpsc::channel();
        self.submit(
            input,
            Box::new(move |output| {
                let _ = tx.send(output);
            }),
        );
        rx.recv()
            .unwrap_or_else(|_| EvalOutput::error(NO_RESULT_MESSAGE))
    }
}

impl EvalBackend for Bridge {
    fn submit(&self, input: String, callback: Callback) {
        self.run(input, callback);
    }

    fn state(&self) -> LoaderState {
        Bridge::state(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStyle {
    Running,
    Output,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPanel {
    pub text: String,
    pub style: ResultStyle,
}

impl ResultPanel {
    fn running() -> Self {
        Self {
            text: RUNNING_INDICATION.to_string(),
            style: ResultStyle::Running,
        }
    }

    fn from_output(output: EvalOutput) -> Self {
        Self {
            style: if output.is_error {
                ResultStyle::Error
            } else {
                ResultStyle::Output
            },
            text: output.output,
        }
    }
}

/// What a runner container currently shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerView {
    pub source: String,
    pub run_enabled: bool,
    /// `None` while the result area is hidden.
    pub result: Option<ResultPanel>,
}

#[derive(Debug)]
struct RunnerCell {
    view: Mutex<RunnerView>,
    settled: Condvar,
}

/// One runner container. Clones share the same view.
#[derive(Debug, Clone)]
pub struct Runner {
    cell: Arc<RunnerCell>,
}

impl Runner {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            cell: Arc::new(RunnerCell {
                view: Mutex::new(RunnerView {
                    source: source.into(),
                    run_enabled: true,
                    result: None,
                }),
                settled: Condvar::new(),
            }),
        }
    }

    pub fn view(&self) -> RunnerView {
        self.lock().clone()
    }

    pub fn set_source(&self, source: impl Into<String>) {
        self.lock().source = source.into();
    }

    /// Run trigger. Returns false (and submits nothing) while disabled.
    pub fn activate_run(&self, backend: &dyn EvalBackend) -> bool {
        let source = {
            let mut view = self.lock();
            if !view.run_enabled {
                return false;
            }
            view.run_enabled = false;
            view.result = Some(ResultPanel::running());
            view.source.clone()
        };

        let cell = Arc::clone(&self.cell);
        backend.submit(
            source,
            Box::new(move |output| {
                let mut view = cell.view.lock().unwrap_or_else(PoisonError::into_inner);
                view.result = Some(ResultPanel::from_output(output));
                view.run_enabled = true;
                cell.settled.notify_all();
            }),
        );
        true
    }

    /// Block until no run is in flight, then return the view.
    pub fn wait_settled(&self) -> RunnerView {
        let view = self
            .cell
            .settled
            .wait_while(self.lock(), |view| !view.run_enabled)
            .unwrap_or_else(PoisonError::into_inner);
        view.clone()
    }

    /// Clear trigger: hide the result area.
    pub fn clear(&self) {
        self.lock().result = None;
    }

    fn lock(&self) -> MutexGuard<'_, RunnerView> {
        self.cell.view.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Run,
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiEvent {
    pub runner_id: String,
    pub trigger: Trigger,
}

impl UiEvent {
    pub fn run(runner_id: impl Into<String>) -> Self {
        Self {
            runner_id: runner_id.into(),
            trigger: Trigger::Run,
        }
    }

    pub fn clear(runner_id: impl Into<String>) -> Self {
        Self {
            runner_id: runner_id.into(),
            trigger: Trigger::Clear,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BoardError {
    #[error("runner not found: {0}")]
    RunnerNotFound(String),
}

/// Delegated trigger handling for every runner mounted on one page.
pub struct RunnerBoard<B: EvalBackend> {
    backend: B,
    runners: BTreeMap<String, Runner>,
}

impl<B: EvalBackend> RunnerBoard<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            runners: BTreeMap::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mount (or replace) the runner with `id`.
    pub fn mount(&mut self, id: impl Into<String>, source: impl Into<String>) -> Runner {
        let runner = Runner::new(source);
        self.runners.insert(id.into(), runner.clone());
        runner
    }

    pub fn runner(&self, id: &str) -> Option<&Runner> {
        self.runners.get(id)
    }

    /// Route one trigger activation. For `Run`, the returned flag tells
    /// whether a submission was made; `Clear` always reports true.
    pub fn handle(&self, event: &UiEvent) -> Result<bool, BoardError> {
        let runner = self
            .runners
            .get(&event.runner_id)
            .ok_or_else(|| BoardError::RunnerNotFound(event.runner_id.clone()))?;
        match event.trigger {
            Trigger::Run => Ok(runner.activate_run(&self.backend)),
            Trigger::Clear => {
                runner.clear();
                Ok(true)
            }
        }
    }
}
