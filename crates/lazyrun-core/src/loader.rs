//! Single-shot runtime loader.
//!
//! The first [`Loader::request_load`] moves the shared state from `Idle` to
//! `Loading` and spawns the fetch/verify/initialize sequence. Every later
//! call is a no-op. The outcome is handed to the one completion hook given
//! with that first call; the hook owns publishing the terminal state.
//! Failures are never retried.

use crate::adapter::{EvalFunction, describe_panic};
use crate::error::LoadError;
use crate::source::{RuntimeModule, RuntimeSource};
use crate::state::{LoaderState, SharedState};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

/// Knobs applied to the one load sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSettings {
    /// Expected `sha256:<hex>` digest of the fetched module.
    pub integrity: Option<String>,
    /// Upper bound on fetch + initialize.
    pub timeout: Option<Duration>,
}

/// How the load sequence ended.
pub enum LoadOutcome {
    Ready(Arc<dyn EvalFunction>),
    Failed(LoadError),
}

impl fmt::Debug for LoadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(_) => f.write_str("Ready(..)"),
            Self::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
        }
    }
}

#[derive(Clone)]
pub struct Loader {
    shared: SharedState,
    source: Arc<dyn RuntimeSource>,
    settings: LoadSettings,
    handle: Handle,
}

impl Loader {
    /// `handle` is the runtime the load task is spawned on.
    pub fn new(
        shared: SharedState,
        source: Arc<dyn RuntimeSource>,
        settings: LoadSettings,
        handle: Handle,
    ) -> Self {
        Self {
            shared,
            source,
            settings,
            handle,
        }
    }

    pub fn state(&self) -> LoaderState {
        self.shared.state()
    }

    pub fn location(&self) -> String {
        self.source.location()
    }

    /// Start the load if nothing has requested it yet; return immediately.
    pub fn request_load<F>(&self, on_complete: F)
    where
        F: FnOnce(LoadOutcome) + Send + 'static,
    {
        if !self.shared.begin_load() {
            debug!(state = %self.shared.state(), "runtime load already requested");
            return;
        }

        let location = self.source.location();
        info!(%location, "requesting runtime load");

        let source = Arc::clone(&self.source);
        let settings = self.settings.clone();
        self.handle.spawn(async move {
            let started = Instant::now();
            let load_task =
                tokio::spawn(async move { load_with_timeout(source.as_ref(), &settings).await });
            let loaded = match load_task.await {
                Ok(loaded) => loaded,
                Err(join_err) => Err(LoadError::Panicked {
                    location: location.clone(),
                    message: describe_join_error(join_err),
                }),
            };

            let outcome = match loaded {
                Ok(eval) => {
                    info!(
                        %location,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "runtime ready"
                    );
                    LoadOutcome::Ready(eval)
                }
                Err(err) => {
                    warn!(
                        %location,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        error = %err,
                        "runtime load failed"
                    );
                    LoadOutcome::Failed(err)
                }
            };

            // The hook runs queued evaluations and user callbacks, which may block.
            if let Err(join_err) = tokio::task::spawn_blocking(move || on_complete(outcome)).await
            {
                error!(%location, error = %join_err, "load completion hook did not finish");
            }
        });
    }
}

fn describe_join_error(join_err: JoinError) -> String {
    match join_err.try_into_panic() {
        Ok(payload) => describe_panic(payload.as_ref()),
        Err(join_err) => join_err.to_string(),
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("location", &self.source.location())
            .field("state", &self.shared.state())
            .field("settings", &self.settings)
            .finish()
    }
}

async fn load_with_timeout(
    source: &dyn RuntimeSource,
    settings: &LoadSettings,
) -> Result<Arc<dyn EvalFunction>, LoadError> {
    match settings.timeout {
        Some(limit) => tokio::time::timeout(limit, load(source, settings))
            .await
            .map_err(|_| LoadError::Timeout(limit))?,
        None => load(source, settings).await,
    }
}

async fn load(
    source: &dyn RuntimeSource,
    settings: &LoadSettings,
) -> Result<Arc<dyn EvalFunction>, LoadError> {
    let module = source.fetch().await?;
    debug!(
        location = %module.location,
        bytes = module.bytes.len(),
        "runtime module fetched"
    );
    if let Some(expected) = &settings.integrity {
        verify_integrity(&module, expected)?;
    }
    source.initialize(module).await
}

fn verify_integrity(module: &RuntimeModule, expected: &str) -> Result<(), LoadError> {
    let actual = module.digest();
    if actual.eq_ignore_ascii_case(expected.trim()) {
        debug!(location = %module.location, digest = %actual, "runtime integrity verified");
        Ok(())
    } else {
        Err(LoadError::Integrity {
            location: module.location.clone(),
            expected: expected.trim().to_string(),
            actual,
        })
    }
}
