//! # lazyrun core
//!
//! Deferred loading of an external evaluation runtime, with every request
//! issued before the runtime is ready held in a FIFO queue and delivered
//! exactly once after the load settles.
//!
//! The runtime itself is opaque: it is reached only through a
//! [`RuntimeSource`] (fetch + initialize) and the [`EvalFunction`] it yields.
//!
//! ## Architecture
//!
//! ```text
//! Bridge                ← public entry point: run(input, callback)
//!     │
//! Dispatcher            ← routes: execute now / queue (+ load) / fail fast
//!     │         ╲
//!     │          Loader ← single-shot fetch + initialize, one completion hook
//!     │
//! SharedState           ← LoaderState + RequestQueue behind one lock
//!     │
//! adapter::invoke       ← the only caller of EvalFunction::call
//! ```

pub mod adapter;
pub mod bridge;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod loader;
pub mod process;
pub mod request;
pub mod source;
pub mod state;

pub use adapter::{EvalFunction, EvalResult, invoke};
pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use dispatcher::{Dispatcher, RUNTIME_UNAVAILABLE_MESSAGE};
pub use error::{ConfigError, LoadError};
pub use loader::{LoadOutcome, LoadSettings, Loader};
pub use process::ProcessRuntimeSource;
pub use request::{Callback, EvalOutput, PendingRequest, RequestQueue};
pub use source::{RuntimeModule, RuntimeSource};
pub use state::{LoaderState, SharedState};
