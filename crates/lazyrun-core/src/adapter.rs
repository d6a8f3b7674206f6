//! External call adapter.
//!
//! [`invoke`] is the only place that calls into the runtime. It normalizes
//! whatever the entry point does (returns, returns nothing, fails, panics)
//! into an [`EvalOutput`].

use crate::request::EvalOutput;
use std::any::Any;
use std::error::Error;
use std::panic::{self, AssertUnwindSafe};

/// What the runtime entry point yields for one input. `Ok(None)` means the
/// call returned nothing.
pub type EvalResult = Result<Option<String>, Box<dyn Error + Send + Sync>>;

const UNDESCRIBED_FAILURE: &str = "evaluation failed";
const UNDESCRIBED_PANIC: &str = "evaluation panicked";

/// The runtime's single string-in/string-out entry point.
pub trait EvalFunction: Send + Sync {
    fn call(&self, input: &str) -> EvalResult;
}

impl<F> EvalFunction for F
where
    F: Fn(&str) -> EvalResult + Send + Sync,
{
    fn call(&self, input: &str) -> EvalResult {
        self(input)
    }
}

/// Run `input` through `eval` and normalize the outcome.
pub fn invoke(eval: &dyn EvalFunction, input: &str) -> EvalOutput {
    match panic::catch_unwind(AssertUnwindSafe(|| eval.call(input))) {
        Ok(Ok(Some(output))) => EvalOutput::ok(output),
        Ok(Ok(None)) => EvalOutput::ok(String::new()),
        Ok(Err(err)) => EvalOutput::error(describe_error(err.as_ref())),
        Err(payload) => EvalOutput::error(describe_panic(payload.as_ref())),
    }
}

fn describe_error(err: &(dyn Error + Send + Sync)) -> String {
    let message = err.to_string();
    if !message.trim().is_empty() {
        return message;
    }
    let debug = format!("{err:?}");
    if debug.trim().is_empty() {
        UNDESCRIBED_FAILURE.to_string()
    } else {
        debug
    }
}

pub(crate) fn describe_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        UNDESCRIBED_PANIC.to_string()
    }
}
