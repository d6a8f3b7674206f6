//! Where the runtime comes from.

use crate::adapter::EvalFunction;
use crate::error::LoadError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Raw runtime module as fetched from its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeModule {
    pub location: String,
    pub bytes: Vec<u8>,
}

impl RuntimeModule {
    pub fn new(location: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            location: location.into(),
            bytes,
        }
    }

    /// `sha256:<hex>` digest of the module bytes.
    pub fn digest(&self) -> String {
        let hash = Sha256::digest(&self.bytes);
        format!("sha256:{hash:x}")
    }
}

/// Fetches and initializes the external runtime. The loader calls `fetch`
/// at most once per bridge and passes its result to `initialize`.
#[async_trait]
pub trait RuntimeSource: Send + Sync {
    /// Location reported in logs and errors.
    fn location(&self) -> String;

    async fn fetch(&self) -> Result<RuntimeModule, LoadError>;

    async fn initialize(&self, module: RuntimeModule) -> Result<Arc<dyn EvalFunction>, LoadError>;
}
