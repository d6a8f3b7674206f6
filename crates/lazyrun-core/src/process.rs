//! Process-backed runtime.
//!
//! The runtime module is an executable. Fetching reads its bytes,
//! initializing checks that it can actually be run, and each evaluation
//! spawns it once with the input on stdin and takes stdout, without
//! trailing whitespace, as the output. A non-zero exit is an evaluation
//! error carrying stderr.

use crate::adapter::{EvalFunction, EvalResult};
use crate::error::LoadError;
use crate::source::{RuntimeModule, RuntimeSource};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRuntimeSource {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessRuntimeSource {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl RuntimeSource for ProcessRuntimeSource {
    fn location(&self) -> String {
        self.program.display().to_string()
    }

    async fn fetch(&self) -> Result<RuntimeModule, LoadError> {
        let bytes = tokio::fs::read(&self.program)
            .await
            .map_err(|source| LoadError::Fetch {
                location: self.location(),
                source,
            })?;
        Ok(RuntimeModule::new(self.location(), bytes))
    }

    async fn initialize(&self, module: RuntimeModule) -> Result<Arc<dyn EvalFunction>, LoadError> {
        if module.bytes.is_empty() {
            return Err(LoadError::Malformed {
                location: module.location,
                reason: "module is empty".to_string(),
            });
        }

        let metadata = tokio::fs::metadata(&self.program)
            .await
            .map_err(|source| LoadError::Fetch {
                location: module.location.clone(),
                source,
            })?;
        if !is_executable(&metadata) {
            return Err(LoadError::MissingEntryPoint {
                location: module.location,
                reason: "module is not executable".to_string(),
            });
        }

        Ok(Arc::new(ProcessEval {
            program: self.program.clone(),
            args: self.args.clone(),
        }))
    }
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.is_file() && metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    metadata.is_file()
}

/// Entry point produced by [`ProcessRuntimeSource::initialize`].
#[derive(Debug)]
struct ProcessEval {
    program: PathBuf,
    args: Vec<String>,
}

impl EvalFunction for ProcessEval {
    fn call(&self, input: &str) -> EvalResult {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to start {}: {e}", self.program.display()))?;

        // Feed stdin from a separate thread so a chatty runtime cannot
        // deadlock on a full stdout pipe.
        let writer = child.stdin.take().map(|mut stdin| {
            let input = input.to_string();
            thread::spawn(move || stdin.write_all(input.as_bytes()))
        });

        let output = child
            .wait_with_output()
            .map_err(|e| format!("failed to wait for {}: {e}", self.program.display()))?;

        if let Some(writer) = writer {
            // A runtime that exits without reading its input closes the pipe early.
            let _ = writer.join();
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(if stderr.is_empty() {
                format!("runtime exited with {}", output.status).into()
            } else {
                stderr.into()
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout)
            .trim_end()
            .to_string();
        Ok((!stdout.is_empty()).then_some(stdout))
    }
}
