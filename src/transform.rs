//! Media transform service contract and the external-worker adapter.

use crate::command::Operation;
use crate::error::{Result, TransformError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;

/// One media transformation step, synchronous from the pipeline's point of
/// view. Implementations own creation of their output file.
#[async_trait]
pub trait TransformService: Send + Sync {
    async fn execute(&self, operation: &Operation, input: &Path) -> Result<PathBuf>;
}

/// Adapter invoking the external transform worker binary.
///
/// Invocation shape: `worker <op> <op-args...> --input <in> --output <out>`.
/// The worker does the actual media processing; this adapter only routes
/// arguments and interprets the exit status.
pub struct WorkerTransformer {
    worker_bin: PathBuf,
}

impl WorkerTransformer {
    pub fn new(worker_bin: PathBuf) -> Self {
        Self { worker_bin }
    }
}

#[async_trait]
impl TransformService for WorkerTransformer {
    async fn execute(&self, operation: &Operation, input: &Path) -> Result<PathBuf> {
        let output = input.with_extension(format!("{}.out", uuid::Uuid::new_v4().simple()));

        let result = tokio::process::Command::new(&self.worker_bin)
            .args(operation.worker_args())
            .arg("--input")
            .arg(input)
            .arg("--output")
            .arg(&output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(TransformError::Io)?;

        if !result.status.success() {
            let _ = tokio::fs::remove_file(&output).await;
            return Err(TransformError::WorkerFailed {
                status: result.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
            }
            .into());
        }
        if !output.exists() {
            return Err(TransformError::Failed {
                operation: operation.tag().to_string(),
                detail: "worker exited cleanly but produced no output file".into(),
            }
            .into());
        }
        Ok(output)
    }
}
