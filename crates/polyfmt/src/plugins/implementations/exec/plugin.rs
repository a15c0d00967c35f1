use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use anyhow::Context;
use anyhow::Result;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::configuration::ExecMode;
use crate::errors::InvocationError;
use crate::plugins::types::ExecPluginSpec;
use crate::plugins::FormatRequest;
use crate::plugins::FormatResult;
use crate::plugins::InitializedPlugin;
use crate::plugins::Plugin;

/// External formatter run as a subprocess per file. Stateless between
/// invocations, so initialization is trivial.
pub struct ExecPlugin {
  spec: ExecPluginSpec,
  timeout: Duration,
}

impl ExecPlugin {
  pub fn new(spec: ExecPluginSpec, timeout_seconds: u64) -> Self {
    ExecPlugin {
      spec,
      timeout: Duration::from_secs(timeout_seconds),
    }
  }
}

#[async_trait(?Send)]
impl Plugin for ExecPlugin {
  fn name(&self) -> &str {
    &self.spec.name
  }

  async fn initialize(&self) -> Result<Arc<dyn InitializedPlugin>> {
    Ok(Arc::new(InitializedExecPlugin {
      spec: self.spec.clone(),
      timeout: self.timeout,
    }))
  }
}

struct InitializedExecPlugin {
  spec: ExecPluginSpec,
  timeout: Duration,
}

#[async_trait]
impl InitializedPlugin for InitializedExecPlugin {
  async fn format_text(&self, request: FormatRequest) -> FormatResult {
    if request.token.is_cancelled() {
      return Ok(None);
    }
    let result = match self.spec.mode {
      ExecMode::Stdout => self.format_via_stdout(&request).await,
      ExecMode::Overwrite => self.format_via_overwrite(&request).await,
    };
    match result {
      Ok(output) => {
        if output == request.file_bytes {
          Ok(None)
        } else {
          Ok(Some(output))
        }
      }
      Err(err) => Err(err),
    }
  }
}

impl InitializedExecPlugin {
  /// Pipes the file bytes to the command's stdin and takes the
  /// formatted result from its stdout.
  async fn format_via_stdout(&self, request: &FormatRequest) -> Result<Vec<u8>, InvocationError> {
    let mut child = Command::new(self.spec.command.program())
      .args(self.spec.command.args(&request.file_path))
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()
      .map_err(|err| InvocationError::Other(anyhow!("Error spawning {}: {:#}", self.spec.command.program(), err)))?;

    // write on a separate task so a command that fills its stdout pipe
    // before draining stdin cannot deadlock the exchange
    let mut stdin = child.stdin.take().expect("stdin was piped");
    let file_bytes = request.file_bytes.clone();
    let stdin_task = tokio::task::spawn(async move {
      let _ = stdin.write_all(&file_bytes).await;
      // drops and closes the pipe
    });

    let output = self.wait_with_timeout(child, &request.token).await?;
    stdin_task.abort();
    let output = output?;

    match output.status.code() {
      Some(0) => Ok(output.stdout),
      code => Err(InvocationError::ProcessExit {
        code: code.unwrap_or(-1),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
      }),
    }
  }

  /// Stages a copy of the file in a temporary location, lets the
  /// command rewrite it in place, then reads the result back. The
  /// original file is never touched by the subprocess, so a failed or
  /// killed run cannot corrupt it.
  async fn format_via_overwrite(&self, request: &FormatRequest) -> Result<Vec<u8>, InvocationError> {
    let staged_path = staging_path(&request.file_path);
    tokio::fs::write(&staged_path, &request.file_bytes)
      .await
      .with_context(|| format!("Error staging {}", staged_path.display()))
      .map_err(InvocationError::Other)?;

    let result = self.run_overwrite_command(&staged_path, request).await;
    let output = match &result {
      Ok(_) => tokio::fs::read(&staged_path)
        .await
        .with_context(|| format!("Error reading back {}", staged_path.display()))
        .map_err(InvocationError::Other),
      Err(_) => Ok(Vec::new()),
    };
    let _ = tokio::fs::remove_file(&staged_path).await;
    result?;
    output
  }

  async fn run_overwrite_command(&self, staged_path: &Path, request: &FormatRequest) -> Result<(), InvocationError> {
    let child = Command::new(self.spec.command.program())
      .args(self.spec.command.args(staged_path))
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()
      .map_err(|err| InvocationError::Other(anyhow!("Error spawning {}: {:#}", self.spec.command.program(), err)))?;

    let output = self.wait_with_timeout(child, &request.token).await??;
    match output.status.code() {
      Some(0) => Ok(()),
      code => Err(InvocationError::ProcessExit {
        code: code.unwrap_or(-1),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
      }),
    }
  }

  /// Dropping the child on the timeout or cancellation path kills the
  /// process since it was spawned with kill_on_drop.
  async fn wait_with_timeout(
    &self,
    child: tokio::process::Child,
    token: &tokio_util::sync::CancellationToken,
  ) -> Result<Result<std::process::Output, InvocationError>, InvocationError> {
    tokio::select! {
      result = tokio::time::timeout(self.timeout, child.wait_with_output()) => match result {
        Ok(Ok(output)) => Ok(Ok(output)),
        Ok(Err(err)) => Ok(Err(InvocationError::Other(anyhow!("Error waiting on {}: {:#}", self.spec.command.program(), err)))),
        Err(_) => Err(InvocationError::Timeout {
          timeout_seconds: self.timeout.as_secs(),
        }),
      },
      _ = token.cancelled() => Err(InvocationError::Other(anyhow!("Cancelled."))),
    }
  }
}

/// Unique sibling-free path in the system temp directory that keeps the
/// original extension so extension-sensitive formatters behave.
fn staging_path(file_path: &Path) -> PathBuf {
  static NEXT_ID: AtomicUsize = AtomicUsize::new(0);
  let id = NEXT_ID.fetch_add(1, Ordering::SeqCst);
  let file_name = file_path.file_name().and_then(|f| f.to_str()).unwrap_or("file");
  std::env::temp_dir().join(format!("polyfmt-{}-{}-{}", std::process::id(), id, file_name))
}
