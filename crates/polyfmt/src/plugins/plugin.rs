use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::configuration::ConfigKeyMap;
use crate::errors::InvocationError;

/// A single format invocation. The token is observed by backends that
/// can abandon work early (subprocess kill, queued wasm work).
pub struct FormatRequest {
  pub file_path: PathBuf,
  pub file_bytes: Vec<u8>,
  pub config: Arc<ConfigKeyMap>,
  pub token: CancellationToken,
}

/// `Ok(None)` means the file was already formatted.
pub type FormatResult = Result<Option<Vec<u8>>, InvocationError>;

/// A resolved plugin ready to hand out invocation handles. Owned by the
/// resolver as an `Arc`; callers never clone the underlying resources.
#[async_trait(?Send)]
pub trait Plugin: Send + Sync {
  fn name(&self) -> &str;

  /// Creates the invocation handle. Expensive for module plugins (an
  /// instance gets created), called once per plugin per run.
  async fn initialize(&self) -> Result<Arc<dyn InitializedPlugin>>;
}

impl std::fmt::Debug for dyn Plugin {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Plugin").field("name", &self.name()).finish()
  }
}

#[async_trait]
pub trait InitializedPlugin: Send + Sync {
  async fn format_text(&self, request: FormatRequest) -> FormatResult;
}
