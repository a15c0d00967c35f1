use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use url::Url;

use crate::configuration::UnverifiedPolicy;
use crate::environment::Environment;
use crate::errors::ResolveError;
use crate::utils::get_sha256_checksum;
use crate::utils::verify_sha256_checksum;

use super::cache_manifest::read_manifest;
use super::cache_manifest::write_manifest;
use super::cache_manifest::CacheItem;
use super::cache_manifest::CacheManifest;

const WASM_MAGIC: &[u8] = b"\0asm";

#[derive(Clone, Debug)]
pub struct PluginCacheItem {
  pub file_path: PathBuf,
  /// Digest of the artifact bytes on disk.
  pub checksum: String,
}

/// Content addressed store for remote module artifacts. Artifacts are
/// persisted under their own digest and re-verified on every warm load,
/// so a corrupted cache entry is refetched rather than executed.
///
/// Requests for the same url are deduplicated so concurrent resolution
/// performs at most one download.
pub struct PluginCache<TEnvironment: Environment> {
  environment: TEnvironment,
  cache_dir: PathBuf,
  manifest: Mutex<CacheManifest>,
  cells: Mutex<HashMap<String, Arc<OnceCell<PluginCacheItem>>>>,
}

impl<TEnvironment: Environment> PluginCache<TEnvironment> {
  pub fn new(environment: TEnvironment) -> Self {
    let cache_dir = environment.get_cache_dir().join("plugins");
    let manifest = read_manifest(&environment, &cache_dir);
    PluginCache {
      environment,
      cache_dir,
      manifest: Mutex::new(manifest),
      cells: Default::default(),
    }
  }

  pub async fn get_cache_item(&self, url: &Url, checksum: Option<&str>, policy: UnverifiedPolicy) -> Result<PluginCacheItem> {
    if checksum.is_none() && policy == UnverifiedPolicy::Error {
      return Err(ResolveError::UnverifiedPlugin { origin: url.to_string() }.into());
    }
    let cell = self.cells.lock().entry(url.to_string()).or_default().clone();
    let item = cell.get_or_try_init(|| self.resolve_cache_item(url, checksum)).await?;
    Ok(item.clone())
  }

  async fn resolve_cache_item(&self, url: &Url, checksum: Option<&str>) -> Result<PluginCacheItem> {
    if let Some(item) = self.get_warm_item(url, checksum)? {
      return Ok(item);
    }

    let bytes = self.environment.download_file(url.as_str())?;
    if let Some(expected) = checksum {
      // a failed verification never persists the artifact
      verify_sha256_checksum(&bytes, expected, url.as_ref())?;
    }
    if !bytes.starts_with(WASM_MAGIC) {
      return Err(
        ResolveError::UnsupportedPluginArtifact {
          origin: url.to_string(),
          message: "the file is not a wasm module".to_string(),
        }
        .into(),
      );
    }

    let digest = get_sha256_checksum(&bytes);
    let file_name = format!("{}.wasm", digest);
    let file_path = self.cache_dir.join(&file_name);
    self.environment.mk_dir_all(&self.cache_dir)?;
    self.environment.write_file_bytes(&file_path, &bytes)?;
    {
      let mut manifest = self.manifest.lock();
      manifest.add_item(
        url.to_string(),
        CacheItem {
          created_time: self.environment.get_time_secs(),
          checksum: digest.clone(),
          file_name,
        },
      );
      write_manifest(&self.environment, &self.cache_dir, &manifest)?;
    }
    if checksum.is_none() {
      log_warn!(
        self.environment,
        "Plugin {} has no integrity digest. Add @{} to the identifier to pin it.",
        url,
        digest
      );
    }
    Ok(PluginCacheItem { file_path, checksum: digest })
  }

  fn get_warm_item(&self, url: &Url, checksum: Option<&str>) -> Result<Option<PluginCacheItem>> {
    let item = match self.manifest.lock().get_item(url.as_ref()) {
      Some(item) => item.clone(),
      None => return Ok(None),
    };
    let file_path = self.cache_dir.join(&item.file_name);
    if !self.environment.path_exists(&file_path) {
      self.forget_url(url);
      return Ok(None);
    }
    let bytes = self.environment.read_file_bytes(&file_path)?;
    let digest = get_sha256_checksum(&bytes);
    if digest != item.checksum {
      log_warn!(self.environment, "The cached copy of plugin {} was corrupt. Redownloading.", url);
      self.forget_url(url);
      return Ok(None);
    }
    if let Some(expected) = checksum {
      verify_sha256_checksum(&bytes, expected, url.as_ref())?;
    } else {
      log_warn!(
        self.environment,
        "Plugin {} has no integrity digest. Add @{} to the identifier to pin it.",
        url,
        digest
      );
    }
    Ok(Some(PluginCacheItem { file_path, checksum: digest }))
  }

  fn forget_url(&self, url: &Url) {
    let mut manifest = self.manifest.lock();
    if let Some(item) = manifest.remove_item(url.as_ref()) {
      let _ = self.environment.remove_file(&self.cache_dir.join(item.file_name));
      let _ = write_manifest(&self.environment, &self.cache_dir, &manifest);
    }
  }

  /// Deletes everything. Used by the clear-cache command.
  pub fn clear(&self) -> Result<()> {
    self.environment.remove_dir_all(&self.cache_dir)?;
    *self.manifest.lock() = CacheManifest::default();
    self.cells.lock().clear();
    Ok(())
  }
}
