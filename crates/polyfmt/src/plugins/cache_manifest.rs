use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;

use crate::environment::Environment;

const MANIFEST_FILE_NAME: &str = "plugin-cache-manifest.json";

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CacheManifest {
  urls: HashMap<String, CacheItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheItem {
  pub created_time: u64,
  /// Digest of the stored artifact bytes, verified again on every warm
  /// load.
  pub checksum: String,
  pub file_name: String,
}

impl CacheManifest {
  pub fn get_item(&self, url: &str) -> Option<&CacheItem> {
    self.urls.get(url)
  }

  pub fn add_item(&mut self, url: String, item: CacheItem) {
    self.urls.insert(url, item);
  }

  pub fn remove_item(&mut self, url: &str) -> Option<CacheItem> {
    self.urls.remove(url)
  }
}

/// A corrupt or missing manifest is treated as empty rather than an
/// error since the cache can always be repopulated.
pub fn read_manifest(environment: &impl Environment, cache_dir: &Path) -> CacheManifest {
  let file_path = manifest_file_path(cache_dir);
  if !environment.path_exists(&file_path) {
    return CacheManifest::default();
  }
  match environment.read_file(&file_path).ok().and_then(|text| serde_json::from_str(&text).ok()) {
    Some(manifest) => manifest,
    None => {
      log_warn!(environment, "Resetting the corrupt plugin cache manifest at {}", file_path.display());
      CacheManifest::default()
    }
  }
}

pub fn write_manifest(environment: &impl Environment, cache_dir: &Path, manifest: &CacheManifest) -> Result<()> {
  let text = serde_json::to_string(manifest)?;
  environment.write_file(&manifest_file_path(cache_dir), &text)
}

fn manifest_file_path(cache_dir: &Path) -> PathBuf {
  cache_dir.join(MANIFEST_FILE_NAME)
}
