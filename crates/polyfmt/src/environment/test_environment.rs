use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use anyhow::Result;
use parking_lot::Mutex;

use super::Environment;
use super::LogLevel;
use crate::errors::ResolveError;

/// In-memory environment for tests. Remote files are canned and
/// download attempts are counted per url so tests can assert on how
/// many network calls a scenario performed.
#[derive(Clone)]
pub struct TestEnvironment {
  files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
  remote_files: Arc<Mutex<HashMap<String, Result<Vec<u8>, String>>>>,
  download_counts: Arc<Mutex<HashMap<String, usize>>>,
  logged_messages: Arc<Mutex<Vec<String>>>,
  logged_errors: Arc<Mutex<Vec<String>>>,
}

impl TestEnvironment {
  pub fn new() -> TestEnvironment {
    TestEnvironment {
      files: Default::default(),
      remote_files: Default::default(),
      download_counts: Default::default(),
      logged_messages: Default::default(),
      logged_errors: Default::default(),
    }
  }

  pub fn add_remote_file(&self, url: &str, bytes: &[u8]) {
    self.remote_files.lock().insert(url.to_string(), Ok(bytes.to_vec()));
  }

  pub fn add_remote_file_error(&self, url: &str, message: &str) {
    self.remote_files.lock().insert(url.to_string(), Err(message.to_string()));
  }

  pub fn download_count(&self, url: &str) -> usize {
    self.download_counts.lock().get(url).copied().unwrap_or(0)
  }

  pub fn take_logged_messages(&self) -> Vec<String> {
    std::mem::take(&mut *self.logged_messages.lock())
  }

  pub fn take_logged_errors(&self) -> Vec<String> {
    std::mem::take(&mut *self.logged_errors.lock())
  }
}

impl Environment for TestEnvironment {
  fn read_file_bytes(&self, file_path: &Path) -> Result<Vec<u8>> {
    let files = self.files.lock();
    match files.get(file_path) {
      Some(bytes) => Ok(bytes.clone()),
      None => bail!("Could not find file at path {}", file_path.display()),
    }
  }

  fn write_file_bytes(&self, file_path: &Path, bytes: &[u8]) -> Result<()> {
    self.files.lock().insert(file_path.to_path_buf(), bytes.to_vec());
    Ok(())
  }

  fn remove_file(&self, file_path: &Path) -> Result<()> {
    self.files.lock().remove(file_path);
    Ok(())
  }

  fn remove_dir_all(&self, dir_path: &Path) -> Result<()> {
    self.files.lock().retain(|path, _| !path.starts_with(dir_path));
    Ok(())
  }

  fn path_exists(&self, file_path: &Path) -> bool {
    self.files.lock().contains_key(file_path)
  }

  fn mk_dir_all(&self, _path: &Path) -> Result<()> {
    Ok(())
  }

  fn cwd(&self) -> PathBuf {
    PathBuf::from("/")
  }

  fn walk_files(&self, base: &Path) -> Result<Vec<PathBuf>> {
    let files = self.files.lock();
    let mut file_paths = files.keys().filter(|path| path.starts_with(base)).cloned().collect::<Vec<_>>();
    file_paths.sort();
    Ok(file_paths)
  }

  fn download_file(&self, url: &str) -> Result<Vec<u8>> {
    *self.download_counts.lock().entry(url.to_string()).or_insert(0) += 1;
    let remote_files = self.remote_files.lock();
    match remote_files.get(url) {
      Some(Ok(bytes)) => Ok(bytes.clone()),
      Some(Err(message)) => Err(
        ResolveError::Network {
          url: url.to_string(),
          attempts: 1,
          message: message.clone(),
        }
        .into(),
      ),
      None => Err(
        ResolveError::Network {
          url: url.to_string(),
          attempts: 1,
          message: "404 Not Found".to_string(),
        }
        .into(),
      ),
    }
  }

  fn get_cache_dir(&self) -> PathBuf {
    PathBuf::from("/cache")
  }

  fn get_time_secs(&self) -> u64 {
    123456
  }

  fn max_threads(&self) -> usize {
    4
  }

  fn log(&self, text: &str) {
    self.logged_messages.lock().push(text.to_string());
  }

  fn log_stderr(&self, text: &str) {
    self.logged_errors.lock().push(text.to_string());
  }

  fn log_level(&self) -> LogLevel {
    LogLevel::Info
  }
}
