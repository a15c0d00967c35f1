use std::path::Path;
use std::path::PathBuf;

use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
  Silent,
  Warn,
  Info,
  Debug,
}

/// Boundary to the host system. Everything the engine does to the
/// outside world goes through here so tests can run fully in memory.
pub trait Environment: Clone + Send + Sync + 'static {
  fn read_file(&self, file_path: &Path) -> Result<String> {
    let bytes = self.read_file_bytes(file_path)?;
    Ok(String::from_utf8(bytes)?)
  }
  fn read_file_bytes(&self, file_path: &Path) -> Result<Vec<u8>>;
  fn write_file(&self, file_path: &Path, file_text: &str) -> Result<()> {
    self.write_file_bytes(file_path, file_text.as_bytes())
  }
  fn write_file_bytes(&self, file_path: &Path, bytes: &[u8]) -> Result<()>;
  fn remove_file(&self, file_path: &Path) -> Result<()>;
  fn remove_dir_all(&self, dir_path: &Path) -> Result<()>;
  fn path_exists(&self, file_path: &Path) -> bool;
  fn mk_dir_all(&self, path: &Path) -> Result<()>;
  fn cwd(&self) -> PathBuf;
  /// Recursively yields the files under the base directory. Walking and
  /// ignore-file handling are this collaborator's concern; the engine
  /// only consumes the resulting paths.
  fn walk_files(&self, base: &Path) -> Result<Vec<PathBuf>>;
  /// Downloads a url, retrying transient failures with backoff. Returns
  /// a `ResolveError::Network` once the retries are exhausted.
  fn download_file(&self, url: &str) -> Result<Vec<u8>>;
  fn get_cache_dir(&self) -> PathBuf;
  fn get_time_secs(&self) -> u64;
  fn max_threads(&self) -> usize;
  fn log(&self, text: &str);
  fn log_stderr(&self, text: &str);
  fn log_level(&self) -> LogLevel;
}

// macros so the format arguments are only evaluated when the level is active

macro_rules! log_warn {
    ($environment:expr, $($arg:tt)*) => {
        if $environment.log_level() >= $crate::environment::LogLevel::Warn {
            $environment.log_stderr(&format!($($arg)*));
        }
    }
}

macro_rules! log_debug {
    ($environment:expr, $($arg:tt)*) => {
        if $environment.log_level() >= $crate::environment::LogLevel::Debug {
            $environment.log_stderr(&format!($($arg)*));
        }
    }
}
