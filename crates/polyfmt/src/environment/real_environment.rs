use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::SystemTime;

use anyhow::anyhow;
use anyhow::bail;
use anyhow::Context;
use anyhow::Result;

use super::Environment;
use super::LogLevel;
use crate::errors::ResolveError;

const MAX_DOWNLOAD_ATTEMPTS: u8 = 3;

#[derive(Clone)]
pub struct RealEnvironment {
  log_level: LogLevel,
  cache_dir: PathBuf,
}

pub struct RealEnvironmentOptions {
  pub log_level: LogLevel,
}

impl RealEnvironment {
  pub fn new(options: RealEnvironmentOptions) -> Result<Self> {
    let cache_dir = get_cache_dir_internal()?;
    std::fs::create_dir_all(&cache_dir).with_context(|| format!("Error creating cache directory at {}", cache_dir.display()))?;
    Ok(RealEnvironment {
      log_level: options.log_level,
      cache_dir,
    })
  }
}

impl Environment for RealEnvironment {
  fn read_file_bytes(&self, file_path: &Path) -> Result<Vec<u8>> {
    std::fs::read(file_path).with_context(|| format!("Error reading file {}", file_path.display()))
  }

  fn write_file_bytes(&self, file_path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(file_path, bytes).with_context(|| format!("Error writing file {}", file_path.display()))
  }

  fn remove_file(&self, file_path: &Path) -> Result<()> {
    std::fs::remove_file(file_path).with_context(|| format!("Error removing file {}", file_path.display()))
  }

  fn remove_dir_all(&self, dir_path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir_path) {
      Err(err) if err.kind() != std::io::ErrorKind::NotFound => {
        Err(err).with_context(|| format!("Error removing directory {}", dir_path.display()))
      }
      _ => Ok(()),
    }
  }

  fn path_exists(&self, file_path: &Path) -> bool {
    file_path.exists()
  }

  fn mk_dir_all(&self, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).with_context(|| format!("Error creating directory {}", path.display()))
  }

  fn cwd(&self) -> PathBuf {
    std::env::current_dir().expect("Expected to get the current working directory.")
  }

  fn walk_files(&self, base: &Path) -> Result<Vec<PathBuf>> {
    let mut file_paths = Vec::new();
    for entry in ignore::WalkBuilder::new(base).build() {
      let entry = entry?;
      if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
        file_paths.push(entry.into_path());
      }
    }
    Ok(file_paths)
  }

  fn download_file(&self, url: &str) -> Result<Vec<u8>> {
    let lowercase_url = url.to_lowercase();
    if !lowercase_url.starts_with("http://") && !lowercase_url.starts_with("https://") {
      bail!("Not implemented url scheme: {}", url);
    }
    let agent = ureq::AgentBuilder::new().build();
    let mut last_error = None;
    for attempt in 1..=MAX_DOWNLOAD_ATTEMPTS {
      match inner_download(&agent, url) {
        Ok(bytes) => return Ok(bytes),
        Err(err) => {
          if attempt < MAX_DOWNLOAD_ATTEMPTS {
            log_debug!(self, "Error downloading {} ({}/{}): {:#}", url, attempt, MAX_DOWNLOAD_ATTEMPTS, err);
            std::thread::sleep(Duration::from_millis(250 * 2u64.pow(attempt as u32 - 1)));
          }
          last_error = Some(err);
        }
      }
    }
    Err(
      ResolveError::Network {
        url: url.to_string(),
        attempts: MAX_DOWNLOAD_ATTEMPTS,
        message: format!("{:#}", last_error.unwrap()),
      }
      .into(),
    )
  }

  fn get_cache_dir(&self) -> PathBuf {
    self.cache_dir.clone()
  }

  fn get_time_secs(&self) -> u64 {
    SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap().as_secs()
  }

  fn max_threads(&self) -> usize {
    std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
  }

  fn log(&self, text: &str) {
    if self.log_level >= LogLevel::Info {
      #[allow(clippy::print_stdout)]
      {
        println!("{}", text);
      }
    }
  }

  fn log_stderr(&self, text: &str) {
    #[allow(clippy::print_stderr)]
    {
      eprintln!("{}", text);
    }
  }

  fn log_level(&self) -> LogLevel {
    self.log_level
  }
}

fn inner_download(agent: &ureq::Agent, url: &str) -> Result<Vec<u8>> {
  use std::io::Read;
  let resp = agent.get(url).call().map_err(|err| anyhow!("{:#}", err))?;
  let total_size = resp.header("Content-Length").and_then(|s| s.parse::<usize>().ok()).unwrap_or(0);
  let mut bytes = Vec::with_capacity(total_size);
  resp.into_reader().read_to_end(&mut bytes)?;
  Ok(bytes)
}

fn get_cache_dir_internal() -> Result<PathBuf> {
  if let Ok(dir_path) = std::env::var("POLYFMT_CACHE_DIR") {
    if !dir_path.trim().is_empty() {
      return Ok(PathBuf::from(dir_path));
    }
  }
  match dirs::cache_dir() {
    Some(dir) => Ok(dir.join("polyfmt")),
    None => bail!("Expected to find a cache directory. Set the POLYFMT_CACHE_DIR environment variable to manually specify one."),
  }
}
