use thiserror::Error;

/// Errors detected while interpreting the configuration. These are all
/// fatal and reported before any file is touched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
  #[error("Malformed plugin specifier '{specifier}': {reason}")]
  MalformedPluginSpec { specifier: String, reason: String },
  #[error(
    "Plugins '{first}' and '{second}' both claim files with the '{extension}' extension. Remove one or give one an explicit \"exts\" list in its configuration."
  )]
  DuplicatePluginForExtension { extension: String, first: String, second: String },
  #[error("Invalid pattern '{pattern}': {message}")]
  InvalidPattern { pattern: String, message: String },
}

/// Errors fetching, verifying, or loading a plugin artifact. Fatal for
/// that plugin only; files matched by other plugins keep formatting.
#[derive(Debug, Error)]
pub enum ResolveError {
  #[error("Error downloading {url} after {attempts} attempts: {message}")]
  Network { url: String, attempts: u8, message: String },
  #[error("Invalid checksum found for {origin}.\nExpected: {expected}\nActual: {actual}")]
  IntegrityMismatch { origin: String, expected: String, actual: String },
  #[error("Unsupported plugin artifact at {origin}: {message}")]
  UnsupportedPluginArtifact { origin: String, message: String },
  #[error("Plugin {origin} has no checksum and the configuration sets \"unverified\" to \"error\".")]
  UnverifiedPlugin { origin: String },
}

/// Per-file formatting failures. Recorded in the report; they never
/// abort the run unless fail-fast is requested.
#[derive(Debug, Error)]
pub enum InvocationError {
  #[error("Formatting timed out after {timeout_seconds}s")]
  Timeout { timeout_seconds: u64 },
  #[error("Process exited with code {code}.{}", format_stderr(.stderr))]
  ProcessExit { code: i32, stderr: String },
  #[error("Plugin fault: {0}")]
  ModuleFault(String),
  #[error(transparent)]
  Other(#[from] anyhow::Error),
}

fn format_stderr(stderr: &str) -> String {
  let stderr = stderr.trim();
  if stderr.is_empty() {
    String::new()
  } else {
    format!(" Stderr:\n{}", stderr)
  }
}
