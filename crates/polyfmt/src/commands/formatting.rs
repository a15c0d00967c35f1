use anyhow::Result;
use thiserror::Error;

use crate::configuration::Configuration;
use crate::environment::Environment;
use crate::format::run_format;
use crate::format::FormatOptions;
use crate::format::FormatReport;
use crate::plugins::PluginCache;
use crate::plugins::PluginResolver;

/// Check mode found files that would change. Mapped to its own exit
/// code so scripts can tell "needs formatting" apart from real errors.
#[derive(Debug, Error)]
#[error("Found {count} not formatted file(s).")]
pub struct CheckFailedError {
  pub count: usize,
}

pub async fn format_files<TEnvironment: Environment>(
  environment: &TEnvironment,
  config: &Configuration,
  resolver: &PluginResolver<TEnvironment>,
  fail_fast: bool,
) -> Result<()> {
  let report = run_format(
    environment,
    config,
    resolver,
    FormatOptions {
      check_only: false,
      fail_fast,
    },
  )
  .await?;

  log_debug!(environment, "Left {} file(s) unchanged and skipped {}.", report.unchanged.len(), report.skipped.len());
  if !report.formatted.is_empty() {
    environment.log(&format!("Formatted {} file(s).", report.formatted.len()));
  }
  handle_failures(environment, &report)
}

pub async fn check_files<TEnvironment: Environment>(
  environment: &TEnvironment,
  config: &Configuration,
  resolver: &PluginResolver<TEnvironment>,
  fail_fast: bool,
) -> Result<()> {
  let report = run_format(
    environment,
    config,
    resolver,
    FormatOptions {
      check_only: true,
      fail_fast,
    },
  )
  .await?;

  for file_path in &report.formatted {
    environment.log(&format!("{} is not formatted.", file_path.display()));
  }
  handle_failures(environment, &report)?;
  if report.formatted.is_empty() {
    Ok(())
  } else {
    Err(
      CheckFailedError {
        count: report.formatted.len(),
      }
      .into(),
    )
  }
}

pub fn clear_cache(environment: &impl Environment) -> Result<()> {
  let cache = PluginCache::new(environment.clone());
  cache.clear()?;
  environment.log("Deleted the plugin cache.");
  Ok(())
}

fn handle_failures(environment: &impl Environment, report: &FormatReport) -> Result<()> {
  if !report.had_failures() {
    return Ok(());
  }
  for failure in &report.failures {
    log_warn!(environment, "Error formatting {}: {}", failure.file_path.display(), failure.message);
  }
  anyhow::bail!("Had {} error(s) formatting.", report.failures.len())
}
