use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::configuration::ConfigKeyMap;
use crate::configuration::Configuration;
use crate::dispatch::FileDispatcher;
use crate::environment::Environment;
use crate::plugins::register_plugins;
use crate::plugins::types::PluginSpec;
use crate::plugins::FormatRequest;
use crate::plugins::InitializedPlugin;
use crate::plugins::PluginResolver;

#[derive(Debug, Default, Clone, Copy)]
pub struct FormatOptions {
  /// Report what would change without writing anything.
  pub check_only: bool,
  /// Cancel outstanding work after the first failure.
  pub fail_fast: bool,
}

#[derive(Debug)]
pub struct FormatFailure {
  pub file_path: PathBuf,
  pub message: String,
}

/// Outcome of one orchestration run over the tree.
#[derive(Debug, Default)]
pub struct FormatReport {
  /// Files that changed, or in check mode would change.
  pub formatted: Vec<PathBuf>,
  pub unchanged: Vec<PathBuf>,
  /// Excluded, unmatched, or abandoned after a fail fast cancellation.
  pub skipped: Vec<PathBuf>,
  pub failures: Vec<FormatFailure>,
}

impl FormatReport {
  pub fn had_failures(&self) -> bool {
    !self.failures.is_empty()
  }
}

enum FileOutcome {
  Formatted,
  Unchanged,
  Skipped,
  Failed(String),
}

/// Walks the tree, dispatches every file to at most one plugin and runs
/// the invocations with bounded parallelism. Plugins are resolved once
/// per run; a plugin that fails to resolve fails only its own files.
pub async fn run_format<TEnvironment: Environment>(
  environment: &TEnvironment,
  config: &Configuration,
  resolver: &PluginResolver<TEnvironment>,
  options: FormatOptions,
) -> Result<FormatReport> {
  let specs = register_plugins(config)?;
  let dispatcher = FileDispatcher::new(config, &specs)?;

  let mut file_paths = environment.walk_files(&config.base_path)?;
  file_paths.sort();

  let mut report = FormatReport::default();
  let mut tasks: Vec<(PathBuf, usize)> = Vec::new();
  for file_path in file_paths {
    match dispatcher.select(&file_path) {
      Some(spec_index) => tasks.push((file_path, spec_index)),
      None => report.skipped.push(file_path),
    }
  }

  // resolve and initialize each needed plugin once
  let mut handles: Vec<Option<(Arc<dyn InitializedPlugin>, Arc<ConfigKeyMap>)>> = Vec::new();
  for (spec_index, spec) in specs.iter().enumerate() {
    if !tasks.iter().any(|(_, index)| *index == spec_index) {
      handles.push(None);
      continue;
    }
    let config_map = Arc::new(match spec {
      PluginSpec::Module(spec) => spec.config.clone(),
      PluginSpec::Exec(_) => ConfigKeyMap::new(),
    });
    match resolver.resolve_plugin(spec).await {
      Ok(plugin) => match plugin.initialize().await {
        Ok(initialized) => handles.push(Some((initialized, config_map))),
        Err(err) => {
          fail_plugin_files(&mut report, &mut tasks, spec_index, &format!("{:#}", err));
          handles.push(None);
        }
      },
      Err(err) => {
        fail_plugin_files(&mut report, &mut tasks, spec_index, &format!("{:#}", err));
        handles.push(None);
      }
    }
  }

  let concurrency = config.concurrency.unwrap_or_else(|| environment.max_threads());
  let semaphore = Arc::new(Semaphore::new(concurrency));
  let token = CancellationToken::new();

  let futures = tasks.iter().map(|(file_path, spec_index)| {
    let (plugin, config_map) = handles[*spec_index].as_ref().expect("handles exist for every dispatched spec");
    let plugin = plugin.clone();
    let config_map = config_map.clone();
    let semaphore = semaphore.clone();
    let token = token.clone();
    let environment = environment.clone();
    let file_path = file_path.clone();
    async move {
      let _permit = semaphore.acquire().await.expect("the semaphore is never closed");
      if token.is_cancelled() {
        return FileOutcome::Skipped;
      }
      let outcome = format_file(&environment, &plugin, config_map, &file_path, &token, options).await;
      if matches!(outcome, FileOutcome::Failed(_)) && options.fail_fast {
        token.cancel();
      }
      outcome
    }
  });
  let outcomes = futures::future::join_all(futures).await;

  for ((file_path, _), outcome) in tasks.into_iter().zip(outcomes) {
    match outcome {
      FileOutcome::Formatted => report.formatted.push(file_path),
      FileOutcome::Unchanged => report.unchanged.push(file_path),
      FileOutcome::Skipped => report.skipped.push(file_path),
      FileOutcome::Failed(message) => report.failures.push(FormatFailure { file_path, message }),
    }
  }
  report.skipped.sort();
  Ok(report)
}

fn fail_plugin_files(report: &mut FormatReport, tasks: &mut Vec<(PathBuf, usize)>, spec_index: usize, message: &str) {
  tasks.retain(|(file_path, index)| {
    if *index == spec_index {
      report.failures.push(FormatFailure {
        file_path: file_path.clone(),
        message: message.to_string(),
      });
      false
    } else {
      true
    }
  });
}

async fn format_file<TEnvironment: Environment>(
  environment: &TEnvironment,
  plugin: &Arc<dyn InitializedPlugin>,
  config_map: Arc<ConfigKeyMap>,
  file_path: &PathBuf,
  token: &CancellationToken,
  options: FormatOptions,
) -> FileOutcome {
  let file_bytes = match environment.read_file_bytes(file_path) {
    Ok(bytes) => bytes,
    Err(err) => return FileOutcome::Failed(format!("{:#}", err)),
  };
  let request = FormatRequest {
    file_path: file_path.clone(),
    file_bytes,
    config: config_map,
    token: token.clone(),
  };
  match plugin.format_text(request).await {
    Ok(None) => FileOutcome::Unchanged,
    Ok(Some(formatted_bytes)) => {
      if token.is_cancelled() {
        return FileOutcome::Skipped;
      }
      if options.check_only {
        return FileOutcome::Formatted;
      }
      match environment.write_file_bytes(file_path, &formatted_bytes) {
        Ok(()) => FileOutcome::Formatted,
        Err(err) => FileOutcome::Failed(format!("{:#}", err)),
      }
    }
    Err(err) => {
      if token.is_cancelled() {
        FileOutcome::Skipped
      } else {
        FileOutcome::Failed(format!("{:#}", err))
      }
    }
  }
}
