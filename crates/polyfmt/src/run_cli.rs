use std::path::Path;

use anyhow::Result;

use crate::arg_parser::CliArgs;
use crate::arg_parser::SubCommand;
use crate::commands;
use crate::commands::CheckFailedError;
use crate::configuration::resolve_config;
use crate::environment::Environment;
use crate::plugins::PluginResolver;

pub struct AppError {
  pub inner: anyhow::Error,
  pub exit_code: i32,
}

impl From<anyhow::Error> for AppError {
  fn from(inner: anyhow::Error) -> Self {
    let exit_code = if inner.downcast_ref::<CheckFailedError>().is_some() { 20 } else { 1 };
    AppError { inner, exit_code }
  }
}

pub async fn run_cli<TEnvironment: Environment>(args: &CliArgs, environment: &TEnvironment) -> Result<()> {
  match &args.sub_command {
    SubCommand::Help(text) => {
      environment.log(text);
      Ok(())
    }
    SubCommand::Version => {
      environment.log(&format!("polyfmt {}", env!("CARGO_PKG_VERSION")));
      Ok(())
    }
    SubCommand::ClearCache => commands::clear_cache(environment),
    SubCommand::Fmt | SubCommand::Check => {
      let mut config = resolve_config(environment, args.config.as_deref().map(Path::new))?;
      if args.concurrency.is_some() {
        config.concurrency = args.concurrency;
      }
      let resolver = PluginResolver::new(environment.clone(), &config);
      match args.sub_command {
        SubCommand::Fmt => commands::format_files(environment, &config, &resolver, args.fail_fast).await,
        _ => commands::check_files(environment, &config, &resolver, args.fail_fast).await,
      }
    }
  }
}

#[cfg(test)]
mod test {
  use std::path::PathBuf;

  use pretty_assertions::assert_eq;

  use crate::arg_parser::parse_args;
  use crate::environment::TestEnvironment;

  use super::*;

  fn args(args: &[&str]) -> CliArgs {
    let mut full_args = vec!["polyfmt".to_string()];
    full_args.extend(args.iter().map(|a| a.to_string()));
    parse_args(full_args).unwrap()
  }

  #[tokio::test]
  async fn errors_when_no_config_file_exists() {
    let environment = TestEnvironment::new();
    let err = run_cli(&args(&["fmt"]), &environment).await.unwrap_err();
    assert!(err.to_string().contains("Could not find a polyfmt.json file"));
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn formats_a_tree_through_an_exec_plugin() {
    let environment = TestEnvironment::new();
    environment
      .write_file_bytes(&PathBuf::from("/polyfmt.json"), br#"{ "exec": [{ "command": "tr a-z A-Z", "exts": ["txt"] }] }"#)
      .unwrap();
    environment.write_file_bytes(&PathBuf::from("/notes.txt"), b"abc").unwrap();

    run_cli(&args(&["fmt"]), &environment).await.unwrap();

    assert_eq!(environment.read_file_bytes(&PathBuf::from("/notes.txt")).unwrap(), b"ABC");
    assert_eq!(environment.take_logged_messages(), vec!["Formatted 1 file(s).".to_string()]);
  }

  #[tokio::test]
  async fn clear_cache_logs_a_confirmation() {
    let environment = TestEnvironment::new();
    run_cli(&args(&["clear-cache"]), &environment).await.unwrap();
    assert_eq!(environment.take_logged_messages(), vec!["Deleted the plugin cache.".to_string()]);
  }

  #[test]
  fn check_failures_map_to_their_own_exit_code() {
    let app_error = AppError::from(anyhow::Error::new(CheckFailedError { count: 2 }));
    assert_eq!(app_error.exit_code, 20);
    let app_error = AppError::from(anyhow::anyhow!("other"));
    assert_eq!(app_error.exit_code, 1);
  }
}
