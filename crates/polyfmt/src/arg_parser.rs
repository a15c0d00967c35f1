use anyhow::Result;
use clap::Arg;
use clap::ArgAction;
use clap::Command;
use thiserror::Error;

use crate::environment::LogLevel;

#[derive(Debug, PartialEq, Eq)]
pub struct CliArgs {
  pub sub_command: SubCommand,
  pub config: Option<String>,
  pub concurrency: Option<usize>,
  pub fail_fast: bool,
  pub log_level: LogLevel,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SubCommand {
  /// Formats files in place.
  Fmt,
  /// Reports the files that would change without writing.
  Check,
  ClearCache,
  Help(String),
  Version,
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct ParseArgsError {
  message: String,
}

pub fn parse_args(args: Vec<String>) -> Result<CliArgs, ParseArgsError> {
  let mut cli_parser = create_cli_parser();
  let matches = match cli_parser.try_get_matches_from_mut(&args) {
    Ok(matches) => matches,
    Err(err) => {
      return Err(ParseArgsError {
        message: err.to_string(),
      })
    }
  };

  let sub_command = match matches.subcommand() {
    Some(("fmt", _)) => SubCommand::Fmt,
    Some(("check", _)) => SubCommand::Check,
    Some(("clear-cache", _)) => SubCommand::ClearCache,
    _ => SubCommand::Help(cli_parser.render_help().to_string()),
  };
  let sub_command = if matches.get_flag("version") { SubCommand::Version } else { sub_command };

  let log_level = if matches.get_flag("verbose") {
    LogLevel::Debug
  } else if matches.get_flag("quiet") {
    LogLevel::Warn
  } else {
    LogLevel::Info
  };

  let concurrency = matches.get_one::<usize>("concurrency").copied();
  if concurrency == Some(0) {
    return Err(ParseArgsError {
      message: "--concurrency must be greater than zero.".to_string(),
    });
  }

  Ok(CliArgs {
    sub_command,
    config: matches.get_one::<String>("config").map(String::from),
    concurrency,
    fail_fast: matches.get_flag("fail-fast"),
    log_level,
  })
}

fn create_cli_parser() -> Command {
  Command::new("polyfmt")
    .about("A pluggable code formatting engine.")
    .disable_version_flag(true)
    .subcommand(Command::new("fmt").about("Formats the source files and writes the result to the file system."))
    .subcommand(Command::new("check").about("Checks for any files that haven't been formatted."))
    .subcommand(Command::new("clear-cache").about("Deletes the plugin cache directory."))
    .arg(
      Arg::new("config")
        .long("config")
        .short('c')
        .help("Path to the configuration file.")
        .num_args(1)
        .global(true),
    )
    .arg(
      Arg::new("concurrency")
        .long("concurrency")
        .help("Maximum number of files formatted at the same time.")
        .num_args(1)
        .value_parser(clap::value_parser!(usize))
        .global(true),
    )
    .arg(
      Arg::new("fail-fast")
        .long("fail-fast")
        .help("Stop formatting after the first failure.")
        .action(ArgAction::SetTrue)
        .global(true),
    )
    .arg(
      Arg::new("verbose")
        .long("verbose")
        .help("Prints additional diagnostic information.")
        .action(ArgAction::SetTrue)
        .global(true),
    )
    .arg(
      Arg::new("quiet")
        .long("quiet")
        .help("Only prints warnings and errors.")
        .action(ArgAction::SetTrue)
        .global(true)
        .conflicts_with("verbose"),
    )
    .arg(Arg::new("version").long("version").help("Prints the version.").action(ArgAction::SetTrue))
}

#[cfg(test)]
mod test {
  use pretty_assertions::assert_eq;

  use super::*;

  fn parse(args: &[&str]) -> CliArgs {
    try_parse(args).unwrap()
  }

  fn try_parse(args: &[&str]) -> Result<CliArgs, ParseArgsError> {
    let mut full_args = vec!["polyfmt".to_string()];
    full_args.extend(args.iter().map(|a| a.to_string()));
    parse_args(full_args)
  }

  #[test]
  fn parses_the_fmt_command() {
    let args = parse(&["fmt"]);
    assert_eq!(args.sub_command, SubCommand::Fmt);
    assert_eq!(args.config, None);
    assert!(!args.fail_fast);
    assert_eq!(args.log_level, LogLevel::Info);
  }

  #[test]
  fn parses_check_with_options() {
    let args = parse(&["check", "--config", "other.json", "--concurrency", "2", "--fail-fast", "--verbose"]);
    assert_eq!(args.sub_command, SubCommand::Check);
    assert_eq!(args.config, Some("other.json".to_string()));
    assert_eq!(args.concurrency, Some(2));
    assert!(args.fail_fast);
    assert_eq!(args.log_level, LogLevel::Debug);
  }

  #[test]
  fn errors_for_zero_concurrency() {
    let err = try_parse(&["fmt", "--concurrency", "0"]).unwrap_err();
    assert_eq!(err.to_string(), "--concurrency must be greater than zero.");
  }

  #[test]
  fn errors_for_non_numeric_concurrency() {
    let err = try_parse(&["fmt", "--concurrency", "abc"]).unwrap_err();
    assert!(err.to_string().contains("invalid value"));
  }

  #[test]
  fn parses_clear_cache() {
    let args = parse(&["clear-cache"]);
    assert_eq!(args.sub_command, SubCommand::ClearCache);
  }

  #[test]
  fn shows_help_for_no_subcommand() {
    let args = parse(&[]);
    assert!(matches!(args.sub_command, SubCommand::Help(_)));
  }
}
