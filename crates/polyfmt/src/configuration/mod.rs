use std::path::Path;
use std::path::PathBuf;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use indexmap::IndexMap;
use serde::Deserialize;

use crate::environment::Environment;

/// Opaque per-plugin option bag, passed through to the plugin
/// unmodified. Order preserving so plugins see keys as authored.
pub type ConfigKeyMap = IndexMap<String, serde_json::Value>;

pub const CONFIG_FILE_NAMES: [&str; 2] = ["polyfmt.json", ".polyfmt.json"];

/// How the result of an exec plugin invocation is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
  /// File bytes are piped to stdin and the formatted output read from stdout.
  #[default]
  Stdout,
  /// The command rewrites the file in place; the engine stages a
  /// temporary copy so a failed run never corrupts the original.
  Overwrite,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecPluginEntry {
  pub command: String,
  pub exts: Vec<String>,
  #[serde(default)]
  pub mode: ExecMode,
}

/// Policy for remote plugins declared without an integrity digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnverifiedPolicy {
  #[default]
  Warn,
  Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
  /// Directory the configuration file lives in. Exclusion patterns and
  /// relative plugin paths resolve against this.
  pub base_path: PathBuf,
  pub plugins: Vec<String>,
  pub excludes: Vec<String>,
  pub exec: Vec<ExecPluginEntry>,
  /// Format name -> option bag for the remaining top level keys.
  pub plugin_configs: IndexMap<String, ConfigKeyMap>,
  pub concurrency: Option<usize>,
  pub timeout_seconds: u64,
  pub unverified: UnverifiedPolicy,
}

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

pub fn resolve_config(environment: &impl Environment, config_path: Option<&Path>) -> Result<Configuration> {
  let file_path = match config_path {
    Some(path) => path.to_path_buf(),
    None => {
      let cwd = environment.cwd();
      match CONFIG_FILE_NAMES.iter().map(|name| cwd.join(name)).find(|path| environment.path_exists(path)) {
        Some(path) => path,
        None => bail!("Could not find a {} file in {}. Run with --config to specify one.", CONFIG_FILE_NAMES[0], cwd.display()),
      }
    }
  };
  let file_text = environment
    .read_file(&file_path)
    .with_context(|| format!("Error reading configuration file {}", file_path.display()))?;
  let base_path = file_path.parent().map(|p| p.to_path_buf()).unwrap_or_else(|| environment.cwd());
  parse_config_text(&file_text, base_path).with_context(|| format!("Error parsing configuration file {}", file_path.display()))
}

pub fn parse_config_text(file_text: &str, base_path: PathBuf) -> Result<Configuration> {
  let value = jsonc_parser::parse_to_serde_value(file_text, &Default::default())?;
  let serde_json::Value::Object(mut root) = value.unwrap_or(serde_json::Value::Null) else {
    bail!("Expected the configuration to be an object.");
  };

  let plugins = take_string_array(&mut root, "plugins")?;
  let excludes = take_string_array(&mut root, "excludes")?;
  let exec = match root.shift_remove("exec") {
    Some(value) => serde_json::from_value::<Vec<ExecPluginEntry>>(value).context("Error parsing the \"exec\" entries.")?,
    None => Vec::new(),
  };
  let concurrency = match root.shift_remove("concurrency") {
    Some(value) => Some(serde_json::from_value::<usize>(value).context("Expected \"concurrency\" to be a positive integer.")?),
    None => None,
  };
  let timeout_seconds = match root.shift_remove("timeoutSeconds") {
    Some(value) => serde_json::from_value::<u64>(value).context("Expected \"timeoutSeconds\" to be a positive integer.")?,
    None => DEFAULT_TIMEOUT_SECONDS,
  };
  let unverified = match root.shift_remove("unverified") {
    Some(value) => serde_json::from_value::<UnverifiedPolicy>(value).context("Expected \"unverified\" to be \"warn\" or \"error\".")?,
    None => UnverifiedPolicy::default(),
  };

  if let Some(concurrency) = concurrency {
    if concurrency == 0 {
      bail!("Expected \"concurrency\" to be greater than zero.");
    }
  }

  let mut plugin_configs = IndexMap::new();
  for (key, value) in root {
    if key.starts_with('$') {
      continue; // ex. $schema
    }
    let serde_json::Value::Object(bag) = value else {
      bail!("Expected the \"{}\" property to be an object of plugin configuration.", key);
    };
    plugin_configs.insert(key, bag.into_iter().collect::<ConfigKeyMap>());
  }

  Ok(Configuration {
    base_path,
    plugins,
    excludes,
    exec,
    plugin_configs,
    concurrency,
    timeout_seconds,
    unverified,
  })
}

fn take_string_array(root: &mut serde_json::Map<String, serde_json::Value>, key: &str) -> Result<Vec<String>> {
  match root.shift_remove(key) {
    Some(value) => serde_json::from_value::<Vec<String>>(value).with_context(|| format!("Expected \"{}\" to be an array of strings.", key)),
    None => Ok(Vec::new()),
  }
}

#[cfg(test)]
mod test {
  use pretty_assertions::assert_eq;

  use super::*;

  fn parse(text: &str) -> Result<Configuration> {
    parse_config_text(text, PathBuf::from("/project"))
  }

  #[test]
  fn parses_a_full_config() {
    let config = parse(
      r#"{
  // comments are allowed
  "markdown": { "lineWidth": 80 },
  "json": {},
  "exec": [{ "command": "rustfmt --edition 2021 {file}", "exts": ["rs"], "mode": "overwrite" }],
  "excludes": ["build/", "**/*.min.js"],
  "plugins": [
    "https://plugins.example.com/markdown-0.17.8.wasm@e3b98a4da31a127d4bde6e43033f66ba274cab0eb7eb1c70ec41402bf6273dd8",
    "https://plugins.example.com/json-0.19.0.wasm"
  ],
  "timeoutSeconds": 10,
  "unverified": "error"
}"#,
    )
    .unwrap();

    assert_eq!(config.plugins.len(), 2);
    assert_eq!(config.excludes, vec!["build/".to_string(), "**/*.min.js".to_string()]);
    assert_eq!(
      config.exec,
      vec![ExecPluginEntry {
        command: "rustfmt --edition 2021 {file}".to_string(),
        exts: vec!["rs".to_string()],
        mode: ExecMode::Overwrite,
      }]
    );
    assert_eq!(config.plugin_configs.keys().collect::<Vec<_>>(), vec!["markdown", "json"]);
    assert_eq!(config.timeout_seconds, 10);
    assert_eq!(config.unverified, UnverifiedPolicy::Error);
    assert_eq!(config.concurrency, None);
    assert_eq!(config.base_path, PathBuf::from("/project"));
  }

  #[test]
  fn defaults_for_missing_entries() {
    let config = parse("{}").unwrap();
    assert!(config.plugins.is_empty());
    assert!(config.excludes.is_empty());
    assert!(config.exec.is_empty());
    assert_eq!(config.timeout_seconds, 30);
    assert_eq!(config.unverified, UnverifiedPolicy::Warn);
  }

  #[test]
  fn errors_for_non_object_plugin_config() {
    let err = parse(r#"{ "markdown": true }"#).unwrap_err();
    assert_eq!(err.to_string(), "Expected the \"markdown\" property to be an object of plugin configuration.");
  }

  #[test]
  fn errors_for_zero_concurrency() {
    let err = parse(r#"{ "concurrency": 0 }"#).unwrap_err();
    assert_eq!(err.to_string(), "Expected \"concurrency\" to be greater than zero.");
  }
}
