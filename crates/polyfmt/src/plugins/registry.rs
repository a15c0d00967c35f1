use std::collections::HashMap;
use std::path::PathBuf;

use url::Url;

use crate::configuration::ConfigKeyMap;
use crate::configuration::Configuration;
use crate::configuration::ExecMode;
use crate::errors::ConfigurationError;
use crate::utils::is_checksum;

use super::types::CommandTemplate;
use super::types::ExecPluginSpec;
use super::types::ModulePluginSpec;
use super::types::PathSource;
use super::types::PluginSourceReference;
use super::types::PluginSpec;

/// Extensions claimed by well known format names when a plugin's option
/// bag doesn't say otherwise.
const KNOWN_FORMAT_EXTENSIONS: [(&str, &[&str]); 8] = [
  ("typescript", &["ts", "tsx", "js", "jsx", "mjs", "cjs", "mts", "cts"]),
  ("json", &["json", "jsonc"]),
  ("markdown", &["md", "markdown"]),
  ("toml", &["toml"]),
  ("yaml", &["yaml", "yml"]),
  ("css", &["css", "scss", "sass", "less"]),
  ("html", &["html", "htm"]),
  ("dockerfile", &["dockerfile"]),
];

/// Turns the configuration's plugin declarations into an ordered list of
/// typed specs. Order is dispatch priority: exec records first in
/// declared order, then the plugins list in declared order. Pure, no
/// network or disk access.
pub fn register_plugins(config: &Configuration) -> Result<Vec<PluginSpec>, ConfigurationError> {
  let mut specs = Vec::with_capacity(config.exec.len() + config.plugins.len());

  for entry in &config.exec {
    let command = CommandTemplate::parse(&entry.command)?;
    if entry.exts.is_empty() {
      return Err(ConfigurationError::MalformedPluginSpec {
        specifier: entry.command.clone(),
        reason: "an exec entry must claim at least one extension".to_string(),
      });
    }
    if entry.mode == ExecMode::Overwrite && !command.has_file_token() {
      return Err(ConfigurationError::MalformedPluginSpec {
        specifier: entry.command.clone(),
        reason: "overwrite mode requires a {file} token in the command".to_string(),
      });
    }
    let name = PathBuf::from(command.program())
      .file_stem()
      .and_then(|s| s.to_str())
      .unwrap_or(command.program())
      .to_string();
    specs.push(PluginSpec::Exec(ExecPluginSpec {
      name,
      command,
      exts: entry.exts.iter().map(|e| e.trim_start_matches('.').to_lowercase()).collect(),
      mode: entry.mode,
    }));
  }

  // extension -> name of the first module plugin that claimed it through
  // the built-in table
  let mut builtin_claims: HashMap<String, String> = HashMap::new();

  for specifier in &config.plugins {
    let reference = parse_plugin_source_reference(specifier, &config.base_path)?;
    let name = infer_plugin_name(&reference).ok_or_else(|| ConfigurationError::MalformedPluginSpec {
      specifier: specifier.clone(),
      reason: "could not infer a plugin name from the identifier".to_string(),
    })?;
    let mut plugin_config = config.plugin_configs.get(&name).cloned().unwrap_or_default();
    let explicit_extensions = take_string_vec(&mut plugin_config, "exts", specifier)?;
    let associations = take_string_vec(&mut plugin_config, "associations", specifier)?;

    let (file_extensions, explicit) = match explicit_extensions {
      Some(exts) => (exts.into_iter().map(|e| e.trim_start_matches('.').to_lowercase()).collect(), true),
      None => match KNOWN_FORMAT_EXTENSIONS.iter().find(|(known_name, _)| *known_name == name) {
        Some((_, exts)) => (exts.iter().map(|e| e.to_string()).collect::<Vec<_>>(), false),
        None if associations.is_some() => (Vec::new(), true),
        None => {
          return Err(ConfigurationError::MalformedPluginSpec {
            specifier: specifier.clone(),
            reason: format!("unknown format \"{}\" and no \"exts\" or \"associations\" configured for it", name),
          })
        }
      },
    };

    if !explicit {
      for ext in &file_extensions {
        if let Some(first) = builtin_claims.get(ext) {
          return Err(ConfigurationError::DuplicatePluginForExtension {
            extension: ext.clone(),
            first: first.clone(),
            second: name.clone(),
          });
        }
      }
      for ext in &file_extensions {
        builtin_claims.insert(ext.clone(), name.clone());
      }
    }

    specs.push(PluginSpec::Module(ModulePluginSpec {
      reference,
      name,
      file_extensions,
      explicit_extensions: explicit,
      associations,
      config: plugin_config,
    }));
  }

  Ok(specs)
}

/// Splits an optional trailing `@sha256-hex` off a plugin identifier.
/// The digest is only recognized when what precedes the `@` is itself a
/// module artifact path, so URLs containing `@` elsewhere stay intact.
pub fn parse_plugin_source_reference(specifier: &str, base_path: &std::path::Path) -> Result<PluginSourceReference, ConfigurationError> {
  let specifier = specifier.trim();
  if specifier.is_empty() {
    return Err(ConfigurationError::MalformedPluginSpec {
      specifier: specifier.to_string(),
      reason: "the identifier is empty".to_string(),
    });
  }
  let (source_text, checksum) = match specifier.rsplit_once('@') {
    Some((prefix, suffix)) if prefix.to_lowercase().ends_with(".wasm") => {
      if !is_checksum(suffix) {
        return Err(ConfigurationError::MalformedPluginSpec {
          specifier: specifier.to_string(),
          reason: "expected the text after the @ to be a sha256 hex digest".to_string(),
        });
      }
      (prefix, Some(suffix.to_lowercase()))
    }
    _ => (specifier, None),
  };
  let path_source = if source_text.starts_with("http://") || source_text.starts_with("https://") {
    let url = Url::parse(source_text).map_err(|err| ConfigurationError::MalformedPluginSpec {
      specifier: specifier.to_string(),
      reason: err.to_string(),
    })?;
    PathSource::Remote(url)
  } else {
    let path = PathBuf::from(source_text.strip_prefix("./").unwrap_or(source_text));
    let path = if path.is_absolute() { path } else { base_path.join(path) };
    PathSource::Local(path)
  };
  Ok(PluginSourceReference { path_source, checksum })
}

/// Infers a plugin name from the identifier's file stem, stripping a
/// trailing `-x.y.z` version (ex. `markdown-0.17.8.wasm` -> `markdown`).
fn infer_plugin_name(reference: &PluginSourceReference) -> Option<String> {
  let file_name = match &reference.path_source {
    PathSource::Remote(url) => url.path_segments()?.filter(|s| !s.is_empty()).next_back()?.to_string(),
    PathSource::Local(path) => path.file_name()?.to_str()?.to_string(),
  };
  let stem = file_name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(&file_name);
  let name = match stem.rsplit_once('-') {
    Some((prefix, suffix)) if is_version(suffix) => prefix,
    _ => stem,
  };
  if name.is_empty() {
    None
  } else {
    Some(name.to_lowercase())
  }
}

fn is_version(text: &str) -> bool {
  let parts = text.split('.').collect::<Vec<_>>();
  parts.len() >= 2 && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

fn take_string_vec(config: &mut ConfigKeyMap, key: &str, specifier: &str) -> Result<Option<Vec<String>>, ConfigurationError> {
  match config.shift_remove(key) {
    Some(value) => serde_json::from_value::<Vec<String>>(value)
      .map(Some)
      .map_err(|_| ConfigurationError::MalformedPluginSpec {
        specifier: specifier.to_string(),
        reason: format!("expected \"{}\" to be an array of strings", key),
      }),
    None => Ok(None),
  }
}

#[cfg(test)]
mod test {
  use pretty_assertions::assert_eq;

  use crate::configuration::parse_config_text;
  use crate::configuration::ExecMode;

  use super::*;

  fn register(config_text: &str) -> Result<Vec<PluginSpec>, ConfigurationError> {
    let config = parse_config_text(config_text, PathBuf::from("/project")).unwrap();
    register_plugins(&config)
  }

  #[test]
  fn registers_exec_entries_before_module_plugins() {
    let specs = register(
      r#"{
  "plugins": ["https://plugins.example.com/typescript-0.93.0.wasm"],
  "exec": [{ "command": "rustfmt {file}", "exts": ["rs"] }]
}"#,
    )
    .unwrap();
    assert_eq!(specs.iter().map(|s| s.name()).collect::<Vec<_>>(), vec!["rustfmt", "typescript"]);
  }

  #[test]
  fn preserves_declared_order_within_each_group() {
    let specs = register(
      r#"{
  "exec": [
    { "command": "first {file}", "exts": ["rs"] },
    { "command": "second {file}", "exts": ["rs"] }
  ]
}"#,
    )
    .unwrap();
    assert_eq!(specs.iter().map(|s| s.name()).collect::<Vec<_>>(), vec!["first", "second"]);
  }

  #[test]
  fn infers_names_and_builtin_extensions() {
    let specs = register(r#"{ "plugins": ["https://plugins.example.com/markdown-0.17.8.wasm"] }"#).unwrap();
    let PluginSpec::Module(spec) = &specs[0] else { panic!() };
    assert_eq!(spec.name, "markdown");
    assert_eq!(spec.file_extensions, vec!["md".to_string(), "markdown".to_string()]);
    assert!(!spec.explicit_extensions);
  }

  #[test]
  fn exts_in_option_bag_override_builtin_claims() {
    let specs = register(
      r#"{
  "plugins": ["https://plugins.example.com/markdown-0.17.8.wasm"],
  "markdown": { "exts": [".MDX"], "lineWidth": 80 }
}"#,
    )
    .unwrap();
    let PluginSpec::Module(spec) = &specs[0] else { panic!() };
    assert_eq!(spec.file_extensions, vec!["mdx".to_string()]);
    assert!(spec.explicit_extensions);
    // dispatch-only keys are not passed through to the plugin
    assert_eq!(spec.config.keys().collect::<Vec<_>>(), vec!["lineWidth"]);
  }

  #[test]
  fn errors_for_overlapping_builtin_claims() {
    let err = register(
      r#"{ "plugins": [
  "https://plugins.example.com/markdown-0.17.8.wasm",
  "https://other.example.com/markdown-0.10.0.wasm"
] }"#,
    )
    .unwrap_err();
    match err {
      ConfigurationError::DuplicatePluginForExtension { extension, first, second } => {
        assert_eq!(extension, "md");
        assert_eq!(first, "markdown");
        assert_eq!(second, "markdown");
      }
      _ => panic!("expected DuplicatePluginForExtension"),
    }
  }

  #[test]
  fn allows_overlap_when_extensions_are_explicit() {
    let specs = register(
      r#"{
  "plugins": [
    "https://plugins.example.com/markdown-0.17.8.wasm",
    "https://other.example.com/mdfmt-1.0.0.wasm"
  ],
  "mdfmt": { "exts": ["md"] }
}"#,
    )
    .unwrap();
    assert_eq!(specs.len(), 2);
  }

  #[test]
  fn errors_for_unknown_format_without_extensions() {
    let err = register(r#"{ "plugins": ["https://plugins.example.com/obscure-1.0.0.wasm"] }"#).unwrap_err();
    assert!(matches!(err, ConfigurationError::MalformedPluginSpec { .. }));
  }

  #[test]
  fn associations_alone_are_enough_for_unknown_formats() {
    let specs = register(
      r#"{
  "plugins": ["https://plugins.example.com/obscure-1.0.0.wasm"],
  "obscure": { "associations": ["**/*.obs"] }
}"#,
    )
    .unwrap();
    let PluginSpec::Module(spec) = &specs[0] else { panic!() };
    assert!(spec.file_extensions.is_empty());
    assert_eq!(spec.associations, Some(vec!["**/*.obs".to_string()]));
  }

  #[test]
  fn errors_for_empty_exec_extension_list() {
    let err = register(r#"{ "exec": [{ "command": "rustfmt {file}", "exts": [] }] }"#).unwrap_err();
    assert!(matches!(err, ConfigurationError::MalformedPluginSpec { .. }));
  }

  #[test]
  fn errors_for_overwrite_mode_without_a_file_token() {
    let err = register(r#"{ "exec": [{ "command": "rustfmt", "exts": ["rs"], "mode": "overwrite" }] }"#).unwrap_err();
    assert!(matches!(err, ConfigurationError::MalformedPluginSpec { .. }));
  }

  #[test]
  fn exec_entries_default_to_stdout_mode() {
    let specs = register(r#"{ "exec": [{ "command": "shfmt", "exts": ["sh"] }] }"#).unwrap();
    let PluginSpec::Exec(spec) = &specs[0] else { panic!() };
    assert_eq!(spec.mode, ExecMode::Stdout);
  }

  #[test]
  fn parses_a_reference_with_checksum() {
    let reference = parse_plugin_source_reference(
      "https://plugins.example.com/json-0.19.0.wasm@e3b98a4da31a127d4bde6e43033f66ba274cab0eb7eb1c70ec41402bf6273dd8",
      &PathBuf::from("/project"),
    )
    .unwrap();
    assert_eq!(
      reference.checksum.as_deref(),
      Some("e3b98a4da31a127d4bde6e43033f66ba274cab0eb7eb1c70ec41402bf6273dd8")
    );
    assert_eq!(reference.path_source.display(), "https://plugins.example.com/json-0.19.0.wasm");
  }

  #[test]
  fn errors_for_a_malformed_checksum() {
    let err = parse_plugin_source_reference("https://plugins.example.com/json-0.19.0.wasm@nothex", &PathBuf::from("/project")).unwrap_err();
    assert!(matches!(err, ConfigurationError::MalformedPluginSpec { .. }));
  }

  #[test]
  fn resolves_relative_local_paths_against_the_base() {
    let reference = parse_plugin_source_reference("./plugins/markdown-0.17.8.wasm", &PathBuf::from("/project")).unwrap();
    assert_eq!(reference.path_source, PathSource::Local(PathBuf::from("/project/plugins/markdown-0.17.8.wasm")));
    assert_eq!(reference.checksum, None);
  }
}
