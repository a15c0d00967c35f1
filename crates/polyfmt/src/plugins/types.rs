use std::path::Path;
use std::path::PathBuf;

use url::Url;

use crate::configuration::ConfigKeyMap;
use crate::configuration::ExecMode;
use crate::errors::ConfigurationError;

/// Where a module plugin's artifact comes from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathSource {
  Remote(Url),
  Local(PathBuf),
}

impl PathSource {
  pub fn display(&self) -> String {
    match self {
      PathSource::Remote(url) => url.to_string(),
      PathSource::Local(path) => path.display().to_string(),
    }
  }
}

/// A module plugin identifier as authored: its source plus the optional
/// pinned integrity digest.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PluginSourceReference {
  pub path_source: PathSource,
  pub checksum: Option<String>,
}

impl PluginSourceReference {
  pub fn display(&self) -> String {
    self.path_source.display()
  }
}

/// A plugin declaration resolved to a typed spec at configuration parse
/// time. Immutable afterwards; registration order is dispatch priority.
#[derive(Clone, Debug, PartialEq)]
pub enum PluginSpec {
  Module(ModulePluginSpec),
  Exec(ExecPluginSpec),
}

impl PluginSpec {
  pub fn name(&self) -> &str {
    match self {
      PluginSpec::Module(spec) => &spec.name,
      PluginSpec::Exec(spec) => &spec.name,
    }
  }

  pub fn file_extensions(&self) -> &[String] {
    match self {
      PluginSpec::Module(spec) => &spec.file_extensions,
      PluginSpec::Exec(spec) => &spec.exts,
    }
  }

  pub fn associations(&self) -> Option<&[String]> {
    match self {
      PluginSpec::Module(spec) => spec.associations.as_deref(),
      PluginSpec::Exec(_) => None,
    }
  }

  /// Key used to memoize resolution for the process lifetime.
  pub fn identity(&self) -> PluginSpecIdentity {
    match self {
      PluginSpec::Module(spec) => PluginSpecIdentity::Module(spec.reference.clone()),
      PluginSpec::Exec(spec) => PluginSpecIdentity::Exec(spec.command.text.clone()),
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PluginSpecIdentity {
  Module(PluginSourceReference),
  Exec(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModulePluginSpec {
  pub reference: PluginSourceReference,
  /// Inferred from the identifier's file stem (ex. `markdown-0.17.8.wasm`
  /// infers `markdown`).
  pub name: String,
  /// Lowercase extension claims used by the dispatcher.
  pub file_extensions: Vec<String>,
  /// True when the extensions came from the plugin's option bag rather
  /// than the built-in table.
  pub explicit_extensions: bool,
  /// Additional glob pattern claims from the plugin's option bag.
  pub associations: Option<Vec<String>>,
  pub config: ConfigKeyMap,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExecPluginSpec {
  pub name: String,
  pub command: CommandTemplate,
  /// Lowercase extension claims. Exec plugins are always matched by this
  /// explicit list.
  pub exts: Vec<String>,
  pub mode: ExecMode,
}

pub const FILE_TOKEN: &str = "{file}";

/// A validated external formatter command. The `{file}` token, when
/// present, is substituted with the matched file's path at spawn time.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommandTemplate {
  pub text: String,
  parts: Vec<String>,
}

impl CommandTemplate {
  pub fn parse(text: &str) -> Result<CommandTemplate, ConfigurationError> {
    let parts = text.split_whitespace().map(|p| p.to_string()).collect::<Vec<_>>();
    let malformed = |reason: &str| ConfigurationError::MalformedPluginSpec {
      specifier: text.to_string(),
      reason: reason.to_string(),
    };
    if parts.is_empty() {
      return Err(malformed("the command is empty"));
    }
    if parts[0] == FILE_TOKEN {
      return Err(malformed("the {file} token cannot be the program"));
    }
    if parts.iter().filter(|p| p.as_str() == FILE_TOKEN).count() > 1 {
      return Err(malformed("the {file} token may appear at most once"));
    }
    Ok(CommandTemplate {
      text: text.to_string(),
      parts,
    })
  }

  pub fn program(&self) -> &str {
    &self.parts[0]
  }

  pub fn args(&self, file_path: &Path) -> Vec<String> {
    self.parts[1..]
      .iter()
      .map(|part| {
        if part == FILE_TOKEN {
          file_path.to_string_lossy().to_string()
        } else {
          part.clone()
        }
      })
      .collect()
  }

  pub fn has_file_token(&self) -> bool {
    self.parts.iter().any(|p| p == FILE_TOKEN)
  }
}
