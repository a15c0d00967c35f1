use std::collections::HashSet;
use std::path::Path;

use crate::configuration::Configuration;
use crate::errors::ConfigurationError;
use crate::plugins::types::PluginSpec;
use crate::utils::get_lowercase_file_extension;
use crate::utils::GlobMatcher;
use crate::utils::GlobMatcherOptions;

/// Picks at most one plugin for a path. Exclusion always wins, then the
/// first spec in registration order whose claims match. No match is a
/// normal outcome, such files are left alone.
pub struct FileDispatcher {
  exclusion_matcher: GlobMatcher,
  entries: Vec<DispatchEntry>,
}

struct DispatchEntry {
  /// Lowercase extensions, also matched against the whole lowercase
  /// file name so claims like `dockerfile` catch extensionless files.
  extensions: HashSet<String>,
  associations: Option<GlobMatcher>,
}

impl FileDispatcher {
  pub fn new(config: &Configuration, specs: &[PluginSpec]) -> Result<Self, ConfigurationError> {
    let options = GlobMatcherOptions::default();
    let exclusion_matcher = GlobMatcher::new(&config.excludes, config.base_path.clone(), &options)?;
    let mut entries = Vec::with_capacity(specs.len());
    for spec in specs {
      let associations = match spec.associations() {
        Some(patterns) => Some(GlobMatcher::new(patterns, config.base_path.clone(), &options)?),
        None => None,
      };
      entries.push(DispatchEntry {
        extensions: spec.file_extensions().iter().map(|e| e.to_lowercase()).collect(),
        associations,
      });
    }
    Ok(FileDispatcher { exclusion_matcher, entries })
  }

  /// Returns the index of the selected spec.
  pub fn select(&self, file_path: &Path) -> Option<usize> {
    if self.exclusion_matcher.matches(file_path) {
      return None;
    }
    let extension = get_lowercase_file_extension(file_path);
    let file_name = file_path.file_name().and_then(|f| f.to_str()).map(|f| f.to_lowercase());
    self.entries.iter().position(|entry| {
      if let Some(extension) = &extension {
        if entry.extensions.contains(extension) {
          return true;
        }
      }
      if let Some(file_name) = &file_name {
        if entry.extensions.contains(file_name) {
          return true;
        }
      }
      match &entry.associations {
        Some(matcher) => matcher.matches(file_path),
        None => false,
      }
    })
  }
}
