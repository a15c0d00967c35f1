use std::path::Path;
use std::path::PathBuf;

use ignore::overrides::Override;
use ignore::overrides::OverrideBuilder;
use ignore::Match;

use crate::errors::ConfigurationError;

pub struct GlobMatcherOptions {
  pub case_sensitive: bool,
}

impl Default for GlobMatcherOptions {
  fn default() -> Self {
    GlobMatcherOptions {
      case_sensitive: !cfg!(windows),
    }
  }
}

/// Compiled set of glob patterns matched against paths relative to a
/// base directory. Compiling front-loads all pattern errors so matching
/// itself can never fail partway through a tree scan; matching is pure
/// and safe to call from many workers at once.
#[derive(Debug)]
pub struct GlobMatcher {
  base_dir: PathBuf,
  matcher: Override,
}

impl GlobMatcher {
  pub fn new(patterns: &[String], base_dir: PathBuf, options: &GlobMatcherOptions) -> Result<GlobMatcher, ConfigurationError> {
    let mut builder = OverrideBuilder::new(&base_dir);
    builder.case_insensitive(!options.case_sensitive).map_err(|err| ConfigurationError::InvalidPattern {
      pattern: String::new(),
      message: format!("{:#}", err),
    })?;
    for pattern in patterns {
      for processed in process_pattern(pattern) {
        builder.add(&processed).map_err(|err| ConfigurationError::InvalidPattern {
          pattern: pattern.clone(),
          message: format!("{:#}", err),
        })?;
      }
    }
    let matcher = builder.build().map_err(|err| ConfigurationError::InvalidPattern {
      pattern: String::new(),
      message: format!("{:#}", err),
    })?;
    Ok(GlobMatcher { base_dir, matcher })
  }

  pub fn matches(&self, path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    let path = path.strip_prefix(&self.base_dir).unwrap_or(path);
    matches!(self.matcher.matched(path, false), Match::Whitelist(_))
  }

}

/// Expands one configuration pattern into the gitignore-style patterns
/// fed to the override builder. Patterns are anchored at the base
/// directory, `*` stays within a segment and `**` crosses segments; a
/// trailing slash means the directory and everything beneath it.
fn process_pattern(pattern: &str) -> Vec<String> {
  let pattern = pattern.replace('\\', "/");
  let pattern = pattern.strip_prefix("./").unwrap_or(&pattern);
  let anchored = if pattern.starts_with('/') {
    pattern.to_string()
  } else {
    format!("/{}", pattern)
  };
  match anchored.strip_suffix('/') {
    Some(dir) => vec![format!("{}/", dir), format!("{}/**", dir)],
    None => vec![anchored],
  }
}
