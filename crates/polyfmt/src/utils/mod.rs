mod checksums;
mod glob;

pub use checksums::*;
pub use glob::*;

use std::path::Path;

pub fn get_lowercase_file_extension(file_path: &Path) -> Option<String> {
  file_path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase())
}
