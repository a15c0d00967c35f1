use crate::errors::ResolveError;

pub fn get_sha256_checksum(bytes: &[u8]) -> String {
  use sha2::Digest;
  use sha2::Sha256;
  let mut hasher = Sha256::new();
  hasher.update(bytes);
  format!("{:x}", hasher.finalize())
}

pub fn verify_sha256_checksum(bytes: &[u8], checksum: &str, source: &str) -> Result<(), ResolveError> {
  let bytes_checksum = get_sha256_checksum(bytes);
  if bytes_checksum != checksum.to_lowercase() {
    Err(ResolveError::IntegrityMismatch {
      origin: source.to_string(),
      expected: checksum.to_string(),
      actual: bytes_checksum,
    })
  } else {
    Ok(())
  }
}

pub fn is_checksum(text: &str) -> bool {
  text.len() == 64 && text.chars().all(|c| c.is_ascii_hexdigit())
}
