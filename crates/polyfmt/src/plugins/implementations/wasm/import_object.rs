use wasmer::Imports;

/// Module plugins get no host imports at all. Anything they do happens
/// inside their own linear memory, so a plugin cannot touch the file
/// system, network or environment of the host process.
pub fn create_import_object() -> Imports {
  Imports::new()
}
