mod import_object;
mod instance;
mod load_instance;
mod plugin;

pub use import_object::create_import_object;
pub use load_instance::WasmModuleCreator;
pub use plugin::WasmPlugin;
