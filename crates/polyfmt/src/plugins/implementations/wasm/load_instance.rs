use anyhow::bail;
use anyhow::Result;
use wasmer::Engine;
use wasmer::Imports;
use wasmer::Instance;
use wasmer::Module;
use wasmer::Store;

/// A compiled module paired with the engine that compiled it. The engine
/// must outlive every instance created from the module.
#[derive(Clone)]
pub struct WasmModule {
  pub inner: Module,
  pub engine: Engine,
}

/// Compiles wasm bytes with a single shared engine so module plugins
/// compiled in one run share compilation caches.
pub struct WasmModuleCreator {
  engine: Engine,
}

impl WasmModuleCreator {
  pub fn new() -> Self {
    WasmModuleCreator { engine: Engine::default() }
  }

  pub fn create_from_wasm_bytes(&self, wasm_bytes: &[u8]) -> Result<WasmModule> {
    match Module::new(&self.engine, wasm_bytes) {
      Ok(module) => Ok(WasmModule {
        inner: module,
        engine: self.engine.clone(),
      }),
      Err(err) => bail!("Error compiling wasm module: {:#}", err),
    }
  }
}

pub fn create_store(module: &WasmModule) -> Store {
  Store::new(module.engine.clone())
}

pub fn load_instance(store: &mut Store, module: &WasmModule, import_object: &Imports) -> Result<Instance> {
  match Instance::new(store, &module.inner, import_object) {
    Ok(instance) => Ok(instance),
    Err(err) => bail!("Error instantiating module: {:#}", err),
  }
}
