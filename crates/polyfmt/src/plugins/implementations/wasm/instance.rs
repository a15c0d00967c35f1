use std::path::Path;

use anyhow::anyhow;
use anyhow::bail;
use anyhow::Result;
use wasmer::Engine;
use wasmer::Instance;
use wasmer::Memory;
use wasmer::MemoryView;
use wasmer::Store;
use wasmer::TypedFunction;
use wasmer::WasmPtr;
use wasmer::WasmTypeList;

use crate::configuration::ConfigKeyMap;
use crate::errors::InvocationError;
use crate::plugins::FormatResult;

const PLUGIN_SCHEMA_VERSION: u32 = 1;

enum WasmFormatResponse {
  NoChange,
  Change,
  Error,
}

/// Drives one module instance. Calls are synchronous and `&mut`, so an
/// instance is owned by exactly one thread at a time.
pub struct WasmPluginInstance {
  wasm_functions: WasmFunctions,
  buffer_size: usize,
}

impl WasmPluginInstance {
  pub fn new(store: Store, instance: Instance, engine: Engine) -> Result<Self> {
    let mut wasm_functions = WasmFunctions::new(store, instance, engine)?;
    let schema_version = wasm_functions.get_plugin_schema_version()?;
    if schema_version != PLUGIN_SCHEMA_VERSION {
      bail!(
        "The module uses schema version {} but this version of the engine only supports version {}.",
        schema_version,
        PLUGIN_SCHEMA_VERSION
      );
    }
    let buffer_size = wasm_functions.get_wasm_memory_buffer_size()?;
    Ok(WasmPluginInstance { wasm_functions, buffer_size })
  }

  pub fn set_plugin_config(&mut self, plugin_config: &ConfigKeyMap) -> Result<()> {
    let json = serde_json::to_string(plugin_config)?;
    self.send_string(&json)?;
    self.wasm_functions.set_plugin_config()?;
    Ok(())
  }

  /// Outer error means the instance trapped and can no longer be used.
  /// Inner error is a failure the plugin itself reported.
  pub fn format_text(&mut self, file_path: &Path, file_bytes: &[u8]) -> Result<FormatResult> {
    self.send_string(&file_path.to_string_lossy())?;
    self.wasm_functions.set_file_path()?;

    self.send_bytes(file_bytes)?;
    let response = self.wasm_functions.format()?;

    match response {
      WasmFormatResponse::NoChange => Ok(Ok(None)),
      WasmFormatResponse::Change => {
        let len = self.wasm_functions.get_formatted_text()?;
        let bytes = self.receive_bytes(len)?;
        Ok(Ok(Some(bytes)))
      }
      WasmFormatResponse::Error => {
        let len = self.wasm_functions.get_error_text()?;
        let text = self.receive_string(len)?;
        Ok(Err(InvocationError::ModuleFault(text)))
      }
    }
  }

  /* low level sending and receiving */

  fn send_string(&mut self, text: &str) -> Result<()> {
    self.send_bytes(text.as_bytes())
  }

  fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
    let mut index = 0;
    let len = bytes.len();
    self.wasm_functions.clear_shared_bytes(len)?;
    while index < len {
      let write_count = std::cmp::min(len - index, self.buffer_size);
      self.write_bytes_to_memory_buffer(&bytes[index..(index + write_count)])?;
      self.wasm_functions.add_to_shared_bytes_from_buffer(write_count)?;
      index += write_count;
    }
    Ok(())
  }

  fn write_bytes_to_memory_buffer(&mut self, bytes: &[u8]) -> Result<()> {
    let wasm_buffer_pointer = self.wasm_functions.get_wasm_memory_buffer_ptr()?;
    let memory_view = self.wasm_functions.get_memory_view();
    memory_view.write(wasm_buffer_pointer.offset() as u64, bytes)?;
    Ok(())
  }

  fn receive_string(&mut self, len: usize) -> Result<String> {
    let bytes = self.receive_bytes(len)?;
    Ok(String::from_utf8(bytes)?)
  }

  fn receive_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
    let mut index = 0;
    let mut bytes: Vec<u8> = vec![0; len];
    while index < len {
      let read_count = std::cmp::min(len - index, self.buffer_size);
      self.wasm_functions.set_buffer_with_shared_bytes(index, read_count)?;
      self.read_bytes_from_memory_buffer(&mut bytes[index..(index + read_count)])?;
      index += read_count;
    }
    Ok(bytes)
  }

  fn read_bytes_from_memory_buffer(&mut self, bytes: &mut [u8]) -> Result<()> {
    let wasm_buffer_pointer = self.wasm_functions.get_wasm_memory_buffer_ptr()?;
    let memory_view = self.wasm_functions.get_memory_view();
    memory_view.read(wasm_buffer_pointer.offset() as u64, bytes)?;
    Ok(())
  }
}

struct WasmFunctions {
  store: Store,
  instance: Instance,
  memory: Memory,
  // keep this alive for the duration of the instance otherwise it
  // could be cleaned up before the instance is dropped
  _engine: Engine,
}

impl WasmFunctions {
  pub fn new(store: Store, instance: Instance, engine: Engine) -> Result<Self> {
    let memory = instance.exports.get_memory("memory")?.clone();
    Ok(WasmFunctions {
      store,
      instance,
      memory,
      _engine: engine,
    })
  }

  #[inline]
  pub fn get_plugin_schema_version(&mut self) -> Result<u32> {
    let func = self.get_export::<(), u32>("get_plugin_schema_version")?;
    Ok(func.call(&mut self.store)?)
  }

  #[inline]
  pub fn set_plugin_config(&mut self) -> Result<()> {
    let func = self.get_export::<(), ()>("set_plugin_config")?;
    Ok(func.call(&mut self.store)?)
  }

  #[inline]
  pub fn set_file_path(&mut self) -> Result<()> {
    let func = self.get_export::<(), ()>("set_file_path")?;
    Ok(func.call(&mut self.store)?)
  }

  #[inline]
  pub fn format(&mut self) -> Result<WasmFormatResponse> {
    let func = self.get_export::<(), u8>("format")?;
    let value = func.call(&mut self.store)?;
    match value {
      0 => Ok(WasmFormatResponse::NoChange),
      1 => Ok(WasmFormatResponse::Change),
      2 => Ok(WasmFormatResponse::Error),
      value => Err(anyhow!("Unknown format response code: {}", value)),
    }
  }

  #[inline]
  pub fn get_formatted_text(&mut self) -> Result<usize> {
    let func = self.get_export::<(), u32>("get_formatted_text")?;
    Ok(func.call(&mut self.store).map(|value| value as usize)?)
  }

  #[inline]
  pub fn get_error_text(&mut self) -> Result<usize> {
    let func = self.get_export::<(), u32>("get_error_text")?;
    Ok(func.call(&mut self.store).map(|value| value as usize)?)
  }

  #[inline]
  pub fn get_memory_view(&self) -> MemoryView {
    self.memory.view(&self.store)
  }

  #[inline]
  pub fn clear_shared_bytes(&mut self, capacity: usize) -> Result<()> {
    let func = self.get_export::<u32, ()>("clear_shared_bytes")?;
    Ok(func.call(&mut self.store, capacity as u32)?)
  }

  #[inline]
  pub fn get_wasm_memory_buffer_size(&mut self) -> Result<usize> {
    let func = self.get_export::<(), u32>("get_wasm_memory_buffer_size")?;
    Ok(func.call(&mut self.store).map(|value| value as usize)?)
  }

  #[inline]
  pub fn get_wasm_memory_buffer_ptr(&mut self) -> Result<WasmPtr<u32>> {
    let func = self.get_export::<(), WasmPtr<u32>>("get_wasm_memory_buffer")?;
    Ok(func.call(&mut self.store)?)
  }

  #[inline]
  pub fn set_buffer_with_shared_bytes(&mut self, offset: usize, length: usize) -> Result<()> {
    let func = self.get_export::<(u32, u32), ()>("set_buffer_with_shared_bytes")?;
    Ok(func.call(&mut self.store, offset as u32, length as u32)?)
  }

  #[inline]
  pub fn add_to_shared_bytes_from_buffer(&mut self, length: usize) -> Result<()> {
    let func = self.get_export::<u32, ()>("add_to_shared_bytes_from_buffer")?;
    Ok(func.call(&mut self.store, length as u32)?)
  }

  fn get_export<Args, Rets>(&mut self, name: &str) -> Result<TypedFunction<Args, Rets>>
  where
    Args: WasmTypeList,
    Rets: WasmTypeList,
  {
    match self.instance.exports.get_function(name) {
      Ok(func) => match func.typed::<Args, Rets>(&self.store) {
        Ok(native_func) => Ok(native_func),
        Err(err) => bail!("Error creating function '{}'. Message: {:#}", name, err),
      },
      Err(err) => bail!("Could not find export in module with name '{}'. Message: {:#}", name, err),
    }
  }
}
