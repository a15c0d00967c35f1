use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::configuration::ConfigKeyMap;
use crate::environment::Environment;
use crate::errors::InvocationError;
use crate::plugins::FormatRequest;
use crate::plugins::FormatResult;
use crate::plugins::InitializedPlugin;
use crate::plugins::Plugin;

use super::create_import_object;
use super::load_instance::create_store;
use super::load_instance::load_instance;
use super::load_instance::WasmModule;
use super::instance::WasmPluginInstance;

pub struct WasmPlugin<TEnvironment: Environment> {
  name: String,
  module: WasmModule,
  config: Arc<ConfigKeyMap>,
  environment: TEnvironment,
}

impl<TEnvironment: Environment> WasmPlugin<TEnvironment> {
  pub fn new(name: String, module: WasmModule, config: ConfigKeyMap, environment: TEnvironment) -> Self {
    WasmPlugin {
      name,
      module,
      config: Arc::new(config),
      environment,
    }
  }
}

#[async_trait(?Send)]
impl<TEnvironment: Environment> Plugin for WasmPlugin<TEnvironment> {
  fn name(&self) -> &str {
    &self.name
  }

  async fn initialize(&self) -> Result<Arc<dyn InitializedPlugin>> {
    Ok(Arc::new(InitializedWasmPlugin {
      name: self.name.clone(),
      module: self.module.clone(),
      config: self.config.clone(),
      pending_instances: Default::default(),
      environment: self.environment.clone(),
    }))
  }
}

struct WasmFormatMessage {
  file_path: PathBuf,
  file_bytes: Vec<u8>,
}

// outer error = the instance trapped and is no longer usable
type WasmResponseSender = tokio::sync::oneshot::Sender<Result<FormatResult>>;
type WasmPluginSender = std::sync::mpsc::Sender<(Arc<WasmFormatMessage>, WasmResponseSender)>;

/// Pools module instances. Each instance runs on its own dedicated
/// thread so a call never blocks the async runtime; concurrent callers
/// get separate instances because a call holds the instance for its
/// whole duration.
struct InitializedWasmPlugin<TEnvironment: Environment> {
  name: String,
  module: WasmModule,
  config: Arc<ConfigKeyMap>,
  pending_instances: Mutex<Vec<WasmPluginSender>>,
  environment: TEnvironment,
}

impl<TEnvironment: Environment> InitializedWasmPlugin<TEnvironment> {
  async fn get_or_create_instance(&self) -> Result<WasmPluginSender> {
    let maybe_instance = self.pending_instances.lock().pop(); // needs to be on a separate line
    match maybe_instance {
      Some(sender) => Ok(sender),
      None => self.create_instance().await,
    }
  }

  fn release_instance(&self, sender: WasmPluginSender) {
    self.pending_instances.lock().push(sender);
  }

  async fn create_instance(&self) -> Result<WasmPluginSender> {
    let start_instant = Instant::now();
    log_debug!(self.environment, "Creating instance of {}", self.name);

    let (tx, rx) = std::sync::mpsc::channel::<(Arc<WasmFormatMessage>, WasmResponseSender)>();
    let (initialize_tx, initialize_rx) = tokio::sync::oneshot::channel::<Result<()>>();

    // the instance lives on a dedicated thread because wasmer calls are
    // synchronous and the instance is not Sync
    tokio::task::spawn_blocking({
      let module = self.module.clone();
      let config = self.config.clone();
      move || {
        let initialize = || {
          let mut store = create_store(&module);
          let import_object = create_import_object();
          let instance = load_instance(&mut store, &module, &import_object)?;
          let mut instance = WasmPluginInstance::new(store, instance, module.engine.clone())?;
          instance.set_plugin_config(&config)?;
          Ok::<_, anyhow::Error>(instance)
        };
        let mut instance = match initialize() {
          Ok(instance) => {
            if initialize_tx.send(Ok(())).is_err() {
              return; // disconnected
            }
            instance
          }
          Err(err) => {
            let _ = initialize_tx.send(Err(err));
            return; // quit
          }
        };
        while let Ok((message, response)) = rx.recv() {
          let result = instance.format_text(&message.file_path, &message.file_bytes);
          let crashed = result.is_err();
          if response.send(result).is_err() {
            break; // disconnected
          }
          if crashed {
            break; // do not reuse a trapped instance
          }
        }
      }
    });

    initialize_rx.await.map_err(|_| anyhow!("The instance thread for {} quit during initialization.", self.name))??;

    log_debug!(
      self.environment,
      "Created instance of {} in {}ms",
      self.name,
      start_instant.elapsed().as_millis() as u64
    );
    Ok(tx)
  }

  async fn call_instance(&self, sender: &WasmPluginSender, message: Arc<WasmFormatMessage>) -> Result<FormatResult> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    sender.send((message, tx)).map_err(|_| anyhow!("The instance thread for {} is gone.", self.name))?;
    rx.await.map_err(|_| anyhow!("The instance thread for {} quit mid call.", self.name))?
  }
}

#[async_trait]
impl<TEnvironment: Environment> InitializedPlugin for InitializedWasmPlugin<TEnvironment> {
  async fn format_text(&self, request: FormatRequest) -> FormatResult {
    // a module call cannot be interrupted once started
    if request.token.is_cancelled() {
      return Ok(None);
    }
    let message = Arc::new(WasmFormatMessage {
      file_path: request.file_path,
      file_bytes: request.file_bytes,
    });

    let sender = self.get_or_create_instance().await.map_err(InvocationError::Other)?;
    match self.call_instance(&sender, message.clone()).await {
      Ok(result) => {
        self.release_instance(sender);
        result
      }
      Err(original_err) => {
        // the instance trapped, so try once more with a fresh one
        let sender = self.get_or_create_instance().await.map_err(InvocationError::Other)?;
        match self.call_instance(&sender, message).await {
          Ok(result) => {
            self.release_instance(sender);
            result
          }
          Err(retry_err) => Err(InvocationError::ModuleFault(format!(
            "The module for {} trapped and failed again after reinitializing. Original error: {:#}. Retry error: {:#}",
            self.name, original_err, retry_err
          ))),
        }
      }
    }
  }
}
