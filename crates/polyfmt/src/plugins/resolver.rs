use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::configuration::Configuration;
use crate::configuration::UnverifiedPolicy;
use crate::environment::Environment;
use crate::errors::ResolveError;
use crate::utils::verify_sha256_checksum;

use super::cache::PluginCache;
use super::implementations::exec::ExecPlugin;
use super::implementations::wasm::WasmModuleCreator;
use super::implementations::wasm::WasmPlugin;
use super::types::ModulePluginSpec;
use super::types::PathSource;
use super::types::PluginSpec;
use super::types::PluginSpecIdentity;
use super::Plugin;

const WASM_MAGIC: &[u8] = b"\0asm";

/// Turns specs into ready plugins, memoizing per spec identity for the
/// life of the process. Resolving the same spec concurrently fetches,
/// verifies and compiles at most once.
pub struct PluginResolver<TEnvironment: Environment> {
  environment: TEnvironment,
  plugin_cache: PluginCache<TEnvironment>,
  wasm_module_creator: WasmModuleCreator,
  unverified: UnverifiedPolicy,
  timeout_seconds: u64,
  resolutions: Mutex<HashMap<PluginSpecIdentity, Arc<OnceCell<Arc<dyn Plugin>>>>>,
  #[cfg(test)]
  injected: Mutex<HashMap<PluginSpecIdentity, Arc<dyn Plugin>>>,
}

impl<TEnvironment: Environment> PluginResolver<TEnvironment> {
  pub fn new(environment: TEnvironment, config: &Configuration) -> Self {
    PluginResolver {
      plugin_cache: PluginCache::new(environment.clone()),
      environment,
      wasm_module_creator: WasmModuleCreator::new(),
      unverified: config.unverified,
      timeout_seconds: config.timeout_seconds,
      resolutions: Default::default(),
      #[cfg(test)]
      injected: Default::default(),
    }
  }

  pub async fn resolve_plugin(&self, spec: &PluginSpec) -> Result<Arc<dyn Plugin>> {
    let identity = spec.identity();
    #[cfg(test)]
    if let Some(plugin) = self.injected.lock().get(&identity) {
      return Ok(plugin.clone());
    }
    let cell = self.resolutions.lock().entry(identity).or_default().clone();
    let plugin = cell
      .get_or_try_init(|| self.create_plugin(spec))
      .await
      .with_context(|| format!("Error resolving plugin {}", spec.name()))?;
    Ok(plugin.clone())
  }

  async fn create_plugin(&self, spec: &PluginSpec) -> Result<Arc<dyn Plugin>> {
    match spec {
      PluginSpec::Exec(spec) => Ok(Arc::new(ExecPlugin::new(spec.clone(), self.timeout_seconds))),
      PluginSpec::Module(spec) => {
        let wasm_bytes = self.get_module_bytes(spec).await?;
        let module = self
          .wasm_module_creator
          .create_from_wasm_bytes(&wasm_bytes)
          .map_err(|err| ResolveError::UnsupportedPluginArtifact {
            origin: spec.reference.display(),
            message: format!("{:#}", err),
          })?;
        Ok(Arc::new(WasmPlugin::new(
          spec.name.clone(),
          module,
          spec.config.clone(),
          self.environment.clone(),
        )))
      }
    }
  }

  async fn get_module_bytes(&self, spec: &ModulePluginSpec) -> Result<Vec<u8>> {
    match &spec.reference.path_source {
      PathSource::Remote(url) => {
        let cache_item = self.plugin_cache.get_cache_item(url, spec.reference.checksum.as_deref(), self.unverified).await?;
        self.environment.read_file_bytes(&cache_item.file_path)
      }
      // local artifacts are loaded in place and never enter the cache
      PathSource::Local(path) => {
        let bytes = self
          .environment
          .read_file_bytes(path)
          .with_context(|| format!("Error reading local plugin {}", path.display()))?;
        if let Some(checksum) = &spec.reference.checksum {
          verify_sha256_checksum(&bytes, checksum, &spec.reference.display())?;
        }
        if !bytes.starts_with(WASM_MAGIC) {
          return Err(
            ResolveError::UnsupportedPluginArtifact {
              origin: spec.reference.display(),
              message: "the file is not a wasm module".to_string(),
            }
            .into(),
          );
        }
        Ok(bytes)
      }
    }
  }

  #[cfg(test)]
  pub fn inject_plugin(&self, identity: PluginSpecIdentity, plugin: Arc<dyn Plugin>) {
    self.injected.lock().insert(identity, plugin);
  }
}

#[cfg(test)]
mod test {
  use std::path::PathBuf;

  use pretty_assertions::assert_eq;

  use crate::configuration::parse_config_text;
  use crate::environment::TestEnvironment;
  use crate::plugins::registry::register_plugins;
  use crate::utils::get_sha256_checksum;

  use super::*;

  fn resolver_for(config_text: &str, environment: &TestEnvironment) -> (Vec<PluginSpec>, PluginResolver<TestEnvironment>) {
    let config = parse_config_text(config_text, PathBuf::from("/project")).unwrap();
    let specs = register_plugins(&config).unwrap();
    let resolver = PluginResolver::new(environment.clone(), &config);
    (specs, resolver)
  }

  #[tokio::test]
  async fn memoizes_resolution_per_spec_identity() {
    let environment = TestEnvironment::new();
    let (specs, resolver) = resolver_for(r#"{ "exec": [{ "command": "cat", "exts": ["txt"] }] }"#, &environment);
    let first = resolver.resolve_plugin(&specs[0]).await.unwrap();
    let second = resolver.resolve_plugin(&specs[0]).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
  }

  #[tokio::test]
  async fn rejects_a_local_artifact_that_is_not_wasm() {
    let environment = TestEnvironment::new();
    environment.write_file_bytes(&PathBuf::from("/project/plugins/fake-1.0.0.wasm"), b"not wasm").unwrap();
    let (specs, resolver) = resolver_for(
      r#"{ "plugins": ["./plugins/fake-1.0.0.wasm"], "fake": { "exts": ["fk"] } }"#,
      &environment,
    );
    let err = resolver.resolve_plugin(&specs[0]).await.unwrap_err();
    let err = err.downcast::<ResolveError>().unwrap();
    assert!(matches!(err, ResolveError::UnsupportedPluginArtifact { .. }));
  }

  #[tokio::test]
  async fn verifies_the_digest_of_a_local_artifact() {
    let environment = TestEnvironment::new();
    environment.write_file_bytes(&PathBuf::from("/project/plugins/fake-1.0.0.wasm"), b"\0asm bytes").unwrap();
    let wrong = "b".repeat(64);
    let (specs, resolver) = resolver_for(
      &format!(
        r#"{{ "plugins": ["./plugins/fake-1.0.0.wasm@{}"], "fake": {{ "exts": ["fk"] }} }}"#,
        wrong
      ),
      &environment,
    );
    let err = resolver.resolve_plugin(&specs[0]).await.unwrap_err();
    let err = err.downcast::<ResolveError>().unwrap();
    match err {
      ResolveError::IntegrityMismatch { expected, actual, .. } => {
        assert_eq!(expected, wrong);
        assert_eq!(actual, get_sha256_checksum(b"\0asm bytes"));
      }
      err => panic!("expected IntegrityMismatch: {}", err),
    }
  }

  #[tokio::test]
  async fn local_artifacts_never_touch_the_network_or_cache() {
    let environment = TestEnvironment::new();
    environment.write_file_bytes(&PathBuf::from("/project/plugins/fake-1.0.0.wasm"), b"not wasm").unwrap();
    let (specs, resolver) = resolver_for(
      r#"{ "plugins": ["./plugins/fake-1.0.0.wasm"], "fake": { "exts": ["fk"] } }"#,
      &environment,
    );
    let _ = resolver.resolve_plugin(&specs[0]).await;
    assert!(!environment.path_exists(&PathBuf::from("/cache/plugins/plugin-cache-manifest.json")));
  }
}
