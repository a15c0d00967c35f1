mod cache;
mod cache_manifest;
pub mod implementations;
mod plugin;
pub mod registry;
mod resolver;
pub mod types;

pub use cache::PluginCache;
pub use plugin::FormatRequest;
pub use plugin::FormatResult;
pub use plugin::InitializedPlugin;
pub use plugin::Plugin;
pub use registry::register_plugins;
pub use resolver::PluginResolver;

#[cfg(test)]
pub use plugin::test_helpers::TestPlugin;
