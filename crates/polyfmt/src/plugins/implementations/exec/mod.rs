mod plugin;

pub use plugin::ExecPlugin;
