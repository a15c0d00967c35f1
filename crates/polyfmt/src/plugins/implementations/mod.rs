pub mod exec;
pub mod wasm;
