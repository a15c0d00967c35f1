mod formatting;

pub use formatting::*;
