//! Runtime settings: server address, control store, backend deadlines and payload ceilings.

mod loader;
mod types;
pub use types::*;
