//! Configuration resolution
//!
//! Discovers `bdui.config.*` at the project root, validates it, and merges it
//! over the defaults into a [`ResolvedConfig`].

mod loader;
mod types;
mod validate;

pub use loader::{find_project_root, load, LoadOptions, LoadedConfig, CONFIG_FILE_NAMES};
pub use types::*;
pub use validate::validate;
