//! Configuration schema types for Potluck.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod backend;
mod chat;
mod logging;
mod recipes;

pub use backend::*;
pub use chat::*;
pub use logging::*;
pub use recipes::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PotluckConfig {
    pub backend: BackendConfig,
    pub chat: ChatConfig,
    pub recipes: RecipesConfig,
    pub logging: LoggingConfig,
}
