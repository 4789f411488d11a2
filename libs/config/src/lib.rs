//! # Module Runtime Configuration
//!
//! Configuration and defaults for modules, their ports and the registry
//! they resolve through.
//!
//! ## Features
//!
//! - **Layered loading**: TOML file overridden by `AIM_`-prefixed environment
//!   variables (nested keys separated by `__`, e.g. `AIM_MODULE__ID=3`)
//! - **Defaults**: every section has working defaults, see [`defaults`]
//! - **Validation**: duplicate or unusable port names are rejected up front
//!
//! ## Usage
//!
//! ```rust
//! use runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_toml_str(r#"
//!     [module]
//!     name = "Consumer"
//!     id = "0"
//!
//!     [[ports]]
//!     name = "Input"
//!     direction = "in"
//!     kind = "int"
//! "#).unwrap();
//!
//! assert_eq!(config.port_path("Input"), "/consumer0/input");
//! ```

pub mod defaults;
pub mod runtime_config;

pub use runtime_config::{
    ModuleSettings, PortConfig, RegistryConfig, RetryConfig, RuntimeConfig, TransportKind,
};
