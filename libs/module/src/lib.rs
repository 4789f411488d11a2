//! # Module Runtime
//!
//! Runs processing modules that exchange typed values over named ports.
//!
//! - [`Module`]: owns the registry client, the control channel and the ports
//! - [`ControlClient`]: orchestrator side, sends "connect source->target"
//! - [`Worker`] / [`Tick`]: the per-module thread running the tick loop
//! - [`HostBridge`]: hands values between the worker thread and an
//!   embedding host's single-threaded event loop
//!
//! ## Example
//!
//! ```rust,no_run
//! use module_runtime::{Module, Result, Tick, TickFlow, Worker};
//! use async_trait::async_trait;
//! use std::path::Path;
//!
//! struct Doubler;
//!
//! #[async_trait]
//! impl Tick for Doubler {
//!     async fn tick(&mut self, module: &mut Module) -> Result<TickFlow> {
//!         if let Some(value) = module.read("Input", false).await? {
//!             let doubled = value.as_int().unwrap_or_default() * 2;
//!             module.write("Output", doubled).await?;
//!         }
//!         Ok(TickFlow::Continue)
//!     }
//! }
//!
//! # async fn run() -> Result<()> {
//! let module = Module::load(Path::new("doubler.toml"))?;
//! let worker = Worker::spawn(module, Doubler).await?;
//! worker.stop_and_join()?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod control;
pub mod error;
pub mod module;
pub mod worker;

pub use bridge::{DestroyOutcome, HostBridge};
pub use control::ControlClient;
pub use error::{ModuleError, Result};
pub use module::{CommandOutcome, Module};
pub use worker::{run_tick_loop, Tick, TickFlow, Worker};
