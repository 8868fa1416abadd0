//! bdui - behavior-driven UI testing
//!
//! This crate provides the machinery behind the `bdui` CLI:
//! - Resolves a layered configuration (defaults, `bdui.config.*`, web server)
//! - Composes the builtin step library with a user-supplied support bundle
//! - Gives every scenario its own world with a lazily created browser driver
//! - Runs Gherkin features through the `cucumber` execution engine
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Runner                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  config::load() -> ResolvedConfig                           │
//! │  EnvGuard::apply(environment)                               │
//! │  WebServer::start(webServer)        (optional)              │
//! │  steps::builtin_bundle() ─┐                                 │
//! │  SupportBuilder::build() ─┴─> bundle::compose() -> bundle   │
//! │  ExecutionEngine::run(bundle)  under hard timeout           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Per scenario                                               │
//! │    WorldConstructor -> ScenarioWorld { WorldRuntime }       │
//! │    WorldRuntime                                             │
//! │      ├── data: key -> JSON value                            │
//! │      ├── page objects (cached by type)                      │
//! │      └── driver: Box<dyn Driver>  (lazy)                    │
//! │            └── BrowserDriver<PageBackend>                   │
//! │                  ├── PlaywrightBackend (node bridge)        │
//! │                  └── MemoryPage        (mock)               │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod bundle;
pub mod config;
pub mod driver;
pub mod engine;
pub mod env;
pub mod error;
pub mod runner;
pub mod server;
pub mod steps;
pub mod world;

pub use bundle::{compose, StepArgs, SupportBundle};
pub use config::{load, LoadOptions, LoadedConfig, ResolvedConfig};
pub use driver::{BrowserDriver, Driver, DriverFactory, MemoryPage};
pub use error::{ConfigError, DriverError, RunError, StepError, WorldError};
pub use runner::{RunOutcome, Runner};
pub use world::{ScenarioWorld, WorldRuntime};
