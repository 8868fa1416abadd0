//! Per-scenario world
//!
//! The execution engine builds one [`ScenarioWorld`] per scenario through the
//! bundle's world constructor. The builtin steps reach the browser through
//! the [`WorldRuntime`] a world exposes.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use serde_json::Value;
use tracing::debug;

use crate::config::WorldConfig;
use crate::driver::{Driver, DriverFactory};
use crate::error::{DriverError, WorldError};

/// What the execution engine holds for each scenario.
///
/// A custom world that embeds a [`WorldRuntime`] returns it from
/// [`ScenarioWorld::runtime`]; otherwise the builtin steps cannot run.
pub trait ScenarioWorld: Send + fmt::Debug {
    fn runtime(&mut self) -> Option<&mut WorldRuntime>;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Inputs to a [`WorldRuntime`]. At least one of `driver` and
/// `driver_factory` is required.
pub struct WorldOptions {
    pub config: WorldConfig,
    pub driver: Option<Box<dyn Driver>>,
    pub driver_factory: Option<DriverFactory>,
}

/// Scenario state: config slice, lazy driver, data store and page objects
pub struct WorldRuntime {
    config: WorldConfig,
    driver: Option<Box<dyn Driver>>,
    driver_factory: Option<DriverFactory>,
    data: HashMap<String, Value>,
    page_objects: HashMap<TypeId, Box<dyn Any + Send>>,
    destroyed: bool,
}

impl fmt::Debug for WorldRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorldRuntime")
            .field("config", &self.config)
            .field("driver", &self.driver.as_ref().map(|_| "<driver>"))
            .field("has_factory", &self.driver_factory.is_some())
            .field("data", &self.data)
            .field("page_objects", &self.page_objects.len())
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl WorldRuntime {
    pub fn new(options: WorldOptions) -> Result<Self, WorldError> {
        if options.driver.is_none() && options.driver_factory.is_none() {
            return Err(WorldError::MissingDriver);
        }
        Ok(Self {
            config: options.config,
            driver: options.driver,
            driver_factory: options.driver_factory,
            data: HashMap::new(),
            page_objects: HashMap::new(),
            destroyed: false,
        })
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn set_base_url(&mut self, base_url: impl Into<String>) {
        self.config.base_url = Some(base_url.into());
    }

    /// Resolve `target` against the base URL unless it is already absolute
    pub fn resolve_url(&self, target: &str) -> String {
        if url::Url::parse(target).is_ok() {
            return target.to_string();
        }
        self.config
            .base_url
            .as_deref()
            .and_then(|base| url::Url::parse(base).ok())
            .and_then(|base| base.join(target).ok())
            .map(|url| url.to_string())
            .unwrap_or_else(|| target.to_string())
    }

    // Data store

    pub fn set_data(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    /// `None` when the key was never stored. A stored `Value::Null` is present.
    pub fn get_data(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn has_data(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn remove_data(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn clear_data(&mut self) {
        self.data.clear();
    }

    /// Cached page object of type `P`, built by `init` on first use.
    ///
    /// Later calls return the cached instance and never run `init`.
    /// Errors from `init` are returned unchanged and nothing is cached.
    pub fn page_object<P, E, F>(&mut self, init: F) -> Result<&mut P, E>
    where
        P: Any + Send,
        E: From<WorldError>,
        F: FnOnce() -> Result<P, E>,
    {
        let key = TypeId::of::<P>();
        if !self.page_objects.contains_key(&key) {
            let object = init()?;
            self.page_objects.insert(key, Box::new(object));
        }
        self.page_objects
            .get_mut(&key)
            .and_then(|object| object.downcast_mut::<P>())
            .ok_or_else(|| {
                WorldError::PageObject {
                    type_name: std::any::type_name::<P>(),
                }
                .into()
            })
    }

    pub fn clear_page_objects(&mut self) {
        self.page_objects.clear();
    }

    /// Driver if one has been created or supplied
    pub fn driver(&self) -> Option<&dyn Driver> {
        self.driver.as_deref()
    }

    /// The driver, created through the factory on first use
    pub async fn ensure_driver(&mut self) -> Result<&dyn Driver, WorldError> {
        if self.destroyed {
            return Err(DriverError::Destroyed.into());
        }
        if self.driver.is_none() {
            let factory = self.driver_factory.clone().ok_or(WorldError::MissingDriver)?;
            debug!("Creating {} driver", self.config.driver.kind.as_str());
            self.driver = Some(factory(self.config.clone()).await?);
        }
        self.driver.as_deref().ok_or(WorldError::MissingDriver)
    }

    /// Reset scenario state and open the base URL when one is configured.
    /// Repeated calls repeat both.
    pub async fn before_scenario(&mut self) -> Result<(), WorldError> {
        self.clear_data();
        self.clear_page_objects();

        let Some(base_url) = self.config.base_url.clone() else {
            return Ok(());
        };
        let driver = self.ensure_driver().await?;
        driver
            .goto(&base_url)
            .await
            .map_err(|source| WorldError::Setup {
                url: base_url,
                source,
            })
    }

    pub async fn after_scenario(&mut self) -> Result<(), WorldError> {
        self.clear_data();
        self.clear_page_objects();
        Ok(())
    }

    /// Tear down the driver and drop remaining state. Safe to call again.
    pub async fn destroy(&mut self) -> Result<(), WorldError> {
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;
        self.clear_data();
        self.clear_page_objects();
        if let Some(driver) = self.driver.take() {
            driver.destroy().await?;
        }
        Ok(())
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

/// World used when the user bundle does not provide one
#[derive(Debug)]
pub struct BuiltinWorld {
    pub runtime: WorldRuntime,
}

impl BuiltinWorld {
    pub fn new(runtime: WorldRuntime) -> Self {
        Self { runtime }
    }
}

impl ScenarioWorld for BuiltinWorld {
    fn runtime(&mut self) -> Option<&mut WorldRuntime> {
        Some(&mut self.runtime)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
