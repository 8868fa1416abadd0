//! Builtin step library
//!
//! The vocabulary every project gets without writing a step: world
//! lifecycle, scenario data, navigation, form interaction, expectations,
//! viewport and screenshots. Every step reaches the page through the
//! [`WorldRuntime`] the scenario world exposes.

use std::sync::Arc;
use std::time::Duration;

use futures::future::LocalBoxFuture;
use tracing::debug;

use crate::bundle::{
    builtin_parameter_types, HookContext, ScenarioInfo, SupportBundle, WorldParameters,
};
use crate::error::{StepError, WorldError};
use crate::world::{BuiltinWorld, ScenarioWorld, WorldOptions, WorldRuntime};

mod assertions;
mod data;
mod interaction;
mod lifecycle;
mod navigation;
mod viewport;

/// Builtin steps wait longer than user steps by default; page loads are slow
pub const BUILTIN_STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Scenarios with this tag never run concurrently with others
pub const SERIAL_TAG: &str = "serial";

/// The builtin bundle: parameter types, setup/teardown hooks, world
/// constructor, parallel policy and steps.
pub fn builtin_bundle() -> SupportBundle {
    let mut bundle = SupportBundle::new()
        .before(setup_scenario)
        .after(teardown_scenario)
        .parallel(|info: &ScenarioInfo| !info.has_tag(SERIAL_TAG))
        .default_timeout(BUILTIN_STEP_TIMEOUT);

    bundle.parameter_types = builtin_parameter_types();
    bundle.world = Some(Arc::new(builtin_world));
    bundle.coordinates.import_paths = vec![module_path!().to_string()];
    bundle.coordinates.loaders = vec!["builtin".to_string()];

    let bundle = lifecycle::register(bundle);
    let bundle = data::register(bundle);
    let bundle = navigation::register(bundle);
    let bundle = interaction::register(bundle);
    let bundle = assertions::register(bundle);
    viewport::register(bundle)
}

/// Default world: a [`BuiltinWorld`] whose driver comes from the run's factory
pub fn builtin_world(params: WorldParameters) -> Result<Box<dyn ScenarioWorld>, WorldError> {
    let runtime = WorldRuntime::new(WorldOptions {
        config: params.config,
        driver: None,
        driver_factory: Some(params.driver_factory),
    })?;
    Ok(Box::new(BuiltinWorld::new(runtime)))
}

/// The runtime behind `world`, or [`StepError::RuntimeUnavailable`] for
/// custom worlds that do not embed one
pub fn runtime(world: &mut dyn ScenarioWorld) -> Result<&mut WorldRuntime, StepError> {
    world.runtime().ok_or(StepError::RuntimeUnavailable)
}

fn setup_scenario<'a>(
    world: &'a mut dyn ScenarioWorld,
    ctx: HookContext,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move {
        match world.runtime() {
            Some(runtime) => runtime.before_scenario().await?,
            None => debug!(
                "Scenario {:?} has no builtin runtime; skipping setup",
                ctx.scenario.scenario
            ),
        }
        Ok(())
    })
}

fn teardown_scenario<'a>(
    world: &'a mut dyn ScenarioWorld,
    _ctx: HookContext,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move {
        if let Some(runtime) = world.runtime() {
            let cleared = runtime.after_scenario().await;
            runtime.destroy().await?;
            cleared?;
        }
        Ok(())
    })
}
