//! Viewport and screenshot steps

use std::path::PathBuf;

use futures::future::LocalBoxFuture;
use tracing::info;

use super::runtime;
use crate::bundle::{StepArgs, SupportBundle};
use crate::driver::Viewport;
use crate::error::StepError;
use crate::world::ScenarioWorld;

pub(super) fn register(bundle: SupportBundle) -> SupportBundle {
    bundle
        .step("I set the viewport to {int} by {int}", set_viewport)
        .step("the viewport should be {int} by {int}", assert_viewport)
        .step("I take a screenshot named {string}", screenshot)
        .step("I take a full page screenshot named {string}", full_page_screenshot)
}

fn set_viewport<'a>(
    world: &'a mut dyn ScenarioWorld,
    args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move {
        let viewport = Viewport::new(args.parse(0)?, args.parse(1)?);
        runtime(world)?.ensure_driver().await?.set_viewport(viewport).await?;
        Ok(())
    })
}

fn assert_viewport<'a>(
    world: &'a mut dyn ScenarioWorld,
    args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move {
        let expected = Viewport::new(args.parse(0)?, args.parse(1)?);
        let actual = runtime(world)?.ensure_driver().await?.get_viewport().await?;
        if actual != expected {
            return Err(StepError::Assertion(format!(
                "expected viewport {}, found {}",
                expected, actual
            )));
        }
        Ok(())
    })
}

/// Writes `<artifacts>/screenshots/<name>.png`
fn screenshot<'a>(
    world: &'a mut dyn ScenarioWorld,
    args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move { save_screenshot(world, args.get(0)?, false).await })
}

fn full_page_screenshot<'a>(
    world: &'a mut dyn ScenarioWorld,
    args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move { save_screenshot(world, args.get(0)?, true).await })
}

async fn save_screenshot(
    world: &mut dyn ScenarioWorld,
    name: &str,
    full_page: bool,
) -> Result<(), StepError> {
    let name = file_stem(name);
    let runtime = runtime(world)?;
    let dir = runtime.config().artifacts_dir.join("screenshots");
    let driver = runtime.ensure_driver().await?;
    let png = if full_page {
        driver.full_page_screenshot().await?
    } else {
        driver.screenshot().await?
    };

    tokio::fs::create_dir_all(&dir).await?;
    let path: PathBuf = dir.join(format!("{}.png", name));
    tokio::fs::write(&path, png).await?;
    info!("Saved screenshot {}", path.display());
    Ok(())
}

/// Screenshot names become file names; anything but `[A-Za-z0-9_-]` turns
/// into `_`
fn file_stem(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "screenshot".to_string()
    } else {
        stem
    }
}
