//! Form and element interaction steps

use futures::future::LocalBoxFuture;

use super::runtime;
use crate::bundle::{StepArgs, SupportBundle};
use crate::error::StepError;
use crate::world::ScenarioWorld;

pub(super) fn register(bundle: SupportBundle) -> SupportBundle {
    bundle
        .step("I fill {string} with {string}", fill)
        .step("I type {string} into {string}", type_text)
        .step("I click {string}", click)
        .step("I select {string} in {string}", select_one)
        .step("I select {string} options in {string}", select_many)
        .step("I wait for {string}", wait_for)
}

fn fill<'a>(
    world: &'a mut dyn ScenarioWorld,
    args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move {
        let selector = args.get(0)?;
        let value = args.get(1)?;
        runtime(world)?.ensure_driver().await?.fill(selector, value).await?;
        Ok(())
    })
}

fn type_text<'a>(
    world: &'a mut dyn ScenarioWorld,
    args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move {
        let text = args.get(0)?;
        let selector = args.get(1)?;
        runtime(world)?.ensure_driver().await?.type_text(selector, text).await?;
        Ok(())
    })
}

fn click<'a>(
    world: &'a mut dyn ScenarioWorld,
    args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move {
        let selector = args.get(0)?;
        runtime(world)?.ensure_driver().await?.click(selector).await?;
        Ok(())
    })
}

fn select_one<'a>(
    world: &'a mut dyn ScenarioWorld,
    args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move {
        let value = args.get(0)?.to_string();
        let selector = args.get(1)?;
        runtime(world)?.ensure_driver().await?.select(selector, &[value]).await?;
        Ok(())
    })
}

/// Values are comma-separated: `I select "red, blue" options in "#colors"`
fn select_many<'a>(
    world: &'a mut dyn ScenarioWorld,
    args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move {
        let values: Vec<String> = args
            .get(0)?
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        let selector = args.get(1)?;
        runtime(world)?.ensure_driver().await?.select(selector, &values).await?;
        Ok(())
    })
}

fn wait_for<'a>(
    world: &'a mut dyn ScenarioWorld,
    args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move {
        let selector = args.get(0)?;
        runtime(world)?.ensure_driver().await?.wait_for(selector, None).await?;
        Ok(())
    })
}
