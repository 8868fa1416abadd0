//! Expectation steps
//!
//! Thin wrappers that build an expectation condition string and hand it to
//! [`crate::driver::Driver::expect`], so every assertion goes through the
//! same parser and polling.

use futures::future::LocalBoxFuture;
use serde_json::Value;

use super::runtime;
use crate::bundle::{StepArgs, SupportBundle};
use crate::error::StepError;
use crate::world::ScenarioWorld;

pub(super) fn register(bundle: SupportBundle) -> SupportBundle {
    bundle
        .step("{string} should be visible", visible)
        .step("{string} should be hidden", hidden)
        .step("{string} should have text {string}", has_text)
        .step("{string} should contain text {string}", contains_text)
        .step("{string} should have value {string}", has_value)
        .step("I expect {string} {condition}", expect_raw)
}

async fn expect(
    world: &mut dyn ScenarioWorld,
    selector: &str,
    condition: &str,
) -> Result<(), StepError> {
    runtime(world)?
        .ensure_driver()
        .await?
        .expect(selector, condition)
        .await?;
    Ok(())
}

/// `<prefix> <json string>`
fn with_payload(prefix: &str, value: &str) -> String {
    format!("{} {}", prefix, Value::String(value.to_string()))
}

fn visible<'a>(
    world: &'a mut dyn ScenarioWorld,
    args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move { expect(world, args.get(0)?, "to be visible").await })
}

fn hidden<'a>(
    world: &'a mut dyn ScenarioWorld,
    args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move { expect(world, args.get(0)?, "to be hidden").await })
}

fn has_text<'a>(
    world: &'a mut dyn ScenarioWorld,
    args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move {
        let condition = with_payload("to have text", args.get(1)?);
        expect(world, args.get(0)?, &condition).await
    })
}

fn contains_text<'a>(
    world: &'a mut dyn ScenarioWorld,
    args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move {
        let condition = with_payload("to contain text", args.get(1)?);
        expect(world, args.get(0)?, &condition).await
    })
}

fn has_value<'a>(
    world: &'a mut dyn ScenarioWorld,
    args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move {
        let condition = with_payload("to have value", args.get(1)?);
        expect(world, args.get(0)?, &condition).await
    })
}

/// `I expect "#title" to have text "Welcome"`
fn expect_raw<'a>(
    world: &'a mut dyn ScenarioWorld,
    args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move { expect(world, args.get(0)?, args.get(1)?).await })
}
