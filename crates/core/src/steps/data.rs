//! Scenario data steps

use futures::future::LocalBoxFuture;
use serde_json::Value;

use super::runtime;
use crate::bundle::{StepArgs, SupportBundle};
use crate::error::StepError;
use crate::world::ScenarioWorld;

pub(super) fn register(bundle: SupportBundle) -> SupportBundle {
    // the absent form must come first; the free-text form would match it too
    bundle
        .step("I store {string} as {string}", store)
        .step("data for {word} should be absent", assert_absent)
        .step_regex(r"^data for (\S+) should be (.*)$", assert_equals)
}

fn store<'a>(
    world: &'a mut dyn ScenarioWorld,
    args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move {
        let value = args.get(0)?;
        let key = args.get(1)?;
        runtime(world)?.set_data(key, value);
        Ok(())
    })
}

fn assert_absent<'a>(
    world: &'a mut dyn ScenarioWorld,
    args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move {
        let key = args.get(0)?;
        match runtime(world)?.get_data(key) {
            None => Ok(()),
            Some(value) => Err(StepError::Assertion(format!(
                "expected no data for {}, found {}",
                key, value
            ))),
        }
    })
}

fn assert_equals<'a>(
    world: &'a mut dyn ScenarioWorld,
    args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move {
        let key = args.get(0)?;
        let expected = args.get(1)?;
        let actual = match runtime(world)?.get_data(key) {
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
            None => {
                return Err(StepError::Assertion(format!(
                    "expected data for {} to be {:?}, but nothing is stored",
                    key, expected
                )))
            }
        };
        if actual != expected {
            return Err(StepError::Assertion(format!(
                "expected data for {} to be {:?}, found {:?}",
                key, expected, actual
            )));
        }
        Ok(())
    })
}
