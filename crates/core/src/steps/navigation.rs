//! Navigation and history steps

use futures::future::LocalBoxFuture;
use url::Url;

use super::runtime;
use crate::bundle::{StepArgs, SupportBundle};
use crate::error::StepError;
use crate::world::ScenarioWorld;

pub(super) fn register(bundle: SupportBundle) -> SupportBundle {
    bundle
        .step("I navigate to {string}", navigate)
        .step("I reload the page", reload)
        .step("I go back", back)
        .step("I go forward", forward)
        .step("the navigation history should end with {string}", history_ends_with)
        .step("the navigation history should end with:", history_ends_with_list)
}

fn navigate<'a>(
    world: &'a mut dyn ScenarioWorld,
    args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move {
        let runtime = runtime(world)?;
        let url = runtime.resolve_url(args.get(0)?);
        runtime.ensure_driver().await?.goto(&url).await?;
        Ok(())
    })
}

fn reload<'a>(
    world: &'a mut dyn ScenarioWorld,
    _args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move {
        runtime(world)?.ensure_driver().await?.reload().await?;
        Ok(())
    })
}

fn back<'a>(
    world: &'a mut dyn ScenarioWorld,
    _args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move {
        runtime(world)?.ensure_driver().await?.back().await?;
        Ok(())
    })
}

fn forward<'a>(
    world: &'a mut dyn ScenarioWorld,
    _args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move {
        runtime(world)?.ensure_driver().await?.forward().await?;
        Ok(())
    })
}

fn history_ends_with<'a>(
    world: &'a mut dyn ScenarioWorld,
    args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move {
        let expected = vec![args.get(0)?.to_string()];
        check_history_tail(world, &expected).await
    })
}

/// Expected URLs come from a doc string (one per line) or the first
/// column of a table
fn history_ends_with_list<'a>(
    world: &'a mut dyn ScenarioWorld,
    args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move {
        let expected: Vec<String> = if let Some(table) = &args.table {
            table.iter().filter_map(|row| row.first().cloned()).collect()
        } else if let Some(docstring) = &args.docstring {
            docstring
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()
        } else {
            return Err(StepError::msg("expected a doc string or table listing URLs"));
        };
        check_history_tail(world, &expected).await
    })
}

async fn check_history_tail(
    world: &mut dyn ScenarioWorld,
    expected: &[String],
) -> Result<(), StepError> {
    let runtime = runtime(world)?;
    let expected: Vec<String> = expected
        .iter()
        .map(|u| normalize(&runtime.resolve_url(u)))
        .collect();
    let driver = runtime.ensure_driver().await?;
    let actual: Vec<String> = driver
        .navigation_history()
        .into_iter()
        .map(|entry| normalize(&entry.url))
        .collect();

    if !actual.ends_with(&expected) {
        return Err(StepError::Assertion(format!(
            "expected navigation history to end with {:?}, but it was {:?}",
            expected, actual
        )));
    }
    Ok(())
}

fn normalize(url: &str) -> String {
    Url::parse(url).map(|u| u.to_string()).unwrap_or_else(|_| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::StepArgs;
    use crate::driver::MemoryPage;
    use crate::steps::testing::{args, world};

    #[tokio::test]
    async fn test_navigate_then_reload_keeps_history_tail() {
        let mut world = world(&MemoryPage::new());
        navigate(&mut world, args(&["http://app.test/a"])).await.unwrap();
        navigate(&mut world, args(&["/b"])).await.unwrap();
        reload(&mut world, args(&[])).await.unwrap();

        history_ends_with(&mut world, args(&["http://app.test/b"])).await.unwrap();
        let list = StepArgs {
            docstring: Some("http://app.test/a\nhttp://app.test/b\n".to_string()),
            ..Default::default()
        };
        history_ends_with_list(&mut world, list).await.unwrap();

        let err = history_ends_with(&mut world, args(&["http://app.test/a"])).await.unwrap_err();
        assert!(matches!(err, StepError::Assertion(_)));
    }

    #[tokio::test]
    async fn test_back_and_forward() {
        let mut world = world(&MemoryPage::new());
        navigate(&mut world, args(&["http://app.test/a"])).await.unwrap();
        navigate(&mut world, args(&["http://app.test/b"])).await.unwrap();
        back(&mut world, args(&[])).await.unwrap();
        history_ends_with(&mut world, args(&["/a"])).await.unwrap();
        forward(&mut world, args(&[])).await.unwrap();

        let table = StepArgs {
            table: Some(vec![
                vec!["http://app.test/a".to_string()],
                vec!["http://app.test/b".to_string()],
            ]),
            ..Default::default()
        };
        history_ends_with_list(&mut world, table).await.unwrap();
    }
}
