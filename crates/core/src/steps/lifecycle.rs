//! World lifecycle steps

use futures::future::LocalBoxFuture;

use super::runtime;
use crate::bundle::{StepArgs, SupportBundle};
use crate::error::StepError;
use crate::world::ScenarioWorld;

pub(super) fn register(bundle: SupportBundle) -> SupportBundle {
    bundle
        .step("a fresh test world", fresh_world)
        .step("a world configured with base url {string}", configure_base_url)
        .step("trigger scenario setup", trigger_setup)
}

/// Drop data, page objects and navigation history without navigating
fn fresh_world<'a>(
    world: &'a mut dyn ScenarioWorld,
    _args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move {
        let runtime = runtime(world)?;
        runtime.clear_data();
        runtime.clear_page_objects();
        if let Some(driver) = runtime.driver() {
            driver.clear_navigation_history();
        }
        Ok(())
    })
}

fn configure_base_url<'a>(
    world: &'a mut dyn ScenarioWorld,
    args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move {
        let base_url = args.get(0)?.to_string();
        let runtime = runtime(world)?;
        runtime.set_base_url(base_url);
        runtime.ensure_driver().await?.clear_navigation_history();
        runtime.before_scenario().await?;
        Ok(())
    })
}

fn trigger_setup<'a>(
    world: &'a mut dyn ScenarioWorld,
    _args: StepArgs,
) -> LocalBoxFuture<'a, Result<(), StepError>> {
    Box::pin(async move {
        runtime(world)?.before_scenario().await?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MemoryPage;
    use crate::steps::testing::{args, world};

    #[tokio::test]
    async fn test_fresh_world_clears_state_and_history() {
        let page = MemoryPage::new();
        let mut world = world(&page);
        world.runtime.set_data("key", "value");
        world.runtime.before_scenario().await.unwrap();
        assert_eq!(world.runtime.driver().unwrap().navigation_history().len(), 1);

        fresh_world(&mut world, args(&[])).await.unwrap();
        assert!(!world.runtime.has_data("key"));
        assert!(world.runtime.driver().unwrap().navigation_history().is_empty());
    }

    #[tokio::test]
    async fn test_configure_base_url_navigates_there() {
        let page = MemoryPage::new();
        let mut world = world(&page);
        world.runtime.before_scenario().await.unwrap();

        configure_base_url(&mut world, args(&["http://other.test/home"])).await.unwrap();
        let history = world.runtime.driver().unwrap().navigation_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].url, "http://other.test/home");
        assert_eq!(world.runtime.config().base_url.as_deref(), Some("http://other.test/home"));
    }

    #[tokio::test]
    async fn test_trigger_setup_clears_data() {
        let page = MemoryPage::new();
        let mut world = world(&page);
        world.runtime.set_data("message", "Hello World");
        trigger_setup(&mut world, args(&[])).await.unwrap();
        assert!(world.runtime.get_data("message").is_none());
    }
}
