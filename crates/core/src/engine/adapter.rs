//! `cucumber` crate adapter
//!
//! The engine knows nothing about bdui bundles. One catch-all step per
//! keyword dispatches to the composed step definitions, and the engine's
//! before/after scenario closures drive the bundle's hooks. A failing step
//! or hook panics, which is how `cucumber` records failure.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cucumber::gherkin;
use cucumber::runner::ScenarioType;
use cucumber::tag::Ext as _;
use cucumber::writer::Stats as _;
use cucumber::{step, World};
use futures::future::LocalBoxFuture;
use regex::Regex;
use tracing::{debug, info, warn};

use super::features::{discover, FeatureParser, FeatureSet};
use super::matcher::StepMatcher;
use super::{parse_tag_expression, EngineRequest, ExecutionEngine, TagOperation};
use crate::bundle::{
    HookContext, HookDefinition, HookFn, ParallelPredicate, RunHookFn, ScenarioInfo, SupportBundle,
    WorldConstructor, WorldParameters,
};
use crate::config::{ResolvedConfig, ScenarioOrder};
use crate::error::{RunError, StepError};
use crate::world::ScenarioWorld;

/// Scenarios run at once when none is marked serial
pub const DEFAULT_MAX_CONCURRENT: usize = 8;

/// [`super::ExecutionEngine`] backed by the `cucumber` crate
#[derive(Debug, Clone)]
pub struct CucumberEngine {
    max_concurrent: usize,
}

impl Default for CucumberEngine {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

impl CucumberEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait(?Send)]
impl ExecutionEngine for CucumberEngine {
    async fn run(&self, request: EngineRequest) -> Result<bool, RunError> {
        let EngineRequest {
            config,
            bundle,
            driver_factory,
        } = request;

        let features = discover(&config.project_root, &config.features)?;
        if features.is_empty() {
            warn!("No feature files match {:?}; nothing to run", config.features);
            return Ok(true);
        }
        info!("Running {} feature files from {}", features.len(), features.base.display());

        let tags = parse_tag_filter(&config.cucumber.tag_expression)?;
        let shuffle = config.cucumber.order == ScenarioOrder::Random;
        if shuffle {
            info!("Running scenarios in random order");
        }

        let world = bundle.world.clone().ok_or(RunError::MissingWorld)?;
        let shared = Arc::new(SharedRun::new(
            &bundle,
            world,
            WorldParameters {
                config: config.world_config(),
                driver_factory,
            },
        )?);

        run_before_all(&bundle.hooks.before_all, &config).await?;
        let passed = self
            .execute(shared, bundle.parallel.clone(), features, tags, shuffle)
            .await;
        run_after_all(&bundle.hooks.after_all, &config).await?;
        passed
    }
}

impl CucumberEngine {
    async fn execute(
        &self,
        shared: Arc<SharedRun>,
        parallel: Option<ParallelPredicate>,
        features: FeatureSet,
        tags: Option<TagOperation>,
        shuffle: bool,
    ) -> Result<bool, RunError> {
        let any = Regex::new("^.*$").map_err(|e| RunError::StepPattern {
            pattern: "^.*$".to_string(),
            reason: e.to_string(),
        })?;
        let input = features.base.clone();

        let writer = EngineWorld::cucumber::<PathBuf>()
            .with_parser::<_, PathBuf>(FeatureParser::new(shuffle))
            .max_concurrent_scenarios(self.max_concurrent)
            .given(any.clone(), dispatch)
            .when(any.clone(), dispatch)
            .then(any, dispatch)
            .which_scenario(move |feature, rule, scenario| {
                let info = scenario_info(feature, rule, scenario);
                match &parallel {
                    Some(parallel) if !parallel(&info) => ScenarioType::Serial,
                    _ => ScenarioType::Concurrent,
                }
            })
            .before(move |feature, rule, scenario, world| {
                let shared = shared.clone();
                let info = scenario_info(feature, rule, scenario);
                Box::pin(async move {
                    if let Err(e) = world.start(shared, info).await {
                        panic!("Scenario setup failed: {e}");
                    }
                })
            })
            .after(|_feature, _rule, _scenario, _event, world| {
                Box::pin(async move {
                    if let Some(world) = world {
                        if let Err(e) = world.finish().await {
                            panic!("Scenario teardown failed: {e}");
                        }
                    }
                })
            })
            .with_default_cli()
            .filter_run(input, move |feature, rule, scenario| {
                let selected = feature
                    .path
                    .as_deref()
                    .map(|path| features.contains(path))
                    .unwrap_or(false);
                selected
                    && tags
                        .as_ref()
                        .map(|tags| tags.eval(effective_tags(feature, rule, scenario)))
                        .unwrap_or(true)
            })
            .await;

        Ok(!writer.execution_has_failed())
    }
}

fn parse_tag_filter(expression: &str) -> Result<Option<TagOperation>, RunError> {
    if expression.trim().is_empty() {
        return Ok(None);
    }
    parse_tag_expression(expression)
        .map(Some)
        .map_err(|reason| RunError::TagExpression {
            expression: expression.to_string(),
            reason,
        })
}

async fn run_before_all(
    hooks: &[HookDefinition<RunHookFn>],
    config: &ResolvedConfig,
) -> Result<(), RunError> {
    for hook in hooks {
        (hook.func)(config).await.map_err(RunError::Hook)?;
    }
    Ok(())
}

/// Every hook runs; the first failure is reported
async fn run_after_all(
    hooks: &[HookDefinition<RunHookFn>],
    config: &ResolvedConfig,
) -> Result<(), RunError> {
    let mut first_error = None;
    for hook in hooks {
        if let Err(e) = (hook.func)(config).await {
            warn!("After-all hook failed: {}", e);
            first_error.get_or_insert(RunError::Hook(e));
        }
    }
    first_error.map_or(Ok(()), Err)
}

fn effective_tags(
    feature: &gherkin::Feature,
    rule: Option<&gherkin::Rule>,
    scenario: &gherkin::Scenario,
) -> Vec<String> {
    feature
        .tags
        .iter()
        .chain(rule.into_iter().flat_map(|rule| rule.tags.iter()))
        .chain(scenario.tags.iter())
        .map(|tag| tag.trim_start_matches('@').to_string())
        .collect()
}

fn scenario_info(
    feature: &gherkin::Feature,
    rule: Option<&gherkin::Rule>,
    scenario: &gherkin::Scenario,
) -> ScenarioInfo {
    ScenarioInfo {
        feature: feature.name.clone(),
        scenario: scenario.name.clone(),
        tags: effective_tags(feature, rule, scenario),
    }
}

/// A per-scenario or per-step hook with its tag filter parsed
struct ScopedHook {
    name: String,
    func: HookFn,
    filter: Option<TagOperation>,
}

impl ScopedHook {
    fn compile(hooks: &[HookDefinition<HookFn>], kind: &str) -> Result<Vec<Self>, RunError> {
        hooks
            .iter()
            .enumerate()
            .map(|(i, hook)| {
                let filter = match &hook.tags {
                    Some(tags) => parse_tag_filter(tags)?,
                    None => None,
                };
                Ok(ScopedHook {
                    name: hook.name.clone().unwrap_or_else(|| format!("{} #{}", kind, i + 1)),
                    func: hook.func,
                    filter,
                })
            })
            .collect()
    }

    fn applies(&self, info: &ScenarioInfo) -> bool {
        self.filter.as_ref().map(|f| f.eval(&info.tags)).unwrap_or(true)
    }

    async fn run(
        &self,
        world: &mut dyn ScenarioWorld,
        ctx: HookContext,
        timeout: Duration,
    ) -> Result<(), StepError> {
        debug!("Running hook {}", self.name);
        match tokio::time::timeout(timeout, (self.func)(world, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(StepError::Timeout(timeout)),
        }
    }
}

/// State shared by every scenario of a run
struct SharedRun {
    matcher: StepMatcher,
    world: WorldConstructor,
    params: WorldParameters,
    before: Vec<ScopedHook>,
    after: Vec<ScopedHook>,
    before_step: Vec<ScopedHook>,
    after_step: Vec<ScopedHook>,
    timeout: Duration,
}

impl SharedRun {
    fn new(
        bundle: &SupportBundle,
        world: WorldConstructor,
        params: WorldParameters,
    ) -> Result<Self, RunError> {
        Ok(Self {
            matcher: StepMatcher::compile(&bundle.steps, &bundle.parameter_types)?,
            world,
            params,
            before: ScopedHook::compile(&bundle.hooks.before, "before")?,
            after: ScopedHook::compile(&bundle.hooks.after, "after")?,
            before_step: ScopedHook::compile(&bundle.hooks.before_step, "before step")?,
            after_step: ScopedHook::compile(&bundle.hooks.after_step, "after step")?,
            timeout: bundle.default_timeout,
        })
    }
}

impl fmt::Debug for SharedRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedRun")
            .field("steps", &self.matcher.len())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct Session {
    world: Box<dyn ScenarioWorld>,
    shared: Arc<SharedRun>,
    info: ScenarioInfo,
    failed: bool,
}

/// What `cucumber` holds per scenario. Empty until the before closure
/// builds the bundle's world.
#[derive(Debug, Default, World)]
struct EngineWorld {
    session: Option<Session>,
}

impl EngineWorld {
    /// Build the world and run before hooks. The session is kept even when a
    /// hook fails so after hooks can still tear down.
    async fn start(&mut self, shared: Arc<SharedRun>, info: ScenarioInfo) -> Result<(), StepError> {
        let world = (shared.world)(shared.params.clone())?;
        let session = self.session.insert(Session {
            world,
            shared: shared.clone(),
            info: info.clone(),
            failed: false,
        });

        for hook in shared.before.iter().filter(|h| h.applies(&info)) {
            let ctx = HookContext {
                scenario: info.clone(),
                step: None,
                failed: false,
            };
            hook.run(session.world.as_mut(), ctx, shared.timeout).await?;
        }
        Ok(())
    }

    /// Run every after hook and drop the world
    async fn finish(&mut self) -> Result<(), StepError> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        let shared = session.shared.clone();
        let mut first_error = None;

        for hook in shared.after.iter().filter(|h| h.applies(&session.info)) {
            let ctx = HookContext {
                scenario: session.info.clone(),
                step: None,
                failed: session.failed,
            };
            if let Err(e) = hook.run(session.world.as_mut(), ctx, shared.timeout).await {
                warn!("Hook {} failed for {:?}: {}", hook.name, session.info.scenario, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn step(
        &mut self,
        text: &str,
        docstring: Option<String>,
        table: Option<Vec<Vec<String>>>,
    ) -> Result<(), StepError> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| StepError::msg("scenario world was never constructed"))?;
        let shared = session.shared.clone();
        let info = session.info.clone();

        let found = shared
            .matcher
            .find(text)
            .ok_or_else(|| StepError::Undefined(text.to_string()))?;
        let func = found.definition.func;
        let timeout = found.definition.timeout.unwrap_or(shared.timeout);
        let args = found.into_args(text, docstring, table);

        let ctx = HookContext {
            scenario: info.clone(),
            step: Some(text.to_string()),
            failed: session.failed,
        };
        for hook in shared.before_step.iter().filter(|h| h.applies(&info)) {
            hook.run(session.world.as_mut(), ctx.clone(), shared.timeout).await?;
        }

        let result = match tokio::time::timeout(timeout, func(session.world.as_mut(), args)).await {
            Ok(result) => result,
            Err(_) => Err(StepError::Timeout(timeout)),
        };
        if result.is_err() {
            session.failed = true;
        }

        let mut after_error = None;
        for hook in shared.after_step.iter().filter(|h| h.applies(&info)) {
            let ctx = HookContext {
                failed: session.failed,
                ..ctx.clone()
            };
            if let Err(e) = hook.run(session.world.as_mut(), ctx, shared.timeout).await {
                after_error.get_or_insert(e);
            }
        }

        result?;
        after_error.map_or(Ok(()), Err)
    }
}

fn dispatch<'a>(world: &'a mut EngineWorld, ctx: step::Context) -> LocalBoxFuture<'a, ()> {
    Box::pin(async move {
        let step = ctx.step;
        let table = step.table.as_ref().map(|table| table.rows.clone());
        if let Err(e) = world.step(&step.value, step.docstring.clone(), table).await {
            panic!("{e}");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{compose, StepArgs};
    use crate::config::{DriverKind, WorldConfig};
    use crate::driver::{memory_factory, MemoryPage};
    use crate::steps::builtin_bundle;

    fn failing<'a>(
        _: &'a mut dyn ScenarioWorld,
        _: StepArgs,
    ) -> LocalBoxFuture<'a, Result<(), StepError>> {
        Box::pin(async { Err(StepError::msg("boom")) })
    }

    fn record_failure<'a>(
        world: &'a mut dyn ScenarioWorld,
        ctx: HookContext,
    ) -> LocalBoxFuture<'a, Result<(), StepError>> {
        Box::pin(async move {
            if let Some(runtime) = world.runtime() {
                runtime.set_data("after_step_saw_failure", ctx.failed);
            }
            Ok(())
        })
    }

    fn shared(user: SupportBundle) -> Arc<SharedRun> {
        let bundle = compose(user, builtin_bundle());
        let params = WorldParameters {
            config: WorldConfig::new(std::env::temp_dir(), DriverKind::Mock)
                .with_base_url("http://app.test/"),
            driver_factory: memory_factory(MemoryPage::new()),
        };
        let world = bundle.world.clone().unwrap();
        Arc::new(SharedRun::new(&bundle, world, params).unwrap())
    }

    fn info(tags: &[&str]) -> ScenarioInfo {
        ScenarioInfo {
            feature: "Feature".to_string(),
            scenario: "Scenario".to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_session_lifecycle_runs_builtin_hooks() {
        let mut world = EngineWorld::default();
        world.start(shared(SupportBundle::new()), info(&[])).await.unwrap();

        world.step(r#"I store "Hello World" as "message""#, None, None).await.unwrap();
        world.step("data for message should be Hello World", None, None).await.unwrap();
        world.step("trigger scenario setup", None, None).await.unwrap();
        world.step("data for message should be absent", None, None).await.unwrap();

        world.finish().await.unwrap();
        assert!(world.session.is_none());
    }

    #[tokio::test]
    async fn test_undefined_step_fails() {
        let mut world = EngineWorld::default();
        world.start(shared(SupportBundle::new()), info(&[])).await.unwrap();
        let err = world.step("I dance", None, None).await.unwrap_err();
        assert!(matches!(err, StepError::Undefined(text) if text == "I dance"));
    }

    #[tokio::test]
    async fn test_after_step_hooks_see_failures() {
        let user = SupportBundle::new()
            .step("it fails", failing)
            .after_step(record_failure);
        let mut world = EngineWorld::default();
        world.start(shared(user), info(&[])).await.unwrap();

        assert!(world.step("it fails", None, None).await.is_err());
        let session = world.session.as_mut().unwrap();
        assert!(session.failed);
        let runtime = session.world.runtime().unwrap();
        assert_eq!(runtime.get_data("after_step_saw_failure"), Some(&serde_json::json!(true)));
    }

    #[test]
    fn test_tagged_hooks_only_apply_to_matching_scenarios() {
        let user = SupportBundle::new().before_tagged("@checkout and not @wip", record_failure);
        let shared = shared(user);
        // builtin setup hook first, then the tagged user hook
        assert_eq!(shared.before.len(), 2);
        assert!(shared.before[1].applies(&info(&["checkout"])));
        assert!(!shared.before[1].applies(&info(&["checkout", "wip"])));
        assert!(shared.before[0].applies(&info(&[])));
    }

    #[test]
    fn test_invalid_hook_tags_fail_before_running() {
        let bundle = compose(
            SupportBundle::new().before_tagged("@a and (", record_failure),
            builtin_bundle(),
        );
        let params = WorldParameters {
            config: WorldConfig::new(std::env::temp_dir(), DriverKind::Mock),
            driver_factory: memory_factory(MemoryPage::new()),
        };
        let world = bundle.world.clone().unwrap();
        let err = SharedRun::new(&bundle, world, params).err().unwrap();
        assert!(matches!(err, RunError::TagExpression { .. }));
    }

    #[test]
    fn test_empty_tag_filter_selects_everything() {
        assert!(parse_tag_filter("  ").unwrap().is_none());
        assert!(parse_tag_filter("@smoke").unwrap().is_some());
    }

    #[test]
    fn test_tag_filter_matches_scenario_tags() {
        let filter = parse_tag_filter(" @smoke and not @wip ").unwrap().unwrap();
        assert!(filter.eval(["smoke", "checkout"]));
        assert!(!filter.eval(["smoke", "wip"]));
        assert!(!filter.eval(Vec::<String>::new()));

        let grouped = parse_tag_filter("not (@slow or @wip)").unwrap().unwrap();
        assert!(grouped.eval(["fast"]));
        assert!(!grouped.eval(["slow"]));
    }

    #[test]
    fn test_tag_filter_needs_at_signs() {
        assert!(matches!(parse_tag_filter("smoke"), Err(RunError::TagExpression { .. })));
    }
}
