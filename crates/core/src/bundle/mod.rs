//! Support bundles
//!
//! A [`SupportBundle`] is everything the execution engine needs to run
//! scenarios: hooks, step definitions, parameter types, the world
//! constructor and the parallel-assignment policy. The builtin step library
//! and the user each provide one; [`compose`] merges them.

use std::fmt;
use std::panic::Location;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::LocalBoxFuture;

use crate::config::{ResolvedConfig, WorldConfig};
use crate::driver::DriverFactory;
use crate::error::{StepError, WorldError};
use crate::world::ScenarioWorld;

mod compose;
mod params;

pub use compose::compose;
pub use params::{builtin_parameter_types, ParameterRegistry, ParameterType};

/// Step and hook timeout when a bundle does not set one
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// A step implementation. Receives the scenario world explicitly.
pub type StepFn =
    for<'a> fn(&'a mut dyn ScenarioWorld, StepArgs) -> LocalBoxFuture<'a, Result<(), StepError>>;

/// A per-scenario or per-step hook
pub type HookFn =
    for<'a> fn(&'a mut dyn ScenarioWorld, HookContext) -> LocalBoxFuture<'a, Result<(), StepError>>;

/// A hook around the whole test run
pub type RunHookFn = for<'a> fn(&'a ResolvedConfig) -> LocalBoxFuture<'a, Result<(), StepError>>;

/// Builds the world for one scenario
pub type WorldConstructor =
    Arc<dyn Fn(WorldParameters) -> Result<Box<dyn ScenarioWorld>, WorldError> + Send + Sync>;

/// Whether a scenario may run concurrently with others
pub type ParallelPredicate = Arc<dyn Fn(&ScenarioInfo) -> bool + Send + Sync>;

/// Handed to the world constructor
#[derive(Clone)]
pub struct WorldParameters {
    pub config: WorldConfig,
    pub driver_factory: DriverFactory,
}

/// Identifies a scenario to hooks and the parallel predicate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioInfo {
    pub feature: String,
    pub scenario: String,
    /// Effective tags (feature, rule and scenario) without the leading `@`
    pub tags: Vec<String>,
}

impl ScenarioInfo {
    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.trim_start_matches('@');
        self.tags.iter().any(|t| t == tag)
    }
}

/// What a hook knows about where it runs
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    pub scenario: ScenarioInfo,
    /// Step text, for per-step hooks
    pub step: Option<String>,
    /// Whether a step of the scenario has failed so far
    pub failed: bool,
}

/// Arguments extracted from a matched step
#[derive(Debug, Clone, Default)]
pub struct StepArgs {
    /// Full step text, without the keyword
    pub text: String,
    /// Captured parameters, after parameter-type transforms
    pub captures: Vec<String>,
    pub docstring: Option<String>,
    pub table: Option<Vec<Vec<String>>>,
}

impl StepArgs {
    pub fn get(&self, index: usize) -> Result<&str, StepError> {
        self.captures
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| StepError::Argument {
                index,
                reason: format!("is missing (step captured {})", self.captures.len()),
            })
    }

    pub fn parse<T>(&self, index: usize) -> Result<T, StepError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let raw = self.get(index)?;
        raw.parse().map_err(|e: T::Err| StepError::Argument {
            index,
            reason: format!("{:?} is invalid: {}", raw, e),
        })
    }
}

/// How a step definition matches step text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StepPattern {
    /// Cucumber expression: literal text, `{type}` parameters and
    /// `(optional)` text
    Expression(String),
    /// Raw regular expression; every capture group becomes an argument
    Regex(String),
}

impl StepPattern {
    pub fn as_str(&self) -> &str {
        match self {
            StepPattern::Expression(s) | StepPattern::Regex(s) => s,
        }
    }
}

impl fmt::Display for StepPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepPattern::Expression(s) => write!(f, "{}", s),
            StepPattern::Regex(s) => write!(f, "/{}/", s),
        }
    }
}

#[derive(Clone)]
pub struct StepDefinition {
    pub pattern: StepPattern,
    pub func: StepFn,
    /// `file:line` where the step was registered
    pub source: String,
    /// Overrides the bundle's default timeout
    pub timeout: Option<Duration>,
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("pattern", &self.pattern)
            .field("source", &self.source)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Clone)]
pub struct HookDefinition<F> {
    pub name: Option<String>,
    /// Tag expression; the hook only runs for matching scenarios
    pub tags: Option<String>,
    pub func: F,
}

impl<F> HookDefinition<F> {
    pub fn new(func: F) -> Self {
        Self {
            name: None,
            tags: None,
            func,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn tagged(mut self, tags: &str) -> Self {
        self.tags = Some(tags.to_string());
        self
    }
}

impl<F> fmt::Debug for HookDefinition<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookDefinition")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .finish()
    }
}

/// The six hook lists. `before*` lists run in order, `after*` lists too;
/// composition puts builtin hooks outermost.
#[derive(Debug, Clone, Default)]
pub struct Hooks {
    pub before_all: Vec<HookDefinition<RunHookFn>>,
    pub after_all: Vec<HookDefinition<RunHookFn>>,
    pub before: Vec<HookDefinition<HookFn>>,
    pub after: Vec<HookDefinition<HookFn>>,
    pub before_step: Vec<HookDefinition<HookFn>>,
    pub after_step: Vec<HookDefinition<HookFn>>,
}

/// Where the engine believes a bundle came from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Coordinates {
    pub import_paths: Vec<String>,
    pub require_paths: Vec<String>,
    pub loaders: Vec<String>,
}

#[derive(Clone)]
pub struct SupportBundle {
    pub hooks: Hooks,
    pub steps: Vec<StepDefinition>,
    pub parameter_types: ParameterRegistry,
    pub world: Option<WorldConstructor>,
    /// Set when `world` was supplied on purpose rather than left at default
    pub custom_world_provided: bool,
    pub parallel: Option<ParallelPredicate>,
    pub default_timeout: Duration,
    pub coordinates: Coordinates,
}

impl Default for SupportBundle {
    fn default() -> Self {
        Self {
            hooks: Hooks::default(),
            steps: Vec::new(),
            parameter_types: ParameterRegistry::default(),
            world: None,
            custom_world_provided: false,
            parallel: None,
            default_timeout: DEFAULT_STEP_TIMEOUT,
            coordinates: Coordinates::default(),
        }
    }
}

impl fmt::Debug for SupportBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupportBundle")
            .field("hooks", &self.hooks)
            .field("steps", &self.steps)
            .field("parameter_types", &self.parameter_types)
            .field("world", &self.world.as_ref().map(|_| "<constructor>"))
            .field("custom_world_provided", &self.custom_world_provided)
            .field("parallel", &self.parallel.as_ref().map(|_| "<predicate>"))
            .field("default_timeout", &self.default_timeout)
            .field("coordinates", &self.coordinates)
            .finish()
    }
}

impl SupportBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step matched by a cucumber expression
    #[track_caller]
    pub fn step(self, expression: &str, func: StepFn) -> Self {
        let source = caller();
        self.with_step(StepDefinition {
            pattern: StepPattern::Expression(expression.to_string()),
            func,
            source,
            timeout: None,
        })
    }

    /// Register a step matched by a regular expression
    #[track_caller]
    pub fn step_regex(self, regex: &str, func: StepFn) -> Self {
        let source = caller();
        self.with_step(StepDefinition {
            pattern: StepPattern::Regex(regex.to_string()),
            func,
            source,
            timeout: None,
        })
    }

    pub fn with_step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    pub fn before(mut self, func: HookFn) -> Self {
        self.hooks.before.push(HookDefinition::new(func));
        self
    }

    pub fn before_tagged(mut self, tags: &str, func: HookFn) -> Self {
        self.hooks.before.push(HookDefinition::new(func).tagged(tags));
        self
    }

    pub fn after(mut self, func: HookFn) -> Self {
        self.hooks.after.push(HookDefinition::new(func));
        self
    }

    pub fn after_tagged(mut self, tags: &str, func: HookFn) -> Self {
        self.hooks.after.push(HookDefinition::new(func).tagged(tags));
        self
    }

    pub fn before_step(mut self, func: HookFn) -> Self {
        self.hooks.before_step.push(HookDefinition::new(func));
        self
    }

    pub fn after_step(mut self, func: HookFn) -> Self {
        self.hooks.after_step.push(HookDefinition::new(func));
        self
    }

    pub fn before_all(mut self, func: RunHookFn) -> Self {
        self.hooks.before_all.push(HookDefinition::new(func));
        self
    }

    pub fn after_all(mut self, func: RunHookFn) -> Self {
        self.hooks.after_all.push(HookDefinition::new(func));
        self
    }

    /// Register a parameter type, replacing one of the same name
    pub fn parameter_type(mut self, parameter_type: ParameterType) -> Self {
        self.parameter_types.register(parameter_type);
        self
    }

    /// Supply a custom world constructor
    pub fn world<F>(mut self, constructor: F) -> Self
    where
        F: Fn(WorldParameters) -> Result<Box<dyn ScenarioWorld>, WorldError> + Send + Sync + 'static,
    {
        self.world = Some(Arc::new(constructor));
        self.custom_world_provided = true;
        self
    }

    pub fn parallel<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ScenarioInfo) -> bool + Send + Sync + 'static,
    {
        self.parallel = Some(Arc::new(predicate));
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

#[track_caller]
fn caller() -> String {
    let location = Location::caller();
    format!("{}:{}", location.file(), location.line())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_args_get_and_parse() {
        let args = StepArgs {
            text: "I set the viewport to 1024 by 768".to_string(),
            captures: vec!["1024".to_string(), "tall".to_string()],
            ..Default::default()
        };
        assert_eq!(args.parse::<u32>(0).unwrap(), 1024);
        assert!(matches!(args.parse::<u32>(1), Err(StepError::Argument { index: 1, .. })));
        assert!(matches!(args.get(2), Err(StepError::Argument { index: 2, .. })));
    }

    #[test]
    fn test_step_records_registration_site() {
        fn noop<'a>(
            _: &'a mut dyn ScenarioWorld,
            _: StepArgs,
        ) -> LocalBoxFuture<'a, Result<(), StepError>> {
            Box::pin(async { Ok(()) })
        }
        let bundle = SupportBundle::new().step("a step", noop);
        assert!(bundle.steps[0].source.contains("bundle"));
        assert_eq!(bundle.steps[0].pattern, StepPattern::Expression("a step".into()));
    }

    #[test]
    fn test_world_sets_custom_flag() {
        let bundle = SupportBundle::new();
        assert!(!bundle.custom_world_provided);
        let bundle = bundle.world(|_params| Err(WorldError::MissingDriver));
        assert!(bundle.custom_world_provided);
        assert!(bundle.world.is_some());
    }

    #[test]
    fn test_scenario_info_tags_ignore_at_sign() {
        let info = ScenarioInfo {
            tags: vec!["serial".to_string()],
            ..Default::default()
        };
        assert!(info.has_tag("@serial"));
        assert!(info.has_tag("serial"));
        assert!(!info.has_tag("smoke"));
    }
}
