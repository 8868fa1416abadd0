//! Execution engine seam
//!
//! Two narrow interfaces isolate the external BDD engine:
//! - [`SupportBuilder`] supplies the user's support bundle
//! - [`ExecutionEngine`] runs features against a composed bundle
//!
//! [`CucumberEngine`] is the production engine, backed by the `cucumber`
//! crate.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::bundle::SupportBundle;
use crate::config::ResolvedConfig;
use crate::driver::DriverFactory;
use crate::error::RunError;

mod adapter;
pub mod features;
pub mod matcher;

pub use adapter::CucumberEngine;
pub use features::{discover, FeatureSet};
pub use matcher::{StepMatch, StepMatcher};
pub use cucumber::gherkin::tagexpr::TagOperation;

/// Parse a tag expression such as `@smoke and not (@slow or @wip)`. Tags
/// need their `@`. The error is a human-readable reason.
pub fn parse_tag_expression(text: &str) -> Result<TagOperation, String> {
    text.trim().parse::<TagOperation>().map_err(|e| e.to_string())
}

/// Supplies the user support bundle for a run
pub trait SupportBuilder: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this builder can be used in the current process
    fn is_available(&self) -> bool {
        true
    }

    fn build(&self, config: &ResolvedConfig) -> Result<SupportBundle, RunError>;
}

/// A bundle assembled in code by the embedding program
pub struct StaticSupport {
    name: String,
    bundle: SupportBundle,
}

impl StaticSupport {
    pub fn new(bundle: SupportBundle) -> Self {
        Self::named("static", bundle)
    }

    pub fn named(name: &str, bundle: SupportBundle) -> Self {
        Self {
            name: name.to_string(),
            bundle,
        }
    }
}

impl SupportBuilder for StaticSupport {
    fn name(&self) -> &str {
        &self.name
    }

    fn build(&self, config: &ResolvedConfig) -> Result<SupportBundle, RunError> {
        Ok(stamp(self.bundle.clone(), &self.name, config))
    }
}

/// No user steps; the builtin library alone
#[derive(Debug, Default)]
pub struct EmptySupport;

impl SupportBuilder for EmptySupport {
    fn name(&self) -> &str {
        "empty"
    }

    fn build(&self, config: &ResolvedConfig) -> Result<SupportBundle, RunError> {
        Ok(stamp(SupportBundle::new(), self.name(), config))
    }
}

/// Record where the bundle came from
fn stamp(mut bundle: SupportBundle, loader: &str, config: &ResolvedConfig) -> SupportBundle {
    bundle.coordinates.require_paths.extend(config.steps.iter().cloned());
    if let Some(path) = &config.config_file_path {
        bundle.coordinates.import_paths.push(path.display().to_string());
    }
    bundle.coordinates.loaders.push(loader.to_string());
    bundle
}

/// First available builder: `primary`, else `fallback`
pub fn resolve_support_builder(
    primary: Arc<dyn SupportBuilder>,
    fallback: Option<Arc<dyn SupportBuilder>>,
) -> Result<Arc<dyn SupportBuilder>, RunError> {
    if primary.is_available() {
        return Ok(primary);
    }
    debug!("Support builder {} is unavailable", primary.name());

    match fallback {
        Some(fallback) if fallback.is_available() => Ok(fallback),
        Some(fallback) => Err(RunError::ExtensionPointUnavailable(format!(
            "neither {} nor {} can load support code",
            primary.name(),
            fallback.name()
        ))),
        None => Err(RunError::ExtensionPointUnavailable(format!(
            "{} cannot load support code and no fallback is configured",
            primary.name()
        ))),
    }
}

/// Everything an engine needs for one run
#[derive(Clone)]
pub struct EngineRequest {
    pub config: ResolvedConfig,
    pub bundle: SupportBundle,
    pub driver_factory: DriverFactory,
}

/// Runs features. Returns `Ok(true)` when every scenario passed.
#[async_trait(?Send)]
pub trait ExecutionEngine {
    async fn run(&self, request: EngineRequest) -> Result<bool, RunError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unavailable(&'static str);

    impl SupportBuilder for Unavailable {
        fn name(&self) -> &str {
            self.0
        }

        fn is_available(&self) -> bool {
            false
        }

        fn build(&self, _config: &ResolvedConfig) -> Result<SupportBundle, RunError> {
            Err(RunError::ExtensionPointUnavailable(self.0.to_string()))
        }
    }

    #[test]
    fn test_resolve_prefers_primary_then_fallback() {
        let chosen = resolve_support_builder(Arc::new(EmptySupport), None).unwrap();
        assert_eq!(chosen.name(), "empty");

        let chosen = resolve_support_builder(
            Arc::new(Unavailable("primary")),
            Some(Arc::new(EmptySupport)),
        )
        .unwrap();
        assert_eq!(chosen.name(), "empty");
    }

    #[test]
    fn test_resolve_fails_when_nothing_is_available() {
        let err = resolve_support_builder(
            Arc::new(Unavailable("primary")),
            Some(Arc::new(Unavailable("secondary"))),
        )
        .err()
        .unwrap();
        assert!(matches!(err, RunError::ExtensionPointUnavailable(_)));
        assert!(err.to_string().contains("secondary"));
    }

    #[test]
    fn test_builders_stamp_coordinates() {
        let mut config = ResolvedConfig::defaults("/app");
        config.steps = vec!["steps/**/*.rs".to_string()];
        config.config_file_path = Some("/app/bdui.config.toml".into());

        let bundle = StaticSupport::named("suite", SupportBundle::new()).build(&config).unwrap();
        assert_eq!(bundle.coordinates.require_paths, vec!["steps/**/*.rs"]);
        assert_eq!(bundle.coordinates.import_paths, vec!["/app/bdui.config.toml"]);
        assert_eq!(bundle.coordinates.loaders, vec!["suite"]);
    }
}
