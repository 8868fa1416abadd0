//! Run orchestration
//!
//! A [`Runner`] owns one resolved configuration and drives a single run:
//! environment, optional web server, bundle composition and the execution
//! engine under the hard run timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::bundle::{compose, SupportBundle};
use crate::config::ResolvedConfig;
use crate::driver::{self, DriverFactory};
use crate::engine::{
    resolve_support_builder, CucumberEngine, EmptySupport, EngineRequest, ExecutionEngine,
    StaticSupport, SupportBuilder,
};
use crate::env::EnvGuard;
use crate::error::RunError;
use crate::server::WebServer;
use crate::steps::builtin_bundle;

/// Result of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// Every scenario passed and the run finished in time
    pub success: bool,
    /// The hard run timeout fired
    pub timed_out: bool,
    /// SIGINT or SIGTERM arrived during the run
    pub interrupted: bool,
    pub duration: Duration,
}

enum Completion {
    Finished(bool),
    TimedOut,
    Interrupted,
}

/// Runs the features of one resolved configuration
pub struct Runner {
    config: ResolvedConfig,
    support: Arc<dyn SupportBuilder>,
    fallback: Option<Arc<dyn SupportBuilder>>,
    driver_factory: DriverFactory,
    engine: Box<dyn ExecutionEngine>,
}

impl Runner {
    pub fn new(config: ResolvedConfig) -> Self {
        Self {
            config,
            support: Arc::new(EmptySupport),
            fallback: None,
            driver_factory: driver::default_factory(),
            engine: Box::new(CucumberEngine::new()),
        }
    }

    pub fn with_support(mut self, support: Arc<dyn SupportBuilder>) -> Self {
        self.support = support;
        self
    }

    /// Used when the primary support builder reports itself unavailable
    pub fn with_fallback_support(mut self, fallback: Arc<dyn SupportBuilder>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Shorthand for a bundle assembled in code
    pub fn with_user_bundle(self, bundle: SupportBundle) -> Self {
        self.with_support(Arc::new(StaticSupport::new(bundle)))
    }

    pub fn with_driver_factory(mut self, factory: DriverFactory) -> Self {
        self.driver_factory = factory;
        self
    }

    pub fn with_engine(mut self, engine: Box<dyn ExecutionEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Execute the run.
    ///
    /// Configuration and composition errors are returned before the engine
    /// starts. Scenario failures, the hard timeout and interrupts are
    /// reported through [`RunOutcome`]. The environment is restored and the
    /// web server stopped on every path.
    pub async fn run(&self) -> Result<RunOutcome, RunError> {
        let start = Instant::now();
        let env_guard = EnvGuard::apply(&self.config.environment)?;
        if !self.config.environment.is_empty() {
            debug!("Applied {} environment variable(s)", env_guard.keys().count());
        }

        let mut config = self.config.clone();
        let mut server = match &config.web_server {
            Some(settings) => {
                let server = WebServer::start(settings, &config.project_root).await?;
                if server.base_url != settings.base_url {
                    info!("Using {} as base URL", server.base_url);
                    config.base_url = server.base_url.clone();
                }
                Some(server)
            }
            None => None,
        };

        let completion = self.execute(&config).await;

        if let Some(server) = server.as_mut() {
            if let Err(e) = server.stop().await {
                warn!("Failed to stop web server: {}", e);
            }
        }
        drop(env_guard);

        let duration = start.elapsed();
        let outcome = match completion? {
            Completion::Finished(success) => RunOutcome {
                success,
                timed_out: false,
                interrupted: false,
                duration,
            },
            Completion::TimedOut => RunOutcome {
                success: false,
                timed_out: true,
                interrupted: false,
                duration,
            },
            Completion::Interrupted => RunOutcome {
                success: false,
                timed_out: false,
                interrupted: true,
                duration,
            },
        };

        if outcome.success {
            info!("Run passed in {:.1}s", duration.as_secs_f64());
        } else {
            info!("Run failed in {:.1}s", duration.as_secs_f64());
        }
        Ok(outcome)
    }

    async fn execute(&self, config: &ResolvedConfig) -> Result<Completion, RunError> {
        let builtin = builtin_bundle();
        let support = resolve_support_builder(self.support.clone(), self.fallback.clone())?;
        info!("Loading support code with {}", support.name());
        let user = support.build(config)?;
        let bundle = compose(user, builtin);
        debug!(
            "Composed bundle: {} step(s), {} parameter type(s)",
            bundle.steps.len(),
            bundle.parameter_types.len()
        );

        let request = EngineRequest {
            config: config.clone(),
            bundle,
            driver_factory: self.driver_factory.clone(),
        };

        tokio::select! {
            result = self.engine.run(request) => Ok(Completion::Finished(result?)),
            _ = sleep(config.timeout) => {
                error!("Run exceeded the hard timeout of {:?}", config.timeout);
                Ok(Completion::TimedOut)
            }
            signal = shutdown_signal() => {
                warn!("Received {}; stopping the run", signal);
                Ok(Completion::Interrupted)
            }
        }
    }
}

/// Resolves on SIGINT or SIGTERM. Never resolves if no handler can be
/// installed.
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        if let Ok(mut terminate) = signal(SignalKind::terminate()) {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if result.is_err() {
                        terminate.recv().await;
                        return "SIGTERM";
                    }
                    return "SIGINT";
                }
                _ = terminate.recv() => return "SIGTERM",
            }
        }
    }

    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    "SIGINT"
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::future::LocalBoxFuture;
    use parking_lot::Mutex;

    use std::fs;

    use tempfile::TempDir;

    use crate::bundle::StepArgs;
    use crate::config::{DriverKind, WebServerSettings};
    use crate::driver::{memory_factory, MemoryPage};
    use crate::error::StepError;
    use crate::world::ScenarioWorld;

    #[derive(Default)]
    struct Seen {
        steps: Vec<String>,
        base_url: String,
        env_value: Option<String>,
        has_world: bool,
    }

    /// Records what it was handed instead of running features
    struct Recording {
        seen: Arc<Mutex<Seen>>,
        result: bool,
    }

    #[async_trait(?Send)]
    impl ExecutionEngine for Recording {
        async fn run(&self, request: EngineRequest) -> Result<bool, RunError> {
            let mut seen = self.seen.lock();
            seen.steps = request.bundle.steps.iter().map(|s| s.pattern.to_string()).collect();
            seen.base_url = request.config.base_url.clone();
            seen.env_value = std::env::var("BDUI_RUNNER_TEST_VAR").ok();
            seen.has_world = request.bundle.world.is_some();
            Ok(self.result)
        }
    }

    struct Hanging;

    #[async_trait(?Send)]
    impl ExecutionEngine for Hanging {
        async fn run(&self, _request: EngineRequest) -> Result<bool, RunError> {
            std::future::pending::<()>().await;
            Ok(true)
        }
    }

    fn noop<'a>(
        _world: &'a mut dyn ScenarioWorld,
        _args: StepArgs,
    ) -> LocalBoxFuture<'a, Result<(), StepError>> {
        Box::pin(async move { Ok(()) })
    }

    fn config() -> ResolvedConfig {
        let mut config = ResolvedConfig::defaults(".");
        config.driver.kind = DriverKind::Mock;
        config
    }

    fn recording(result: bool) -> (Box<Recording>, Arc<Mutex<Seen>>) {
        let seen = Arc::new(Mutex::new(Seen::default()));
        (
            Box::new(Recording {
                seen: seen.clone(),
                result,
            }),
            seen,
        )
    }

    #[tokio::test]
    async fn test_engine_receives_composed_bundle() {
        let (engine, seen) = recording(true);
        let runner = Runner::new(config())
            .with_user_bundle(SupportBundle::new().step("my custom step", noop))
            .with_engine(engine);

        let outcome = runner.run().await.unwrap();
        assert!(outcome.success);
        assert!(!outcome.timed_out && !outcome.interrupted);

        let seen = seen.lock();
        assert!(seen.has_world);
        assert!(seen.steps.iter().any(|s| s == "I navigate to {string}"));
        assert_eq!(seen.steps.last().map(String::as_str), Some("my custom step"));
    }

    #[tokio::test]
    async fn test_engine_failure_is_reported() {
        let (engine, _) = recording(false);
        let outcome = Runner::new(config()).with_engine(engine).run().await.unwrap();
        assert!(!outcome.success);
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn test_environment_applied_for_the_run_only() {
        std::env::remove_var("BDUI_RUNNER_TEST_VAR");
        let mut config = config();
        config
            .environment
            .insert("BDUI_RUNNER_TEST_VAR".to_string(), "on".to_string());

        let (engine, seen) = recording(true);
        Runner::new(config).with_engine(engine).run().await.unwrap();

        assert_eq!(seen.lock().env_value.as_deref(), Some("on"));
        assert!(std::env::var_os("BDUI_RUNNER_TEST_VAR").is_none());
    }

    #[tokio::test]
    async fn test_invalid_env_key_aborts_before_engine() {
        let mut config = config();
        config.environment.insert("NOT-VALID".to_string(), "x".to_string());

        let (engine, seen) = recording(true);
        let err = Runner::new(config).with_engine(engine).run().await.unwrap_err();
        assert!(matches!(err, RunError::InvalidEnvKey { .. }));
        assert!(seen.lock().steps.is_empty());
    }

    #[tokio::test]
    async fn test_hard_timeout_reports_failure() {
        let mut config = config();
        config.timeout = Duration::from_millis(50);

        let outcome = Runner::new(config).with_engine(Box::new(Hanging)).run().await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.timed_out);
    }

    #[tokio::test]
    async fn test_unavailable_support_fails_fast() {
        struct Missing;

        impl SupportBuilder for Missing {
            fn name(&self) -> &str {
                "missing"
            }

            fn is_available(&self) -> bool {
                false
            }

            fn build(&self, _config: &ResolvedConfig) -> Result<SupportBundle, RunError> {
                Ok(SupportBundle::new())
            }
        }

        let (engine, _) = recording(true);
        let err = Runner::new(config())
            .with_support(Arc::new(Missing))
            .with_engine(engine)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::ExtensionPointUnavailable(_)));

        let (engine, _) = recording(true);
        let outcome = Runner::new(config())
            .with_support(Arc::new(Missing))
            .with_fallback_support(Arc::new(EmptySupport))
            .with_engine(engine)
            .run()
            .await
            .unwrap();
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn test_reused_server_keeps_base_url() {
        use tokio::io::AsyncWriteExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                    .await;
            }
        });

        let mut config = config();
        let base_url = format!("http://127.0.0.1:{}/", port);
        config.base_url = base_url.clone();
        config.web_server = Some(WebServerSettings {
            command: "exit 1".to_string(),
            port,
            base_url: base_url.clone(),
            reuse_existing_server: true,
            timeout: Duration::from_secs(2),
        });

        let (engine, seen) = recording(true);
        let outcome = Runner::new(config).with_engine(engine).run().await.unwrap();
        assert!(outcome.success);
        assert_eq!(seen.lock().base_url, base_url);
    }

    /// Project with one feature file, run by the cucumber engine on the
    /// in-memory driver
    fn feature_project(feature: &str) -> (TempDir, ResolvedConfig) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("features")).unwrap();
        fs::write(dir.path().join("features/run.feature"), feature).unwrap();

        let mut config = ResolvedConfig::defaults(dir.path());
        config.driver.kind = DriverKind::Mock;
        config.base_url = "http://app.test/".to_string();
        config.features = vec!["features/*.feature".to_string()];
        (dir, config)
    }

    fn cucumber_runner(config: ResolvedConfig, bundle: SupportBundle) -> Runner {
        Runner::new(config)
            .with_user_bundle(bundle)
            .with_driver_factory(memory_factory(MemoryPage::new()))
    }

    static RUN_HOOKS: Mutex<Vec<&'static str>> = parking_lot::const_mutex(Vec::new());

    fn first_before_all(_config: &ResolvedConfig) -> LocalBoxFuture<'_, Result<(), StepError>> {
        Box::pin(async {
            RUN_HOOKS.lock().push("before_all 1");
            Ok(())
        })
    }

    fn second_before_all(_config: &ResolvedConfig) -> LocalBoxFuture<'_, Result<(), StepError>> {
        Box::pin(async {
            RUN_HOOKS.lock().push("before_all 2");
            Ok(())
        })
    }

    fn record_after_all(_config: &ResolvedConfig) -> LocalBoxFuture<'_, Result<(), StepError>> {
        Box::pin(async {
            RUN_HOOKS.lock().push("after_all");
            Ok(())
        })
    }

    fn record_step<'a>(
        _world: &'a mut dyn ScenarioWorld,
        _args: StepArgs,
    ) -> LocalBoxFuture<'a, Result<(), StepError>> {
        Box::pin(async {
            RUN_HOOKS.lock().push("step");
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_run_hooks_wrap_the_features() {
        let (_dir, config) = feature_project(
            "Feature: Hooks\n  Scenario: one step\n    Given I record the step\n",
        );
        let bundle = SupportBundle::new()
            .before_all(first_before_all)
            .before_all(second_before_all)
            .after_all(record_after_all)
            .step("I record the step", record_step);

        let outcome = cucumber_runner(config, bundle).run().await.unwrap();
        assert!(outcome.success);
        assert_eq!(
            *RUN_HOOKS.lock(),
            vec!["before_all 1", "before_all 2", "step", "after_all"]
        );
    }

    fn failing_step<'a>(
        _world: &'a mut dyn ScenarioWorld,
        _args: StepArgs,
    ) -> LocalBoxFuture<'a, Result<(), StepError>> {
        Box::pin(async { Err(StepError::msg("checkout broke")) })
    }

    fn failing_after_all(_config: &ResolvedConfig) -> LocalBoxFuture<'_, Result<(), StepError>> {
        Box::pin(async { Err(StepError::msg("report upload failed")) })
    }

    #[tokio::test]
    async fn test_after_all_failure_after_failed_suite_is_an_error() {
        let (_dir, config) = feature_project(
            "Feature: Broken\n  Scenario: fails\n    Given the checkout breaks\n",
        );
        let bundle = SupportBundle::new()
            .after_all(failing_after_all)
            .step("the checkout breaks", failing_step);

        let err = cucumber_runner(config, bundle).run().await.unwrap_err();
        match err {
            RunError::Hook(StepError::Message(message)) => {
                assert_eq!(message, "report upload failed")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    fn slow_step<'a>(
        _world: &'a mut dyn ScenarioWorld,
        _args: StepArgs,
    ) -> LocalBoxFuture<'a, Result<(), StepError>> {
        Box::pin(async {
            sleep(Duration::from_secs(10)).await;
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_hard_timeout_stops_a_running_suite() {
        let (_dir, mut config) = feature_project(
            "Feature: Slow\n  Scenario: takes forever\n    Given a very slow step\n",
        );
        config.timeout = Duration::from_millis(300);
        let bundle = SupportBundle::new().step("a very slow step", slow_step);

        let started = Instant::now();
        let outcome = cucumber_runner(config, bundle).run().await.unwrap();
        assert!(outcome.timed_out);
        assert!(!outcome.success);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
