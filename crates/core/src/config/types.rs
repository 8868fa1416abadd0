//! Configuration types: the user-facing file shape and the resolved, immutable run configuration

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_FEATURES: &str = "features/**/*.feature";
pub const DEFAULT_STEPS: &str = "bdui/steps/**/*.rs";

/// Hard backstop for a whole run
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// How long a configured web server may take to become healthy
pub const DEFAULT_SERVER_TIMEOUT: Duration = Duration::from_secs(60);

/// Directory (relative to the project root) that receives screenshots and reports
pub const ARTIFACTS_DIR: &str = "bdui-results";

/// Which driver implementation backs a scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Real browser driven through Playwright
    #[default]
    Playwright,
    /// In-memory page, no browser process
    Mock,
}

impl DriverKind {
    pub const VARIANTS: [&'static str; 2] = ["playwright", "mock"];

    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::Playwright => "playwright",
            DriverKind::Mock => "mock",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub const VARIANTS: [&'static str; 3] = ["chromium", "firefox", "webkit"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order in which scenarios are handed to the execution engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioOrder {
    #[default]
    Defined,
    Random,
}

impl ScenarioOrder {
    pub const VARIANTS: [&'static str; 2] = ["defined", "random"];
}

// ---------------------------------------------------------------------------
// File shape
// ---------------------------------------------------------------------------

/// Config as written by the user. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConfig {
    #[serde(default)]
    pub project_root: Option<PathBuf>,

    #[serde(default, rename = "baseURL")]
    pub base_url: Option<String>,

    #[serde(default)]
    pub features: Option<Vec<String>>,

    #[serde(default)]
    pub steps: Option<Vec<String>>,

    #[serde(default)]
    pub driver: Option<RawDriver>,

    #[serde(default)]
    pub web_server: Option<RawWebServer>,

    #[serde(default)]
    pub cucumber: Option<RawCucumber>,

    #[serde(default)]
    pub environment: Option<BTreeMap<String, String>>,

    /// Hard run timeout in milliseconds
    #[serde(default)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDriver {
    #[serde(default)]
    pub kind: Option<DriverKind>,
    #[serde(default)]
    pub browser: Option<Browser>,
    #[serde(default)]
    pub headless: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawWebServer {
    pub command: String,
    pub port: u16,
    #[serde(default, rename = "baseURL")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub reuse_existing_server: Option<bool>,
    /// Startup timeout in milliseconds
    #[serde(default)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCucumber {
    #[serde(default)]
    pub tag_expression: Option<String>,
    #[serde(default)]
    pub order: Option<ScenarioOrder>,
}

// ---------------------------------------------------------------------------
// Resolved shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverSettings {
    pub kind: DriverKind,
    pub browser: Browser,
    pub headless: bool,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            kind: DriverKind::Playwright,
            browser: Browser::Chromium,
            headless: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebServerSettings {
    /// Shell command that starts the server
    pub command: String,
    pub port: u16,
    pub base_url: String,
    pub reuse_existing_server: bool,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CucumberSettings {
    /// Empty means "run everything"
    pub tag_expression: String,
    pub order: ScenarioOrder,
}

/// Fully resolved configuration for one run.
///
/// Produced once by [`crate::config::load`] and passed by reference
/// afterwards. Only the web-server detection step in the runner rewrites
/// `base_url` and the server port, and it does so before any scenario runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub project_root: PathBuf,
    pub config_file_path: Option<PathBuf>,
    pub base_url: String,
    pub features: Vec<String>,
    pub steps: Vec<String>,
    pub driver: DriverSettings,
    pub web_server: Option<WebServerSettings>,
    pub cucumber: CucumberSettings,
    pub environment: BTreeMap<String, String>,
    pub timeout: Duration,
}

impl ResolvedConfig {
    /// Defaults for a project rooted at `project_root` with no config file
    pub fn defaults(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            config_file_path: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            features: vec![DEFAULT_FEATURES.to_string()],
            steps: vec![DEFAULT_STEPS.to_string()],
            driver: DriverSettings::default(),
            web_server: None,
            cucumber: CucumberSettings::default(),
            environment: BTreeMap::new(),
            timeout: DEFAULT_RUN_TIMEOUT,
        }
    }

    /// Apply a validated raw config on top of the defaults
    pub fn resolve(
        project_root: &Path,
        config_file_path: Option<PathBuf>,
        raw: &RawConfig,
    ) -> Self {
        let mut resolved = Self::defaults(project_root);
        resolved.config_file_path = config_file_path;

        if let Some(features) = &raw.features {
            resolved.features = features.clone();
        }
        if let Some(steps) = &raw.steps {
            resolved.steps = steps.clone();
        }
        if let Some(driver) = &raw.driver {
            resolved.driver = DriverSettings {
                kind: driver.kind.unwrap_or_default(),
                browser: driver.browser.unwrap_or_default(),
                headless: driver.headless.unwrap_or(true),
            };
        }

        resolved.web_server = raw.web_server.as_ref().map(|server| WebServerSettings {
            command: server.command.clone(),
            port: server.port,
            base_url: server
                .base_url
                .clone()
                .unwrap_or_else(|| format!("http://localhost:{}", server.port)),
            reuse_existing_server: server.reuse_existing_server.unwrap_or(false),
            timeout: server
                .timeout
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_SERVER_TIMEOUT),
        });

        resolved.base_url = match (&raw.base_url, &resolved.web_server) {
            (Some(url), _) => url.clone(),
            (None, Some(server)) => server.base_url.clone(),
            (None, None) => DEFAULT_BASE_URL.to_string(),
        };

        if let Some(cucumber) = &raw.cucumber {
            resolved.cucumber = CucumberSettings {
                tag_expression: cucumber.tag_expression.clone().unwrap_or_default(),
                order: cucumber.order.unwrap_or_default(),
            };
        }
        if let Some(environment) = &raw.environment {
            resolved.environment = environment.clone();
        }
        if let Some(timeout) = raw.timeout {
            resolved.timeout = Duration::from_millis(timeout);
        }

        resolved
    }

    /// The slice of configuration a scenario world needs
    pub fn world_config(&self) -> WorldConfig {
        WorldConfig {
            base_url: Some(self.base_url.clone()),
            driver: self.driver.clone(),
            project_root: self.project_root.clone(),
            artifacts_dir: self.project_root.join(ARTIFACTS_DIR),
        }
    }
}

/// Per-scenario copy of the configuration a [`crate::world::WorldRuntime`] reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldConfig {
    /// Navigated to by `before_scenario` when set
    pub base_url: Option<String>,
    pub driver: DriverSettings,
    pub project_root: PathBuf,
    pub artifacts_dir: PathBuf,
}

impl WorldConfig {
    /// Config for a world without a base URL, backed by the given driver kind
    pub fn new(project_root: impl Into<PathBuf>, kind: DriverKind) -> Self {
        let project_root = project_root.into();
        Self {
            base_url: None,
            driver: DriverSettings {
                kind,
                ..DriverSettings::default()
            },
            artifacts_dir: project_root.join(ARTIFACTS_DIR),
            project_root,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}
