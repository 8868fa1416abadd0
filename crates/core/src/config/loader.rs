//! Config file discovery and loading

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info};

use super::types::{RawConfig, ResolvedConfig};
use super::validate::validate;
use crate::error::ConfigError;

/// Probed in order inside the project root; first match wins
pub const CONFIG_FILE_NAMES: [&str; 4] = [
    "bdui.config.toml",
    "bdui.config.yaml",
    "bdui.config.yml",
    "bdui.config.json",
];

/// Files that mark a project root
const PROJECT_MANIFESTS: [&str; 2] = ["Cargo.toml", "package.json"];

/// Where to look for configuration
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Directory to resolve from (defaults to the process working directory)
    pub cwd: Option<PathBuf>,

    /// Explicit config file, resolved relative to `cwd`
    pub config_path: Option<PathBuf>,
}

impl LoadOptions {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
            config_path: None,
        }
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }
}

/// Result of [`load`]
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub project_root: PathBuf,
    pub config_file_path: Option<PathBuf>,
    /// The validated file contents, `None` when running on defaults
    pub raw: Option<RawConfig>,
    pub resolved: ResolvedConfig,
}

/// Discover, validate and resolve configuration
pub fn load(options: &LoadOptions) -> Result<LoadedConfig, ConfigError> {
    let cwd = resolve_cwd(options.cwd.as_deref())?;
    let mut project_root = find_project_root(&cwd);
    debug!("Project root: {}", project_root.display());

    let config_file = match &options.config_path {
        Some(path) => {
            let path = if path.is_absolute() {
                path.clone()
            } else {
                cwd.join(path)
            };
            if !path.is_file() {
                return Err(ConfigError::FileLoad {
                    path,
                    reason: "config file does not exist".to_string(),
                    source: None,
                });
            }
            Some(path)
        }
        None => discover(&project_root),
    };

    let Some(path) = config_file else {
        info!("No bdui.config.* found in {}, using defaults", project_root.display());
        return Ok(LoadedConfig {
            resolved: ResolvedConfig::defaults(&project_root),
            project_root,
            config_file_path: None,
            raw: None,
        });
    };

    info!("Loading config from {}", path.display());
    let document = select_export(read_document(&path)?);

    let issues = validate(&document);
    if !issues.is_empty() {
        return Err(ConfigError::Validation {
            file: Some(path),
            issues,
        });
    }

    let raw: RawConfig = serde_json::from_value(document)
        .map_err(|e| ConfigError::file_load(&path, "config does not match the expected shape", e))?;

    if let Some(root) = &raw.project_root {
        let config_dir = path.parent().unwrap_or(&cwd);
        project_root = config_dir.join(root);
        debug!("Project root overridden by config: {}", project_root.display());
    }

    let resolved = ResolvedConfig::resolve(&project_root, Some(path.clone()), &raw);

    Ok(LoadedConfig {
        project_root,
        config_file_path: Some(path),
        raw: Some(raw),
        resolved,
    })
}

fn resolve_cwd(cwd: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let current = || {
        std::env::current_dir().map_err(|source| ConfigError::ProjectRoot {
            cwd: PathBuf::from("."),
            source,
        })
    };
    match cwd {
        Some(path) if path.is_absolute() => Ok(path.to_path_buf()),
        Some(path) => Ok(current()?.join(path)),
        None => current(),
    }
}

/// Walk up from `start` to the nearest directory holding a package manifest.
/// Falls back to `start` itself.
pub fn find_project_root(start: &Path) -> PathBuf {
    start
        .ancestors()
        .find(|dir| PROJECT_MANIFESTS.iter().any(|m| dir.join(m).is_file()))
        .unwrap_or(start)
        .to_path_buf()
}

fn discover(project_root: &Path) -> Option<PathBuf> {
    CONFIG_FILE_NAMES
        .iter()
        .map(|name| project_root.join(name))
        .find(|path| path.is_file())
}

/// Parse a config file into a format-neutral document tree
fn read_document(path: &Path) -> Result<Value, ConfigError> {
    let text = fs::read_to_string(path)
        .map_err(|e| ConfigError::file_load(path, "cannot read file", e))?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    match extension.as_str() {
        "toml" => toml::from_str::<Value>(&text)
            .map_err(|e| ConfigError::file_load(path, "invalid TOML", e)),
        "yaml" | "yml" => serde_yaml::from_str::<Value>(&text)
            .map_err(|e| ConfigError::file_load(path, "invalid YAML", e)),
        "json" => serde_json::from_str::<Value>(&text)
            .map_err(|e| ConfigError::file_load(path, "invalid JSON", e)),
        other => Err(ConfigError::FileLoad {
            path: path.to_path_buf(),
            reason: format!("unsupported config format {:?} (use toml, yaml or json)", other),
            source: None,
        }),
    }
}

/// Pick the exported config out of a document: a `default` table, else a
/// `config` table, else the whole document.
fn select_export(document: Value) -> Value {
    match document {
        Value::Object(mut map) => {
            for key in ["default", "config"] {
                if map.get(key).map(Value::is_object).unwrap_or(false) {
                    if let Some(export) = map.remove(key) {
                        return export;
                    }
                }
            }
            Value::Object(map)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Browser, DriverKind};
    use tempfile::TempDir;
    use test_case::test_case;

    fn project() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();
        dir
    }

    #[test]
    fn test_no_config_file_yields_defaults() {
        let dir = project();
        let loaded = load(&LoadOptions::new(dir.path())).unwrap();
        assert!(loaded.config_file_path.is_none());
        assert!(loaded.raw.is_none());
        assert_eq!(loaded.resolved, ResolvedConfig::defaults(dir.path()));
        assert_eq!(loaded.resolved.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_project_root_found_from_nested_directory() {
        let dir = project();
        let nested = dir.path().join("features/checkout");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("bdui.config.toml"), "baseURL = \"http://localhost:4000\"\n").unwrap();

        let loaded = load(&LoadOptions::new(&nested)).unwrap();
        assert_eq!(loaded.project_root, dir.path());
        assert_eq!(loaded.resolved.base_url, "http://localhost:4000");
    }

    #[test_case(&["bdui.config.toml", "bdui.config.json"], "bdui.config.toml" ; "toml beats json")]
    #[test_case(&["bdui.config.yaml", "bdui.config.yml"], "bdui.config.yaml" ; "yaml beats yml")]
    #[test_case(&["bdui.config.yml", "bdui.config.json"], "bdui.config.yml" ; "yml beats json")]
    #[test_case(&["bdui.config.json"], "bdui.config.json" ; "json alone")]
    fn test_discovery_priority(present: &[&str], expected: &str) {
        let dir = project();
        for name in present {
            let body = if name.ends_with(".toml") {
                "features = [\"a.feature\"]\n"
            } else {
                "{\"features\": [\"a.feature\"]}"
            };
            fs::write(dir.path().join(name), body).unwrap();
        }
        let loaded = load(&LoadOptions::new(dir.path())).unwrap();
        assert_eq!(loaded.config_file_path, Some(dir.path().join(expected)));
    }

    #[test]
    fn test_browser_override_keeps_headless_default() {
        let dir = project();
        fs::write(
            dir.path().join("bdui.config.yaml"),
            "driver:\n  browser: firefox\n",
        )
        .unwrap();
        let loaded = load(&LoadOptions::new(dir.path())).unwrap();
        assert_eq!(loaded.resolved.driver.browser, Browser::Firefox);
        assert_eq!(loaded.resolved.driver.kind, DriverKind::Playwright);
        assert!(loaded.resolved.driver.headless);
    }

    #[test]
    fn test_default_export_is_preferred() {
        let dir = project();
        fs::write(
            dir.path().join("bdui.config.json"),
            r#"{"default": {"baseURL": "http://127.0.0.1:1234"}, "config": {"baseURL": "http://ignored"}}"#,
        )
        .unwrap();
        let loaded = load(&LoadOptions::new(dir.path())).unwrap();
        assert_eq!(loaded.resolved.base_url, "http://127.0.0.1:1234");
    }

    #[test]
    fn test_named_config_export() {
        let dir = project();
        fs::write(
            dir.path().join("bdui.config.toml"),
            "[config]\nbaseURL = \"http://127.0.0.1:5678\"\n",
        )
        .unwrap();
        let loaded = load(&LoadOptions::new(dir.path())).unwrap();
        assert_eq!(loaded.resolved.base_url, "http://127.0.0.1:5678");
    }

    #[test]
    fn test_missing_override_is_a_load_error() {
        let dir = project();
        let err = load(&LoadOptions::new(dir.path()).with_config_path("missing.toml")).unwrap_err();
        match err {
            ConfigError::FileLoad { path, .. } => assert_eq!(path, dir.path().join("missing.toml")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_override_relative_to_cwd() {
        let dir = project();
        fs::create_dir_all(dir.path().join("ci")).unwrap();
        fs::write(
            dir.path().join("ci/bdui.ci.json"),
            r#"{"driver": {"kind": "mock"}}"#,
        )
        .unwrap();
        let loaded = load(&LoadOptions::new(dir.path()).with_config_path("ci/bdui.ci.json")).unwrap();
        assert_eq!(loaded.resolved.driver.kind, DriverKind::Mock);
    }

    #[test]
    fn test_validation_errors_are_aggregated_with_file_path() {
        let dir = project();
        fs::write(
            dir.path().join("bdui.config.toml"),
            "baseURL = \"nope\"\nfeatures = []\n[webServer]\ncommand = \"npm start\"\nport = 0\n",
        )
        .unwrap();
        let err = load(&LoadOptions::new(dir.path())).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("bdui.config.toml"));
        assert_eq!(err.issues().len(), 3);
    }

    #[test]
    fn test_syntax_error_wraps_file_path() {
        let dir = project();
        fs::write(dir.path().join("bdui.config.toml"), "baseURL = ").unwrap();
        let err = load(&LoadOptions::new(dir.path())).unwrap_err();
        assert!(matches!(err, ConfigError::FileLoad { .. }));
        assert!(err.to_string().contains("invalid TOML"));
    }

    #[test]
    fn test_project_root_key_is_relative_to_config_file() {
        let dir = project();
        fs::create_dir_all(dir.path().join("app")).unwrap();
        fs::write(dir.path().join("bdui.config.toml"), "projectRoot = \"app\"\n").unwrap();
        let loaded = load(&LoadOptions::new(dir.path())).unwrap();
        assert_eq!(loaded.project_root, dir.path().join("app"));
        assert_eq!(loaded.resolved.project_root, dir.path().join("app"));
    }
}
