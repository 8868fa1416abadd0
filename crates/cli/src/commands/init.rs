//! `bdui init`

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use colored::Colorize;
use tracing::debug;

const CONFIG_TEMPLATE: &str = r#"# bdui configuration
baseURL = "http://localhost:3000"
features = ["features/**/*.feature"]
steps = ["bdui/steps/**/*.rs"]

[driver]
kind = "playwright"
browser = "chromium"
headless = true

[cucumber]
tagExpression = ""
order = "defined"

# [webServer]
# command = "npm run dev"
# port = 3000
# reuseExistingServer = true
"#;

const FEATURE_TEMPLATE: &str = r#"Feature: Example

  Scenario: Open the home page
    Given a fresh test world
    When I navigate to "/"
    Then the navigation history should end with "/"
"#;

#[derive(Args)]
pub struct InitArgs {
    /// Where to write the config file
    #[arg(short, long, default_value = "bdui.config.toml")]
    pub config: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Created,
    Skipped,
}

pub fn execute(args: InitArgs) -> anyhow::Result<()> {
    let cwd = std::env::current_dir().context("Failed to read the current directory")?;
    for (path, status) in scaffold(&cwd, &args.config)? {
        let label = match status {
            Status::Created => "created".green(),
            Status::Skipped => "skipped".yellow(),
        };
        println!("  {:>8} {}", label, path.display());
    }
    Ok(())
}

/// Write the starter files under the config file's directory. Existing files
/// are never overwritten.
pub fn scaffold(cwd: &Path, config: &Path) -> anyhow::Result<Vec<(PathBuf, Status)>> {
    let config = cwd.join(config);
    let root = config.parent().map(Path::to_path_buf).unwrap_or_else(|| cwd.to_path_buf());

    let files = [
        (config, CONFIG_TEMPLATE),
        (root.join("features/example.feature"), FEATURE_TEMPLATE),
        (root.join("bdui/steps/.gitkeep"), ""),
    ];

    let mut written = Vec::with_capacity(files.len());
    for (path, contents) in files {
        let status = write_new(&path, contents)?;
        written.push((path, status));
    }
    Ok(written)
}

fn write_new(path: &Path, contents: &str) -> anyhow::Result<Status> {
    if path.exists() {
        debug!("{} already exists", path.display());
        return Ok(Status::Skipped);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(Status::Created)
}
