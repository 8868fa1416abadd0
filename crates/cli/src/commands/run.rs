//! `bdui run`

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use bdui::engine::discover;
use bdui::{load, LoadOptions, ResolvedConfig, Runner};
use clap::Args;
use colored::Colorize;
use tracing::{debug, error};

/// Cleanup time allowed after the hard timeout before the process is killed
const TIMEOUT_GRACE: Duration = Duration::from_secs(5);

#[derive(Args)]
pub struct RunArgs {
    /// Config file; discovered from the project root when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

pub async fn execute(args: RunArgs) -> anyhow::Result<()> {
    let cwd = std::env::current_dir().context("Failed to read the current directory")?;
    let mut options = LoadOptions::new(&cwd);
    if let Some(path) = args.config {
        options = options.with_config_path(path);
    }

    let loaded = load(&options)?;
    debug!("Resolved config: {:?}", loaded.resolved);
    check_step_files(&loaded.resolved)?;

    let outcome = Runner::new(loaded.resolved).run().await?;

    if outcome.timed_out {
        arm_watchdog();
        bail!("Run exceeded its timeout");
    }
    if outcome.interrupted {
        error!("Run interrupted");
        std::process::exit(1);
    }
    if !outcome.success {
        println!("{} Some scenarios failed", "✗".red());
        std::process::exit(1);
    }

    println!(
        "{} All scenarios passed ({:.1}s)",
        "✓".green(),
        outcome.duration.as_secs_f64()
    );
    Ok(())
}

/// Fail when the `steps` globs match files this binary cannot load
fn check_step_files(config: &ResolvedConfig) -> anyhow::Result<()> {
    let found = discover(&config.project_root, &config.steps)?;
    if found.is_empty() {
        return Ok(());
    }
    let files: Vec<String> = found
        .files
        .iter()
        .map(|path| path.display().to_string())
        .collect();
    bail!(
        "Step definitions found but not linked into `bdui run`: {}\n\
         Run them from a test binary with `Runner::with_user_bundle`, \
         or point `steps` away from them to use only the builtin steps",
        files.join(", ")
    )
}

/// Force the process down if shutdown hangs after a timed out run
fn arm_watchdog() {
    std::thread::spawn(|| {
        std::thread::sleep(TIMEOUT_GRACE);
        eprintln!("Cleanup did not finish within {:?}; exiting", TIMEOUT_GRACE);
        std::process::exit(1);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"app\"\n").unwrap();
        dir
    }

    #[test]
    fn test_builtin_only_project_passes_step_check() {
        let dir = project();
        fs::create_dir_all(dir.path().join("bdui/steps")).unwrap();
        fs::write(dir.path().join("bdui/steps/.gitkeep"), "").unwrap();

        let resolved = load(&LoadOptions::new(dir.path())).unwrap().resolved;
        check_step_files(&resolved).unwrap();
    }

    #[test]
    fn test_unlinked_step_files_are_refused() {
        let dir = project();
        fs::create_dir_all(dir.path().join("bdui/steps")).unwrap();
        fs::write(dir.path().join("bdui/steps/cart.rs"), "// cart steps\n").unwrap();

        let resolved = load(&LoadOptions::new(dir.path())).unwrap().resolved;
        let err = check_step_files(&resolved).unwrap_err().to_string();
        assert!(err.contains("cart.rs"));
        assert!(err.contains("with_user_bundle"));
    }

    #[test]
    fn test_steps_glob_elsewhere_skips_check() {
        let dir = project();
        fs::create_dir_all(dir.path().join("bdui/steps")).unwrap();
        fs::write(dir.path().join("bdui/steps/cart.rs"), "// cart steps\n").unwrap();
        fs::write(dir.path().join("bdui.config.toml"), "steps = [\"e2e/steps/*.rs\"]\n").unwrap();

        let resolved = load(&LoadOptions::new(dir.path())).unwrap().resolved;
        check_step_files(&resolved).unwrap();
    }
}
