use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use together_core::config::{self, PROJECT_DIR, ProjectConfig};
use together_core::db::SqliteStore;

use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Rewrite the config even if `.together/` already exists.
    #[arg(long)]
    pub force: bool,
}

const GITIGNORE: &str = "*.db\n*.db-wal\n*.db-shm\n";

#[derive(Debug, Serialize)]
struct InitReport {
    ok: bool,
    config: String,
    database: String,
}

/// Execute `tg init`. Creates the project skeleton:
///
/// ```text
/// .together/
///   config.toml   (default project config)
///   .gitignore    (database files)
///   together.db   (migrated to the latest schema)
/// ```
///
/// # Errors
///
/// Returns an error if `.together/` already exists and `--force` is not set,
/// or if any filesystem or database operation fails.
pub fn run_init(args: &InitArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    let dir = project_root.join(PROJECT_DIR);

    if dir.exists() && !args.force {
        anyhow::bail!("{PROJECT_DIR}/ already exists. Use `tg init --force` to reinitialize.");
    }

    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let project = ProjectConfig::default();
    let config_path = dir.join("config.toml");
    let config_toml = toml::to_string_pretty(&project).context("Failed to encode config")?;
    std::fs::write(&config_path, config_toml)
        .with_context(|| format!("Failed to write config: {}", config_path.display()))?;

    let gitignore_path = dir.join(".gitignore");
    std::fs::write(&gitignore_path, GITIGNORE)
        .with_context(|| format!("Failed to write .gitignore: {}", gitignore_path.display()))?;

    let db_path = config::database_path(project_root, &project);
    SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to create database {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "initialized project");

    let report = InitReport {
        ok: true,
        config: config_path.display().to_string(),
        database: db_path.display().to_string(),
    };
    render(output, &report, |report, w| {
        writeln!(w, "✓ Initialized {PROJECT_DIR}/")?;
        writeln!(w)?;
        writeln!(w, "  Config:   {}", report.config)?;
        writeln!(w, "  Database: {}", report.database)?;
        writeln!(w)?;
        writeln!(w, "Next steps:")?;
        writeln!(w, "  tg user add --email you@example.com --name You")?;
        writeln!(w, "  export TOGETHER_USER=you@example.com")?;
        writeln!(w, "  tg invite   # share the code with your partner")
    })
}
