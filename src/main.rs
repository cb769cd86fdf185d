use anyhow::{Context as _, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use gator::commands::{self, Command, Context};
use gator::config::{default_config_dir, Config};
use gator::storage::{Database, DatabaseError};

#[derive(Parser, Debug)]
#[command(name = "gator", version, about = "Command-line RSS aggregator")]
struct Args {
    /// Config file to use instead of ~/.config/gator/config.toml
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Create the config directory user-only if it does not exist yet.
fn ensure_private_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create config directory {}", dir.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)) {
            tracing::warn!(
                path = %dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gator=info")),
        )
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => {
            let dir = default_config_dir()?;
            ensure_private_dir(&dir)?;
            dir.join("config.toml")
        }
    };
    let config_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let db_path = config.database_path(&config_dir);
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_private_dir(parent)?;
    }
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;

    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: The gator database is locked by another process. Please try again.");
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let mut ctx = Context {
        db,
        config,
        config_path,
    };

    let mut stdout = std::io::stdout();
    commands::run(&mut ctx, args.command, &mut stdout).await?;
    Ok(())
}
