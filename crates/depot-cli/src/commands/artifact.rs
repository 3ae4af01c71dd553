//! Artifact commands - push, pull, delete, list and yank

use console::style;
use std::io::Write;
use std::path::Path;

use crate::engine::Engine;
use crate::error::{CliError, Result};

/// Push a file to a repository at a wire path
pub async fn push(engine: &Engine, repository: &str, path: &str, file: &Path) -> Result<()> {
    if !file.exists() {
        return Err(CliError::input(format!("File not found: {}", file.display())));
    }
    let content = std::fs::read(file)?;

    let repo = engine.repository(repository)?;
    let descriptor = repo.push(&engine.ctx, path, &content, None).await?;

    println!(
        "{} {} {} to {}",
        style("Pushed").green().bold(),
        descriptor.name,
        descriptor.version,
        descriptor.repository
    );
    println!("  {}: {}", style("Path").bold(), descriptor.path);
    println!("  {}: {} bytes", style("Size").bold(), descriptor.size);
    println!("  {}: sha256:{}", style("Digest").bold(), descriptor.checksum_or_empty());
    Ok(())
}

/// Pull an artifact to a file, or to stdout when no file is given
pub async fn pull(
    engine: &Engine,
    repository: &str,
    path: &str,
    output: Option<&Path>,
) -> Result<()> {
    let repo = engine.repository(repository)?;
    let content = repo.pull(&engine.ctx, path).await?;

    match output {
        Some(file) => {
            if let Some(parent) = file.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(file, &content)?;
            eprintln!(
                "{} {} ({} bytes)",
                style("Saved").green().bold(),
                file.display(),
                content.len()
            );
        }
        None => std::io::stdout().write_all(&content)?,
    }
    Ok(())
}

pub async fn delete(engine: &Engine, repository: &str, path: &str) -> Result<()> {
    let repo = engine.repository(repository)?;
    repo.delete(&engine.ctx, path).await?;
    println!("{} {} from {}", style("Deleted").green().bold(), path, repository);
    Ok(())
}

/// List stored paths under a prefix
pub async fn list(engine: &Engine, repository: &str, prefix: &str) -> Result<()> {
    let repo = engine.repository(repository)?;
    let paths = repo.list(&engine.ctx, prefix).await?;

    if paths.is_empty() {
        eprintln!("No artifacts found.");
        return Ok(());
    }
    for path in paths {
        println!("{}", path);
    }
    Ok(())
}

/// Toggle the yanked marker of an artifact
pub async fn yank(engine: &Engine, repository: &str, path: &str, undo: bool) -> Result<()> {
    let repo = engine.repository(repository)?;
    let descriptor = repo.set_yanked(&engine.ctx, path, !undo).await?;

    let verb = if descriptor.yanked { "Yanked" } else { "Restored" };
    println!(
        "{} {} {}",
        style(verb).yellow().bold(),
        descriptor.name,
        descriptor.version
    );
    Ok(())
}
