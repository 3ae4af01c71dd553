//! Index commands - protocol index, rebuild, cache invalidation and statistics

use console::style;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use depot_repo::{OperationStats, RepositoryStatistics};

use crate::engine::Engine;
use crate::error::Result;

/// Write the protocol index document of a repository
pub async fn index(engine: &Engine, repository: &str, output: Option<&Path>) -> Result<()> {
    let repo = engine.repository(repository)?;
    let document = repo.get_index(&engine.ctx).await?;

    match output {
        Some(file) => {
            std::fs::write(file, &document)?;
            eprintln!(
                "{} {} index ({}) to {}",
                style("Wrote").green().bold(),
                repo.ecosystem(),
                repo.index_content_type(),
                file.display()
            );
        }
        None => std::io::stdout().write_all(&document)?,
    }
    Ok(())
}

/// Re-derive metadata records from stored content
pub async fn rebuild(engine: &Engine, repository: &str) -> Result<()> {
    let repo = engine.repository(repository)?;
    let report = repo.rebuild_index(&engine.ctx).await?;

    println!(
        "{} {}: {} scanned, {} indexed, {} skipped",
        style("Rebuilt").green().bold(),
        repository,
        report.scanned,
        report.indexed,
        report.skipped
    );
    if report.skipped > 0 {
        println!(
            "{}",
            style("Some paths could not be indexed; run with --debug for details").yellow()
        );
    }
    Ok(())
}

/// Drop the cached copy of a path
pub async fn invalidate(engine: &Engine, repository: &str, path: &str) -> Result<()> {
    let repo = engine.repository(repository)?;
    repo.invalidate_cache(&engine.ctx, path).await?;
    println!("{} {} in {}", style("Invalidated").green().bold(), path, repository);
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsOutput<'a> {
    repository: &'a str,
    #[serde(flatten)]
    statistics: RepositoryStatistics,
    operations: BTreeMap<&'static str, OperationStats>,
}

/// Show artifact counts and counters
pub async fn stats(engine: &Engine, repository: &str, json: bool) -> Result<()> {
    let repo = engine.repository(repository)?;
    let statistics = repo.get_statistics(&engine.ctx).await?;

    if json {
        let output = StatsOutput {
            repository,
            statistics,
            operations: engine.registry.metrics(repository)?.snapshot(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}", style(repository).cyan().bold());
    println!("{}", style("=".repeat(repository.len())).dim());
    println!("{}: {}", style("Kind").bold(), repo.kind());
    println!("{}: {}", style("Ecosystem").bold(), repo.ecosystem());
    println!("{}: {}", style("Artifacts").bold(), statistics.total_artifacts);
    println!("{}: {} bytes", style("Total size").bold(), statistics.total_size);
    println!("{}: {}", style("Pulls").bold(), statistics.pull_count);
    println!("{}: {}", style("Pushes").bold(), statistics.push_count);
    Ok(())
}
