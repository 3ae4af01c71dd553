//! Adapter commands - path parsing and ecosystem helpers, no storage involved

use console::style;
use depot_core::{cargo_index_path, create_adapter, pypi_normalize, supported_tags};

use crate::error::Result;

/// Parse a wire path into a descriptor
pub fn parse(ecosystem: &str, path: &str, json: bool) -> Result<()> {
    let adapter = create_adapter(ecosystem)?;
    let descriptor = adapter.parse_path(path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&descriptor)?);
        return Ok(());
    }

    println!("{}: {}", style("Name").bold(), descriptor.name);
    println!("{}: {}", style("Version").bold(), descriptor.version);
    println!("{}: {}", style("Ecosystem").bold(), descriptor.ecosystem);
    if let Some(group) = descriptor.group() {
        println!("{}: {}", style("Group").bold(), group);
    }
    println!(
        "{}: {}",
        style("Canonical path").bold(),
        adapter.generate_path(&descriptor)
    );

    if !descriptor.metadata.is_empty() {
        println!();
        println!("{}:", style("Metadata").bold());
        for (key, value) in &descriptor.metadata {
            println!("  {}: {}", key, value);
        }
    }
    Ok(())
}

/// Print the sharded Cargo index path of a crate
pub fn index_path(name: &str) {
    println!("{}", cargo_index_path(name));
}

/// Print the PEP 503 normalized form of a PyPI project name
pub fn normalize(name: &str) {
    println!("{}", pypi_normalize(name));
}

/// List the supported ecosystem tags
pub fn ecosystems() {
    for tag in supported_tags() {
        println!("{}", tag);
    }
}
