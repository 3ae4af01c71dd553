//! Repository management commands

use console::style;
use depot_core::Ecosystem;
use depot_repo::{Credentials, RepositoryKind, RepositorySpec};
use std::time::Duration;

use crate::engine::{Engine, Paths};
use crate::error::{CliError, Result};

/// Flags of `depot repo add`
#[derive(Debug, Default)]
pub struct AddOptions<'a> {
    pub url: Option<&'a str>,
    pub upstreams: &'a [String],
    pub ttl: Option<&'a str>,
    pub description: Option<&'a str>,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub token: Option<&'a str>,
}

/// Add a repository to the configuration and create it
pub async fn add(
    paths: &Paths,
    name: &str,
    kind: &str,
    ecosystem: &str,
    options: AddOptions<'_>,
) -> Result<()> {
    let mut config = paths.load_config()?;
    if config.get(name).is_some() {
        return Err(CliError::input_with_help(
            format!("Repository '{}' already exists", name),
            format!("Remove it first with 'depot repo remove {}'", name),
        ));
    }

    let kind: RepositoryKind = kind.parse()?;
    let ecosystem: Ecosystem = ecosystem.parse()?;
    let mut spec = match kind {
        RepositoryKind::Local => RepositorySpec::local(name, ecosystem),
        RepositoryKind::Remote => {
            let url = options
                .url
                .ok_or_else(|| CliError::input("A remote repository needs --url"))?;
            RepositorySpec::remote(name, ecosystem, url)
        }
        RepositoryKind::Virtual => {
            RepositorySpec::virtual_(name, ecosystem, options.upstreams.iter().cloned())
        }
    };
    if let Some(ttl) = options.ttl {
        spec = spec.with_cache_ttl(parse_ttl(ttl)?);
    }
    if let Some(description) = options.description {
        spec = spec.with_description(description);
    }

    let mut credentials = paths.load_credentials()?;
    let supplied = match (options.token, options.username, options.password) {
        (Some(token), _, _) => Some(Credentials::bearer(token)),
        (None, Some(user), Some(pass)) => Some(Credentials::basic(user, pass)),
        (None, None, None) => None,
        _ => {
            return Err(CliError::input(
                "Please provide both username and password, or a token",
            ));
        }
    };
    if supplied.is_some() && kind != RepositoryKind::Remote {
        return Err(CliError::input("Credentials only apply to remote repositories"));
    }

    config.add(spec)?;
    if let Some(creds) = supplied {
        credentials.set(name, creds);
    }

    // Creating the engine bootstraps the new spec
    Engine::open(&config, &credentials).await?;

    config.save_to(&paths.config)?;
    if credentials.has(name) {
        credentials.save_to(&paths.credentials)?;
        println!("Credentials stored securely");
    }

    println!(
        "{} {} repository \"{}\" ({})",
        style("Added").green().bold(),
        kind,
        name,
        ecosystem
    );
    Ok(())
}

/// Remove a repository from the engine and the configuration
pub async fn remove(paths: &Paths, name: &str, force: bool) -> Result<()> {
    let mut config = paths.load_config()?;
    let mut credentials = paths.load_credentials()?;

    // Configured virtuals are recreated on every start and need their members
    if let Some(referrer) = config
        .repositories
        .iter()
        .find(|spec| spec.upstreams.iter().any(|u| u == name))
    {
        return Err(CliError::input_with_help(
            format!(
                "Repository '{}' is a member of virtual repository '{}'",
                name, referrer.name
            ),
            format!("Remove '{}' first", referrer.name),
        ));
    }

    let engine = Engine::open(&config, &credentials).await?;
    engine.registry.delete(&engine.ctx, name, force).await?;

    if config.get(name).is_some() {
        config.remove(name)?;
        config.save_to(&paths.config)?;
    }
    if credentials.remove(name).is_some() {
        credentials.save_to(&paths.credentials)?;
    }

    println!("{} repository \"{}\"", style("Removed").green().bold(), name);
    Ok(())
}

/// List live repositories
pub async fn list(paths: &Paths, show_auth: bool) -> Result<()> {
    let config = paths.load_config()?;
    let credentials = paths.load_credentials()?;
    let engine = Engine::open(&config, &credentials).await?;

    let specs = engine.registry.specs();
    if specs.is_empty() {
        println!("No repositories configured.");
        println!();
        println!("Add one with: depot repo add <name> --kind local --ecosystem <tag>");
        return Ok(());
    }

    println!("{:<20} {:<8} {:<10} {}", "NAME", "KIND", "ECOSYSTEM", "SOURCE");
    println!("{}", "-".repeat(80));

    for spec in &specs {
        let source = match spec.kind {
            RepositoryKind::Local => String::new(),
            RepositoryKind::Remote => spec.url.clone().unwrap_or_default(),
            RepositoryKind::Virtual => spec.upstreams.join(", "),
        };
        let auth_info = match (show_auth, spec.kind) {
            (true, RepositoryKind::Remote) if credentials.has(&spec.name) => " (authenticated)",
            (true, RepositoryKind::Remote) => " (public)",
            _ => "",
        };
        println!(
            "{:<20} {:<8} {:<10} {}{}",
            spec.name, spec.kind, spec.ecosystem, source, auth_info
        );
    }
    Ok(())
}

fn parse_ttl(raw: &str) -> Result<Duration> {
    humantime_serde::re::humantime::parse_duration(raw).map_err(|e| {
        CliError::input_with_help(
            format!("Invalid TTL '{}': {}", raw, e),
            "Use a duration such as 30m, 12h or 7d",
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ttl() {
        assert_eq!(parse_ttl("12h").unwrap(), Duration::from_secs(12 * 3600));
        assert_eq!(parse_ttl("30m").unwrap(), Duration::from_secs(1800));
        assert!(matches!(parse_ttl("soon"), Err(CliError::Input { .. })));
    }
}
