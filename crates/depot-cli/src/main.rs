//! Depot CLI - operate a universal artifact repository from the terminal

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod engine;
mod error;
mod exit_codes;

use engine::{Engine, Paths};
use error::Result;

#[derive(Parser)]
#[command(name = "depot")]
#[command(author = "Depot Contributors")]
#[command(version)]
#[command(about = "Universal artifact repository - local, proxy and virtual repositories for 13 ecosystems", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: user config directory)
    #[arg(long, global = true, env = "DEPOT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a wire path into an artifact descriptor
    Parse {
        /// Ecosystem tag (maven, npm, cargo, ...)
        ecosystem: String,

        /// Repository-relative path
        path: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the sharded Cargo index path of a crate
    IndexPath {
        /// Crate name
        name: String,
    },

    /// Print the normalized form of a PyPI project name
    Normalize {
        /// Project name
        name: String,
    },

    /// List supported ecosystem tags
    Ecosystems,

    /// Manage repositories
    #[command(subcommand)]
    Repo(RepoCommands),

    /// Push a file to a repository
    Push {
        /// Repository name
        repository: String,

        /// Wire path to store the file at
        path: String,

        /// File to upload
        file: PathBuf,
    },

    /// Pull an artifact
    Pull {
        /// Repository name
        repository: String,

        /// Wire path of the artifact
        path: String,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete an artifact
    Delete {
        /// Repository name
        repository: String,

        /// Wire path of the artifact
        path: String,
    },

    /// List stored paths
    List {
        /// Repository name
        repository: String,

        /// Only paths starting with this prefix
        #[arg(default_value = "")]
        prefix: String,
    },

    /// Hide an artifact from protocol indices without removing it
    Yank {
        /// Repository name
        repository: String,

        /// Wire path of the artifact
        path: String,

        /// Make the artifact visible again
        #[arg(long)]
        undo: bool,
    },

    /// Print the protocol index document of a repository
    Index {
        /// Repository name
        repository: String,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Re-derive metadata records from stored content
    Rebuild {
        /// Repository name
        repository: String,
    },

    /// Drop the cached copy of a path
    Invalidate {
        /// Repository name
        repository: String,

        /// Wire path of the artifact
        path: String,
    },

    /// Show repository statistics
    Stats {
        /// Repository name
        repository: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RepoCommands {
    /// Add a repository
    Add {
        /// Repository name
        name: String,

        /// Repository kind (local, remote, virtual)
        #[arg(long, default_value = "local")]
        kind: String,

        /// Ecosystem tag (maven, npm, cargo, ...)
        #[arg(long)]
        ecosystem: String,

        /// Upstream URL of a remote repository
        #[arg(long)]
        url: Option<String>,

        /// Member of a virtual repository, in precedence order (repeatable)
        #[arg(long = "upstream")]
        upstreams: Vec<String>,

        /// Cache TTL of a remote repository (e.g. 30m, 12h)
        #[arg(long)]
        ttl: Option<String>,

        /// Free-form description
        #[arg(long)]
        description: Option<String>,

        /// Username for a remote upstream
        #[arg(long)]
        username: Option<String>,

        /// Password for a remote upstream
        #[arg(long)]
        password: Option<String>,

        /// Bearer token for a remote upstream
        #[arg(long)]
        token: Option<String>,
    },

    /// Remove a repository
    Remove {
        /// Repository name
        name: String,

        /// Also delete the artifacts of a non-empty local repository
        #[arg(long)]
        force: bool,
    },

    /// List repositories
    List {
        /// Show whether remote repositories have credentials
        #[arg(long)]
        auth: bool,
    },
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn open_engine(paths: &Paths) -> Result<Engine> {
    let config = paths.load_config()?;
    let credentials = paths.load_credentials()?;
    Engine::open(&config, &credentials).await
}

async fn run(cli: Cli) -> Result<()> {
    // Offline commands never touch the config directory
    let config = cli.config;
    let paths = move || Paths::resolve(config.as_deref());

    match cli.command {
        Commands::Parse {
            ecosystem,
            path,
            json,
        } => commands::adapter::parse(&ecosystem, &path, json),

        Commands::IndexPath { name } => {
            commands::adapter::index_path(&name);
            Ok(())
        }

        Commands::Normalize { name } => {
            commands::adapter::normalize(&name);
            Ok(())
        }

        Commands::Ecosystems => {
            commands::adapter::ecosystems();
            Ok(())
        }

        Commands::Repo(RepoCommands::Add {
            name,
            kind,
            ecosystem,
            url,
            upstreams,
            ttl,
            description,
            username,
            password,
            token,
        }) => {
            let options = commands::repo::AddOptions {
                url: url.as_deref(),
                upstreams: &upstreams,
                ttl: ttl.as_deref(),
                description: description.as_deref(),
                username: username.as_deref(),
                password: password.as_deref(),
                token: token.as_deref(),
            };
            commands::repo::add(&paths()?, &name, &kind, &ecosystem, options).await
        }

        Commands::Repo(RepoCommands::Remove { name, force }) => {
            commands::repo::remove(&paths()?, &name, force).await
        }

        Commands::Repo(RepoCommands::List { auth }) => commands::repo::list(&paths()?, auth).await,

        Commands::Push {
            repository,
            path,
            file,
        } => {
            let engine = open_engine(&paths()?).await?;
            commands::artifact::push(&engine, &repository, &path, &file).await
        }

        Commands::Pull {
            repository,
            path,
            output,
        } => {
            let engine = open_engine(&paths()?).await?;
            commands::artifact::pull(&engine, &repository, &path, output.as_deref()).await
        }

        Commands::Delete { repository, path } => {
            let engine = open_engine(&paths()?).await?;
            commands::artifact::delete(&engine, &repository, &path).await
        }

        Commands::List { repository, prefix } => {
            let engine = open_engine(&paths()?).await?;
            commands::artifact::list(&engine, &repository, &prefix).await
        }

        Commands::Yank {
            repository,
            path,
            undo,
        } => {
            let engine = open_engine(&paths()?).await?;
            commands::artifact::yank(&engine, &repository, &path, undo).await
        }

        Commands::Index { repository, output } => {
            let engine = open_engine(&paths()?).await?;
            commands::index::index(&engine, &repository, output.as_deref()).await
        }

        Commands::Rebuild { repository } => {
            let engine = open_engine(&paths()?).await?;
            commands::index::rebuild(&engine, &repository).await
        }

        Commands::Invalidate { repository, path } => {
            let engine = open_engine(&paths()?).await?;
            commands::index::invalidate(&engine, &repository, &path).await
        }

        Commands::Stats { repository, json } => {
            let engine = open_engine(&paths()?).await?;
            commands::index::stats(&engine, &repository, json).await
        }
    }
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_logging(cli.debug);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_repo_add_flags() {
        let cli = Cli::try_parse_from([
            "depot", "repo", "add", "public", "--kind", "virtual", "--ecosystem", "npm",
            "--upstream", "libs", "--upstream", "npmjs",
        ])
        .unwrap();
        match cli.command {
            Commands::Repo(RepoCommands::Add {
                kind, upstreams, ..
            }) => {
                assert_eq!(kind, "virtual");
                assert_eq!(upstreams, vec!["libs", "npmjs"]);
            }
            _ => panic!("expected repo add"),
        }
    }

    #[test]
    fn test_io_error_exit_code() {
        let err: error::CliError = std::io::Error::other("disk full").into();
        assert_eq!(err.exit_code(), exit_codes::IO_ERROR);
    }
}
