//! mudobj - resolve and instantiate file-defined object definitions

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use mudobj::objects::{DefinitionRegistry, FileSource, ObjectSpace};
use mudobj::permissions::Principal;
use mudobj::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// HemiMUD object model tool
#[derive(Parser, Debug)]
#[command(name = "mudobj", version, about = "Check and spawn HemiMUD object definitions")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding definition sources (overrides `source_root`)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve definitions and print their flattened tables
    Check {
        /// Definition paths (default: every source under the root)
        ids: Vec<String>,
    },
    /// Create an instance as the system and print its fields
    Spawn {
        /// Definition path
        id: String,
    },
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mudobj=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    let Some(root) = args.root.clone().or_else(|| config.source_root.clone()) else {
        bail!("No source root: pass --root or set source_root");
    };
    if !root.is_dir() {
        bail!("Source root not found: {}", root.display());
    }

    let source = FileSource::new(root);
    let registry = DefinitionRegistry::new(&config)
        .with_loader(source.clone())
        .shared();

    match args.command {
        Command::Check { ids } => {
            let ids = if ids.is_empty() {
                source
                    .discover()?
                    .into_iter()
                    .map(|id| id.to_string())
                    .collect()
            } else {
                ids
            };

            let mut failed = 0;
            for id in &ids {
                match registry.get_path(id) {
                    Ok(table) => {
                        println!("{}", serde_json::to_string_pretty(&table.summary())?);
                    }
                    Err(e) => {
                        eprintln!("{}: {}", id, e);
                        failed += 1;
                    }
                }
            }
            if failed > 0 {
                bail!("{} of {} definitions failed to resolve", failed, ids.len());
            }
        }
        Command::Spawn { id } => {
            let mut space = ObjectSpace::new(registry, &config)?;
            let instance = space.instantiate_path(&id, Principal::System)?;
            let fields = space
                .get(instance)
                .map(|obj| obj.describe().fields)
                .unwrap_or_default();
            println!("{}", serde_json::to_string_pretty(&fields)?);
        }
    }

    Ok(())
}
