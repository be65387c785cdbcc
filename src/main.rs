use std::sync::Arc;

use clap::Parser;
use heliopause::*;
use heliopause::acl::types::{Operation, Request};
use miette::Result;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "heliopause",
    version,
    about = "Access control engine for secret storage"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Parser, Debug)]
enum Command {
    /// Evaluate a single request against the loaded policies and exit
    Check {
        /// Request path, e.g. secret/prod/db
        path: String,

        /// One of create, read, update, delete, list, help
        #[arg(short, long, default_value = "read")]
        operation: Operation,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    // compile the policy directory into an immutable ACL
    let acl = acl::loader::load_acl(&settings.policies.dir)?;

    match cli.command {
        Some(Command::Check { path, operation }) => {
            let request = Request {
                path,
                operation,
                data: serde_json::Map::new(),
            };
            let decision = acl::engine::authorize(&acl, &request);
            println!(
                "allowed: {}, root privileged: {}",
                decision.allowed, decision.root_privileged
            );
        }
        None => {
            acl::web::serve(&settings, Arc::new(acl)).await?;
        }
    }

    Ok(())
}
