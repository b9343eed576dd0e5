//! Network ACL command line tool.
//!
//! Validates ACL definitions offline and prints their fingerprints.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use netacl::acl::validate::validate_name;
use netacl::{AclContext, AclInfo, AclStore, EngineConfig, MemoryStore, NoopSdnClient};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// Network ACL tool
#[derive(Parser, Debug)]
#[command(name = "netacl")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Engine configuration file (YAML)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate an ACL definition and print it normalised
    Validate {
        /// ACL definition (YAML or JSON)
        file: PathBuf,

        /// Project the ACL belongs to
        #[arg(short = 'p', long, default_value = "default")]
        project: String,

        /// Name of another ACL in the project, usable as a rule subject
        #[arg(short = 'k', long = "known-acl")]
        known_acls: Vec<String>,
    },

    /// Print the fingerprint of an ACL definition
    Etag {
        /// ACL definition (YAML or JSON)
        file: PathBuf,
    },
}

fn load_definition(path: &Path) -> anyhow::Result<AclInfo> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    // YAML is a superset of JSON, so one parser covers both.
    serde_yaml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

async fn validate(
    config: EngineConfig,
    path: &Path,
    project: &str,
    known_acls: &[String],
) -> anyhow::Result<()> {
    let mut info = load_definition(path)?;
    validate_name(&info.name)?;

    let store = Arc::new(MemoryStore::new());
    for name in known_acls {
        store
            .create_acl(project, &AclInfo::new(name.as_str(), Default::default()))
            .await
            .with_context(|| format!("Failed to register known ACL {:?}", name))?;
    }
    debug!(count = known_acls.len(), "Registered known ACLs");

    let ctx = AclContext::new(store, Arc::new(NoopSdnClient)).with_config(config);
    ctx.validate_config(project, &mut info.put).await?;

    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

fn etag(path: &Path) -> anyhow::Result<()> {
    let mut info = load_definition(path)?;
    info.put.normalise();
    println!("{}", netacl::acl::etag(&info)?);
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => EngineConfig::load_or_default(path)?,
        None => EngineConfig::default(),
    };

    match args.command {
        Command::Validate {
            file,
            project,
            known_acls,
        } => validate(config, &file, &project, &known_acls).await,
        Command::Etag { file } => etag(&file),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
