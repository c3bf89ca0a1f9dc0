use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use modelsight::config::load_config;
use modelsight::extract::extract;
use modelsight::index::ProjectIndex;
use modelsight::server::run_stdio_server;
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "modelsight")]
#[command(version)]
#[command(about = "Index dva model modules and answer editor queries about them")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the JSON-RPC stdio server
    Serve,

    /// Extract one file and print the result as JSON
    Inspect {
        #[arg(value_name = "FILE_PATH")]
        file: PathBuf,
    },

    /// Index one project and print its report and models as JSON
    Scan {
        /// Project root (defaults to the current directory)
        #[arg(value_name = "ROOT")]
        root: Option<PathBuf>,

        /// Models directory relative to ROOT; overrides .modelsight.json
        #[arg(long, value_name = "DIR")]
        models_dir: Option<String>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("MODELSIGHT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("Failed to get current dir")?;

    match cli.cmd {
        Command::Serve => run_stdio_server().await,
        Command::Inspect { file } => {
            let abs = if file.is_absolute() { file } else { cwd.join(file) };
            let out = extract(&abs, None).await?;
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(())
        }
        Command::Scan { root, models_dir } => {
            let root = match root {
                Some(r) if r.is_absolute() => r,
                Some(r) => cwd.join(r),
                None => cwd,
            };
            let mut cfg = load_config(&root);
            if let Some(dir) = models_dir {
                cfg.models_dir = dir;
            }
            let mut index = ProjectIndex::new(root, cfg.index_config());
            if !index.load().await {
                bail!("no models directory at {}", index.models_dir().display());
            }
            let models: Vec<_> = index.models().collect();
            let out = json!({
                "root": index.root(),
                "report": index.report(),
                "models": models,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(())
        }
    }
}
