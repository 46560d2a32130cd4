mod commands;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use etlflow::config::load_pipeline;
use etlflow::registry::ComponentRegistry;

#[derive(Parser)]
#[command(
    name = "etlflow",
    version,
    about = "Run a configuration-driven ETL pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error); overrides the pipeline's settings
    #[arg(long, global = true, env = "ETLFLOW_LOG_LEVEL")]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline, or list the registered components
    Run {
        /// Path to the pipeline YAML file
        #[arg(short, long, required_unless_present = "list_modules")]
        config: Option<PathBuf>,
        /// Ignore the stored cursor and extract everything; the new cursor is
        /// still saved after a successful load
        #[arg(short, long)]
        full_refresh: bool,
        /// List all registered extractors, transformers and loaders, then exit
        #[arg(short, long)]
        list_modules: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let registry = Arc::new(ComponentRegistry::with_builtins()?);

    match cli.command {
        Commands::Run {
            config,
            full_refresh,
            list_modules,
        } => {
            if list_modules {
                logging::init(logging::resolve_level(cli.log_level.as_deref(), None));
                commands::list::execute(&registry);
                return Ok(());
            }
            let Some(path) = config else {
                anyhow::bail!("the following argument is required: -c/--config");
            };

            let file = load_pipeline(&path)
                .with_context(|| format!("Failed to load pipeline: {}", path.display()))?;
            logging::init(logging::resolve_level(
                cli.log_level.as_deref(),
                Some(file.settings.log_level.as_str()),
            ));
            commands::run::execute(registry, &path, &file, full_refresh).await
        }
    }
}
