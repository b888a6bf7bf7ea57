//! Pipeline Orchestrator - command line entry point
//!
//! Inspects configuration and checks workflow submissions without running
//! any stage.

use clap::{Parser, Subcommand};
use pipeline_orchestrator::observability::init_default_logging;
use pipeline_orchestrator::routing::{PipelineOrder, TaskOptions};
use pipeline_orchestrator::workflow::parse_submission;
use pipeline_orchestrator::{OrchestratorConfig, OrchestratorError, OrchestratorResult};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info};

/// Analysis pipeline orchestrator
#[derive(Parser)]
#[command(name = "pipeline-orchestrator")]
#[command(about = "Coordinates pluggable analysis pipeline stages")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "PIPELINE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate configuration
    Config {
        /// Print the effective configuration as TOML
        #[arg(long)]
        show: bool,
    },
    /// Check a workflow submission (JSON array of tasks) without executing it
    Validate {
        #[arg(value_name = "WORKFLOW")]
        workflow: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_default_logging();

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Config { show } => handle_config_command(&config, show),
        Commands::Validate { workflow } => handle_validate_command(&config, &workflow),
    };

    if let Err(e) = result {
        if e.is_preflight() {
            error!(error = %e, error_type = e.error_type(), "Workflow rejected");
        } else {
            error!(error = %e, "Command failed");
        }
        process::exit(1);
    }
}

fn load_configuration(path: Option<&Path>) -> OrchestratorResult<OrchestratorConfig> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration");
            Ok(OrchestratorConfig::load_from_file(path)?)
        }
        None => {
            info!("No configuration file given, using defaults");
            Ok(OrchestratorConfig::default())
        }
    }
}

fn handle_config_command(config: &OrchestratorConfig, show: bool) -> OrchestratorResult<()> {
    let order = config.pipeline_order()?;
    info!(stages = order.len(), "Configuration is valid");

    if show {
        let rendered = toml::to_string_pretty(config)
            .map_err(|e| OrchestratorError::internal(format!("cannot render configuration: {e}")))?;
        println!("{rendered}");
        println!("# effective pipeline order: {}", order.stages().join(" -> "));
    }
    Ok(())
}

fn handle_validate_command(config: &OrchestratorConfig, workflow: &Path) -> OrchestratorResult<()> {
    let content = std::fs::read_to_string(workflow).map_err(|e| {
        OrchestratorError::configuration(format!("cannot read {}: {e}", workflow.display()))
    })?;
    let tasks = parse_submission(&content)?;
    if tasks.is_empty() {
        return Err(OrchestratorError::validation(
            "workflow must contain at least one task",
        ));
    }

    let order: PipelineOrder = config.pipeline_order()?;
    order.validate_sequence(tasks.iter().map(|t| t.task_type.as_str()))?;
    for task in &tasks {
        TaskOptions::parse(&task.task_type, &task.parameters)?;
    }

    info!(tasks = tasks.len(), "Workflow is valid");
    println!("OK: {} task(s) in pipeline order", tasks.len());
    Ok(())
}
