//! pbimeta CLI - ingest Power BI model metadata
//!
//! Usage:
//!   pbimeta extract <path> [--name <name>]
//!   pbimeta deps <path>
//!   pbimeta tools
//!   pbimeta detect <path>
//!
//! Examples:
//!   pbimeta extract reports/Sales.pbix > sales.json
//!   pbimeta extract reports/Sales.pbip --name "Sales Model"
//!   pbimeta deps reports/Sales.SemanticModel
//!   RUST_LOG=pbimeta=debug pbimeta tools

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use pbimeta::config::Settings;
use pbimeta::definition::detect_input;
use pbimeta::ingest::{ingest, list_server_tools};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pbimeta")]
#[command(about = "pbimeta - Power BI semantic-model metadata ingestion")]
#[command(version)]
struct Cli {
    /// Settings file (overrides PBIMETA_CONFIG and the default search)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a model and print it as JSON
    Extract {
        /// .pbix file, .pbip project, model.bim, or semantic-model directory
        path: PathBuf,

        /// Display name for the model
        #[arg(short, long)]
        name: Option<String>,

        /// Include the measure dependency graph
        #[arg(long)]
        with_deps: bool,
    },

    /// Print the measure dependency graph and any circular references
    Deps {
        path: PathBuf,
    },

    /// List the tools advertised by the configured tool server
    Tools,

    /// Show how a path would be ingested
    Detect {
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = match load_settings(cli.config.as_ref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error starting runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async {
        match cli.command {
            Commands::Extract {
                path,
                name,
                with_deps,
            } => cmd_extract(path, name, with_deps, &settings).await,
            Commands::Deps { path } => cmd_deps(path, &settings).await,
            Commands::Tools => cmd_tools(&settings).await,
            Commands::Detect { path } => cmd_detect(path),
        }
    })
}

fn init_logging(verbose: bool) {
    let default = if verbose { "pbimeta=debug" } else { "pbimeta=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(path: Option<&PathBuf>) -> Result<Settings, pbimeta::config::SettingsError> {
    match path {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    }
}

async fn cmd_extract(
    path: PathBuf,
    name: Option<String>,
    with_deps: bool,
    settings: &Settings,
) -> ExitCode {
    let ingested = match ingest(&path, name.as_deref(), settings).await {
        Ok(ingested) => ingested,
        Err(e) => {
            eprintln!("Extraction failed ({:?}): {}", e.kind(), e);
            return ExitCode::FAILURE;
        }
    };

    if with_deps {
        #[derive(Serialize)]
        struct Output<'a> {
            model: &'a pbimeta::ModelMetadata,
            dependencies: &'a pbimeta::dependency::DependencyGraph,
        }
        print_json(&Output {
            model: &ingested.model,
            dependencies: &ingested.dependencies,
        })
    } else {
        print_json(&ingested.model)
    }
}

async fn cmd_deps(path: PathBuf, settings: &Settings) -> ExitCode {
    let ingested = match ingest(&path, None, settings).await {
        Ok(ingested) => ingested,
        Err(e) => {
            eprintln!("Extraction failed ({:?}): {}", e.kind(), e);
            return ExitCode::FAILURE;
        }
    };

    let graph = &ingested.dependencies;
    for (measure, targets) in graph.edges() {
        if targets.is_empty() {
            println!("{}", measure);
        } else {
            let targets: Vec<_> = targets.iter().map(String::as_str).collect();
            println!("{} -> {}", measure, targets.join(", "));
        }
    }

    if graph.has_cycles() {
        println!();
        println!("Circular references:");
        for cycle in graph.cycles() {
            let members: Vec<_> = cycle.iter().map(String::as_str).collect();
            println!("  - {}", members.join(" <-> "));
        }
    }
    ExitCode::SUCCESS
}

async fn cmd_tools(settings: &Settings) -> ExitCode {
    match list_server_tools(settings).await {
        Ok(tools) => {
            println!("Tools:");
            for tool in &tools {
                match &tool.description {
                    Some(description) => {
                        let summary = description.lines().next().unwrap_or_default();
                        println!("  - {}: {}", tool.name, summary);
                    }
                    None => println!("  - {}", tool.name),
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Tool server error ({:?}): {}", e.kind(), e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_detect(path: PathBuf) -> ExitCode {
    match detect_input(&path) {
        Ok(kind) => {
            println!("Input: {}", kind);
            println!("Format: {}", kind.format());
            println!("Model name: {}", kind.display_name());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            ExitCode::FAILURE
        }
    }
}
