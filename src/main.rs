//! WorkflowLite CLI Entry Point
//!
//! Runs one workflow from a definitions file and prints its output.
//!
//! # Usage
//!
//! ```bash
//! # Run a workflow with a string input
//! workflowlite workflows.yaml greeting "hello"
//!
//! # Pass JSON input
//! workflowlite workflows.yaml route '{"kind": "loud"}' --json
//!
//! # Debug logging
//! workflowlite workflows.yaml greeting hello --verbose
//! ```

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use log::{error, info};
use serde_json::Value;

use workflowlite::execution::{ActionRegistry, DefaultExecutionContext, Execution, WorkflowManager};
use workflowlite::{APP_NAME, VERSION};

/// Command-line configuration parsed from arguments.
#[derive(Debug, Default)]
struct Config {
    definitions_path: String,
    workflow_name: String,
    input: Option<String>,
    json_input: bool,
    verbose: bool,
}

impl Config {
    /// Builds the run input from the raw argument.
    fn input_value(&self) -> Result<Value, String> {
        match (&self.input, self.json_input) {
            (None, _) => Ok(Value::Null),
            (Some(raw), true) => serde_json::from_str(raw).map_err(|e| format!("Invalid JSON input: {}", e)),
            (Some(raw), false) => Ok(Value::String(raw.clone())),
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME.bold(), VERSION);
    println!("Lightweight Workflow Execution Engine");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: workflowlite [OPTIONS] <DEFINITIONS_FILE> <WORKFLOW_NAME> [INPUT]");
    println!();
    println!("Arguments:");
    println!("  <DEFINITIONS_FILE>  Path to the workflow definitions YAML file");
    println!("  <WORKFLOW_NAME>     Name of the workflow to run");
    println!("  [INPUT]             Input value (a string unless --json is given)");
    println!();
    println!("Options:");
    println!("  --json              Parse INPUT as JSON");
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  workflowlite workflows.yaml greeting hello");
    println!("  workflowlite workflows.yaml route '{{\"kind\": \"loud\"}}' --json");
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut positional_index = 0;

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--json" => config.json_input = true,
            "--verbose" | "-v" => config.verbose = true,
            arg if arg.starts_with("--") => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                match positional_index {
                    0 => config.definitions_path = arg.clone(),
                    1 => config.workflow_name = arg.clone(),
                    2 => config.input = Some(arg.clone()),
                    _ => return Err(format!("Unexpected argument: {}", arg)),
                }
                positional_index += 1;
            }
        }
    }

    if positional_index < 2 {
        return Err("A definitions file and a workflow name are required".to_string());
    }

    Ok(config)
}

/// Main application logic.
async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("{} {}", "Error:".red().bold(), e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(config.verbose);
    print_banner();

    let input = config.input_value()?;

    info!("Loading definitions: {}", config.definitions_path);
    let manager = WorkflowManager::from_file(&config.definitions_path, ActionRegistry::with_builtins())
        .map_err(|e| {
            error!("Failed to load definitions: {}", e);
            format!("Could not load definitions from '{}': {}", config.definitions_path, e)
        })?;
    info!("Available workflows: {}", manager.workflow_names().join(", "));

    let context = Arc::new(DefaultExecutionContext::new(config.workflow_name.as_str()));
    let execution = manager.run(&config.workflow_name, context, input)?;

    let output = match execution {
        Execution::Completed(value) => value,
        pending @ Execution::Pending(_) => {
            info!("Workflow '{}' went asynchronous, waiting for it", config.workflow_name);
            pending.resolve().await?
        }
    };

    println!();
    println!("{} {}", "Output:".green().bold(), serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
