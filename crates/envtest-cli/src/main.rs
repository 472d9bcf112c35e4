mod commands;
mod signal;

use clap::{Parser, Subcommand};
use commands::{EXIT_CONFIG_ERROR, EXIT_FAILURE};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "envtest",
    version,
    about = "Ephemeral Kubernetes control planes for controller tests"
)]
struct Cli {
    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start an environment, print its kubeconfig, and destroy it on Ctrl-C.
    Up {
        /// Path to an envtest TOML config (defaults to ./envtest.toml if present).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Additional CRD file or directory to install.
        #[arg(long = "crd-path")]
        crd_paths: Vec<PathBuf>,
        /// Control-plane backend.
        #[arg(long, default_value = "mock")]
        backend: String,
        /// Write the kubeconfig to this file instead of stdout.
        #[arg(long)]
        kubeconfig_out: Option<PathBuf>,
        /// Destroy the environment right after it is ready.
        #[arg(long, default_value_t = false)]
        no_wait: bool,
    },
    /// Decode every CRD a config refers to and list them.
    Check {
        /// Path to an envtest TOML config (defaults to ./envtest.toml if present).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Additional CRD file or directory to check.
        #[arg(long = "crd-path")]
        crd_paths: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("ENVTEST_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let json_output = cli.json;
    let result = match cli.command {
        Commands::Up {
            config,
            crd_paths,
            backend,
            kubeconfig_out,
            no_wait,
        } => commands::up::run(
            config.as_deref(),
            &crd_paths,
            &backend,
            kubeconfig_out.as_deref(),
            no_wait,
            json_output,
        ),
        Commands::Check { config, crd_paths } => {
            commands::check::run(config.as_deref(), &crd_paths, json_output)
        }
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("failed to parse config")
                || msg.starts_with("failed to read config")
            {
                EXIT_CONFIG_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
