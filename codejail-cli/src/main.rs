mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "codejail")]
#[command(about = "Run untrusted Python and print the trust-reduced state it leaves behind")]
#[command(version = "0.3.0")]
pub struct Cli {
    /// Config file (defaults to ~/.config/codejail/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a Python file and print the reduced state as JSON
    Run {
        /// File holding the code to execute
        file: PathBuf,

        /// Initial globals, as a JSON object
        #[arg(short, long)]
        globals: Option<String>,

        /// File or directory to copy next to the code (repeatable)
        #[arg(long = "file")]
        files: Vec<PathBuf>,

        /// Directory or zip file to add to the module search path (repeatable)
        #[arg(long = "python-path")]
        python_path: Vec<PathBuf>,

        /// Create NAME next to the code with the contents of PATH (repeatable)
        #[arg(long = "inline", value_name = "NAME=PATH")]
        inline: Vec<String>,

        /// Label used in log messages
        #[arg(short, long)]
        slug: Option<String>,

        /// Run in-process without isolation
        #[arg(long, default_value_t = false)]
        force_debug: bool,
    },
    /// Print only the JSON-safe part of a JSON object
    Filter {
        /// The namespace, as a JSON object
        json: String,
    },
    /// Report which execution strategy would be used
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            file,
            globals,
            files,
            python_path,
            inline,
            slug,
            force_debug,
        } => {
            let mut config = commands::load_config(cli.config.as_deref())?;
            config.always_be_unsafe |= force_debug;
            let args = commands::RunArgs {
                file,
                globals,
                files,
                python_path,
                inline,
                slug,
            };
            match commands::execute_run(&config, args).await? {
                Ok(state) => {
                    println!("{}", serde_json::to_string_pretty(&state)?);
                    Ok(())
                }
                Err(e) => {
                    eprintln!("✗ {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Filter { json } => {
            let safe = commands::execute_filter(&json)?;
            println!("{}", serde_json::to_string_pretty(&safe)?);
            Ok(())
        }
        Commands::Check => {
            let config = commands::load_config(cli.config.as_deref())?;
            let decision = commands::execute_check(&config);
            println!("strategy: {}", decision.kind);
            println!("reason:   {}", decision.reason);
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "codejail=debug" } else { "codejail=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
