pub mod commands;
pub mod logging;
pub mod transport;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use fleetquote_core::config::{AppConfig, LoadOptions};

#[derive(Debug, Parser)]
#[command(
    name = "fleetquote",
    about = "Fleetquote quoting CLI",
    long_about = "Price fleet-tracking quotes, apply promotions, render client summaries, and \
                  submit quotes to the quote backend.",
    after_help = "Examples:\n  fleetquote price --draft quote.json\n  \
                  fleetquote apply-promotion --draft quote.json --promotion PROMO-FLEET\n  \
                  fleetquote submit --draft quote.json --dry-run"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Config file (defaults to ./fleetquote.toml)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Price a draft and print per-line amounts and totals")]
    Price {
        #[arg(long, help = "Quote draft JSON file")]
        draft: PathBuf,
    },
    #[command(about = "Render the client-facing plain-text summary of a draft")]
    Summary {
        #[arg(long, help = "Quote draft JSON file")]
        draft: PathBuf,
    },
    #[command(about = "Apply a catalog promotion to a draft and print the resulting draft")]
    ApplyPromotion {
        #[arg(long, help = "Quote draft JSON file")]
        draft: PathBuf,
        #[arg(long, help = "Promotion id from the catalog")]
        promotion: String,
    },
    #[command(about = "Run the pre-submission validation rules against a draft")]
    Validate {
        #[arg(long, help = "Quote draft JSON file")]
        draft: PathBuf,
    },
    #[command(about = "Validate and submit a draft to the quote backend")]
    Submit {
        #[arg(long, help = "Quote draft JSON file")]
        draft: PathBuf,
        #[arg(long, help = "Validate and print the payload without sending it")]
        dry_run: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    // Config errors are reported by the command itself; logging just stays off.
    if let Ok(config) = AppConfig::load(LoadOptions {
        config_path: config_path.map(Path::to_path_buf),
        require_file: config_path.is_some(),
        ..LoadOptions::default()
    }) {
        if let Err(error) = logging::init_logging(&config.logging) {
            eprintln!("logging disabled: {error:#}");
        }
    }

    let result = match &cli.command {
        Command::Price { draft } => commands::price::run(config_path, draft),
        Command::Summary { draft } => commands::summary::run(config_path, draft),
        Command::ApplyPromotion { draft, promotion } => {
            commands::apply_promotion::run(config_path, draft, promotion)
        }
        Command::Validate { draft } => commands::validate::run(config_path, draft),
        Command::Submit { draft, dry_run } => commands::submit::run(config_path, draft, *dry_run),
        Command::Config => commands::config::run(config_path),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
