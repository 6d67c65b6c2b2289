//! talkface: talking-face render service CLI.
//!
//! # Usage
//!
//! ```text
//! talkface serve [--bind ADDR]
//! talkface render (--text TEXT | --wav PATH) [--sr N] [--channels N] [--asr-model M] [--no-portrait] [-- EXTRA...]
//! talkface assets ensure
//! talkface assets status [--json]
//! talkface config init [--force]
//! talkface config show
//! ```
//!
//! Every subcommand accepts `--config PATH`; see [`commands::load_config`]
//! for the lookup order when it is absent.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    assets::AssetsCommand, config::ConfigCommand, render::RenderArgs, serve::ServeArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "talkface",
    version,
    about = "Render talking-face videos from text or speech",
    long_about = None,
)]
struct Cli {
    /// Path to talkface.yaml.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP front end in the foreground.
    Serve(ServeArgs),

    /// Render one job and print the artifact path.
    Render(RenderArgs),

    /// Download or inspect the asset bundles.
    Assets {
        #[command(subcommand)]
        command: AssetsCommand,
    },

    /// Write or print the configuration document.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve(args) => args.run(config_path),
        Commands::Render(args) => args.run(config_path),
        Commands::Assets { command } => commands::assets::run(command, config_path),
        Commands::Config { command } => commands::config::run(command, config_path),
    }
}
