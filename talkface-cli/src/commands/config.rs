//! `talkface config`: write a starter document or print the effective one.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use talkface_core::config::{save_at, DEFAULT_CONFIG_FILE};
use talkface_core::Config;

use super::{explicit_path, load_config, ConfigSource};

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Write a default talkface.yaml rooted at the current directory.
    Init(InitArgs),
    /// Print the effective configuration as YAML.
    Show,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}

pub fn run(command: ConfigCommand, config_path: Option<&Path>) -> Result<()> {
    match command {
        ConfigCommand::Init(args) => init(args, config_path),
        ConfigCommand::Show => show(config_path),
    }
}

fn init(args: InitArgs, config_path: Option<&Path>) -> Result<()> {
    let cwd = std::env::current_dir().context("could not determine current directory")?;
    let path: PathBuf = explicit_path(config_path).unwrap_or_else(|| cwd.join(DEFAULT_CONFIG_FILE));
    if path.exists() && !args.force {
        bail!(
            "'{}' already exists; pass --force to overwrite",
            path.display()
        );
    }

    let config = Config::for_project_root(cwd);
    save_at(&path, &config).with_context(|| format!("failed to write '{}'", path.display()))?;
    println!("✓ Wrote {}", path.display());
    Ok(())
}

fn show(config_path: Option<&Path>) -> Result<()> {
    let (config, source) = load_config(config_path)?;
    match source {
        ConfigSource::File(path) => eprintln!("# from {}", path.display()),
        ConfigSource::Defaults => eprintln!("# no config file found; showing defaults"),
    }
    let yaml = serde_yaml::to_string(&config).context("failed to encode config")?;
    print!("{yaml}");
    Ok(())
}
