//! `talkface serve`: HTTP front end in the foreground.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use talkface_server::start_blocking;

use super::load_config;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Listen address; overrides `server.bind`.
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,
}

impl ServeArgs {
    pub fn run(self, config_path: Option<&Path>) -> Result<()> {
        let (config, _) = load_config(config_path)?;
        start_blocking(&config, self.bind.as_deref()).context("server exited with error")
    }
}
