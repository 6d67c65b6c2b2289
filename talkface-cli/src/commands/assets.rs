//! `talkface assets`: bundle provisioning and presence.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use talkface_assets::BundleStatus;
use talkface_render::Orchestrator;

use super::{load_config, runtime};

#[derive(Subcommand, Debug)]
pub enum AssetsCommand {
    /// Download and unpack every missing bundle.
    Ensure,
    /// Show which bundles are present.
    Status(StatusArgs),
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct BundleRow {
    #[tabled(rename = "bundle")]
    name: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "provisioned")]
    provisioned: String,
    #[tabled(rename = "path")]
    path: String,
}

pub fn run(command: AssetsCommand, config_path: Option<&Path>) -> Result<()> {
    let (config, _) = load_config(config_path)?;
    let orchestrator = Orchestrator::from_config(&config);
    let rt = runtime()?;

    match command {
        AssetsCommand::Ensure => {
            talkface_server::init_tracing();
            let provisioner = orchestrator.provisioner();
            for bundle in orchestrator.bundles() {
                rt.block_on(provisioner.ensure_one(bundle))
                    .with_context(|| format!("failed to provision '{}'", bundle.name))?;
                println!(
                    "{} {} → {}",
                    "✓".green(),
                    bundle.name,
                    bundle.local_dir.display()
                );
            }
        }
        AssetsCommand::Status(args) => {
            let report = rt.block_on(orchestrator.provisioner().status(orchestrator.bundles()));
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("failed to encode status")?
                );
            } else {
                print_table(&report);
            }
        }
    }
    Ok(())
}

fn print_table(report: &[BundleStatus]) {
    let rows: Vec<BundleRow> = report.iter().map(row).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    let missing = report.iter().filter(|b| !b.present).count();
    if missing == 0 {
        println!("{}", "all bundles present".green());
    } else {
        println!(
            "{}",
            format!("{missing} bundle(s) missing; run `talkface assets ensure`").yellow()
        );
    }
}

fn row(status: &BundleStatus) -> BundleRow {
    let state = if status.in_flight {
        "downloading".cyan().to_string()
    } else if status.present {
        "present".green().to_string()
    } else {
        "missing".red().to_string()
    };
    let provisioned = match status.provisioned_at {
        Some(at) => format_age(Utc::now().signed_duration_since(at)),
        None => "-".to_string(),
    };
    BundleRow {
        name: status.name.to_string(),
        status: state,
        provisioned,
        path: status.local_dir.display().to_string(),
    }
}

fn format_age(age: chrono::Duration) -> String {
    let secs = age.num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}
