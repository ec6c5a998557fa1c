use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::archiver::config::{load_config, load_effective_config};
use crate::commands::{self, CommandReport};
use crate::logging;

#[derive(Parser, Debug)]
#[command(
    name = "convo-archiver",
    version,
    about = "Archive aging helpdesk conversations to a spreadsheet, then delete the originals"
)]
struct Cli {
    /// Emit the command report as JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one archive pass: fetch, archive, verify, delete, stamp.
    Run {
        /// Plan the sheet changes without writing or deleting anything.
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the effective configuration with secrets redacted.
    Config,
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!(
        "{}: {}",
        report.command,
        if report.ok { "ok" } else { "failed" }
    );
    for detail in &report.details {
        println!("  {detail}");
    }
    for issue in &report.issues {
        println!("  ! {issue}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let report = match cli.command {
        Command::Run { dry_run } => {
            let cfg = load_config()?;
            logging::init(cfg.debug);
            commands::run::run(&cfg, &commands::run::RunCommandOptions { dry_run })?
        }
        Command::Config => {
            let cfg = load_effective_config()?;
            logging::init(cfg.debug);
            commands::config::run(&cfg)?
        }
    };

    print_report(&report, cli.json)?;
    if !report.ok {
        std::process::exit(2);
    }
    Ok(())
}
