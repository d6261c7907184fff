mod commands;
mod logging;
mod progress;

use std::io;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use nsp_audit_core::keys::KeySet;
use nsp_audit_core::{
    HttpFetcher, JsonSettingsStore, Pipeline, PipelineError, RecurseOverride, RunConfig,
    RunOverrides, Settings, SettingsStore,
};
use progress::CliReporter;
use tracing::{error, info};

fn main() -> ExitCode {
    dotenv().ok();

    let _guard = logging::init_logger();

    let args = Cli::parse();

    if args.mode.as_deref().is_some_and(|mode| !mode.is_empty()) {
        println!("note: the mode option ('-m') is deprecated, please use settings.json to control options.");
    }

    let store = JsonSettingsStore::new(&args.base_dir);
    let settings = match store.load() {
        Ok(settings) => settings,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            return ExitCode::from(1);
        }
    };

    match args.command.unwrap_or(Commands::Audit) {
        Commands::PrintConfig => {
            println!("Configuration ({}): {:#?}", store.path().display(), settings);
            ExitCode::SUCCESS
        }
        Commands::Audit => match run_audit(&args, store, settings) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!("Error: {:#}", err);
                let code = err
                    .downcast_ref::<PipelineError>()
                    .map_or(1, PipelineError::exit_code);
                ExitCode::from(code)
            }
        },
    }
}

fn run_audit(args: &Cli, store: JsonSettingsStore, settings: Settings) -> anyhow::Result<()> {
    let deep_scan = KeySet::discover(&args.base_dir).is_some_and(|keys| keys.has_header_key());
    let overrides = RunOverrides {
        folder: args.folder.clone(),
        recurse: RecurseOverride::from_flag(args.recursive),
    };

    let fetcher = HttpFetcher::new(Duration::from_secs(settings.fetch_timeout_secs))
        .context("failed to create HTTP client")?;
    let config = RunConfig::new(settings, overrides, args.base_dir.clone()).with_deep_scan(deep_scan);
    let pipeline = Pipeline::new(Box::new(fetcher), Box::new(store));
    let reporter = CliReporter::new();

    let report = {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        pipeline.run(&config, &reporter, &mut out)?
    };

    info!(
        "{} titles found in {} ({} unrecognized files)",
        format!("{}", report.local_titles).cyan(),
        report.scan_dir.display(),
        format!("{}", report.unrecognized_files).yellow(),
    );
    if let Some(deleted) = &report.deleted {
        info!("{} old update files deleted", format!("{}", deleted.deleted.len()).red());
    }
    if let Some(organized) = &report.organized {
        info!(
            "{} files organized, {} left in place",
            format!("{}", organized.moved.len()).green(),
            format!("{}", organized.skipped.len()).yellow(),
        );
    }
    if !report.warnings.is_empty() {
        info!("{} warnings", format!("{}", report.warnings.len()).yellow());
    }

    println!("Completed");
    Ok(())
}
