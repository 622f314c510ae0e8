mod commands;
mod logging;
mod progress;
mod prompt;
mod server;

use std::fs;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, InventoryArgs, MirrorArgs, ServeArgs};
use dir_mimic_core::config::load_configuration;
use dir_mimic_core::inventory::{default_inventory_filename, read_inventory, write_inventory};
use dir_mimic_core::scanner::scan;
use dir_mimic_core::{
    plan, retain_extras, unchanged_count, AppConfig, CatalogService, HashMode, Operation,
    PlanReview, PlanSummary, ScanOptions, SealedPlan, SubmitOutcome,
};
use dotenv::dotenv;
use progress::CliReporter;
use prompt::TerminalConfirm;
use tracing::{error, info, warn};

fn main() {
    dotenv().ok();

    let guard = logging::init_logger();

    let config = match load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            drop(guard);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    let result = match args.command {
        Some(Commands::Serve(args)) => run_serve(&config, args),
        Some(Commands::Inventory(args)) => run_inventory(&config, args),
        Some(Commands::Mirror(args)) => run_mirror(&config, args),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:?}", config);
            Ok(())
        }
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("Error: {:#}", err);
        drop(guard);
        process::exit(1);
    }
}

fn scan_options(config: &AppConfig, hash_override: Option<HashMode>) -> ScanOptions {
    let mut options = ScanOptions::from(config);
    if let Some(mode) = hash_override {
        options.hash_mode = mode;
    }
    options
}

fn run_serve(config: &AppConfig, args: ServeArgs) -> anyhow::Result<()> {
    let options = scan_options(config, args.hash_mode);
    let port = args.port.unwrap_or(config.port);
    let localhost_only = args.localhost || config.localhost_only;

    let service = CatalogService::open(&args.target, options, Box::new(CliReporter::new()))
        .with_context(|| format!("Cannot serve {}", args.target.display()))?;
    let stats = service.catalog().stats().clone();
    info!(
        "{} files in {} folders, {} bytes",
        format!("{}", stats.file_count).green(),
        format!("{}", stats.folder_count).green(),
        format!("{}", stats.total_size).green(),
    );

    let ip = if localhost_only {
        Ipv4Addr::LOCALHOST
    } else {
        Ipv4Addr::UNSPECIFIED
    };
    let addr = SocketAddr::from((ip, port));
    let state = Arc::new(server::AppState::new(
        Arc::new(service),
        Arc::new(TerminalConfirm::new()),
    ));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    runtime.block_on(server::run(state, addr))
}

fn run_inventory(config: &AppConfig, args: InventoryArgs) -> anyhow::Result<()> {
    let options = scan_options(config, args.hash_mode);
    let source = fs::canonicalize(&args.source)
        .with_context(|| format!("Cannot read {}", args.source.display()))?;

    let catalog = scan(&source, &options, &CliReporter::new())?;
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(default_inventory_filename()));
    write_inventory(&catalog, &output)
        .with_context(|| format!("Cannot write {}", output.display()))?;

    let stats = catalog.stats();
    info!(
        "{} files in {} folders ({} hash) written to {}",
        format!("{}", stats.file_count).green(),
        format!("{}", stats.folder_count).green(),
        catalog.hash_mode(),
        output.display().to_string().cyan(),
    );
    Ok(())
}

fn run_mirror(config: &AppConfig, args: MirrorArgs) -> anyhow::Result<()> {
    let source = read_inventory(&args.inventory)
        .with_context(|| format!("Cannot load inventory {}", args.inventory.display()))?;

    // The target must be identified the same way the inventory was.
    let options = ScanOptions::new(source.hash_mode())
        .with_ignore_patterns(config.ignore_patterns.clone());
    let service = CatalogService::open(&args.target, options, Box::new(CliReporter::new()))
        .with_context(|| format!("Cannot scan {}", args.target.display()))?;

    let target = service.catalog();
    let ops = plan(&source, &target);
    let summary = PlanSummary::of(&ops);
    let unchanged = unchanged_count(&source, &target);

    let (executable, missing): (Vec<Operation>, Vec<Operation>) = ops
        .into_iter()
        .partition(|op| !matches!(op, Operation::Missing { .. }));

    for op in &missing {
        if let Operation::Missing { from, size } = op {
            warn!("{} {} ({} bytes)", "MISSING:".magenta(), from, size);
        }
    }

    let (executable, held_back) = if args.delete_extra {
        (executable, Vec::new())
    } else {
        retain_extras(executable)
    };
    for op in &held_back {
        match op.to_path() {
            Some(to) => info!(
                "{} {} -> {} (destination holds a kept extra)",
                "HELD:".yellow(),
                op.from_path(),
                to
            ),
            None => info!("{} {} kept", "EXTRA:".yellow(), op.from_path()),
        }
    }

    if args.verbose {
        info!("Unchanged: {}", unchanged);
        info!("Moved:     {}", summary.moves);
        info!("Copied:    {}", summary.copies);
        info!("Missing:   {}", summary.missing);
        info!(
            "Extra:     {}{}",
            summary.deletes,
            if args.delete_extra { "" } else { " (kept)" }
        );
        if !held_back.is_empty() {
            info!("Held back: {}", held_back.len());
        }
    }

    if executable.is_empty() {
        info!("Nothing to move, copy, or delete in {}", args.target.display());
        return Ok(());
    }

    if !args.doit {
        let sealed = SealedPlan::from_operations(&executable)?;
        prompt::print_plan(&mut io::stdout().lock(), &PlanReview::new(&sealed))?;
        info!("Dry run. Pass --doit to execute this plan.");
        return Ok(());
    }

    let payload = serde_json::to_vec(&executable)?;
    let outcome = service.submit(payload, None, &TerminalConfirm::new())?;
    finish_submission(outcome)
}

/// Any failed operation turns into an error so the process exits non-zero.
fn finish_submission(outcome: SubmitOutcome) -> anyhow::Result<()> {
    match outcome {
        SubmitOutcome::Aborted => info!("No changes made."),
        SubmitOutcome::Completed { errors } if errors.is_empty() => {
            info!("{}", "Plan applied.".green());
        }
        SubmitOutcome::Completed { errors } => {
            for message in &errors {
                error!("{}", message);
            }
            anyhow::bail!("{} operations failed", errors.len());
        }
    }
    Ok(())
}
