mod commands;
mod logging;
mod progress;

use std::io::{self, Write};
use std::process;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use keepsake_core::executor::{self, DryRunExecutioner, Executioner};
use keepsake_core::hasher::{HashCache, MemoryCache, RocksDbCache};
use keepsake_core::{AppConfig, PlanEngine, PlanReport};
use progress::CliReporter;
use std::path::PathBuf;
use tracing::{error, info, warn};

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match keepsake_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    match args.command {
        Some(Commands::Plan {
            roots,
            target,
            export,
            no_cache,
            receipts,
        }) => {
            let mut config = config;
            if !roots.is_empty() {
                config.source_roots = roots;
            }
            if let Some(target) = target {
                config.target_root = target;
            }
            if let Err(err) = run_plan(config, export, no_cache, receipts) {
                error!("Error: {:#}", err);
                process::exit(1);
            }
        }
        Some(Commands::CountHashCache) => {
            info!("Counting hash cache entries...");
            let cache = open_cache(&config)?;
            println!("Hash cache entries: {}", cache.len()?);
        }
        Some(Commands::ClearHashCache) => {
            match prompt_confirm("Are you SURE you want to clear the hash cache?", Some(false)) {
                Ok(true) => {
                    let cache = open_cache(&config)?;
                    cache.clear()?;
                    println!("Hash cache cleared");
                }
                _ => {
                    process::exit(0);
                }
            }
        }
        Some(Commands::PrintConfig) => {
            let rendered =
                toml::to_string_pretty(&config).context("could not render configuration")?;
            println!("{}", rendered);
        }
        None => {
            let _ = Cli::command().print_long_help();
        }
    }

    Ok(())
}

fn open_cache(config: &AppConfig) -> anyhow::Result<RocksDbCache> {
    let location = config.hash_cache_location();
    RocksDbCache::open(&location)
        .with_context(|| format!("could not open hash cache at {}", location.display()))
}

fn run_plan(
    config: AppConfig,
    export: Option<PathBuf>,
    no_cache: bool,
    receipts: bool,
) -> anyhow::Result<()> {
    let mut engine = PlanEngine::new(config);
    if no_cache {
        engine = engine.with_cache(Box::new(MemoryCache::new()));
    }

    let reporter = CliReporter::new();
    let report = engine.run(&reporter)?;
    print_summary(&report);

    if let Some(path) = export {
        let written = executor::write_plan_csv(&path, &report.plan_set.plans)?;
        info!("{} plan records written to {}", written, path.display());
    }

    let summary = DryRunExecutioner.execute(&report.plan_set.plans)?;
    if receipts {
        for (folder, entries) in &summary.receipts {
            println!("{}", folder.display().to_string().bold());
            print!("{}", executor::render_receipt(entries));
        }
    }

    Ok(())
}

fn print_summary(report: &PlanReport) {
    println!();
    info!(
        "Crawl: {}, Hash: {}, Analyze: {}, Plan: {}",
        format!("{:.2}s", report.crawl_duration.as_secs_f64()).green(),
        format!("{:.2}s", report.hash_duration.as_secs_f64()).green(),
        format!("{:.2}s", report.analyze_duration.as_secs_f64()).green(),
        format!("{:.2}s", report.plan_duration.as_secs_f64()).green(),
    );
    info!(
        "{} files, {} duplicate groups, {} superseded files, {} bytes reclaimable",
        format!("{}", report.files_scanned).cyan(),
        format!("{}", report.duplicate_groups()).red(),
        format!("{}", report.superseded_files()).red(),
        format!("{}", report.reclaimable_bytes()).red(),
    );
    let stats = &report.funnel_stats;
    info!(
        "Funnel: {} unique by size, {} unique by partial hash, {} cache hits, {} full hashes",
        stats.unique_by_size, stats.unique_by_partial, stats.cache_hits, stats.full_hashes,
    );
    info!(
        "{} moves planned, {} already in place, {} date-uncertain",
        format!("{}", report.plan_set.plans.len() - report.plan_set.noop_count()).green(),
        format!("{}", report.plan_set.noop_count()).green(),
        format!("{}", report.date_uncertain_files()).yellow(),
    );

    for conflict in &report.plan_set.conflicts {
        warn!("Blocked: {}", conflict);
    }
    if report.warning_count() > 0 {
        warn!(
            "{} paths skipped ({} during crawl, {} during hashing)",
            report.warning_count(),
            report.crawl_warnings.len(),
            report.funnel_warnings.len()
        );
        for skipped in &report.crawl_warnings {
            warn!("  {}", skipped);
        }
        for skipped in &report.funnel_warnings {
            warn!("  {}", skipped);
        }
    }
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
