//! Command line interface.
//!
//! Parses arguments, loads the configuration and drives the pipeline, turning
//! the final report into an exit code.

mod args;
mod confirm;
mod output;
mod report;

pub use args::{Args, CacheAction, Command};
pub use confirm::TerminalConfirmation;
pub use output::OutputManager;

use std::sync::Arc;

use anyhow::Context as _;
use tokio_util::sync::CancellationToken;

use crate::config::{PipelineConfig, load_config};
use crate::error::Result;
use crate::pipeline::run_cache::RunCache;
use crate::pipeline::tools::{Tool, ToolLocator};
use crate::pipeline::{
    ArtifactRequirementResolver, ReleasePipeline, cache_manager, enabled_destinations,
};

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    init_logging(args.verbose);
    execute(args).await
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

/// Runs parsed arguments.
pub async fn execute(args: Args) -> Result<i32> {
    let config = load_config(&args.config)?;
    let out = OutputManager::new(args.verbose, false);

    match args.command {
        Command::Run { yes, json, workers } => run_pipeline(config, &out, yes, json, workers).await,
        Command::Plan => plan(&config, &out),
        Command::Cache { action } => cache(&config, &out, action).await,
        Command::Tools => tools(&config, &out),
    }
}

async fn run_pipeline(
    mut config: PipelineConfig,
    out: &OutputManager,
    yes: bool,
    json: bool,
    workers: Option<u16>,
) -> Result<i32> {
    if yes {
        config.deploy.assume_yes = true;
    }
    if let Some(workers) = workers {
        config.deploy.max_concurrency = Some(usize::from(workers));
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupted, cancelling running commands and uploads");
                cancel.cancel();
            }
        });
    }

    let verbose = out.clone();
    let report = ReleasePipeline::builder(config)
        .cancellation(cancel)
        .confirmation(Box::new(TerminalConfirmation::new(out.clone())))
        .output(Arc::new(move |line: &str| {
            let _ = verbose.verbose(line);
        }))
        .build()
        .run()
        .await?;

    if json {
        let rendered = serde_json::to_string_pretty(&report).context("rendering report")?;
        println!("{rendered}");
    } else {
        report::print_report(out, &report)?;
    }

    Ok(if report.all_succeeded() { 0 } else { 2 })
}

fn plan(config: &PipelineConfig, out: &OutputManager) -> Result<i32> {
    let enabled = enabled_destinations(&config.destinations);
    if enabled.is_empty() {
        return Err(crate::pipeline::Error::NoDestinationsEnabled.into());
    }

    let requirements = ArtifactRequirementResolver::new().resolve(&config.destinations);
    out.section("Destinations")?;
    for destination in &enabled {
        match requirements.iter().find(|r| r.destination_name == destination.name()) {
            Some(req) => out.progress(&format!(
                "{} ({}) needs {}{}",
                destination,
                destination.grade(),
                if req.must_be_signed { "signed " } else { "" },
                req.kind
            ))?,
            None => out.progress(&format!("{} uploads a pre-built archive", destination))?,
        }
    }

    out.section("Builds")?;
    for kind in ArtifactRequirementResolver::artifact_types_to_build(&requirements) {
        out.indent(&kind.to_string())?;
    }
    Ok(0)
}

async fn cache(config: &PipelineConfig, out: &OutputManager, action: CacheAction) -> Result<i32> {
    let manager = cache_manager(config);
    match action {
        CacheAction::Status => {
            let entries = manager.entries().await?;
            out.section(&format!("Cache at {}", manager.cache_dir().display()))?;
            if entries.is_empty() {
                out.indent("empty")?;
            }
            for (slot, digest) in entries {
                out.indent(&format!("{slot}  {digest}"))?;
            }
        }
        CacheAction::Clear => {
            manager.clear().await?;
            out.success(&format!("Cleared {}", manager.cache_dir().display()))?;
        }
    }
    Ok(0)
}

fn tools(config: &PipelineConfig, out: &OutputManager) -> Result<i32> {
    let locator = ToolLocator::new(&config.project.root, Arc::new(RunCache::new()));

    out.section("Android SDK")?;
    match locator.sdk_root() {
        Some(root) => out.success(&root.display().to_string())?,
        None => out.warn("not found")?,
    }
    for (source, path) in locator.sdk_candidates() {
        out.verbose(&format!("candidate {} from {}", path.display(), source))?;
    }

    out.section("Tools")?;
    let mut missing = 0;
    for tool in Tool::ALL {
        if tool == Tool::Xcrun && !cfg!(target_os = "macos") {
            continue;
        }
        match locator.find(tool) {
            Ok(path) => out.success(&format!("{}: {}", tool, path.display()))?,
            Err(e) => {
                missing += 1;
                out.warn(&e.to_string())?;
            }
        }
    }
    Ok(if missing == 0 { 0 } else { 1 })
}
