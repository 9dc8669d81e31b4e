mod manifest;
mod state;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::{debug, warn};
use tokio::task::JoinSet;

use cirrus_core::cancel::{CancelHandle, Cancellation, cancellation};
use cirrus_core::provider::{Provider, ProviderError};
use cirrus_core::reconciler::Reconciler;
use cirrus_core::resource::{Resource, ResourceId, State};
use cirrus_provider_aws::{AwsProvider, ProviderConfig};

use manifest::Manifest;
use state::{ResourceState, StateFile};

#[derive(Parser)]
#[command(name = "cirrus")]
#[command(about = "Converge cloud resources onto a declared configuration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the state file
    #[arg(long, global = true, default_value = StateFile::DEFAULT_PATH)]
    state: PathBuf,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update resources to match the resource file
    Apply {
        /// Path to resource file
        file: PathBuf,
    },
    /// Refresh the recorded state of every resource
    Read {
        /// Path to resource file
        file: PathBuf,
    },
    /// Delete every resource in the resource file
    Destroy {
        /// Path to resource file
        file: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Apply,
    Read,
    Destroy,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let (handle, cancel) = cancellation();
    tokio::spawn(handle_interrupts(tokio::signal::ctrl_c, handle, || {
        eprintln!("{}", "Forced exit, the state file may be out of date".red());
        std::process::exit(130);
    }));

    let (mode, file) = match cli.command {
        Commands::Apply { file } => (Mode::Apply, file),
        Commands::Read { file } => (Mode::Read, file),
        Commands::Destroy { file } => (Mode::Destroy, file),
    };

    if let Err(e) = run(mode, &file, &cli.state, cancel).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Cancel on the first interrupt and call `force_exit` on the second
async fn handle_interrupts<S, Fut>(
    mut next_signal: S,
    handle: CancelHandle,
    force_exit: impl FnOnce(),
) where
    S: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if next_signal().await.is_err() {
        return;
    }
    eprintln!(
        "{}",
        "Interrupted, stopping once in-flight requests complete (Ctrl-C again to force)...".yellow()
    );
    handle.cancel();

    if next_signal().await.is_ok() {
        force_exit();
    }
}

/// What happened to one resource
struct Report {
    id: ResourceId,
    identifier: Option<String>,
    observed: Option<State>,
    result: Result<&'static str, ProviderError>,
}

async fn run_one(mode: Mode, mut reconciler: Reconciler, resource: Resource) -> Report {
    let result = match mode {
        Mode::Apply => reconciler.reconcile(&resource).await.map(|o| o.label()),
        Mode::Read => reconciler
            .read()
            .await
            .map(|s| if s.is_some() { "exists" } else { "not found" }),
        Mode::Destroy => reconciler.destroy().await.map(|()| "destroyed"),
    };

    Report {
        id: reconciler.id().clone(),
        identifier: reconciler.identifier().map(str::to_string),
        observed: reconciler.observed().cloned(),
        result,
    }
}

fn print_report(report: &Report) {
    let target = match &report.identifier {
        Some(identifier) => format!("{} ({})", report.id, identifier),
        None => report.id.to_string(),
    };
    match &report.result {
        Ok(label) => println!("  {} {} {}", "✓".green(), target, label.dimmed()),
        Err(e) if e.is_cancelled() => println!("  {} {} - cancelled", "✗".yellow(), target),
        Err(e) => println!("  {} {} - {}", "✗".red(), target, e),
    }
}

/// Record the identity a reconciler ended with, or forget the resource
fn record(state: &mut StateFile, provider: &str, report: &Report) {
    match &report.identifier {
        Some(identifier) => {
            let mut entry = ResourceState::new(
                &report.id.resource_type,
                &report.id.name,
                provider,
                identifier,
            );
            if let Some(observed) = &report.observed {
                entry = entry.with_observed(observed);
            } else if let Some(previous) =
                state.find_resource(&report.id.resource_type, &report.id.name)
                && previous.identifier == *identifier
            {
                entry.attributes = previous.attributes.clone();
            }
            state.upsert_resource(entry);
        }
        None => {
            state.remove_resource(&report.id.resource_type, &report.id.name);
        }
    }
}

async fn run(mode: Mode, file: &Path, state_path: &Path, cancel: Cancellation) -> Result<(), String> {
    let manifest = Manifest::load(file)?;
    let config = ProviderConfig::from_attributes(&manifest.provider)
        .map_err(|e| format!("Provider configuration: {}", e))?;
    let mut state = StateFile::load(state_path).map_err(|e| e.to_string())?;

    let provider: Arc<dyn Provider> = Arc::new(AwsProvider::new(&config).await);
    let provider_name = provider.name();
    debug!("Using provider {} in {}", provider_name, config.region);

    let heading = match mode {
        Mode::Apply => "Applying changes...",
        Mode::Read => "Reading resources...",
        Mode::Destroy => "Destroying resources...",
    };
    println!("{}", heading.cyan().bold());
    println!();

    let mut tasks = JoinSet::new();
    for resource in manifest.resources {
        let identifier = state
            .find_resource(&resource.id.resource_type, &resource.id.name)
            .map(|r| r.identifier.clone());
        let reconciler = Reconciler::new(provider.clone(), resource.id.clone())
            .with_identifier(identifier)
            .with_config(resource.attributes.clone())
            .with_cancellation(cancel.clone());
        tasks.spawn(run_one(mode, reconciler, resource));
    }

    let mut failures = 0;
    while let Some(joined) = tasks.join_next().await {
        let report = match joined {
            Ok(report) => report,
            Err(e) => {
                warn!("Reconciliation task failed: {}", e);
                failures += 1;
                continue;
            }
        };
        print_report(&report);
        if report.result.is_err() {
            failures += 1;
        }
        record(&mut state, provider_name, &report);
    }

    state.save(state_path).map_err(|e| e.to_string())?;
    println!();

    if failures > 0 {
        return Err(format!("{} resource(s) failed", failures));
    }
    println!("{}", "Done.".green().bold());
    Ok(())
}
