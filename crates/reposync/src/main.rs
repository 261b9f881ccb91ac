use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use reposync::config::{load_config, SyncConfig};
use reposync::logging::{self, LogFormat};
use reposync::{
    ConfigSecretStore, CredentialResolver, Git2Backend, GitBackend, LogMetrics, SyncContext,
    SyncController, SyncMetrics,
};

/// Keeps local git working copies aligned with remote branches, tags or commits.
#[derive(Parser, Debug)]
#[command(name = "reposync", version, about, long_about = None)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "REPOSYNC_CONFIG")]
    config: PathBuf,

    /// Only sync the named source (repeatable)
    #[arg(short, long = "source", value_name = "NAME")]
    sources: Vec<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    if let Err(e) = logging::init(cli.log_format, level) {
        eprintln!("reposync: {}", e);
        return ExitCode::FAILURE;
    }

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let ctx = SyncContext::new();
    let cancel = ctx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        warn!("Interrupted, cancelling in-flight git operations");
        cancel.cancel();
    }) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    if run(&cli, &config, &ctx) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Syncs the selected sources one after another. Returns false if any
/// source failed or was not found.
fn run(cli: &Cli, config: &SyncConfig, ctx: &SyncContext) -> bool {
    for name in &cli.sources {
        if config.source(name).is_none() {
            error!(source = %name, "No such source in {}", cli.config.display());
            return false;
        }
    }

    let mut resolver = CredentialResolver::new()
        .with_typed_resolver(Arc::new(ConfigSecretStore::new(config.secrets.clone())));
    if let Some(api_base) = &config.settings.github_api_base {
        resolver = resolver.with_github_api_base(api_base.clone());
    }
    let resolver = Arc::new(resolver);
    let backend: Arc<dyn GitBackend> =
        Arc::new(Git2Backend::new().with_submodule_depth(config.settings.submodule_depth));
    let metrics: Arc<dyn SyncMetrics> = Arc::new(LogMetrics);

    let selected = config
        .sources
        .iter()
        .filter(|source| cli.sources.is_empty() || cli.sources.contains(&source.name));

    let mut failures = 0usize;
    let mut total = 0usize;
    for source in selected {
        total += 1;
        if ctx.is_cancelled() {
            warn!(source = %source.name, "Skipped after cancellation");
            failures += 1;
            continue;
        }

        let mut controller = SyncController::new(
            source.name.clone(),
            source.target(),
            Arc::clone(&backend),
            Arc::clone(&resolver),
        )
        .with_metrics(Arc::clone(&metrics));

        if let Err(e) = controller.execute(ctx) {
            error!("{}", e);
            failures += 1;
        }
    }

    info!(total, failures, "Finished");
    failures == 0
}
