//! Follow-Harvester main entry point
//!
//! This is the command-line interface for the Follow-Harvester roster crawler.

use anyhow::Context;
use clap::Parser;
use follow_harvester::browser::BrowserlessDriver;
use follow_harvester::config::{load_config_with_hash, Config};
use follow_harvester::events::LogSink;
use follow_harvester::session::SessionManager;
use follow_harvester::storage::{open_shared, SqliteStorage};
use follow_harvester::Orchestrator;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Follow-Harvester: a roster crawler for rendered social timelines
///
/// Follow-Harvester keeps the following list of one tracked identity,
/// revisits the stalest accounts on a schedule and announces every post
/// it has not delivered before.
#[derive(Parser, Debug)]
#[command(name = "follow-harvester")]
#[command(version = "1.0.0")]
#[command(about = "A roster crawler for rendered social timelines", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be harvested without navigating
    #[arg(long, conflicts_with_all = ["stats", "import_cookies", "discover", "once"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "import_cookies", "discover", "once"])]
    stats: bool,

    /// Store an exported cookie JSON file as the tracked identity's session and exit
    #[arg(long, value_name = "FILE", conflicts_with_all = ["dry_run", "stats", "discover", "once"])]
    import_cookies: Option<PathBuf>,

    /// Run one discovery pass and exit
    #[arg(long, conflicts_with = "once")]
    discover: bool,

    /// Run one content cycle and exit
    #[arg(long, conflicts_with = "discover")]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if let Some(path) = &cli.import_cookies {
        handle_import_cookies(&config, path)?;
    } else {
        handle_harvest(config, cli.discover, cli.once).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("follow_harvester=info,warn"),
            1 => EnvFilter::new("follow_harvester=debug,info"),
            2 => EnvFilter::new("follow_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Follow-Harvester Dry Run ===\n");

    println!("Target:");
    println!("  Identity: @{}", config.target.username);
    println!("  Following list: {}/{}/following", config.browser.site_url, config.target.username);

    println!("\nLimits:");
    println!("  Max posts per account: {}", config.limits.max_posts_per_account);
    println!("  Max accounts per cycle: {}", config.limits.max_accounts_per_cycle);
    println!("  Max scroll attempts: {}", config.limits.max_scroll_attempts);
    println!("  Max accounts discovered: {}", config.limits.max_accounts);
    println!("  Min hours between updates: {}", config.limits.min_hours_between_updates);

    println!("\nCadence:");
    println!("  Discovery every {:?}", config.intervals.following_update());
    println!("  Content cycle every {:?}", config.intervals.content_fetch());

    println!("\nRender Service:");
    println!("  Endpoint: {}", config.browser.endpoint);
    println!("  Token: {}", if config.browser.token.is_some() { "set" } else { "none" });
    println!("  Headless: {}", config.browser.headless);

    println!("\nExtraction:");
    println!("  Stall after {} unchanged reveals", config.extraction.no_new_content_max_attempts);
    println!("  Fallback ids: {}", if config.extraction.allow_fallback_ids { "enabled" } else { "disabled" });

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use follow_harvester::output::{load_statistics, print_statistics};

    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .context("failed to open database")?;
    let stats = load_statistics(
        &storage,
        &config.target.username,
        chrono::Utc::now(),
        config.limits.min_hours_between_updates,
    )?;

    print_statistics(&stats);
    Ok(())
}

/// Handles the --import-cookies mode
fn handle_import_cookies(config: &Config, path: &Path) -> anyhow::Result<()> {
    let storage = open_shared(Path::new(&config.output.database_path))
        .context("failed to open database")?;
    let session = SessionManager::new(storage, config.target.username.clone());

    let count = session
        .import_file(path)
        .with_context(|| format!("failed to import {}", path.display()))?;

    println!("✓ Stored {} credential(s) for @{}", count, config.target.username);
    Ok(())
}

/// Handles the harvest modes: one discovery pass, one content cycle, or the daemon
async fn handle_harvest(config: Config, discover: bool, once: bool) -> anyhow::Result<()> {
    let storage = open_shared(Path::new(&config.output.database_path))
        .context("failed to open database")?;
    let driver = BrowserlessDriver::new(&config.browser).context("failed to set up render service")?;
    let orchestrator = Orchestrator::new(config, storage, Box::new(driver), Arc::new(LogSink));

    let cancel = install_signal_handler();

    if discover {
        let count = orchestrator.run_discovery(&cancel).await?;
        tracing::info!("Discovery finished with {} account(s)", count);
    } else if once {
        let result = orchestrator.run_content_cycle(&cancel).await?;
        tracing::info!("Cycle finished: {:?}", result);
    } else {
        tracing::info!("Starting harvester; press Ctrl+C to stop");
        orchestrator.run_forever(cancel).await?;
    }

    Ok(())
}

/// Cancels the returned token on SIGINT or SIGTERM
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT, finishing current account"),
                        _ = sigterm.recv() => tracing::info!("Received SIGTERM, finishing current account"),
                    }
                }
                Err(e) => {
                    tracing::warn!("Could not install SIGTERM handler: {}", e);
                    let _ = tokio::signal::ctrl_c().await;
                    tracing::info!("Received SIGINT, finishing current account");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received Ctrl+C, finishing current account");
        }

        trigger.cancel();
    });

    token
}
