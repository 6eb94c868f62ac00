use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use claudometer::api::MonitorCoreBuilder;
use claudometer::config::{log_dir, Command, Config, Settings};
use claudometer::host::{ConsoleHost, ConsoleRenderer};
use claudometer::logging::setup_logging;
use claudometer::monitor::{ErrorState, TrayView};
use claudometer::notify::{DesktopSink, LogSink, NotificationSink};

/// How long the poll loop gets to exit after a stop request
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments
    let cli = Config::parse_args();

    // Load settings
    let config_path = Settings::resolve_path(cli.config.as_ref());
    let mut settings = Settings::load_from(&config_path)?;
    settings.merge_cli(&cli);

    // Setup logging
    let log_file = setup_logging(settings.debug_mode, &log_dir())?;
    info!(
        "Claudometer {} starting (log: {:?})",
        env!("CARGO_PKG_VERSION"),
        log_file
    );
    info!("{}", Settings::describe_source(&config_path));
    settings.validate();

    match cli.command() {
        Command::Init => init_config(&config_path),
        Command::Check => check_once(settings, &config_path).await,
        Command::Run => run_monitor(settings, &config_path).await,
    }
}

/// Write a default config unless one already exists
fn init_config(config_path: &Path) -> Result<ExitCode> {
    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
    } else {
        Settings::default().save(config_path)?;
        println!("Wrote default config to {}", config_path.display());
    }
    Ok(ExitCode::SUCCESS)
}

/// Poll once and print the tooltip; exit status reflects the outcome
async fn check_once(settings: Settings, config_path: &Path) -> Result<ExitCode> {
    if !settings.is_configured() {
        first_run_setup(config_path)?;
        return Ok(ExitCode::FAILURE);
    }

    let core = MonitorCoreBuilder::new(settings)
        .with_sink(Arc::new(LogSink))
        .build()?;
    let outcome = core.poll_now().await;
    println!("{}", core.tooltip());

    Ok(if outcome == ErrorState::None {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Run the monitor until quit or a termination signal
async fn run_monitor(settings: Settings, config_path: &Path) -> Result<ExitCode> {
    if !settings.is_configured() {
        first_run_setup(config_path)?;
        return Ok(ExitCode::FAILURE);
    }

    let sink = notification_sink(&settings).await;
    let renderer = Arc::new(ConsoleRenderer::new(TrayView::new(
        settings.notification_periods.iter().cloned(),
    )));

    let core = MonitorCoreBuilder::new(settings)
        .with_sink(sink)
        .with_renderer(renderer.clone())
        .build()?;

    core.start();
    ConsoleHost::new(&core, &renderer).run().await?;

    if !core.shutdown(SHUTDOWN_GRACE).await {
        warn!("Poll loop aborted during shutdown");
    }
    info!("Claudometer stopped");
    Ok(ExitCode::SUCCESS)
}

/// Desktop notifications when enabled and available, log-only otherwise
async fn notification_sink(settings: &Settings) -> Arc<dyn NotificationSink> {
    if !settings.notifications.desktop {
        return Arc::new(LogSink);
    }
    if DesktopSink::is_available().await {
        Arc::new(DesktopSink::new())
    } else {
        warn!("Desktop notifications unavailable, logging notifications only");
        Arc::new(LogSink)
    }
}

/// Create a default config if needed and explain how to fill it in
fn first_run_setup(config_path: &Path) -> Result<()> {
    if !config_path.exists() {
        Settings::default().save(config_path)?;
    }
    info!("Credentials missing, showing setup instructions");

    let rule = "=".repeat(60);
    println!("{}", rule);
    println!("Claudometer - First Time Setup");
    println!("{}", rule);
    println!();
    println!("Edit the config file and add your credentials:");
    println!("  {}", config_path.display());
    println!();
    println!("1. organization_id:");
    println!("   - Go to https://claude.ai/settings/usage");
    println!("   - Copy the UUID from the URL:");
    println!("     https://claude.ai/settings/organizations/YOUR-ORG-ID/usage");
    println!();
    println!("2. session_cookie:");
    println!("   - Open https://claude.ai in your browser");
    println!("   - Developer tools -> Application/Storage -> Cookies -> https://claude.ai");
    println!("   - Copy the value of 'sessionKey'");
    println!();
    println!("Then run claudometer again.");
    println!("{}", rule);
    Ok(())
}
