//! Console host: renders status to stdout and reads commands from stdin.

use std::future::Future;
use std::io::{self, BufRead, BufReader, IsTerminal};

use anyhow::Result;
use chrono::{Local, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{info, warn};

use claudometer_core::api::MonitorCore;
use claudometer_core::monitor::{IconSpec, MonitorStatus, Rgb, StatusRenderer, TrayView};
use claudometer_core::notify::Thresholds;
use claudometer_core::usage::Period;

/// Whether color output is enabled (TTY + NO_COLOR not set)
fn use_color() -> bool {
    std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// ANSI escape for an icon color
fn ansi(color: Rgb) -> &'static str {
    match color {
        Rgb::GREEN => "\x1b[32m",
        Rgb::YELLOW => "\x1b[33m",
        Rgb::ORANGE => "\x1b[38;5;208m",
        Rgb::RED => "\x1b[31m",
        Rgb::BLUE => "\x1b[34m",
        _ => "\x1b[2m",
    }
}

/// Format the status badge, e.g. `[80%]`
fn badge(icon: &IconSpec, color: bool) -> String {
    let label = format!("[{}]", icon.label());
    if !color {
        return label;
    }
    match icon {
        IconSpec::Loading => format!("\x1b[2m{}\x1b[0m", label),
        IconSpec::Usage { color: c, .. } | IconSpec::Error { color: c, .. } => {
            format!("{}{}\x1b[0m", ansi(*c), label)
        }
    }
}

/// Renderer printing the tooltip to stdout whenever it changes
pub struct ConsoleRenderer {
    view: TrayView,
    color: bool,
    last: Mutex<Option<String>>,
}

impl ConsoleRenderer {
    /// Create a renderer for the given periods
    pub fn new(view: TrayView) -> Self {
        Self {
            view,
            color: use_color(),
            last: Mutex::new(None),
        }
    }

    /// Text block printed for a status
    pub fn format(&self, status: &MonitorStatus) -> String {
        let icon = self.view.icon(status);
        let tooltip = self.view.tooltip(status, Utc::now());
        let mut out = format!(
            "{} {}",
            Local::now().format("%H:%M:%S"),
            badge(&icon, self.color)
        );
        for line in tooltip.lines().filter(|l| !l.is_empty()) {
            out.push_str("\n  ");
            out.push_str(line);
        }
        out
    }
}

impl StatusRenderer for ConsoleRenderer {
    fn render(&self, status: &MonitorStatus) {
        let key = format!(
            "{:?}{}",
            self.view.icon(status),
            self.view.tooltip(status, Utc::now())
        );
        {
            let mut last = self.last.lock();
            if last.as_deref() == Some(key.as_str()) {
                return;
            }
            *last = Some(key);
        }
        println!("{}", self.format(status));
    }
}

/// A command typed on stdin
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    Refresh,
    Status,
    Reset(Option<Period>),
    Thresholds(Vec<u32>),
    Help,
    Quit,
    Empty,
    Unknown(String),
}

/// Parse one input line
pub fn parse_command(line: &str) -> HostCommand {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return HostCommand::Empty;
    };

    match head.to_ascii_lowercase().as_str() {
        "r" | "refresh" => HostCommand::Refresh,
        "s" | "status" => HostCommand::Status,
        "reset" => match words.next() {
            None | Some("all") => HostCommand::Reset(None),
            Some(key) => HostCommand::Reset(Some(Period::from_key(key))),
        },
        "t" | "thresholds" => {
            let values: Result<Vec<u32>, _> = words.map(str::parse::<u32>).collect();
            match values {
                Ok(v) if !v.is_empty() => HostCommand::Thresholds(v),
                _ => HostCommand::Unknown(line.trim().to_string()),
            }
        }
        "h" | "help" | "?" => HostCommand::Help,
        "q" | "quit" | "exit" => HostCommand::Quit,
        _ => HostCommand::Unknown(line.trim().to_string()),
    }
}

const HELP: &str = "\
Commands:
  r, refresh            poll now
  s, status             show current status
  reset [period|all]    re-arm notifications (e.g. reset five_hour)
  t, thresholds N...    replace notification thresholds
  q, quit               exit";

/// Interactive console driving a [`MonitorCore`]
pub struct ConsoleHost<'a> {
    core: &'a MonitorCore,
    renderer: &'a ConsoleRenderer,
}

impl<'a> ConsoleHost<'a> {
    pub fn new(core: &'a MonitorCore, renderer: &'a ConsoleRenderer) -> Self {
        Self { core, renderer }
    }

    /// Run until `quit` or a termination signal
    pub async fn run(&self) -> Result<()> {
        println!("Type 'help' for commands.");
        let lines = spawn_line_reader(BufReader::new(io::stdin()));
        self.run_until(lines, shutdown_signal()).await;
        Ok(())
    }

    /// Handle input lines until `quit` or until `shutdown` resolves
    async fn run_until<F>(&self, mut lines: mpsc::Receiver<io::Result<String>>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut input_open = true;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                line = lines.recv(), if input_open => {
                    match line {
                        Some(Ok(line)) => {
                            if !self.handle(parse_command(&line)) {
                                break;
                            }
                        }
                        None => {
                            // Detached stdin (service mode): keep running until a signal
                            info!("stdin closed, waiting for a termination signal");
                            input_open = false;
                        }
                        Some(Err(e)) => {
                            warn!("Failed to read stdin: {}", e);
                            input_open = false;
                        }
                    }
                }
            }
        }
    }

    /// Apply a command; returns false to quit
    fn handle(&self, command: HostCommand) -> bool {
        match command {
            HostCommand::Refresh => {
                self.core.trigger_manual_refresh();
            }
            HostCommand::Status => println!("{}", self.renderer.format(&self.core.status())),
            HostCommand::Reset(period) => {
                self.core.reset_notifications(period.as_ref());
                match period {
                    Some(p) => println!("Notifications re-armed for {}", p.display_name()),
                    None => println!("Notifications re-armed for all periods"),
                }
            }
            HostCommand::Thresholds(values) => {
                let thresholds = Thresholds::new(values);
                println!("Thresholds: {:?}", thresholds.as_slice());
                self.core.update_thresholds(thresholds);
            }
            HostCommand::Help => println!("{}", HELP),
            HostCommand::Quit => return false,
            HostCommand::Empty => {}
            HostCommand::Unknown(input) => println!("Unknown command: {} (try 'help')", input),
        }
        true
    }
}

/// Read lines on a dedicated thread.
///
/// A blocking stdin read cannot be cancelled, so the thread is detached and
/// never joined; shutdown does not wait for the next line of input. The
/// channel closes at end of input or after the first read error.
pub fn spawn_line_reader<R>(reader: R) -> mpsc::Receiver<io::Result<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    let spawned = std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in reader.lines() {
                let failed = line.is_err();
                if tx.blocking_send(line).is_err() || failed {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        warn!("Failed to start stdin reader: {}", e);
    }
    rx
}

/// Resolve on Ctrl+C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    use std::sync::Arc;
    use std::time::Duration;

    use claudometer_core::api::MonitorCoreBuilder;
    use claudometer_core::config::Settings;
    use claudometer_core::monitor::ErrorState;
    use claudometer_core::usage::{FetchFuture, UsageFetcher, UsageSnapshot};
    use pretty_assertions::assert_eq;

    struct EmptyFetcher;

    impl UsageFetcher for EmptyFetcher {
        fn fetch_usage(&self) -> FetchFuture<'_> {
            Box::pin(async { Ok(UsageSnapshot::default()) })
        }
    }

    /// Input that never produces a byte, like an idle terminal
    struct IdleInput;

    impl Read for IdleInput {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            loop {
                std::thread::park();
            }
        }
    }

    fn test_core() -> MonitorCore {
        MonitorCoreBuilder::new(Settings::default())
            .with_fetcher(Arc::new(EmptyFetcher))
            .build()
            .expect("core builds with an injected fetcher")
    }

    fn test_renderer() -> ConsoleRenderer {
        ConsoleRenderer {
            view: TrayView::default(),
            color: false,
            last: Mutex::new(None),
        }
    }

    #[tokio::test]
    async fn test_shutdown_does_not_wait_for_blocked_input() {
        let core = test_core();
        let renderer = test_renderer();
        let host = ConsoleHost::new(&core, &renderer);

        let lines = spawn_line_reader(BufReader::new(IdleInput));
        tokio::time::timeout(Duration::from_secs(2), host.run_until(lines, async {}))
            .await
            .expect("host exits on shutdown while a read is pending");
    }

    #[tokio::test]
    async fn test_quit_command_ends_run() {
        let core = test_core();
        let renderer = test_renderer();
        let host = ConsoleHost::new(&core, &renderer);

        let lines = spawn_line_reader(Cursor::new("help\nreset\nq\nr\n"));
        tokio::time::timeout(
            Duration::from_secs(2),
            host.run_until(lines, std::future::pending::<()>()),
        )
        .await
        .expect("quit ends the host");
    }

    #[tokio::test]
    async fn test_end_of_input_keeps_running_until_shutdown() {
        let core = test_core();
        let renderer = test_renderer();
        let host = ConsoleHost::new(&core, &renderer);

        let lines = spawn_line_reader(Cursor::new(""));
        let started = tokio::time::Instant::now();
        host.run_until(lines, tokio::time::sleep(Duration::from_millis(200)))
            .await;
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("r"), HostCommand::Refresh);
        assert_eq!(parse_command("  Refresh "), HostCommand::Refresh);
        assert_eq!(parse_command("s"), HostCommand::Status);
        assert_eq!(parse_command("reset"), HostCommand::Reset(None));
        assert_eq!(parse_command("reset all"), HostCommand::Reset(None));
        assert_eq!(
            parse_command("reset five_hour"),
            HostCommand::Reset(Some(Period::FiveHour))
        );
        assert_eq!(
            parse_command("t 60 80"),
            HostCommand::Thresholds(vec![60, 80])
        );
        assert_eq!(
            parse_command("thresholds high"),
            HostCommand::Unknown("thresholds high".to_string())
        );
        assert_eq!(parse_command("q"), HostCommand::Quit);
        assert_eq!(parse_command(""), HostCommand::Empty);
        assert_eq!(
            parse_command("frobnicate"),
            HostCommand::Unknown("frobnicate".to_string())
        );
    }

    #[test]
    fn test_badge_without_color() {
        assert_eq!(badge(&IconSpec::Loading, false), "[...]");
        assert_eq!(
            badge(
                &IconSpec::Error {
                    symbol: '!',
                    color: Rgb::BLUE
                },
                false
            ),
            "[!]"
        );
    }

    #[test]
    fn test_badge_with_color() {
        let badge = badge(
            &IconSpec::Usage {
                percent: 95,
                color: Rgb::RED,
            },
            true,
        );
        assert_eq!(badge, "\x1b[31m[95%]\x1b[0m");
    }

    #[test]
    fn test_format_skips_blank_tooltip_lines() {
        let renderer = test_renderer();
        let status = MonitorStatus {
            error: ErrorState::NetworkError,
            ..Default::default()
        };
        let text = renderer.format(&status);
        assert!(text.contains("[?]"));
        assert!(text.ends_with("\n  Claude Monitor\n  Connection Error\n  Check internet connection"));
    }
}
