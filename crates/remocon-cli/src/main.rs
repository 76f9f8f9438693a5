//! `remocon` – remote control for a ROS concert from the command line.
//!
//! ```text
//! remocon [--url <ws-url>] [--concert <name>] [--from-app <name>] <command>
//!
//! commands:
//!   start [app]   start an app on the app manager (default: configured app)
//!   stop          stop the running app
//!   list          list available and running apps once
//!   watch         print every app list update until Ctrl-C
//!   config        show the configuration (runs the first-run wizard if absent)
//! ```
//!
//! The app manager is reached through a rosbridge v2 WebSocket server.

mod config;
mod session;
mod telemetry;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};

use remocon_app_manager::{AppManagerFunction, Dispatched};
use remocon_middleware::{PendingResponse, RosbridgeConnector};
use remocon_types::{Rapp, RemoconError};

use crate::config::Config;
use crate::session::{ConcertSession, LaunchContext};

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

fn main() -> ExitCode {
    let _guard = telemetry::init_tracing("remocon");

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: failed to start Tokio runtime: {}", "error".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult {
    if matches!(cli.command, Command::Config) {
        return show_config();
    }

    let mut cfg = config::load()?;
    if let Some(url) = cli.url {
        cfg.rosbridge_url = url;
    }
    if let Some(concert) = cli.concert {
        cfg.concert_name = concert;
    }
    let timeout = Duration::from_secs(cfg.call_timeout_secs);

    let session = ConcertSession::bootstrap(
        &cfg,
        LaunchContext::new(cli.from_app),
        Arc::new(RosbridgeConnector),
    )?;
    debug!(
        url = %cfg.rosbridge_url,
        app = session.app_name(),
        from_application = session.from_application(),
        "connecting to rosbridge"
    );

    let outcome = match cli.command {
        Command::Start { app } => start(&session, app, timeout).await,
        Command::Stop => stop(&session, timeout).await,
        Command::List => list(&session, timeout).await,
        Command::Watch => watch(&session).await,
        Command::Config => Ok(()),
    };
    session.release();
    outcome
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

async fn start(session: &ConcertSession, app: Option<String>, timeout: Duration) -> CliResult {
    let mut manager = session.app_manager(AppManagerFunction::Start);
    if let Some(app) = app {
        manager.set_app_name(app);
    }
    let app = manager.app_name().to_string();

    match session.execute(manager)?.join().await? {
        Dispatched::Start(pending) => {
            let response = await_response(pending, timeout).await?;
            if response.started {
                println!("  {} {} started", "✓".green().bold(), app.bold());
                if !response.application_namespace.is_empty() {
                    println!("    namespace: {}", response.application_namespace.dimmed());
                }
            } else {
                println!(
                    "  {} {} did not start (code {}): {}",
                    "✗".red().bold(),
                    app.bold(),
                    response.error_code,
                    response.message
                );
            }
            Ok(())
        }
        other => Err(unexpected(other)),
    }
}

async fn stop(session: &ConcertSession, timeout: Duration) -> CliResult {
    match session.execute_app_manager(AppManagerFunction::Stop)?.join().await? {
        Dispatched::Stop(pending) => {
            let response = await_response(pending, timeout).await?;
            if response.stopped {
                println!("  {} app stopped", "✓".green().bold());
            } else {
                println!(
                    "  {} app not stopped (code {}): {}",
                    "✗".red().bold(),
                    response.error_code,
                    response.message
                );
            }
            Ok(())
        }
        Dispatched::StopUnavailable => {
            println!(
                "  {} no stop service under {}; nothing to stop",
                "⚠".yellow().bold(),
                session.app_namespace()
            );
            Ok(())
        }
        other => Err(unexpected(other)),
    }
}

async fn list(session: &ConcertSession, timeout: Duration) -> CliResult {
    match session.execute_app_manager(AppManagerFunction::List)?.join().await? {
        Dispatched::List(pending) => {
            let response = await_response(pending, timeout).await?;
            print_apps("Available", &response.available_rapps);
            print_apps("Running", &response.running_rapps);
            Ok(())
        }
        other => Err(unexpected(other)),
    }
}

async fn watch(session: &ConcertSession) -> CliResult {
    let stop = Arc::new(Notify::new());
    let stop_handler = Arc::clone(&stop);
    if let Err(e) = ctrlc::set_handler(move || stop_handler.notify_one()) {
        warn!(error = %e, "Failed to install Ctrl-C handler; stop watching with SIGKILL");
    }

    let mut feed = match session
        .execute_app_manager(AppManagerFunction::ContinuousList)?
        .join()
        .await?
    {
        Dispatched::AppList(feed) => feed,
        other => return Err(unexpected(other)),
    };
    println!("  Watching {} (Ctrl-C to stop)", feed.topic().to_string().bold());

    loop {
        tokio::select! {
            update = feed.recv() => match update {
                Some(apps) => {
                    println!();
                    println!("  {}", chrono::Local::now().format("%H:%M:%S").to_string().dimmed());
                    print_apps("Available", &apps.available_rapps);
                    print_apps("Running", &apps.running_rapps);
                }
                None => {
                    println!("{}", "  App list feed closed.".yellow());
                    return Ok(());
                }
            },
            _ = stop.notified() => {
                println!();
                println!("{}", "  ✓ Stopped watching.".green());
                return Ok(());
            }
        }
    }
}

fn show_config() -> CliResult {
    let path = config::config_path();
    if !path.exists() {
        run_first_run_wizard();
    }
    let cfg = config::load()?;
    println!("  Config at {}", path.display().to_string().bold());
    println!();
    for line in toml::to_string_pretty(&cfg)?.lines() {
        println!("    {line}");
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() {
    println!();
    println!("  No configuration found.  Let's set up remocon.\n");

    let mut cfg = Config::default();
    cfg.rosbridge_url = prompt_line(
        &format!("  rosbridge WebSocket URL [{}]: ", cfg.rosbridge_url),
        &cfg.rosbridge_url,
    );
    cfg.concert_name = prompt_line(
        &format!("  Concert name [{}]: ", cfg.concert_name),
        &cfg.concert_name,
    );
    cfg.default_app_name = prompt_line("  Default app to start []: ", "");

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Arguments
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "remocon")]
#[command(about = "Remote control for a ROS concert app manager")]
struct Cli {
    /// rosbridge WebSocket URL (overrides the config file)
    #[arg(long)]
    url: Option<String>,

    /// Concert name (overrides the config file)
    #[arg(long)]
    concert: Option<String>,

    /// App name handed over by the launcher; `AppChooser` means an app just closed
    #[arg(long)]
    from_app: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Start an app on the app manager (default: configured app)
    Start { app: Option<String> },
    /// Stop the running app
    Stop,
    /// List available and running apps once
    List,
    /// Print every app list update until Ctrl-C
    Watch,
    /// Show the configuration (runs the first-run wizard if absent)
    Config,
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

async fn await_response<T>(pending: PendingResponse<T>, timeout: Duration) -> CliResult<T> {
    let service = pending.service_name().clone();
    match tokio::time::timeout(timeout, pending.response()).await {
        Ok(outcome) => Ok(outcome?),
        Err(_) => Err(RemoconError::ServiceCall {
            service: service.to_string(),
            reason: format!("no response within {}s", timeout.as_secs()),
        }
        .into()),
    }
}

fn unexpected(dispatched: Dispatched) -> Box<dyn std::error::Error> {
    format!("app manager returned an unexpected result: {dispatched:?}").into()
}

fn print_apps(heading: &str, apps: &[Rapp]) {
    println!("  {} ({})", heading.bold(), apps.len());
    for app in apps {
        if app.display_name.is_empty() {
            println!("    • {}", app.name);
        } else {
            println!("    • {} {}", app.name, format!("({})", app.display_name).dimmed());
        }
    }
}

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("remocon").chain(args.iter().copied()))
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse(&["stop"]).unwrap().command, Command::Stop);
        assert_eq!(parse(&["list"]).unwrap().command, Command::List);
        assert_eq!(parse(&["watch"]).unwrap().command, Command::Watch);
        assert_eq!(parse(&["config"]).unwrap().command, Command::Config);
        assert_eq!(parse(&["start"]).unwrap().command, Command::Start { app: None });
        assert_eq!(
            parse(&["start", "turtlebot_teleop"]).unwrap().command,
            Command::Start { app: Some("turtlebot_teleop".to_string()) }
        );
    }

    #[test]
    fn parses_flags_before_the_command() {
        let cli = parse(&[
            "--url", "ws://robot:9090", "--concert", "office", "--from-app", "AppChooser", "list",
        ])
        .unwrap();
        assert_eq!(cli.url.as_deref(), Some("ws://robot:9090"));
        assert_eq!(cli.concert.as_deref(), Some("office"));
        assert_eq!(cli.from_app.as_deref(), Some("AppChooser"));
        assert_eq!(cli.command, Command::List);
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["--url"]).is_err());
        assert!(parse(&["reboot"]).is_err());
        assert!(parse(&["stop", "now"]).is_err());
        assert!(parse(&["start", "a", "b"]).is_err());
    }

    #[test]
    fn command_line_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn await_response_times_out() {
        use remocon_middleware::{GraphName, LocalGraph, ServiceClient};
        use remocon_types::GetRappList;

        let graph = LocalGraph::default();
        let name = GraphName::new("/concert/list_apps").unwrap();
        graph.advertise::<GetRappList, _>(name.clone(), |_| {
            std::thread::sleep(Duration::from_millis(200));
            Default::default()
        });
        let node = graph.node(GraphName::new("/remocon").unwrap());
        let client = ServiceClient::<GetRappList>::connect(&node, &name).await.unwrap();
        let pending = client.call(&Default::default()).unwrap();

        let err = await_response(pending, Duration::from_millis(10)).await.unwrap_err();
        assert!(err.to_string().contains("no response"));
    }
}
