use std::{
    io::{self, Write},
    panic,
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use crossterm::{
    cursor::Show,
    execute,
    style::ResetColor,
    terminal::{LeaveAlternateScreen, disable_raw_mode},
};
use tracing::info;
use tuirealm::{
    PollStrategy,
    terminal::{CrosstermTerminalAdapter, TerminalBridge},
};

use social_analytics::{
    app::{App, polling::PollingController, store::TaskStore},
    cli::{self, RootCommand},
    logging::{init_logging, print_log_location},
    realm::{RootId, apply_message, init_application, should_quit},
    service::{HttpTaskService, ServiceConfig},
    settings::Settings,
    theme::Theme,
    types::TaskId,
};

#[derive(Parser, Debug)]
#[command(
    name = "social-analytics",
    about = "Terminal client for social media analysis tasks",
    long_about = "Create analysis tasks on a social-analytics service and follow their hashtag analytics live.",
    version = env!("SOCIAL_ANALYTICS_BUILD_VERSION"),
    author
)]
struct Cli {
    #[arg(long, global = true, value_name = "URL")]
    server: Option<String>,

    #[arg(long, global = true, value_name = "PRESET")]
    theme: Option<String>,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow a task live until it completes or fails
    Watch(WatchArgs),
    #[command(flatten)]
    Cli(RootCommand),
}

#[derive(Args, Debug)]
struct WatchArgs {
    #[arg(value_name = "TASK_ID")]
    id: TaskId,
}

enum RunOutcome {
    Continue,
    Exit(i32),
}

static TERMINAL_RESTORED: AtomicBool = AtomicBool::new(true);

#[tokio::main]
async fn main() -> Result<()> {
    let log_path = match init_logging() {
        Ok(path) => Some(path),
        Err(err) => {
            eprintln!("warning: failed to initialize logging: {err}");
            None
        }
    };
    if let Some(path) = log_path.as_ref() {
        install_panic_hook_with_log(path.clone());
    }

    match run_app().await {
        Ok(RunOutcome::Continue) => {
            if let Some(path) = log_path.as_ref() {
                print_log_location(path);
            }
            Ok(())
        }
        Ok(RunOutcome::Exit(code)) => {
            std::process::exit(code);
        }
        Err(err) => {
            if let Some(path) = log_path.as_ref() {
                print_log_location(path);
            }
            Err(err)
        }
    }
}

async fn run_app() -> Result<RunOutcome> {
    let cli = Cli::parse();
    let settings = effective_settings(&cli);

    match cli.command {
        Command::Cli(command) => {
            let code = cli::run(&settings, command, cli.json, cli.quiet).await;
            Ok(RunOutcome::Exit(code))
        }
        Command::Watch(args) => {
            watch_task(&settings, args.id)?;
            Ok(RunOutcome::Continue)
        }
    }
}

/// Settings file values with command-line overrides applied.
fn effective_settings(cli: &Cli) -> Settings {
    let mut settings = Settings::load();
    if let Some(server) = cli.server.as_deref() {
        settings.server_url = server.to_string();
    }
    if let Some(theme) = cli.theme.as_deref() {
        settings.theme = theme.to_string();
    }
    settings.validate();
    settings
}

fn watch_task(settings: &Settings, task_id: TaskId) -> Result<()> {
    let service = HttpTaskService::new(ServiceConfig {
        base_url: settings.server_url.clone(),
        request_timeout: settings.request_timeout(),
    })
    .context("failed to create analysis service client")?;
    let store = Arc::new(TaskStore::new(Arc::new(service)));
    let controller = PollingController::new(store, settings.poll_interval());

    info!(task_id = %task_id, server = %settings.server_url, "watching task");

    let mut app = App::new(controller, Theme::from_preset(settings.theme_preset()));
    app.watch(task_id);
    let app = Arc::new(Mutex::new(app));

    let _guard = TerminalGuard;
    let mut terminal = setup_terminal()?;
    let mut realm = init_application(Arc::clone(&app))?;

    let mut redraw = true;
    while !should_quit(&app)? {
        if redraw {
            terminal
                .draw(|frame| realm.view(&RootId::Root, frame, frame.area()))
                .context("failed to render frame")?;
            redraw = false;
        }

        let messages = realm
            .tick(PollStrategy::Once)
            .context("failed to process tui-realm tick")?;

        if !messages.is_empty() {
            redraw = true;
        }

        for message in messages {
            apply_message(&app, message)?;
        }
    }

    let _ = terminal.disable_raw_mode();
    let _ = terminal.leave_alternate_screen();
    let _ = terminal.clear_screen();
    TERMINAL_RESTORED.store(true, Ordering::SeqCst);

    Ok(())
}

fn setup_terminal() -> Result<TerminalBridge<CrosstermTerminalAdapter>> {
    TERMINAL_RESTORED.store(false, Ordering::SeqCst);

    let mut terminal =
        TerminalBridge::new_crossterm().context("failed to initialize terminal bridge")?;

    terminal
        .enable_raw_mode()
        .context("failed to enable raw mode")?;
    terminal
        .enter_alternate_screen()
        .context("failed to enter alternate screen")?;

    Ok(terminal)
}

fn install_panic_hook_with_log(log_path: PathBuf) {
    let previous_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let _ = restore_terminal();
        eprintln!();
        print_log_location(&log_path);
        previous_hook(panic_info);
    }));
}

fn restore_terminal() -> Result<()> {
    if TERMINAL_RESTORED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let _ = disable_raw_mode();

    let mut stderr = io::stderr();
    let _ = execute!(stderr, LeaveAlternateScreen, Show, ResetColor);
    let _ = stderr.write_all(b"\x1b[?1049l\x1b[?25h\x1b[0m\x1b[2J\x1b[H");
    let _ = stderr.flush();

    Ok(())
}

struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = restore_terminal();
    }
}
