use std::{path::Path, sync::Arc};

use chrono::NaiveDate;
use clap::{Args, Subcommand};
use serde_json::{Value, json};
use tracing::error;

use crate::{
    app::store::{RefreshOutcome, TaskStore},
    chart::{self, ChartGeometry},
    service::{ErrorKind, HttpTaskService, ServiceConfig, ServiceError},
    settings::Settings,
    types::{NewTask, Snapshot, Task, TaskId},
    ui::{format_date_range, format_set, format_timestamp},
};

const SCHEMA_VERSION: &str = "cli.v1";
const CHART_TEXT_WIDTH: usize = 36;

#[derive(Debug, Clone, Subcommand)]
pub enum RootCommand {
    /// Inspect and create analysis tasks
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },
    /// Read or update the settings file
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum TaskCommand {
    List,
    Create(TaskCreateArgs),
    Show(TaskShowArgs),
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigCommand {
    Show,
    Set(ConfigSetArgs),
}

#[derive(Debug, Clone, Args)]
pub struct TaskCreateArgs {
    #[arg(long, value_name = "TEXT")]
    pub name: String,

    #[arg(long, value_name = "YYYY-MM-DD")]
    pub start_date: Option<NaiveDate>,

    #[arg(long, value_name = "YYYY-MM-DD")]
    pub end_date: Option<NaiveDate>,

    #[arg(long, value_name = "TAGS", value_delimiter = ',')]
    pub hashtags: Vec<String>,

    #[arg(long, value_name = "PLATFORMS", value_delimiter = ',')]
    pub platforms: Vec<String>,
}

#[derive(Debug, Clone, Args)]
pub struct TaskShowArgs {
    #[arg(value_name = "TASK_ID")]
    pub id: TaskId,
}

#[derive(Debug, Clone, Args, Default)]
pub struct ConfigSetArgs {
    #[arg(long, value_name = "URL")]
    pub server: Option<String>,

    #[arg(long, value_name = "MS")]
    pub poll_interval_ms: Option<u64>,

    #[arg(long, value_name = "MS")]
    pub request_timeout_ms: Option<u64>,

    #[arg(long, value_name = "PRESET")]
    pub theme: Option<String>,
}

pub async fn run(settings: &Settings, command: RootCommand, json_output: bool, quiet: bool) -> i32 {
    match execute(settings, command).await {
        Ok(output) => {
            print_success(output, json_output, quiet);
            0
        }
        Err(err) => {
            print_error(&err, json_output);
            err.exit_code
        }
    }
}

struct CommandOutput {
    command: &'static str,
    data: Value,
    text: String,
}

#[derive(Debug)]
struct CliError {
    exit_code: i32,
    code: &'static str,
    message: String,
    details: Option<Value>,
}

type CliResult<T> = Result<T, CliError>;

async fn execute(settings: &Settings, command: RootCommand) -> CliResult<CommandOutput> {
    match command {
        RootCommand::Task { command } => {
            let service = HttpTaskService::new(ServiceConfig {
                base_url: settings.server_url.clone(),
                request_timeout: settings.request_timeout(),
            })
            .map_err(service_error)?;
            let store = TaskStore::new(Arc::new(service));
            execute_task_command(&store, command).await
        }
        RootCommand::Config { command } => {
            let path = Settings::config_path()
                .ok_or_else(|| runtime_error("unable to determine config path"))?;
            match command {
                ConfigCommand::Show => Ok(config_show(settings, &path)),
                ConfigCommand::Set(args) => config_set(&path, args),
            }
        }
    }
}

async fn execute_task_command(store: &TaskStore, command: TaskCommand) -> CliResult<CommandOutput> {
    match command {
        TaskCommand::List => task_list(store).await,
        TaskCommand::Create(args) => task_create(store, args).await,
        TaskCommand::Show(args) => task_show(store, args).await,
    }
}

async fn task_list(store: &TaskStore) -> CliResult<CommandOutput> {
    let tasks = store.list().await.map_err(service_error)?;

    Ok(CommandOutput {
        command: "task list",
        data: json!({ "tasks": tasks }),
        text: render_task_list_text(&tasks),
    })
}

fn render_task_list_text(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return "No tasks found.".to_string();
    }

    let headers = ["ID", "Name", "Status", "Platforms", "Created", "Completed"];
    let rows = tasks
        .iter()
        .map(|task| {
            vec![
                task.id.to_string(),
                task.name.replace('\n', " "),
                task.status.to_string(),
                format_set(&task.filters.platforms, ""),
                format_timestamp(task.created_at),
                task.completed_at
                    .map(format_timestamp)
                    .unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect::<Vec<_>>();

    render_text_table(&headers, &rows)
}

fn render_text_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths = headers
        .iter()
        .map(|header| header.chars().count())
        .collect::<Vec<_>>();

    for row in rows {
        for (index, cell) in row.iter().enumerate() {
            let width = cell.chars().count();
            if width > widths[index] {
                widths[index] = width;
            }
        }
    }

    let border = format!(
        "+{}+",
        widths
            .iter()
            .map(|width| "-".repeat(*width + 2))
            .collect::<Vec<_>>()
            .join("+")
    );
    let render_row = |cells: Vec<&str>| {
        format!(
            "| {} |",
            cells
                .iter()
                .enumerate()
                .map(|(index, cell)| format!("{cell:<width$}", width = widths[index]))
                .collect::<Vec<_>>()
                .join(" | ")
        )
    };

    let mut lines = vec![border.clone(), render_row(headers.to_vec()), border.clone()];
    for row in rows {
        lines.push(render_row(row.iter().map(String::as_str).collect()));
    }
    lines.push(border);
    lines.join("\n")
}

async fn task_create(store: &TaskStore, args: TaskCreateArgs) -> CliResult<CommandOutput> {
    let new_task = NewTask::new(
        args.name,
        args.start_date,
        args.end_date,
        args.hashtags,
        args.platforms,
    )
    .map_err(|err| usage_error("INVALID_TASK", err.to_string()))?;

    let id = store.create(&new_task).await.map_err(service_error)?;

    Ok(CommandOutput {
        command: "task create",
        data: json!({ "id": id, "name": new_task.name(), "filters": new_task.filters() }),
        text: format!("Created task {id}: {}", new_task.name()),
    })
}

async fn task_show(store: &TaskStore, args: TaskShowArgs) -> CliResult<CommandOutput> {
    let snapshot = match store.refresh(args.id).await {
        Ok(RefreshOutcome::Applied(snapshot)) => snapshot,
        Ok(RefreshOutcome::Superseded) => {
            return Err(runtime_error(format!(
                "refresh of task {} was superseded",
                args.id
            )));
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(not_found_error(
                "TASK_NOT_FOUND",
                format!("task {} not found", args.id),
            ));
        }
        Err(err) => return Err(service_error(err)),
    };

    let geometry = chart::render(&snapshot.analytics);

    Ok(CommandOutput {
        command: "task show",
        data: snapshot_json(&snapshot, &geometry),
        text: render_task_detail_text(&snapshot, &geometry),
    })
}

fn snapshot_json(snapshot: &Snapshot, geometry: &ChartGeometry) -> Value {
    json!({
        "task": snapshot.task,
        "analytics": snapshot.analytics,
        "posts": snapshot.posts,
        "fetched_at": snapshot.fetched_at,
        "chart": {
            "y_domain": [geometry.y_domain.0, geometry.y_domain.1],
            "bars": geometry
                .bars
                .iter()
                .map(|bar| json!({ "hashtag": bar.category, "count": bar.count }))
                .collect::<Vec<_>>()
        }
    })
}

fn render_task_detail_text(snapshot: &Snapshot, geometry: &ChartGeometry) -> String {
    let task = &snapshot.task;
    let completed = task
        .completed_at
        .map(format_timestamp)
        .unwrap_or_else(|| "-".to_string());

    let mut lines = vec![
        format!("Task {}: {}", task.id, task.name),
        format!("  status      {}", task.status),
        format!("  created     {}", format_timestamp(task.created_at)),
        format!("  completed   {completed}"),
        format!("  range       {}", format_date_range(&task.filters)),
        format!("  platforms   {}", format_set(&task.filters.platforms, "")),
        format!("  hashtags    {}", format_set(&task.filters.hashtags, "#")),
        format!("  posts       {}", snapshot.analytics.total_posts),
        format!("  engagement  {}", snapshot.analytics.total_engagement),
        String::new(),
    ];
    lines.push(render_chart_text(geometry, CHART_TEXT_WIDTH));
    lines.join("\n")
}

/// Horizontal bars whose lengths follow the chart's linear scale.
fn render_chart_text(geometry: &ChartGeometry, width: usize) -> String {
    if geometry.is_empty() {
        return "No hashtags recorded yet.".to_string();
    }

    let plot_height = geometry.layout.plot_bottom() - geometry.layout.plot_top();
    let label_width = geometry
        .bars
        .iter()
        .map(|bar| bar.category.chars().count() + 1)
        .max()
        .unwrap_or(0);

    geometry
        .bars
        .iter()
        .map(|bar| {
            let cells = (bar.height / plot_height * width as f64).round() as usize;
            let label = format!("#{}", bar.category);
            format!(
                "{label:<label_width$}  {} {}",
                "█".repeat(cells),
                bar.count
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn config_show(settings: &Settings, path: &Path) -> CommandOutput {
    CommandOutput {
        command: "config show",
        data: json!({ "path": path, "settings": settings }),
        text: render_settings_text(settings, path),
    }
}

fn config_set(path: &Path, args: ConfigSetArgs) -> CliResult<CommandOutput> {
    let mut settings = Settings::load_from_path(path);
    if let Some(server) = args.server {
        settings.server_url = server;
    }
    if let Some(poll_interval_ms) = args.poll_interval_ms {
        settings.poll_interval_ms = poll_interval_ms;
    }
    if let Some(request_timeout_ms) = args.request_timeout_ms {
        settings.request_timeout_ms = request_timeout_ms;
    }
    if let Some(theme) = args.theme {
        settings.theme = theme;
    }
    settings.validate();
    settings
        .save_to_path(path)
        .map_err(|err| runtime_error(format!("{err:#}")))?;

    Ok(CommandOutput {
        command: "config set",
        data: json!({ "path": path, "settings": settings }),
        text: render_settings_text(&settings, path),
    })
}

fn render_settings_text(settings: &Settings, path: &Path) -> String {
    [
        format!("config             {}", path.display()),
        format!("server_url         {}", settings.server_url),
        format!("poll_interval_ms   {}", settings.poll_interval_ms),
        format!("request_timeout_ms {}", settings.request_timeout_ms),
        format!("theme              {}", settings.theme),
    ]
    .join("\n")
}

fn usage_error(code: &'static str, message: impl Into<String>) -> CliError {
    CliError {
        exit_code: 2,
        code,
        message: message.into(),
        details: None,
    }
}

fn not_found_error(code: &'static str, message: impl Into<String>) -> CliError {
    CliError {
        exit_code: 3,
        code,
        message: message.into(),
        details: None,
    }
}

fn runtime_error(err: impl std::fmt::Display) -> CliError {
    CliError {
        exit_code: 5,
        code: "RUNTIME_ERROR",
        message: err.to_string(),
        details: None,
    }
}

fn service_error(err: ServiceError) -> CliError {
    let exit_code = match err.kind() {
        ErrorKind::NotFound => 3,
        ErrorKind::Transport | ErrorKind::Malformed | ErrorKind::Rejected => 5,
    };
    let details = match &err {
        ServiceError::Rejected { status, .. } => Some(json!({ "http_status": status })),
        _ => None,
    };
    CliError {
        exit_code,
        code: err.code(),
        message: err.to_string(),
        details,
    }
}

fn print_success(output: CommandOutput, json_output: bool, quiet: bool) {
    if json_output {
        let payload = json!({
            "schema_version": SCHEMA_VERSION,
            "command": output.command,
            "data": output.data
        });
        match serde_json::to_string_pretty(&payload) {
            Ok(value) => println!("{value}"),
            Err(_) => println!("{}", payload),
        }
        return;
    }

    if quiet {
        return;
    }

    if output.text.is_empty() {
        println!("ok");
    } else {
        println!("{}", output.text);
    }
}

fn print_error(err: &CliError, json_output: bool) {
    error!(
        code = err.code,
        message = %err.message,
        details = ?err.details,
        "cli command failed"
    );

    if json_output {
        let payload = json!({
            "schema_version": SCHEMA_VERSION,
            "error": {
                "code": err.code,
                "message": err.message,
                "details": err.details
            }
        });
        match serde_json::to_string_pretty(&payload) {
            Ok(value) => eprintln!("{value}"),
            Err(_) => eprintln!("{}", payload),
        }
        return;
    }

    eprintln!("error[{}]: {}", err.code, err.message);
}
