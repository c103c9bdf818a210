use chrono::{DateTime, NaiveDate, Utc};
use tuirealm::ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{
        Block, Borders, Paragraph,
        canvas::{Canvas, Context, Line as CanvasLine},
    },
};

use crate::app::App;
use crate::app::polling::{PollState, StopReason};
use crate::chart::ChartGeometry;
use crate::theme::Theme;
use crate::types::{Snapshot, TaskFilters};

const HEADER_HEIGHT: u16 = 6;

pub fn render(frame: &mut Frame<'_>, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(HEADER_HEIGHT),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, chunks[0], app);
    render_chart(frame, chunks[1], app);
    render_footer(frame, chunks[2], app);
}

fn render_header(frame: &mut Frame<'_>, area: Rect, app: &App) {
    let theme = app.theme();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.base.border))
        .title(Span::styled(
            " social-analytics ",
            Style::default().fg(theme.base.header),
        ))
        .title_alignment(Alignment::Left);

    let lines = match app.snapshot() {
        Some(snapshot) => header_lines(snapshot, theme),
        None => vec![Line::from(Span::styled(
            loading_label(app.poll_state()),
            Style::default().fg(theme.base.text_muted),
        ))],
    };

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn header_lines(snapshot: &Snapshot, theme: &Theme) -> Vec<Line<'static>> {
    let task = &snapshot.task;
    let muted = Style::default().fg(theme.base.text_muted);
    let text = Style::default().fg(theme.base.text);

    let mut timestamps = vec![
        Span::styled("created ", muted),
        Span::styled(format_timestamp(task.created_at), text),
    ];
    if let Some(completed_at) = task.completed_at {
        timestamps.push(Span::styled("  completed ", muted));
        timestamps.push(Span::styled(format_timestamp(completed_at), text));
    }

    vec![
        Line::from(vec![
            Span::styled(
                format!("#{} {}", task.id, task.name),
                text.add_modifier(Modifier::BOLD),
            ),
            Span::raw("  "),
            Span::styled(
                format!("[ {} ]", task.status),
                Style::default()
                    .fg(theme.status_color(task.status))
                    .add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(timestamps),
        Line::from(vec![
            Span::styled("range ", muted),
            Span::styled(format_date_range(&task.filters), text),
            Span::styled("  platforms ", muted),
            Span::styled(format_set(&task.filters.platforms, ""), text),
            Span::styled("  hashtags ", muted),
            Span::styled(format_set(&task.filters.hashtags, "#"), text),
        ]),
        Line::from(vec![
            Span::styled("posts ", muted),
            Span::styled(snapshot.analytics.total_posts.to_string(), text),
            Span::styled("  engagement ", muted),
            Span::styled(snapshot.analytics.total_engagement.to_string(), text),
        ]),
    ]
}

fn render_chart(frame: &mut Frame<'_>, area: Rect, app: &App) {
    let theme = app.theme();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.base.border))
        .title(" hashtags ");

    let (Some(snapshot), Some(geometry)) = (app.snapshot(), app.geometry()) else {
        frame.render_widget(block, area);
        return;
    };

    let inner = block.inner(area);
    let cell_width = geometry.layout.width / f64::from(inner.width.max(1));
    let cell_height = geometry.layout.height / f64::from(inner.height.max(1));
    let bar_color = theme.bar_color(snapshot.task.status);
    let theme = *theme;

    let canvas = Canvas::default()
        .block(block)
        .marker(Marker::Block)
        .x_bounds([0.0, geometry.layout.width])
        .y_bounds([0.0, geometry.layout.height])
        .paint(move |ctx| {
            paint_bars(ctx, geometry, bar_color, cell_width);
            ctx.layer();
            paint_axes(ctx, geometry, &theme, cell_width, cell_height);
        });

    frame.render_widget(canvas, area);
}

/// Canvas space has its origin at the bottom-left; chart geometry at the top-left.
fn flip(geometry: &ChartGeometry, y: f64) -> f64 {
    geometry.layout.height - y
}

fn paint_bars(ctx: &mut Context<'_>, geometry: &ChartGeometry, color: Color, cell_width: f64) {
    let step = (cell_width / 2.0).max(0.5);
    for bar in &geometry.bars {
        let bottom = flip(geometry, bar.y + bar.height);
        let top = flip(geometry, bar.y);
        let mut x = bar.x;
        while x <= bar.x + bar.width {
            ctx.draw(&CanvasLine::new(x, bottom, x, top, color));
            x += step;
        }
    }
}

fn paint_axes(
    ctx: &mut Context<'_>,
    geometry: &ChartGeometry,
    theme: &Theme,
    cell_width: f64,
    cell_height: f64,
) {
    let axis_style = Style::default().fg(theme.chart.axis);
    let label_style = Style::default().fg(theme.chart.label);

    let baseline = flip(geometry, geometry.x_axis.offset);
    let (x_start, x_end) = geometry.x_axis.range;
    ctx.draw(&CanvasLine::new(
        x_start,
        baseline,
        x_end,
        baseline,
        theme.chart.axis,
    ));

    let axis_x = geometry.y_axis.offset;
    let (y_start, y_end) = geometry.y_axis.range;
    ctx.draw(&CanvasLine::new(
        axis_x,
        flip(geometry, y_start),
        axis_x,
        flip(geometry, y_end),
        theme.chart.axis,
    ));

    let band_cells = match geometry.bars.first() {
        Some(bar) => (bar.width / cell_width).floor() as usize,
        None => 0,
    };
    for tick in &geometry.x_axis.ticks {
        let label = truncate_label(&tick.label, band_cells.max(1));
        let half_width = label.chars().count() as f64 * cell_width / 2.0;
        ctx.print(
            tick.position - half_width,
            baseline - cell_height,
            Span::styled(label, label_style),
        );
    }

    for tick in &geometry.y_axis.ticks {
        let width = (tick.label.chars().count() + 1) as f64 * cell_width;
        ctx.print(
            axis_x - width,
            flip(geometry, tick.position),
            Span::styled(tick.label.clone(), axis_style),
        );
    }

    if geometry.is_empty() {
        let message = "no hashtags yet";
        let (left, right) = geometry.x_axis.range;
        let middle = (left + right) / 2.0 - message.len() as f64 * cell_width / 2.0;
        ctx.print(
            middle,
            geometry.layout.height / 2.0,
            Span::styled(message, Style::default().fg(theme.base.text_muted)),
        );
    }
}

fn render_footer(frame: &mut Frame<'_>, area: Rect, app: &App) {
    let theme = app.theme();
    let mut spans = vec![Span::styled(
        format!(" {} ", poll_label(app.poll_state(), app.poll_interval_secs())),
        Style::default().fg(theme.base.header),
    )];

    let failures = app.failure_count();
    if failures > 0 {
        spans.push(Span::styled(
            format!(" {} ", staleness_hint(failures)),
            Style::default().fg(theme.base.danger),
        ));
    }

    spans.push(Span::styled(
        " r: refresh  q: quit ",
        Style::default().fg(theme.base.text_muted),
    ));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn loading_label(state: PollState) -> String {
    match state.task_id() {
        Some(task_id) => format!("loading task {task_id}..."),
        None => "no task selected".to_string(),
    }
}

pub fn poll_label(state: PollState, interval_secs: f64) -> String {
    match state {
        PollState::Idle => "idle".to_string(),
        PollState::Polling { .. } => format!("live · every {}s", format_seconds(interval_secs)),
        PollState::Stopped {
            reason: StopReason::Terminal(status),
            ..
        } => format!("stopped · {status}"),
        PollState::Stopped {
            reason: StopReason::TornDown,
            ..
        } => "stopped".to_string(),
    }
}

fn staleness_hint(failures: u32) -> String {
    match failures {
        1 => "1 failed refresh, showing last good data".to_string(),
        n => format!("{n} failed refreshes, showing last good data"),
    }
}

fn format_seconds(secs: f64) -> String {
    if secs.fract() == 0.0 {
        format!("{}", secs as u64)
    } else {
        format!("{secs:.1}")
    }
}

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%d %b %Y %H:%M UTC").to_string()
}

fn format_date(date: NaiveDate) -> String {
    date.format("%d %b %Y").to_string()
}

pub fn format_date_range(filters: &TaskFilters) -> String {
    match (filters.start(), filters.end()) {
        (Some(start), Some(end)) => format!("{} to {}", format_date(start), format_date(end)),
        (Some(start), None) => format!("from {}", format_date(start)),
        (None, Some(end)) => format!("until {}", format_date(end)),
        (None, None) => "all time".to_string(),
    }
}

pub fn format_set<'a>(values: impl IntoIterator<Item = &'a String>, prefix: &str) -> String {
    let joined = values
        .into_iter()
        .map(|value| format!("{prefix}{value}"))
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        "any".to_string()
    } else {
        joined
    }
}

fn truncate_label(label: &str, max_chars: usize) -> String {
    if label.chars().count() <= max_chars {
        return label.to_string();
    }
    if max_chars <= 1 {
        return label.chars().take(max_chars).collect();
    }
    let mut truncated = label.chars().take(max_chars - 1).collect::<String>();
    truncated.push('~');
    truncated
}
