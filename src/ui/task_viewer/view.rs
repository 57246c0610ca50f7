use chrono::{DateTime, Utc};
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;

use crate::filter::StatusFilter;
use crate::task::{Priority, Task};

use super::app::{AppState, DeleteConfirmState, InputMode, StatusKind, Theme};

const CATEGORY_WIDTH: usize = 9;
const PRIORITY_WIDTH: usize = 4;
const DUE_WIDTH: usize = 12;
const NOTIFICATION_PANEL_WIDTH: u16 = 44;

/// Colors for one theme.
struct Palette {
    text: Color,
    muted: Color,
    border: Color,
    info: Color,
    warning: Color,
    error: Color,
    success: Color,
    accent: Color,
}

fn palette(theme: Theme) -> Palette {
    match theme {
        Theme::Dark => Palette {
            text: Color::Rgb(234, 236, 239),
            muted: Color::Rgb(118, 124, 130),
            border: Color::Rgb(92, 126, 166),
            info: Color::Rgb(116, 198, 219),
            warning: Color::Rgb(244, 200, 98),
            error: Color::Rgb(255, 107, 107),
            success: Color::Rgb(126, 210, 146),
            accent: Color::Rgb(122, 170, 255),
        },
        Theme::Light => Palette {
            text: Color::Rgb(33, 37, 41),
            muted: Color::Rgb(108, 117, 125),
            border: Color::Rgb(73, 80, 87),
            info: Color::Rgb(13, 110, 253),
            warning: Color::Rgb(176, 112, 0),
            error: Color::Rgb(200, 35, 51),
            success: Color::Rgb(25, 135, 84),
            accent: Color::Rgb(111, 66, 193),
        },
    }
}

pub fn render(frame: &mut Frame, app: &AppState) {
    let colors = palette(app.theme);
    let area = frame.size();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(2),
                Constraint::Min(0),
                Constraint::Length(3),
            ]
            .as_ref(),
        )
        .split(area);

    render_tabs(frame, app, &colors, chunks[0]);

    if app.show_notifications {
        let main = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(
                [
                    Constraint::Min(0),
                    Constraint::Length(NOTIFICATION_PANEL_WIDTH),
                ]
                .as_ref(),
            )
            .split(chunks[1]);
        render_list(frame, app, &colors, main[0]);
        render_notifications(frame, app, &colors, main[1]);
    } else {
        render_list(frame, app, &colors, chunks[1]);
    }

    render_footer(frame, app, &colors, chunks[2]);

    if let Some(state) = app.delete_confirm.as_ref() {
        render_delete_confirm_modal(frame, &colors, area, state);
    }
}

fn render_tabs(frame: &mut Frame, app: &AppState, colors: &Palette, area: Rect) {
    let counts = app.tab_counts();
    let active = app.session.filters().state().status;

    let mut spans = Vec::new();
    for (idx, status) in StatusFilter::ALL.into_iter().enumerate() {
        if idx > 0 {
            spans.push(Span::styled("  ", Style::default().fg(colors.muted)));
        }
        let text = format!("{} {} ({})", idx + 1, tab_label(status), counts.get(status));
        let style = if status == active {
            Style::default()
                .fg(colors.info)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(colors.muted)
        };
        spans.push(Span::styled(text, style));
    }

    let alerts = app.session.notifications().len();
    spans.push(Span::raw("   "));
    if alerts > 0 {
        spans.push(Span::styled(
            format!("! {alerts}"),
            Style::default()
                .fg(colors.warning)
                .add_modifier(Modifier::BOLD),
        ));
    } else {
        spans.push(Span::styled("no alerts", Style::default().fg(colors.muted)));
    }

    let widget = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::BOTTOM)
            .border_style(Style::default().fg(colors.border)),
    );
    frame.render_widget(widget, area);
}

fn render_list(frame: &mut Frame, app: &AppState, colors: &Palette, area: Rect) {
    let content_width = area.width.saturating_sub(2) as usize;
    let page = app.current_page();
    let notifications = app.session.notifications();

    let mut lines = Vec::new();
    lines.push(Line::from(Span::styled(
        app.filter_summary(),
        Style::default().fg(colors.accent),
    )));
    match app.mode {
        InputMode::Search => lines.push(prompt_line("search: ", &app.input, colors)),
        InputMode::AddTitle => lines.push(prompt_line("new task: ", &app.input, colors)),
        InputMode::Move => lines.push(Line::from(Span::styled(
            "moving: j/k to carry the task, enter to drop",
            Style::default().fg(colors.warning),
        ))),
        InputMode::Normal => {}
    }
    lines.push(Line::from(""));

    if page.items.is_empty() {
        let empty = if app.session.tasks().is_empty() {
            "No tasks"
        } else {
            "No matches"
        };
        lines.push(Line::from(Span::styled(empty, Style::default().fg(colors.muted))));
    }
    for (idx, task) in page.items.iter().enumerate() {
        lines.push(render_list_row(
            task,
            idx == app.selected,
            notifications.contains(&task.id),
            app.mode == InputMode::Move,
            content_width,
            colors,
        ));
    }

    let title = format!("Tasks  page {}/{}", page.number, page.total_pages);
    let widget = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(Style::default().fg(colors.border)),
        )
        .wrap(Wrap { trim: true });
    frame.render_widget(widget, area);
}

fn render_notifications(frame: &mut Frame, app: &AppState, colors: &Palette, area: Rect) {
    let messages = app.notification_messages();
    let lines: Vec<Line<'static>> = if messages.is_empty() {
        vec![Line::from(Span::styled(
            "Nothing due soon",
            Style::default().fg(colors.muted),
        ))]
    } else {
        messages
            .into_iter()
            .map(|message| Line::from(Span::styled(message, Style::default().fg(colors.warning))))
            .collect()
    };
    let widget = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Due soon")
                .border_style(Style::default().fg(colors.warning)),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(widget, area);
}

fn render_footer(frame: &mut Frame, app: &AppState, colors: &Palette, area: Rect) {
    let hint_span = Span::styled(app.footer_hint(), Style::default().fg(colors.info));
    let status = match app.status_line() {
        Some((message, StatusKind::Error)) => Line::from(Span::styled(
            message,
            Style::default()
                .fg(colors.error)
                .add_modifier(Modifier::BOLD),
        )),
        Some((message, StatusKind::Info)) => {
            Line::from(Span::styled(message, Style::default().fg(colors.success)))
        }
        None => Line::from(""),
    };
    let widget = Paragraph::new(vec![Line::from(hint_span), status])
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::TOP)
                .border_style(Style::default().fg(colors.border)),
        );
    frame.render_widget(widget, area);
}

fn render_delete_confirm_modal(
    frame: &mut Frame,
    colors: &Palette,
    area: Rect,
    state: &DeleteConfirmState,
) {
    let content_width = area.width.saturating_sub(8).min(60);
    let modal = centered_rect(content_width, 7, area);
    frame.render_widget(Clear, modal);

    let title_width = (content_width as usize).saturating_sub(4);
    let lines = vec![
        Line::from(Span::styled(
            "Delete task?",
            Style::default()
                .fg(colors.error)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            truncate_text(&state.title, title_width),
            Style::default().fg(colors.text),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "y/enter confirm  esc/n cancel",
            Style::default().fg(colors.muted),
        )),
    ];

    let widget = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Delete Task"))
        .wrap(Wrap { trim: true });
    frame.render_widget(widget, modal);
}

fn render_list_row(
    task: &Task,
    selected: bool,
    due_soon: bool,
    moving: bool,
    width: usize,
    colors: &Palette,
) -> Line<'static> {
    let check = if task.completed { "[x]" } else { "[ ]" };
    let due_text = task
        .due_date
        .map(format_due)
        .unwrap_or_default();
    let used = 3 + 1 + PRIORITY_WIDTH + 1 + CATEGORY_WIDTH + 1 + DUE_WIDTH + 1 + 2;
    let title = truncate_text(&task.title, width.saturating_sub(used));

    let title_style = if task.completed {
        Style::default()
            .fg(colors.muted)
            .add_modifier(Modifier::CROSSED_OUT)
    } else {
        Style::default().fg(colors.text)
    };
    let mut spans = vec![
        Span::styled(check, Style::default().fg(colors.success)),
        Span::raw(" "),
        Span::styled(
            pad_text(priority_label(task.priority), PRIORITY_WIDTH),
            Style::default()
                .fg(priority_color(task.priority, colors))
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(
            pad_text(task.category.as_str(), CATEGORY_WIDTH),
            Style::default().fg(colors.accent),
        ),
        Span::raw(" "),
        Span::styled(pad_text(&due_text, DUE_WIDTH), Style::default().fg(colors.muted)),
        Span::raw(" "),
        Span::styled(title, title_style),
    ];
    if due_soon {
        spans.push(Span::styled(
            " !",
            Style::default()
                .fg(colors.warning)
                .add_modifier(Modifier::BOLD),
        ));
    }

    if selected {
        let marker = if moving { Modifier::SLOW_BLINK } else { Modifier::empty() };
        for span in &mut spans {
            span.style = span.style.add_modifier(Modifier::REVERSED | marker);
        }
    }

    Line::from(spans)
}

fn prompt_line(label: &str, value: &str, colors: &Palette) -> Line<'static> {
    Line::from(vec![
        Span::styled(label.to_string(), Style::default().fg(colors.info)),
        Span::styled(value.to_string(), Style::default().fg(colors.text)),
        Span::styled(" ", Style::default().add_modifier(Modifier::REVERSED)),
    ])
}

fn tab_label(status: StatusFilter) -> &'static str {
    match status {
        StatusFilter::All => "All",
        StatusFilter::Incomplete => "Incomplete",
        StatusFilter::Completed => "Completed",
        StatusFilter::DueSoon => "Due soon",
    }
}

fn priority_label(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "HIGH",
        Priority::Medium => "MED",
        Priority::Low => "LOW",
    }
}

fn priority_color(priority: Priority, colors: &Palette) -> Color {
    match priority {
        Priority::High => colors.error,
        Priority::Medium => colors.warning,
        Priority::Low => colors.muted,
    }
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width.saturating_sub(2));
    let height = height.min(area.height.saturating_sub(2));
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

fn pad_text(value: &str, width: usize) -> String {
    let text = truncate_text(value, width);
    format!("{text:width$}")
}

fn truncate_text(value: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= max {
        return value.to_string();
    }
    if max <= 3 {
        return chars[..max].iter().collect();
    }
    let mut out: String = chars[..(max - 3)].iter().collect();
    out.push_str("...");
    out
}

fn format_due(value: DateTime<Utc>) -> String {
    value.format("%b %d %H:%M").to_string()
}
