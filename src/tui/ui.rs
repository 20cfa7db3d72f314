use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

use super::app::{App, Focus, LinkState, Notification};

/// Accent colour used throughout.
const TEAL: Color = Color::Rgb(0x26, 0xA6, 0x9A);

pub fn draw(frame: &mut Frame, app: &App) {
    let area = frame.area();

    let block = Block::default()
        .title(" Meshtastic Console ")
        .title_bottom(Line::from(status_spans(app)))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(match app.link {
            LinkState::Connected => Color::Green,
            LinkState::Connecting => Color::Yellow,
            LinkState::Disconnected => Color::Red,
        }));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    // Layout: connection + messaging, device settings, console log, help bar.
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // serial connection | messaging
            Constraint::Length(4), // device settings
            Constraint::Min(3),    // console log
            Constraint::Length(1), // help bar
        ])
        .split(inner);

    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(chunks[0]);

    render_port_panel(frame, app, top[0]);
    render_message_panel(frame, app, top[1]);
    render_settings_panel(frame, app, chunks[1]);
    render_console_log(frame, app, chunks[2]);
    frame.render_widget(Paragraph::new(render_help(app)), chunks[3]);

    if let Some(notification) = &app.notification {
        render_notification(frame, notification, area);
    }
}

fn status_spans(app: &App) -> Vec<Span<'static>> {
    let port = app.link_port.clone().unwrap_or_default();
    let (text, color) = match app.link {
        LinkState::Connected => (format!(" Connected to {port} "), Color::Green),
        LinkState::Connecting => (format!(" Connecting to {port}... "), Color::Yellow),
        LinkState::Disconnected => (" Disconnected ".to_string(), Color::Red),
    };
    let mut spans = vec![Span::styled(text, Style::default().fg(color))];

    let dropped = app.inbound_dropped();
    if dropped > 0 {
        spans.push(Span::styled(
            format!(" {dropped} inbound dropped "),
            Style::default().fg(Color::Red),
        ));
    }
    spans
}

fn panel(title: &'static str, focused: bool) -> Block<'static> {
    let style = if focused {
        Style::default().fg(TEAL).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Block::default()
        .title(format!(" {title} "))
        .borders(Borders::ALL)
        .border_style(style)
}

fn render_port_panel(frame: &mut Frame, app: &App, area: Rect) {
    let focused = app.focus == Focus::Port;
    let block = panel("Serial Connection", focused);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let port = app.selected_port().unwrap_or("Select port");
    let arrow = Style::default().fg(if focused { TEAL } else { Color::DarkGray });
    let line = Line::from(vec![
        Span::raw(" Port: "),
        Span::styled("\u{25C0} ", arrow),
        Span::styled(
            format!("{port:<14}"),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        Span::styled(" \u{25B6}", arrow),
        Span::styled(
            format!("  ({} found)", app.ports.len()),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    frame.render_widget(Paragraph::new(line), inner);
}

fn render_message_panel(frame: &mut Frame, app: &App, area: Rect) {
    let focused = app.focus == Focus::Message;
    let block = panel("Messaging", focused);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let line = if app.message_input.is_empty() && !focused {
        Line::from(Span::styled(
            " Enter message...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Line::from(vec![Span::raw(" "), Span::raw(app.message_input.clone())])
    };
    frame.render_widget(Paragraph::new(line), inner);

    if focused && app.notification.is_none() {
        place_cursor(frame, inner, 1 + app.message_input.chars().count(), 0);
    }
}

fn render_settings_panel(frame: &mut Frame, app: &App, area: Rect) {
    let focused = matches!(app.focus, Focus::LongName | Focus::ShortName);
    let block = panel("Device Settings", focused);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let label = |field: Focus, text: &'static str| {
        let style = if app.focus == field {
            Style::default().fg(TEAL).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        };
        Span::styled(text, style)
    };
    let short_len = app.short_name_input.trim().chars().count();
    let short_hint = if short_len == 4 || short_len == 0 {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::Yellow)
    };

    let lines = vec![
        Line::from(vec![
            label(Focus::LongName, " Long Name:  "),
            Span::raw(app.long_name_input.clone()),
        ]),
        Line::from(vec![
            label(Focus::ShortName, " Short Name: "),
            Span::raw(app.short_name_input.clone()),
            Span::styled(format!("  {short_len}/4"), short_hint),
        ]),
    ];
    frame.render_widget(Paragraph::new(lines), inner);

    if app.notification.is_none() {
        match app.focus {
            Focus::LongName => {
                place_cursor(frame, inner, 13 + app.long_name_input.chars().count(), 0)
            }
            Focus::ShortName => {
                place_cursor(frame, inner, 13 + app.short_name_input.chars().count(), 1)
            }
            _ => {}
        }
    }
}

fn place_cursor(frame: &mut Frame, inner: Rect, col: usize, row: u16) {
    if inner.width == 0 || row >= inner.height {
        return;
    }
    let col = (col as u16).min(inner.width - 1);
    frame.set_cursor_position((inner.x + col, inner.y + row));
}

/// Colour for a console line, picked from its shape.
fn line_color(line: &str) -> Color {
    if line.contains("] < ") {
        Color::Cyan
    } else if line.contains("] > You: ") {
        Color::Green
    } else {
        let lower = line.to_lowercase();
        if ["failed", "error", "lost"].iter().any(|w| lower.contains(w)) {
            Color::Red
        } else {
            TEAL
        }
    }
}

/// Indices of the log lines that fit in `height` rows, `scroll_back` lines
/// up from the tail.
fn visible_range(total: usize, height: usize, scroll_back: usize) -> (usize, usize) {
    let end = total.saturating_sub(scroll_back);
    let start = end.saturating_sub(height);
    (start, end)
}

fn render_console_log(frame: &mut Frame, app: &App, area: Rect) {
    let title = if app.scroll_back > 0 {
        format!(" Console Log (-{}) ", app.scroll_back)
    } else {
        " Console Log ".to_string()
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if app.log.is_empty() {
        frame.render_widget(
            Paragraph::new(Span::styled(
                " Console output...",
                Style::default().fg(Color::DarkGray),
            )),
            inner,
        );
        return;
    }

    let (start, end) = visible_range(app.log.len(), inner.height as usize, app.scroll_back);
    let lines: Vec<Line<'static>> = app.log.lines()[start..end]
        .iter()
        .map(|line| {
            Line::from(Span::styled(
                format!(" {line}"),
                Style::default().fg(line_color(line)),
            ))
        })
        .collect();

    frame.render_widget(Paragraph::new(lines), inner);
}

fn render_help(app: &App) -> Line<'static> {
    let help_text = if app.notification.is_some() {
        "  Enter/Esc dismiss  Ctrl-C quit"
    } else {
        match app.focus {
            Focus::Port => {
                "  \u{2190}\u{2192} port  [R]efresh  Enter/[C]onnect  [D]isconnect  Tab next  PgUp/PgDn scroll  [Q]uit"
            }
            Focus::Message => "  type message  Enter send  Tab next  PgUp/PgDn scroll  Ctrl-C quit",
            Focus::LongName | Focus::ShortName => {
                "  type name  Enter apply  Tab next  PgUp/PgDn scroll  Ctrl-C quit"
            }
        }
    };

    Line::from(Span::styled(help_text, Style::default().fg(Color::Magenta)))
}

/// A rectangle of `width` x `height` centred in `area`, clamped to fit.
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn render_notification(frame: &mut Frame, notification: &Notification, area: Rect) {
    let width = (notification.message.chars().count() as u16 + 6).clamp(30, 70);
    let popup = centered(area, width, 5);

    let block = Block::default()
        .title(format!(" {} ", notification.title))
        .title_bottom(" Enter/Esc ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red).add_modifier(Modifier::BOLD));
    let body = Paragraph::new(Line::from(Span::styled(
        notification.message.clone(),
        Style::default().fg(Color::White),
    )))
    .block(block)
    .wrap(Wrap { trim: true });

    frame.render_widget(Clear, popup);
    frame.render_widget(body, popup);
}
