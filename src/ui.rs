use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use commandr_core::Severity;
use crate::app::{App, LineKind};

const SIDEBAR_WIDTH: u16 = 28;

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Info => Color::Blue,
        Severity::Success => Color::Green,
        Severity::Warning => Color::Yellow,
        Severity::Error => Color::Red,
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    let [sidebar_area, chat_column] = Layout::horizontal([
        Constraint::Length(SIDEBAR_WIDTH),
        Constraint::Min(0),
    ])
    .areas(body_area);

    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(chat_column);

    render_header(app, frame, header_area);
    render_conversations(app, frame, sidebar_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let settings = app.controller.settings();
    let key = match app.key_source {
        Some(source) => format!(" key: {} ", source),
        None => " no key ".to_string(),
    };

    let title = Line::from(vec![
        Span::styled(" commandr ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!(
                " {} | temp {:.1} | {} ",
                settings.model,
                settings.temperature,
                if settings.streaming { "stream" } else { "single" }
            ),
            Style::default().fg(Color::White),
        ),
        Span::styled(key, Style::default().fg(Color::Gray)),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_conversations(app: &App, frame: &mut Frame, area: Rect) {
    let conversations = app.controller.conversations();
    let active = app.controller.active_conversation();

    let items: Vec<ListItem> = conversations
        .iter()
        .map(|c| {
            let busy = if app.controller.is_busy(c.id) { "* " } else { "  " };
            ListItem::new(format!("{}{} ({})", busy, c.title, c.message_count))
        })
        .collect();

    let mut state = ListState::default();
    state.select(conversations.iter().position(|c| Some(c.id) == active));

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray))
                .title(" Conversations "),
        )
        .highlight_style(
            Style::default()
                .bg(Color::Cyan)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        );

    frame.render_stateful_widget(list, area, &mut state);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let title = app
        .active_title()
        .map(|t| format!(" {} ", t))
        .unwrap_or_else(|| " Chat ".to_string());
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(title);

    let busy = app.is_busy();
    let text = if app.chat_lines.is_empty() && !busy {
        Text::from(Span::styled(
            "Ask anything, or say \"schedule a meeting tomorrow at 2pm\"...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();
        for line in &app.chat_lines {
            let (label, style) = match line.kind {
                LineKind::User => ("You:", Style::default().fg(Color::Cyan)),
                LineKind::Assistant => ("AI:", Style::default().fg(Color::Yellow)),
                LineKind::Notice(severity) => ("!", Style::default().fg(severity_color(severity))),
            };
            lines.push(Line::from(Span::styled(label, style.add_modifier(Modifier::BOLD))));
            for text in line.content.lines() {
                match line.kind {
                    LineKind::Notice(_) => lines.push(Line::from(Span::styled(text.to_string(), style))),
                    _ => lines.push(Line::from(text.to_string())),
                }
            }
            lines.push(Line::default());
        }

        if busy {
            let dots = ".".repeat(app.animation_frame as usize + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }
        Text::from(lines)
    };

    let chat = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.scroll, 0));
    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Message (Enter to send) ");

    // Scroll horizontally to keep the cursor visible
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width > 0 && app.cursor >= inner_width {
        app.cursor - inner_width + 1
    } else {
        0
    };
    let visible: String = app
        .input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    frame.render_widget(
        Paragraph::new(visible)
            .style(Style::default().fg(Color::Cyan))
            .block(block),
        area,
    );

    let cursor_x = (app.cursor - scroll_offset) as u16;
    frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let [status_area, hints_area] = Layout::horizontal([
        Constraint::Percentage(40),
        Constraint::Percentage(60),
    ])
    .areas(area);

    let status = match &app.status {
        Some(status) => Span::styled(
            format!(" {} ", status.text),
            Style::default().fg(severity_color(status.severity)),
        ),
        None => Span::styled(" Ready ", Style::default().fg(Color::DarkGray)),
    };
    frame.render_widget(Paragraph::new(Line::from(status)), status_area);

    let hints: Vec<Span> = [
        ("^N", "new"),
        ("Tab", "switch"),
        ("^T", "stream"),
        ("^↑↓", "temp"),
        ("Esc", "cancel"),
        ("^K", "clear"),
        ("^C", "quit"),
    ]
    .iter()
    .flat_map(|(key, label)| {
        [
            Span::styled(format!(" {} ", key), key_style),
            Span::styled(format!(" {} ", label), label_style),
        ]
    })
    .collect();
    frame.render_widget(Paragraph::new(Line::from(hints)), hints_area);
}
