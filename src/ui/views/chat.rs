use crate::models::{Message, Presence, Profile};
use crate::ui::format::relative_time;
use crate::ui::{App, ChatContext, InputMode};
use chrono::Utc;
use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};

pub fn render_chat(f: &mut Frame, app: &App, area: Rect, ctx: &ChatContext) {
    let chunks =
        Layout::horizontal([Constraint::Percentage(30), Constraint::Percentage(70)]).split(area);

    render_sidebar(f, app, chunks[0], ctx);

    match ctx.conversation.peer() {
        Some(peer_id) => render_thread(f, app, chunks[1], ctx, peer_id),
        None => render_placeholder(f, chunks[1]),
    }
}

fn presence_dot(status: Presence) -> Span<'static> {
    let color = match status {
        Presence::Online => Color::Green,
        Presence::Offline => Color::DarkGray,
    };
    Span::styled("● ", Style::default().fg(color))
}

fn render_sidebar(f: &mut Frame, app: &App, area: Rect, ctx: &ChatContext) {
    let others = ctx.directory.others();

    if others.is_empty() {
        let empty = Paragraph::new("No users available")
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::RIGHT));
        f.render_widget(empty, area);
        return;
    }

    let items: Vec<ListItem> = others
        .iter()
        .map(|user| {
            let name_line = Line::from(vec![
                presence_dot(user.status),
                Span::styled(user.username.clone(), Style::default().add_modifier(Modifier::BOLD)),
            ]);
            let status_line = Line::from(Span::styled(
                format!("  {}", user.status),
                Style::default().fg(Color::DarkGray),
            ));
            ListItem::new(Text::from(vec![name_line, status_line]))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::RIGHT))
        .highlight_style(Style::default().bg(Color::Rgb(40, 40, 60)));

    let mut state = ListState::default();
    state.select(Some(app.selected_index.min(others.len() - 1)));
    f.render_stateful_widget(list, area, &mut state);
}

fn render_thread(f: &mut Frame, app: &App, area: Rect, ctx: &ChatContext, peer_id: crate::models::UserId) {
    let chunks = Layout::vertical([
        Constraint::Length(2),
        Constraint::Min(1),
        Constraint::Length(3),
    ])
    .split(area);

    render_header(f, chunks[0], ctx.directory.get(peer_id));
    render_messages(f, chunks[1], ctx);
    render_input_bar(f, app, chunks[2]);
}

fn render_header(f: &mut Frame, area: Rect, peer: Option<&Profile>) {
    let line = match peer {
        Some(peer) => {
            let presence = match peer.status {
                Presence::Online => "Online".to_string(),
                Presence::Offline => {
                    format!("Last seen {}", relative_time(peer.last_seen, Utc::now()))
                }
            };
            Line::from(vec![
                presence_dot(peer.status),
                Span::styled(
                    peer.username.clone(),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                Span::styled(format!("  {presence}"), Style::default().fg(Color::DarkGray)),
            ])
        }
        None => Line::from("unknown user"),
    };
    let header = Paragraph::new(line).block(Block::default().borders(Borders::BOTTOM));
    f.render_widget(header, area);
}

fn render_messages(f: &mut Frame, area: Rect, ctx: &ChatContext) {
    let lines: Vec<Line> = ctx
        .conversation
        .messages()
        .iter()
        .map(|m| message_line(m, ctx.conversation.is_sent(m)))
        .collect();

    // Always show the tail of the thread.
    let visible = area.height as usize;
    let skip = lines.len().saturating_sub(visible);
    let paragraph = Paragraph::new(lines[skip..].to_vec());
    f.render_widget(paragraph, area);
}

fn message_line(message: &Message, is_sent: bool) -> Line<'static> {
    let stamp = message
        .created_at
        .with_timezone(&chrono::Local)
        .format("%H:%M");
    let content_style = if is_sent {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::White)
    };
    let line = Line::from(vec![
        Span::styled(message.content.clone(), content_style),
        Span::styled(format!("  {stamp}"), Style::default().fg(Color::DarkGray)),
    ]);
    if is_sent {
        line.right_aligned()
    } else {
        line.left_aligned()
    }
}

fn render_input_bar(f: &mut Frame, app: &App, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let border_style = if editing {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let input = Paragraph::new(app.input.as_str()).style(border_style).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(if editing {
                "Editing (Esc to cancel, Enter to send)"
            } else {
                "Press 'i' to type a message"
            }),
    );
    f.render_widget(input, area);
}

fn render_placeholder(f: &mut Frame, area: Rect) {
    let chunks = Layout::vertical([
        Constraint::Percentage(45),
        Constraint::Length(2),
        Constraint::Min(0),
    ])
    .split(area);
    let placeholder = Paragraph::new(Text::from(vec![
        Line::from(Span::styled(
            "Select a chat",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            "Choose a user to start messaging",
            Style::default().fg(Color::DarkGray),
        )),
    ]))
    .alignment(Alignment::Center);
    f.render_widget(placeholder, chunks[1]);
}
