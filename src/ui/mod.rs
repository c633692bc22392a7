pub mod app;
pub mod format;
pub mod notifications;
pub mod terminal;
pub mod views;

pub use app::{App, InputMode, View};
pub use notifications::{Notification, NotificationLevel};
pub use terminal::{init as init_terminal, restore as restore_terminal, Tui};

use crate::sync::{Conversation, Directory};
use crate::ui::views::login::LoginStep;
use ratatui::{
    layout::{Constraint, Layout},
    style::{Color, Style},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

/// Everything the chat view needs to draw a frame.
pub struct ChatContext<'a> {
    pub directory: &'a Directory,
    pub conversation: &'a Conversation,
}

pub fn render(f: &mut Frame, app: &App, login_step: &LoginStep, chat: Option<ChatContext>) {
    let chunks = Layout::vertical([
        Constraint::Length(2),
        Constraint::Min(0),
        Constraint::Length(2),
    ])
    .split(f.area());

    // Header
    let title = match app.view {
        View::Login => "duochat — Sign in",
        View::Chat => "duochat — Chats",
    };
    let header = Paragraph::new(title)
        .style(Style::default().fg(Color::Cyan))
        .block(Block::default().borders(Borders::BOTTOM));
    f.render_widget(header, chunks[0]);

    // Main content
    match (&app.view, chat) {
        (View::Login, _) | (_, None) => views::login::render_login(f, app, chunks[1], login_step),
        (View::Chat, Some(chat)) => views::chat::render_chat(f, app, chunks[1], &chat),
    }

    // Footer: an active toast wins over the key hints.
    let footer = if let Some(notification) = &app.notification {
        Paragraph::new(format!("{} {}", notification.level.icon(), notification.message))
            .style(Style::default().fg(notification.level.color()))
    } else {
        let hints = match (&app.view, &app.input_mode) {
            (View::Login, _) => "Enter submit · Ctrl+C quit",
            (View::Chat, InputMode::Editing) => "Esc cancel · Enter send",
            (View::Chat, InputMode::Normal) => {
                "↑/↓ users · Enter open · i type · Esc close · L logout · q quit"
            }
        };
        Paragraph::new(hints).style(Style::default().fg(Color::DarkGray))
    };
    f.render_widget(footer.block(Block::default().borders(Borders::TOP)), chunks[2]);
}

/// Splash drawn while the stored session is being restored.
pub fn render_connecting(f: &mut Frame) {
    let connecting = Paragraph::new("Connecting…")
        .style(Style::default().fg(Color::DarkGray))
        .alignment(ratatui::layout::Alignment::Center);
    let chunks = Layout::vertical([
        Constraint::Percentage(50),
        Constraint::Length(1),
        Constraint::Min(0),
    ])
    .split(f.area());
    f.render_widget(connecting, chunks[1]);
}
