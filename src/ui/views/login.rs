use crate::ui::App;
use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Style},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

#[derive(Debug, Clone, PartialEq)]
pub enum LoginStep {
    Email,
    Password,
}

pub fn render_login(f: &mut Frame, app: &App, area: Rect, login_step: &LoginStep) {
    let chunks = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Min(0),
    ])
    .split(area);

    let instructions = match login_step {
        LoginStep::Email => "Enter your email address:",
        LoginStep::Password => "Enter your password:",
    };
    let instruction_widget = Paragraph::new(instructions)
        .style(Style::default().fg(Color::White))
        .alignment(Alignment::Center);
    f.render_widget(instruction_widget, chunks[0]);

    let display_text = if *login_step == LoginStep::Password {
        "*".repeat(app.input.chars().count())
    } else {
        app.input.clone()
    };
    let input_widget = Paragraph::new(display_text)
        .style(Style::default().fg(Color::Yellow))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow))
                .title("Enter to submit"),
        );
    f.render_widget(input_widget, chunks[1]);

    if let Some(ref msg) = app.login_error {
        let status = Paragraph::new(msg.as_str())
            .style(Style::default().fg(Color::Red))
            .alignment(Alignment::Center);
        f.render_widget(status, chunks[2]);
    }
}
