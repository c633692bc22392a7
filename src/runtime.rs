//! The event loop: one `select!` over terminal input, directory change
//! signals, conversation deliveries, and a frame tick.

use crate::backend::{ChangeEvent, ChatBackend};
use crate::models::Profile;
use crate::sync::{self, Conversation, Directory, PresencePublisher};
use crate::ui::{self, views::login::LoginStep, App, InputMode, Notification, Tui, View};
use anyhow::Result;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::{info, warn};

/// Everything that exists only while a user is signed in. Dropped as a unit
/// on logout so nothing from one session can leak into the next.
struct ActiveSession {
    profile: Profile,
    presence: PresencePublisher,
    directory: Directory,
    conversation: Conversation,
}

/// Receive from an optional channel; no channel means park forever so the
/// other `select!` branches keep running. Cancel safe.
async fn recv_opt(rx: &mut Option<UnboundedReceiver<ChangeEvent>>) -> Option<ChangeEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

pub async fn run(terminal: &mut Tui, backend: Arc<dyn ChatBackend>) -> Result<()> {
    let mut app = App::new();
    let mut login_step = LoginStep::Email;
    let mut pending_email: Option<String> = None;
    let mut session: Option<ActiveSession> = None;
    let mut dir_rx: Option<UnboundedReceiver<ChangeEvent>> = None;
    let mut convo_rx: Option<UnboundedReceiver<ChangeEvent>> = None;

    // Resolve any stored session before the first real frame.
    terminal.draw(|f| ui::render_connecting(f))?;
    match sync::session::restore(&backend).await {
        Ok(Some(profile)) => {
            start_session(&backend, &mut app, &mut session, &mut dir_rx, profile).await;
        }
        Ok(None) => {}
        Err(e) => warn!("session restore failed, showing sign-in: {e}"),
    }

    let mut events = EventStream::new();
    let mut tick = tokio::time::interval(Duration::from_millis(250));

    while app.running {
        terminal.draw(|f| {
            let chat = session.as_ref().map(|s| ui::ChatContext {
                directory: &s.directory,
                conversation: &s.conversation,
            });
            ui::render(f, &app, &login_step, chat);
        })?;

        tokio::select! {
            maybe_event = events.next() => match maybe_event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    handle_key(
                        &backend,
                        &mut app,
                        &mut login_step,
                        &mut pending_email,
                        &mut session,
                        &mut dir_rx,
                        &mut convo_rx,
                        key,
                    )
                    .await;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => warn!("terminal event error: {e}"),
                None => app.quit(),
            },
            event = recv_opt(&mut dir_rx) => match event {
                Some(_) => {
                    if let Some(s) = session.as_mut() {
                        s.directory.refresh().await;
                        app.selected_index = clamp_selection(s.directory.others().len(), app.selected_index);
                    }
                }
                None => dir_rx = None,
            },
            event = recv_opt(&mut convo_rx) => match event {
                Some(event) => {
                    if let Some(s) = session.as_mut() {
                        s.conversation.apply(event);
                    }
                }
                None => convo_rx = None,
            },
            _ = tick.tick() => app.tick(),
        }
    }

    // Quitting keeps the stored session but still reports the user offline.
    end_session(&backend, &mut session, &mut dir_rx, &mut convo_rx, false).await;
    Ok(())
}

fn clamp_selection(len: usize, index: usize) -> usize {
    index.min(len.saturating_sub(1))
}

async fn start_session(
    backend: &Arc<dyn ChatBackend>,
    app: &mut App,
    session: &mut Option<ActiveSession>,
    dir_rx: &mut Option<UnboundedReceiver<ChangeEvent>>,
    profile: Profile,
) {
    info!("session active for {}", profile.username);

    let presence = PresencePublisher::new(backend.clone(), profile.id);
    presence.went_online().await;

    let mut directory = Directory::new(backend.clone(), profile.id);
    let (dir_tx, rx) = unbounded_channel();
    if let Err(e) = directory.start(dir_tx).await {
        // The initial list may still have loaded; only live refresh is lost.
        warn!("directory subscription failed: {e}");
        app.notify(Notification::error("User list will not update live"));
    }
    *dir_rx = Some(rx);

    let conversation = Conversation::new(backend.clone(), profile.id);

    app.current_user = Some(profile.clone());
    app.view = View::Chat;
    app.input_mode = InputMode::Normal;
    app.selected_index = 0;
    app.login_error = None;
    app.clear_input();

    *session = Some(ActiveSession { profile, presence, directory, conversation });
}

/// Teardown in dependency order. `sign_out` distinguishes logout (revoke the
/// session) from quit (keep it for next launch).
async fn end_session(
    backend: &Arc<dyn ChatBackend>,
    session: &mut Option<ActiveSession>,
    dir_rx: &mut Option<UnboundedReceiver<ChangeEvent>>,
    convo_rx: &mut Option<UnboundedReceiver<ChangeEvent>>,
    sign_out: bool,
) {
    if let Some(mut s) = session.take() {
        s.conversation.close().await;
        s.directory.shutdown().await;
        s.presence.went_offline().await;
        if sign_out {
            if let Err(e) = backend.sign_out().await {
                warn!("sign out failed: {e}");
            }
        }
    }
    *dir_rx = None;
    *convo_rx = None;
}

#[allow(clippy::too_many_arguments)]
async fn handle_key(
    backend: &Arc<dyn ChatBackend>,
    app: &mut App,
    login_step: &mut LoginStep,
    pending_email: &mut Option<String>,
    session: &mut Option<ActiveSession>,
    dir_rx: &mut Option<UnboundedReceiver<ChangeEvent>>,
    convo_rx: &mut Option<UnboundedReceiver<ChangeEvent>>,
    key: KeyEvent,
) {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        app.quit();
        return;
    }

    match app.view {
        View::Login => handle_login_key(backend, app, login_step, pending_email, session, dir_rx, key.code).await,
        View::Chat => match app.input_mode {
            InputMode::Normal => {
                handle_chat_normal_key(backend, app, login_step, pending_email, session, dir_rx, convo_rx, key.code)
                    .await;
            }
            InputMode::Editing => handle_chat_editing_key(backend, app, session, key.code).await,
        },
    }
}

async fn handle_login_key(
    backend: &Arc<dyn ChatBackend>,
    app: &mut App,
    login_step: &mut LoginStep,
    pending_email: &mut Option<String>,
    session: &mut Option<ActiveSession>,
    dir_rx: &mut Option<UnboundedReceiver<ChangeEvent>>,
    key: KeyCode,
) {
    match key {
        KeyCode::Char(c) => app.enter_char(c),
        KeyCode::Backspace => app.delete_char(),
        KeyCode::Left => app.move_cursor_left(),
        KeyCode::Right => app.move_cursor_right(),
        KeyCode::Esc => {
            app.clear_input();
            app.login_error = None;
            *pending_email = None;
            *login_step = LoginStep::Email;
        }
        KeyCode::Enter => {
            let input = app.submit_input();
            match login_step {
                LoginStep::Email => {
                    if input.trim().is_empty() {
                        return;
                    }
                    *pending_email = Some(input.trim().to_string());
                    *login_step = LoginStep::Password;
                }
                LoginStep::Password => {
                    let Some(email) = pending_email.take() else {
                        *login_step = LoginStep::Email;
                        return;
                    };
                    match sync::session::sign_in(backend, &email, &input).await {
                        Ok(profile) => {
                            start_session(backend, app, session, dir_rx, profile).await;
                        }
                        Err(e) => {
                            app.login_error = Some(format!("Sign in failed: {e}"));
                            *login_step = LoginStep::Email;
                        }
                    }
                }
            }
        }
        _ => {}
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_chat_normal_key(
    backend: &Arc<dyn ChatBackend>,
    app: &mut App,
    login_step: &mut LoginStep,
    pending_email: &mut Option<String>,
    session: &mut Option<ActiveSession>,
    dir_rx: &mut Option<UnboundedReceiver<ChangeEvent>>,
    convo_rx: &mut Option<UnboundedReceiver<ChangeEvent>>,
    key: KeyCode,
) {
    match key {
        KeyCode::Char('q') => app.quit(),
        KeyCode::Char('i') => {
            if session.as_ref().is_some_and(|s| s.conversation.peer().is_some()) {
                app.input_mode = InputMode::Editing;
            }
        }
        KeyCode::Up => app.selected_index = app.selected_index.saturating_sub(1),
        KeyCode::Down => {
            if let Some(s) = session.as_ref() {
                let len = s.directory.others().len();
                if app.selected_index + 1 < len {
                    app.selected_index += 1;
                }
            }
        }
        KeyCode::Enter => {
            let Some(s) = session.as_mut() else { return };
            let Some(peer) = s.directory.others().get(app.selected_index).map(|p| p.id) else {
                return;
            };
            // A fresh channel per open; the previous receiver is replaced so
            // nothing buffered for the old peer can be drained later.
            let (tx, rx) = unbounded_channel();
            match s.conversation.open(peer, tx).await {
                Ok(()) => *convo_rx = Some(rx),
                Err(e) => {
                    *convo_rx = None;
                    app.notify(Notification::error(format!("Could not open conversation: {e}")));
                }
            }
        }
        KeyCode::Esc => {
            if let Some(s) = session.as_mut() {
                s.conversation.close().await;
            }
            *convo_rx = None;
        }
        KeyCode::Char('L') => {
            end_session(backend, session, dir_rx, convo_rx, true).await;
            app.current_user = None;
            app.view = View::Login;
            app.input_mode = InputMode::Editing;
            app.clear_input();
            app.login_error = None;
            *pending_email = None;
            *login_step = LoginStep::Email;
        }
        _ => {}
    }
}

async fn handle_chat_editing_key(
    backend: &Arc<dyn ChatBackend>,
    app: &mut App,
    session: &mut Option<ActiveSession>,
    key: KeyCode,
) {
    match key {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
            app.clear_input();
        }
        KeyCode::Char(c) => app.enter_char(c),
        KeyCode::Backspace => app.delete_char(),
        KeyCode::Left => app.move_cursor_left(),
        KeyCode::Right => app.move_cursor_right(),
        KeyCode::Enter => {
            let content = app.submit_input();
            let Some(s) = session.as_ref() else { return };
            match sync::send(backend, Some(s.profile.id), s.conversation.peer(), &content).await {
                // The message shows up when the subscription echoes it back.
                Ok(_) => {}
                Err(e) => {
                    // Keep the draft so it is not lost on a failed send.
                    app.cursor_position = content.chars().count();
                    app.input = content;
                    app.notify(Notification::error(format!("Send failed: {e}")));
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_selection() {
        assert_eq!(clamp_selection(0, 3), 0);
        assert_eq!(clamp_selection(2, 3), 1);
        assert_eq!(clamp_selection(5, 3), 3);
    }
}
