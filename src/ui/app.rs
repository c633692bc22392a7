use crate::models::Profile;
use crate::ui::notifications::Notification;

#[derive(Debug, Clone, PartialEq)]
pub enum View {
    Login,
    Chat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// View-level state: which screen is showing, the input buffer, selection
/// in the sidebar, and the active toast. Everything synchronized with the
/// backend lives in the sync types, not here.
pub struct App {
    pub running: bool,
    pub view: View,
    pub input_mode: InputMode,
    pub input: String,
    pub cursor_position: usize,

    pub current_user: Option<Profile>,
    /// Index into the directory's `others()` list.
    pub selected_index: usize,

    pub notification: Option<Notification>,
    pub login_error: Option<String>,
}

impl App {
    pub fn new() -> Self {
        Self {
            running: true,
            view: View::Login,
            input_mode: InputMode::Editing,
            input: String::new(),
            cursor_position: 0,
            current_user: None,
            selected_index: 0,
            notification: None,
            login_error: None,
        }
    }

    pub fn quit(&mut self) {
        self.running = false;
    }

    pub fn notify(&mut self, notification: Notification) {
        self.notification = Some(notification);
    }

    /// Frame tick: expire the active toast.
    pub fn tick(&mut self) {
        if self.notification.as_ref().is_some_and(|n| n.is_expired()) {
            self.notification = None;
        }
    }

    // Cursor positions count characters; the byte offset is derived when
    // mutating the buffer so multi-byte input stays intact.

    fn byte_index(&self) -> usize {
        self.input
            .char_indices()
            .nth(self.cursor_position)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }

    pub fn move_cursor_left(&mut self) {
        self.cursor_position = self.cursor_position.saturating_sub(1);
    }

    pub fn move_cursor_right(&mut self) {
        if self.cursor_position < self.input.chars().count() {
            self.cursor_position += 1;
        }
    }

    pub fn enter_char(&mut self, c: char) {
        let at = self.byte_index();
        self.input.insert(at, c);
        self.cursor_position += 1;
    }

    pub fn delete_char(&mut self) {
        if self.cursor_position > 0 {
            self.cursor_position -= 1;
            let at = self.byte_index();
            self.input.remove(at);
        }
    }

    pub fn clear_input(&mut self) {
        self.input.clear();
        self.cursor_position = 0;
    }

    pub fn submit_input(&mut self) -> String {
        let input = self.input.clone();
        self.clear_input();
        input
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}
