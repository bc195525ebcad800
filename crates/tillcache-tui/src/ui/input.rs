//! Keyboard input handling for the TUI.

use crossterm::event::{KeyCode, KeyEvent};

use crate::app::{App, AppState};

/// Handle keyboard input. Returns true if the app should quit.
pub fn handle_input(app: &mut App, key: KeyEvent) -> bool {
    // Handle help overlay
    if matches!(app.state, AppState::ShowingHelp) {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')) {
            app.state = AppState::Normal;
        }
        return false;
    }

    // Handle quit confirmation
    if matches!(app.state, AppState::ConfirmingQuit) {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                app.state = AppState::Quitting;
                return true;
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                app.state = AppState::Normal;
            }
            _ => {}
        }
        return false;
    }

    match key.code {
        KeyCode::Char('q') => {
            app.state = AppState::ConfirmingQuit;
        }
        KeyCode::Char('?') => {
            app.state = AppState::ShowingHelp;
        }
        KeyCode::Up | KeyCode::Char('k') => app.select_prev(),
        KeyCode::Down | KeyCode::Char('j') => app.select_next(),
        KeyCode::Enter | KeyCode::Char('a') => app.add_selected(),
        KeyCode::Char('-') => app.decrement_selected(),
        KeyCode::Char('x') => app.clear_cart(),
        KeyCode::Char('p') => app.cycle_payment_method(),
        KeyCode::Char('c') => app.checkout(),
        KeyCode::Char('l') => app.toggle_logo(),
        KeyCode::Char('r') => app.refresh_all(),
        KeyCode::Char('s') => app.sync_now(),
        KeyCode::Esc => {
            app.status_message = None;
        }
        _ => {}
    }
    false
}
