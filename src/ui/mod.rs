pub mod app;
pub mod components;

use crate::ui::app::{App, AppState};
use crate::ui::components::{
    render_categories_list, render_details, render_footer, render_header, render_popup,
    render_scanning,
};
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::prelude::*;
use std::time::Duration;

/// What a key press means on the current screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    Next,
    Previous,
    Toggle,
    ToggleCategory,
    SelectAll,
    DeselectAll,
    Preview,
    Rescan,
    AskConfirm,
    Clean,
    Back,
    Ignore,
}

pub fn action_for(state: &AppState, code: KeyCode) -> Action {
    match state {
        AppState::Browsing => match code {
            KeyCode::Char('q') => Action::Quit,
            KeyCode::Down | KeyCode::Char('j') => Action::Next,
            KeyCode::Up | KeyCode::Char('k') => Action::Previous,
            KeyCode::Char(' ') => Action::Toggle,
            KeyCode::Char('a') => Action::ToggleCategory,
            KeyCode::Char('A') => Action::SelectAll,
            KeyCode::Char('N') => Action::DeselectAll,
            KeyCode::Char('p') => Action::Preview,
            KeyCode::Char('r') => Action::Rescan,
            KeyCode::Enter => Action::AskConfirm,
            _ => Action::Ignore,
        },
        AppState::Confirming => match code {
            KeyCode::Char('y') | KeyCode::Enter => Action::Clean,
            KeyCode::Char('n' | 'q') | KeyCode::Esc => Action::Back,
            _ => Action::Ignore,
        },
        // Deletions run to completion.
        AppState::Cleaning => Action::Ignore,
        AppState::Scanning | AppState::Planning => match code {
            KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
            _ => Action::Ignore,
        },
        AppState::Previewing(_) | AppState::Done(_) => match code {
            KeyCode::Esc | KeyCode::Enter | KeyCode::Char(' ' | 'q') => Action::Back,
            _ => Action::Ignore,
        },
    }
}

/// Applies `action`. Returns false once the app should exit.
pub fn dispatch(app: &mut App, action: Action) -> bool {
    match action {
        Action::Quit => {
            app.cancel_jobs();
            return false;
        }
        Action::Next => app.next(),
        Action::Previous => app.previous(),
        Action::Toggle => app.toggle(),
        Action::ToggleCategory => app.toggle_category(),
        Action::SelectAll => app.select_all(),
        Action::DeselectAll => app.deselect_all(),
        Action::Preview => app.start_preview(),
        Action::Rescan => app.start_scan(),
        Action::AskConfirm => {
            if app.total_selected_count() > 0 {
                app.state = AppState::Confirming;
            }
        }
        Action::Clean => app.clean_selected(),
        Action::Back => app.state = AppState::Browsing,
        Action::Ignore => {}
    }
    true
}

pub fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.area());

    render_header(f, app, chunks[0]);

    if let AppState::Scanning = app.state {
        render_scanning(f, app, chunks[1]);
    } else {
        let main_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
            .split(chunks[1]);

        render_categories_list(f, app, main_chunks[0]);
        render_details(f, app, main_chunks[1]);
    }

    render_footer(f, app, chunks[2]);
    render_popup(f, app);
}

pub fn run_app(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stderr>>,
    app: &mut App,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;
        app.poll();

        if event::poll(Duration::from_millis(100))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
            && !dispatch(app, action_for(&app.state, key.code))
        {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browsing_keys() {
        let state = AppState::Browsing;
        assert_eq!(action_for(&state, KeyCode::Char('j')), Action::Next);
        assert_eq!(action_for(&state, KeyCode::Up), Action::Previous);
        assert_eq!(action_for(&state, KeyCode::Char('A')), Action::SelectAll);
        assert_eq!(action_for(&state, KeyCode::Char('p')), Action::Preview);
        assert_eq!(action_for(&state, KeyCode::Enter), Action::AskConfirm);
        assert_eq!(action_for(&state, KeyCode::Char('x')), Action::Ignore);
    }

    #[test]
    fn cleaning_swallows_every_key() {
        for code in [KeyCode::Char('q'), KeyCode::Esc, KeyCode::Enter] {
            assert_eq!(action_for(&AppState::Cleaning, code), Action::Ignore);
        }
    }

    #[test]
    fn popups_close_back_to_the_list() {
        let done = AppState::Done("ok".to_string());
        let preview = AppState::Previewing(Vec::new());
        assert_eq!(action_for(&done, KeyCode::Char('q')), Action::Back);
        assert_eq!(action_for(&preview, KeyCode::Esc), Action::Back);
        assert_eq!(action_for(&AppState::Confirming, KeyCode::Char('y')), Action::Clean);
        assert_eq!(action_for(&AppState::Confirming, KeyCode::Char('n')), Action::Back);
    }

    #[test]
    fn long_running_screens_can_quit() {
        assert_eq!(action_for(&AppState::Scanning, KeyCode::Esc), Action::Quit);
        assert_eq!(action_for(&AppState::Planning, KeyCode::Char('q')), Action::Quit);
    }
}
