//! Keyboard and mouse handling
//!
//! One handler per crossterm event class. The search box owns the
//! keyboard while focused; everything else is a flat keymap.

use crossterm::event::{
    Event, KeyCode, KeyEvent, KeyEventKind, MouseButton, MouseEvent, MouseEventKind,
};
use tui_input::backend::crossterm::EventHandler;

use crate::app::App;
use crate::ui::grid;

/// Handle one terminal event.
pub fn handle_event(event: Event, app: &mut App) {
    match event {
        Event::Key(key) => handle_key(key, app),
        Event::Mouse(mouse) => handle_mouse(mouse, app),
        // A terminal coming back from sleep may hold a silently dead
        // socket; nudge the feed to retry now.
        Event::FocusGained => app.live.poke(),
        _ => {}
    }
}

/// Handle a keyboard event
pub fn handle_key(key: KeyEvent, app: &mut App) {
    if key.kind == KeyEventKind::Release {
        return;
    }

    if app.search_focused {
        handle_search_key(key, app);
        return;
    }

    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        KeyCode::Char('/') => app.search_focused = true,

        // Sort controls
        KeyCode::Char('s') => app.cycle_sort_key(),
        KeyCode::Char('o') => app.toggle_sort_order(),
        KeyCode::Char('p') => app.toggle_exclusive_mode(),

        // Playback
        KeyCode::Enter => app.activate_selected(),
        KeyCode::Char(' ') => app.stop_all(),

        // Volume
        KeyCode::Char('+') | KeyCode::Char('=') => app.adjust_volume(1),
        KeyCode::Char('-') => app.adjust_volume(-1),

        // Navigation
        KeyCode::Char('h') | KeyCode::Left => app.move_cursor(-1),
        KeyCode::Char('l') | KeyCode::Right => app.move_cursor(1),
        KeyCode::Char('k') | KeyCode::Up => app.move_cursor_row(-1),
        KeyCode::Char('j') | KeyCode::Down => app.move_cursor_row(1),

        KeyCode::Char('e') => app.show_log = !app.show_log,
        KeyCode::Char('r') => {
            app.dismiss_banner();
            app.load_catalog();
        }

        KeyCode::Esc => {
            if app.banner.is_some() {
                app.dismiss_banner();
            }
        }
        _ => {}
    }
}

/// Search-focused keys: Esc/Enter leave the box, everything else edits
/// it and reapplies the filter immediately.
fn handle_search_key(key: KeyEvent, app: &mut App) {
    match key.code {
        KeyCode::Esc | KeyCode::Enter => app.search_focused = false,
        _ => {
            let before = app.search.value().to_string();
            app.search.handle_event(&Event::Key(key));
            if app.search.value() != before {
                app.search_changed();
            }
        }
    }
}

/// Handle a mouse event: left click activates the tile under the pointer.
pub fn handle_mouse(mouse: MouseEvent, app: &mut App) {
    if let MouseEventKind::Down(MouseButton::Left) = mouse.kind {
        let shown = app.grid.shown_indices().len();
        if let Some(position) = grid::hit_test(
            app.grid_area,
            app.columns,
            app.scroll_row,
            shown,
            mouse.column,
            mouse.row,
        ) {
            app.activate_shown(position);
        }
    }
}
