//! UI rendering using ratatui

mod banner;
pub mod grid;
mod log_panel;
mod search;
mod status;

use ratatui::{
    layout::{Constraint, Direction, Layout},
    Frame,
};

use crate::app::App;

/// Main render function - draws the entire UI
pub fn render(frame: &mut Frame, app: &mut App) {
    let area = frame.area();

    // Main vertical layout: Status | Search | Grid | Event log?
    let mut constraints = vec![
        Constraint::Length(1), // Status bar
        Constraint::Length(3), // Search box
        Constraint::Min(5),    // Tile grid
    ];
    if app.show_log {
        constraints.push(Constraint::Length(10)); // Event log panel
    }

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);

    status::render(frame, layout[0], app);
    search::render(frame, layout[1], app);
    grid::render(frame, layout[2], app);

    if app.show_log {
        log_panel::render(frame, layout[3], app);
    }

    // Error banner overlay (rendered last, on top of everything)
    banner::render(frame, app);
}
