//! The soundboard tile grid

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::app::App;
use crate::tiles::Tile;

/// Fixed tile cell geometry; columns follow from the terminal width.
pub const TILE_WIDTH: u16 = 22;
pub const TILE_HEIGHT: u16 = 3;

/// Render the tile grid panel
pub fn render(frame: &mut Frame, area: Rect, app: &mut App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" sounds ({}) ", app.store.len()));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    // Geometry feeds keyboard row movement and mouse hit-testing
    let columns = (inner.width / TILE_WIDTH).max(1) as usize;
    app.columns = columns;
    app.grid_area = inner;

    if app.halted {
        let msg = Paragraph::new("catalog unavailable")
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(msg, inner);
        return;
    }

    let shown = app.grid.shown_indices();
    if shown.is_empty() {
        let msg = if app.grid.is_empty() {
            "no sounds"
        } else {
            "no matches"
        };
        frame.render_widget(
            Paragraph::new(msg).style(Style::default().fg(Color::DarkGray)),
            inner,
        );
        return;
    }

    let rows_visible = (inner.height / TILE_HEIGHT) as usize;
    // Keep the cursor's row on screen
    let cursor_row = app.cursor / columns;
    let first_row = cursor_row.saturating_sub(rows_visible.saturating_sub(1));
    app.scroll_row = first_row;

    for (position, &tile_idx) in shown.iter().enumerate() {
        let row = position / columns;
        if row < first_row || row >= first_row + rows_visible {
            continue;
        }
        let col = position % columns;
        let cell = Rect {
            x: inner.x + col as u16 * TILE_WIDTH,
            y: inner.y + (row - first_row) as u16 * TILE_HEIGHT,
            width: TILE_WIDTH.min(inner.width.saturating_sub(col as u16 * TILE_WIDTH)),
            height: TILE_HEIGHT.min(inner.height.saturating_sub((row - first_row) as u16 * TILE_HEIGHT)),
        };
        if cell.width < 4 || cell.height < 3 {
            continue;
        }
        render_tile(frame, cell, &app.grid.tiles[tile_idx], position == app.cursor);
    }
}

fn render_tile(frame: &mut Frame, cell: Rect, tile: &Tile, selected: bool) {
    let border_color = if selected {
        Color::Cyan
    } else if tile.playing {
        Color::Green
    } else {
        Color::DarkGray
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color));
    let inner = block.inner(cell);
    frame.render_widget(block, cell);

    let name_style = if tile.playing {
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::White)
    };

    let width = inner.width as usize;
    let mut name = tile.snapshot.name.clone();
    if name.chars().count() > width {
        name = name.chars().take(width.saturating_sub(1)).collect();
        name.push('…');
    }

    let indicator = if tile.playing { "▶ " } else { "" };
    let mut spans = vec![
        Span::styled(indicator, Style::default().fg(Color::Green)),
        Span::styled(name, name_style),
        Span::styled(
            format!(" ({})", tile.snapshot.play_count),
            Style::default().fg(Color::DarkGray),
        ),
    ];
    if !tile.snapshot.tags.is_empty() {
        spans.push(Span::styled(
            format!(" #{}", tile.snapshot.tags.join(" #")),
            Style::default().fg(Color::Blue),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), inner);
}

/// Map a mouse click to a shown-tile position, if it lands on one.
/// `first_row` is the scroll offset the grid was last drawn with.
pub fn hit_test(
    grid_area: Rect,
    columns: usize,
    first_row: usize,
    shown: usize,
    x: u16,
    y: u16,
) -> Option<usize> {
    if x < grid_area.x
        || y < grid_area.y
        || x >= grid_area.x + grid_area.width
        || y >= grid_area.y + grid_area.height
    {
        return None;
    }
    let col = ((x - grid_area.x) / TILE_WIDTH) as usize;
    let row = ((y - grid_area.y) / TILE_HEIGHT) as usize;
    if col >= columns {
        return None;
    }
    let position = (first_row + row) * columns + col;
    (position < shown).then_some(position)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area() -> Rect {
        Rect {
            x: 1,
            y: 5,
            width: 66, // three columns
            height: 9,
        }
    }

    #[test]
    fn test_hit_test_maps_cells_to_positions() {
        assert_eq!(hit_test(area(), 3, 0, 9, 1, 5), Some(0));
        assert_eq!(hit_test(area(), 3, 0, 9, 24, 6), Some(1));
        assert_eq!(hit_test(area(), 3, 0, 9, 2, 8), Some(3));
    }

    #[test]
    fn test_hit_test_outside_grid_is_none() {
        assert_eq!(hit_test(area(), 3, 0, 9, 0, 5), None);
        assert_eq!(hit_test(area(), 3, 0, 9, 1, 4), None);
        assert_eq!(hit_test(area(), 3, 0, 9, 90, 5), None);
    }

    #[test]
    fn test_hit_test_past_last_shown_tile_is_none() {
        // Only two tiles shown; the third cell is empty
        assert_eq!(hit_test(area(), 3, 0, 2, 46, 5), None);
        assert_eq!(hit_test(area(), 3, 0, 2, 24, 5), Some(1));
    }

    #[test]
    fn test_hit_test_accounts_for_scroll_offset() {
        // Grid scrolled down two rows: the top-left cell is position 6,
        // not position 0
        assert_eq!(hit_test(area(), 3, 2, 15, 1, 5), Some(6));
        assert_eq!(hit_test(area(), 3, 2, 15, 24, 6), Some(7));
        assert_eq!(hit_test(area(), 3, 2, 15, 2, 8), Some(9));
        // Scrolled past the last shown tile
        assert_eq!(hit_test(area(), 3, 4, 13, 24, 5), None);
    }
}
