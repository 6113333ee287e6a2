//! Search box

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::app::App;

pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let border_color = if app.search_focused {
        Color::Cyan
    } else {
        Color::DarkGray
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" search ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    // Keep the tail of long input in view
    let scroll = app.search.visual_scroll(inner.width.max(1) as usize);
    let text = Paragraph::new(app.search.value()).scroll((0, scroll as u16));
    frame.render_widget(text, inner);

    if app.search_focused {
        let x = inner.x + (app.search.visual_cursor().saturating_sub(scroll)) as u16;
        frame.set_cursor_position((x.min(inner.x + inner.width.saturating_sub(1)), inner.y));
    }
}
