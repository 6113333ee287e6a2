//! Top status bar: connection, sort mode, volume

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::app::App;
use crate::catalog::{SortKey, SortOrder};

pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let (feed, feed_color) = if app.live.is_connected() {
        ("live", Color::Green)
    } else {
        ("offline", Color::Red)
    };

    let sort = match app.store.params().sort_key {
        SortKey::None => "none",
        SortKey::Count => "count",
        SortKey::Date => "date",
        SortKey::Alpha => "alpha",
    };
    let order = match app.store.params().sort_order {
        SortOrder::Asc => "asc",
        SortOrder::Desc => "desc",
    };
    let mode = if app.store.params().exclusive_mode {
        "single"
    } else {
        "overlap"
    };

    let line = Line::from(vec![
        Span::styled(
            " termboard ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!(" {feed} "), Style::default().fg(feed_color)),
        Span::styled(
            format!(" sort:{sort}/{order} "),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(format!(" mode:{mode} "), Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!(" vol:{}% ", app.router.volume()),
            Style::default().fg(Color::Yellow),
        ),
        Span::styled(
            " /:search s:sort o:order p:mode space:stop q:quit ",
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}
