//! Event log panel
//!
//! Displays the most recent app events with age stamps, newest first.

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::app::App;
use crate::event_log::{LogEntry, LogKind};

/// Render the event log panel
pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" events ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if app.events.is_empty() {
        let msg = Paragraph::new("No events logged yet").style(Style::default().fg(Color::DarkGray));
        frame.render_widget(msg, inner);
        return;
    }

    let now = std::time::Instant::now();
    let visible_height = inner.height as usize;

    let lines: Vec<Line> = app
        .events
        .entries_recent_first()
        .take(visible_height)
        .map(|entry| format_entry(entry, now))
        .collect();

    frame.render_widget(Paragraph::new(lines), inner);
}

/// Format a log entry for display
fn format_entry(entry: &LogEntry, now: std::time::Instant) -> Line<'static> {
    let elapsed = now.duration_since(entry.timestamp);
    let time_str = format_elapsed(elapsed);

    let color = match entry.kind {
        LogKind::Info => Color::White,
        LogKind::Warn => Color::Yellow,
        LogKind::Error => Color::Red,
    };

    Line::from(vec![
        Span::styled(time_str, Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
        Span::styled(entry.message.clone(), Style::default().fg(color)),
    ])
}

/// Format elapsed time for display
fn format_elapsed(elapsed: std::time::Duration) -> String {
    let secs = elapsed.as_secs();
    if secs < 60 {
        format!("{:>3}s", secs)
    } else if secs < 3600 {
        format!("{:>2}m", secs / 60)
    } else {
        format!("{:>2}h", secs / 3600)
    }
}
