//! TUI rendering for the distance badge
//!
//! Projects [`App`] state onto the frame: a small spinner while loading,
//! nothing at all when hidden, and the distance header plus the route map
//! once ready.

use crate::app::App;
use crate::distance::format_distance;
use crate::models::WidgetState;
use ratatui::{prelude::*, widgets::*};

const SPINNER: [&str; 4] = ["◐", "◓", "◑", "◒"];

/// Renders one frame of the badge based on current application state.
///
/// # Arguments
///
/// * `f` - The ratatui frame to draw into (from `terminal.draw()`).
/// * `app` - Current badge state.
pub fn render(f: &mut Frame, app: &App) {
    match app.state {
        WidgetState::Loading => render_loading(f, app),
        WidgetState::Hidden => {}
        WidgetState::Ready => render_ready(f, app),
    }
}

fn render_loading(f: &mut Frame, app: &App) {
    let area = f.size();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(area.height.saturating_sub(1) / 2),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(area);

    let frame = SPINNER[app.tick_count % SPINNER.len()];
    let msg = Paragraph::new(Line::from(vec![
        Span::styled(frame, Style::default().fg(Color::Cyan)),
        Span::styled(" Locating you…", Style::default().fg(Color::DarkGray)),
    ]))
    .alignment(Alignment::Center);
    f.render_widget(msg, chunks[1]);
}

/// Header (distance + greeting), map, and a one-line key hint.
fn render_ready(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Min(5),
            Constraint::Length(1),
        ])
        .split(f.size());

    let city = &app.reference().city_label;
    let distance = app
        .distance_km()
        .map(format_distance)
        .unwrap_or_else(|| "?".to_string());

    let mut header = vec![Line::from(vec![
        Span::styled(
            format!(" {} ", distance),
            Style::default()
                .fg(Color::Black)
                .bg(Color::Rgb(239, 68, 68))
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" from you to "),
        Span::styled(city.as_str(), Style::default().add_modifier(Modifier::BOLD)),
    ])];
    if let Some(greeting) = app.greeting() {
        header.push(Line::from(Span::styled(
            format!(" {}", greeting),
            Style::default().fg(Color::Yellow),
        )));
    }
    f.render_widget(Paragraph::new(header), chunks[0]);

    if let Some(map) = app.map() {
        map.draw(f, chunks[1], city);
    }

    let keys = "+/- zoom  hjkl pan  0 reset  │  q quit";
    let via = app
        .source
        .map(|s| format!(" located via {}  │  {}", s, keys))
        .unwrap_or_else(|| format!(" {}", keys));
    f.render_widget(
        Paragraph::new(via).style(Style::default().fg(Color::DarkGray)),
        chunks[2],
    );
}
