use color_eyre::Result;
use distance_badge::{
    app::{App, Services},
    config::Config,
    events::EventHandler,
    logging,
    models::WidgetState,
    ui,
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, IsTerminal};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Instrumentation and safety
    let _log_guard = logging::initialize_logging();
    install_panic_hook();
    color_eyre::install()?;

    let config = Config::load();
    let services = Services::from_config(&config)?;

    // Without a terminal there is nowhere to draw; the badge stays hidden.
    let interactive = io::stdout().is_terminal() && io::stdin().is_terminal();

    let tick_rate_ms = config.ui.tick_rate_ms;
    let mut events = EventHandler::new();
    let mut app = App::new(config, events.tx.clone());
    app.activate(services, interactive);
    if app.state == WidgetState::Hidden {
        app.teardown();
        return Ok(());
    }

    let mut terminal = setup_terminal()?;
    events.start(tick_rate_ms);

    // Main loop
    while !app.should_quit {
        terminal.draw(|f| ui::render(f, &app))?;

        let Some(event) = events.next().await else {
            warn!("Event channel closed");
            break;
        };
        app.handle_event(event);

        if app.state == WidgetState::Hidden {
            info!("Viewer location unavailable, exiting quietly");
            break;
        }
    }

    app.teardown();
    restore_terminal(terminal)?;
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    crossterm::terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    crossterm::execute!(
        stdout,
        crossterm::terminal::EnterAlternateScreen,
        crossterm::cursor::Hide
    )?;
    Ok(Terminal::new(CrosstermBackend::new(stdout))?)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    crossterm::terminal::disable_raw_mode()?;
    crossterm::execute!(
        terminal.backend_mut(),
        crossterm::terminal::LeaveAlternateScreen,
        crossterm::cursor::Show
    )?;
    Ok(())
}

fn install_panic_hook() {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        // Leave the alternate screen before the report prints.
        crossterm::terminal::disable_raw_mode().ok();
        crossterm::execute!(
            io::stdout(),
            crossterm::terminal::LeaveAlternateScreen,
            crossterm::cursor::Show
        )
        .ok();
        original_hook(panic_info);
    }));
}
