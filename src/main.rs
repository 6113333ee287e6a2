//! termboard - a terminal soundboard client
//!
//! This is the main entry point for the application.

use std::io;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use crossterm::{
    event::{self, DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use termboard::app::{self, App, SurfaceParam};
use termboard::audio::AudioEngine;
use termboard::client::CatalogClient;
use termboard::input;
use termboard::settings::Settings;
use termboard::ui;

/// termboard - terminal soundboard client
#[derive(Parser, Debug)]
#[command(name = "termboard")]
#[command(about = "Play sounds from a soundboard server in your terminal", long_about = None)]
struct Cli {
    /// Soundboard server URL
    #[arg(long, default_value = "http://localhost:8000")]
    server: String,

    /// Initial search filter
    #[arg(long)]
    filter: Option<String>,

    /// Initial sort key
    #[arg(long, value_enum)]
    sort: Option<termboard::catalog::SortKey>,

    /// Initial sort direction
    #[arg(long, value_enum)]
    sortorder: Option<termboard::catalog::SortOrder>,

    /// Start in single-play mode ("no" to start layered)
    #[arg(long, num_args = 0..=1)]
    singleplay: Option<Option<String>>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Completions { shell }) => {
            print_completions(*shell);
            Ok(())
        }
        None => run_board(cli),
    }
}

/// Print shell completions
fn print_completions(shell: clap_complete::Shell) {
    clap_complete::generate(shell, &mut Cli::command(), "termboard", &mut io::stdout());
}

/// Run the soundboard client
fn run_board(cli: Cli) -> Result<()> {
    let server = app::parse_server_url(&cli.server)?;

    // Initialize audio before touching the terminal
    let (_audio_engine, audio_handle, unit_events) = AudioEngine::new()
        .map_err(|e| anyhow::anyhow!("Failed to initialize audio: {}", e))?;

    let client = CatalogClient::new(server);
    let settings = Settings::load_default();
    let mut app = App::new(client, Box::new(audio_handle), unit_events, settings)?;

    // Apply CLI-provided view parameters before the first fetch
    if let Some(filter) = &cli.filter {
        app.search = tui_input::Input::new(filter.clone());
        app.apply_param(SurfaceParam::Filter, filter);
    }
    if let Some(sort) = cli.sort {
        app.apply_view_change(termboard::catalog::ViewChange {
            sort_key: Some(sort),
            ..Default::default()
        });
    }
    if let Some(order) = cli.sortorder {
        app.apply_view_change(termboard::catalog::ViewChange {
            sort_order: Some(order),
            ..Default::default()
        });
    }
    if let Some(singleplay) = &cli.singleplay {
        let value = singleplay.as_deref().unwrap_or("");
        app.apply_param(SurfaceParam::SinglePlay, value);
    }

    app.load_catalog();
    app.live.connect();

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableMouseCapture,
        EnableFocusChange
    )?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the main loop
    let result = run_app(&mut terminal, &mut app);

    // Restore terminal
    app.live.shutdown();
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture,
        DisableFocusChange
    )?;
    terminal.show_cursor()?;

    result
}

/// Main application loop
fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()>
where
    B::Error: Send + Sync + 'static,
{
    let mut last_tick = Instant::now();

    loop {
        // Draw the UI
        terminal.draw(|frame| ui::render(frame, app))?;

        // Drain all pending events (prevents input queue buildup during slow renders)
        while event::poll(Duration::from_millis(16))? {
            input::handle_event(event::read()?, app);
            if app.should_quit {
                return Ok(());
            }
        }

        let now = Instant::now();
        let delta = now - last_tick;
        last_tick = now;

        // Update app state (render slices, live feed, unit lifecycle)
        app.tick(delta);
    }
}
