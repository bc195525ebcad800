//! tillcache - a terminal till that keeps selling while the backend is away.
//!
//! Receipt settings and the product catalogue are shown from the local cache
//! straight away and refreshed in the background. Sales made while offline
//! are queued and pushed once the backend is reachable again.

mod app;
mod ui;

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tillcache_core::auth::CredentialStore;
use tillcache_core::{ApiClient, CacheManager, Config};

use app::{App, AppState};
use ui::input::handle_input;
use ui::render::render;

// ============================================================================
// Constants
// ============================================================================

/// Timeout for polling terminal events (in milliseconds)
const EVENT_POLL_TIMEOUT_MS: u64 = 100;

/// Backend used when none is configured (local development stack)
const DEFAULT_BACKEND_URL: &str = "http://localhost:54321";

/// Log file prefix inside the cache directory
const LOG_FILE_PREFIX: &str = "tillcache.log";

/// Initialize the tracing subscriber for logging.
///
/// The terminal belongs to the UI, so logs go to a daily file in `log_dir`.
/// Use RUST_LOG to control the level (e.g., RUST_LOG=tillcache_core=debug).
fn init_tracing(log_dir: &Path) -> WorkerGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();
    guard
}

#[derive(Debug, Default)]
struct Args {
    offline: bool,
    set_api_key: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--offline" => args.offline = true,
            "--set-api-key" => args.set_api_key = true,
            other => anyhow::bail!("Unknown argument: {} (expected --offline or --set-api-key)", other),
        }
    }
    Ok(args)
}

/// Prompt for the backend API key and store it in the OS keychain
fn set_api_key(backend_url: &str) -> Result<()> {
    eprintln!("Backend: {}", backend_url);
    let key = rpassword::prompt_password("API key: ")?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("API key cannot be empty");
    }
    CredentialStore::store_api_key(backend_url, key)?;
    eprintln!("API key saved to the system keychain.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args = parse_args()?;

    let mut config = Config::load().context("Failed to load config")?;
    let backend_url = config
        .backend_url
        .clone()
        .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());

    if args.set_api_key {
        return set_api_key(&backend_url);
    }

    let cache_dir = config.cache_dir().unwrap_or_else(|_| PathBuf::from("./cache"));
    let store = CacheManager::new(cache_dir.clone())?;
    let _log_guard = init_tracing(&cache_dir);
    info!(backend = %backend_url, cache_dir = %cache_dir.display(), "tillcache starting");

    let api_key = match CredentialStore::resolve_api_key(&backend_url) {
        Ok(key) => key,
        Err(e) => {
            warn!(error = %e, "No API key, starting offline");
            config.offline_mode = true;
            String::new()
        }
    };
    if args.offline {
        config.offline_mode = true;
    }

    let api = ApiClient::new(&backend_url, api_key)?;
    let online = !config.offline_mode;
    let mut app = App::new(config, api, store, online);

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    app.start();

    let result = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
    }

    info!(pending = app.pending_count(), "tillcache shutting down");
    Ok(())
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|f| render(f, app))?;

        // Poll for events with timeout to allow background updates
        if event::poll(Duration::from_millis(EVENT_POLL_TIMEOUT_MS))? {
            if let Event::Key(key) = event::read()? {
                // Ctrl+C to quit
                if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                    return Ok(());
                }

                if handle_input(app, key) {
                    return Ok(());
                }
            }
        }

        app.check_background_tasks();

        if matches!(app.state, AppState::Quitting) {
            return Ok(());
        }
    }
}
