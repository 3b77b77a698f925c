use anyhow::{Context, Result};
use clap::{Arg, Command};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{
    io,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

mod app;
mod auth;
mod config;
mod error;
mod logging;
mod rooms;
mod store;
mod ui;

use app::App;
use auth::{FileSessionStorage, FirebaseAuth, IdentityProvider, MemorySessionStorage, OfflineIdentityProvider, SessionStorage};
use config::Config;
use rooms::{Message, Timestamp};
use store::{DocumentStore, FirestoreStore, MemoryStore};

struct Backends {
    label: String,
    store: Arc<dyn DocumentStore>,
    provider: Arc<dyn IdentityProvider>,
    storage: Box<dyn SessionStorage>,
}

/// Firestore and Firebase Authentication when a project is configured,
/// otherwise an in-memory store that lives as long as the process.
async fn build_backends(config: &Config, offline: bool) -> Result<Backends> {
    let project_id = config.firestore.project_id.as_deref().filter(|_| !offline);
    let Some(project_id) = project_id else {
        tracing::info!("running offline with an in-memory store");
        let store = MemoryStore::new();
        store
            .insert(
                &config.firestore.collection,
                Message {
                    id: uuid::Uuid::new_v4().simple().to_string(),
                    text: "Welcome! Messages here vanish when the client exits.".to_string(),
                    author: "roomchat".to_string(),
                    room: "general".to_string(),
                    created_at: Timestamp::Resolved(chrono::Utc::now()),
                },
            )
            .await;
        return Ok(Backends {
            label: "offline".to_string(),
            store: Arc::new(store),
            provider: Arc::new(OfflineIdentityProvider),
            storage: Box::new(MemorySessionStorage::default()),
        });
    };

    let api_key = config
        .firestore
        .api_key
        .clone()
        .context("firestore.api_key (or ROOMCHAT_API_KEY) is required to sign in")?;
    let store = FirestoreStore::new(project_id, Some(api_key.clone()), config.poll_interval())?;
    let provider = FirebaseAuth::new(api_key)?;
    let session_path = config
        .session
        .path
        .clone()
        .unwrap_or_else(FileSessionStorage::default_path);
    let storage = FileSessionStorage::open(session_path)?;
    tracing::info!(%project_id, session = %storage.path().display(), "using firestore");

    Ok(Backends {
        label: format!("firestore:{}", project_id),
        store: Arc::new(store),
        provider: Arc::new(provider),
        storage: Box::new(storage),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("roomchat")
        .version("0.1.0")
        .about("Terminal chat client for named rooms backed by a shared message collection")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Config file (defaults to <config dir>/roomchat/config.toml)")
        )
        .arg(
            Arg::new("offline")
                .long("offline")
                .action(clap::ArgAction::SetTrue)
                .help("Use an in-memory store even if a project is configured")
        )
        .arg(
            Arg::new("room")
                .short('r')
                .long("room")
                .value_name("NAME")
                .help("Open a room right after signing in")
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Log file (defaults to <data dir>/roomchat/roomchat.log)")
        )
        .get_matches();

    let log_path = matches
        .get_one::<PathBuf>("log-file")
        .cloned()
        .unwrap_or_else(logging::default_log_path);
    logging::init(&log_path).with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let config_path = matches
        .get_one::<PathBuf>("config")
        .cloned()
        .unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)?;
    let backends = build_backends(&config, matches.get_flag("offline")).await?;
    let auto_room = matches.get_one::<String>("room").map(|s| s.as_str());

    let mut app = App::new(
        &config,
        backends.label,
        backends.store,
        backends.provider,
        backends.storage,
        auto_room,
    );

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        tracing::error!(error = ?err, "application error");
        println!("Error: {:?}", err);
    }

    Ok(())
}

async fn run_app(terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>, app: &mut App) -> Result<()> {
    let mut last_tick = Instant::now();
    let tick_rate = Duration::from_millis(250);

    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        let timeout_duration = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if event::poll(timeout_duration)? {
            let event = event::read()?;
            app.handle_input(event).await?;
        }

        if last_tick.elapsed() >= tick_rate {
            app.on_tick().await?;
            last_tick = Instant::now();
        }

        if app.should_quit {
            return Ok(());
        }
    }
}
