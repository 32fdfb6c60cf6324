mod auth;
mod config;
mod controller;
mod device;
mod engine;
mod error;
mod logging;
mod model;
mod remote;
mod view;

#[cfg(test)]
mod testing;

use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use rspotify::{clients::OAuthClient, AuthCodeSpotify, Config, Token};

use auth::{AuthResult, OAuthCredentials};
use config::{EngineConfig, CONFIG_FILE};
use controller::AppController;
use device::{CredentialProvider, DeviceFactory, LibrespotFactory};
use engine::{AuthSignal, AuthStatus, EngineParts, PlaybackEngine};
use model::LikedSongsCache;
use remote::{CachedLyrics, LrclibSource, LyricsSource, SpotifyClient};
use view::{AppView, Screen};

const TOKEN_CHECK_INTERVAL: Duration = Duration::from_secs(60);
const INPUT_POLL: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = logging::init_logging() {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    tracing::info!("=== Spotify-Sync Starting ===");

    let config = EngineConfig::load(Path::new(CONFIG_FILE))?;

    let auth_result = auth::perform_oauth_flow().await?;
    let rspotify_client = setup_rspotify(&auth_result).await?;

    match rspotify_client.me().await {
        Ok(user) => tracing::info!(user_id = %user.id, "rspotify authorized successfully"),
        Err(e) => {
            tracing::error!(error = %e, "rspotify authentication failed");
            return Err(anyhow::anyhow!("rspotify init failed"));
        }
    }

    let spotify_client = SpotifyClient::new(
        rspotify_client,
        auth_result.refresh_token.clone(),
        Some(auth_result.expires_at),
    );

    let liked_songs = LikedSongsCache::new(config.liked_songs_cache.clone());
    if let Err(e) = liked_songs.load_from_disk().await {
        tracing::debug!(error = %e, "No liked songs cache on disk");
    }

    let factory: Arc<dyn DeviceFactory> = Arc::new(LibrespotFactory::new(config.device_name.clone()));
    let credentials: Arc<dyn CredentialProvider> =
        Arc::new(OAuthCredentials::new(spotify_client.clone()));
    let lyrics: Option<Arc<dyn LyricsSource>> = config.lyrics_enabled.then(|| {
        let source: Arc<dyn LyricsSource> = Arc::new(LrclibSource::new(config.lyrics_timeout()));
        Arc::new(CachedLyrics::new(source)) as Arc<dyn LyricsSource>
    });

    let engine = PlaybackEngine::start(
        EngineParts {
            remote: Arc::new(spotify_client.clone()),
            device: Some((factory, credentials)),
            lyrics,
            liked_songs,
            auth: AuthSignal::new(),
        },
        &config,
    );

    spawn_token_maintenance(spotify_client, engine.auth_signal());

    let controller = AppController::new(
        engine.commands(),
        engine.library(),
        engine.subscribe_state(),
        engine.subscribe_position(),
    );
    controller.start_track_sync();

    tracing::info!("Starting TUI...");

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &engine, &config, controller).await;

    engine.shutdown().await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        tracing::error!(error = ?err, "Application error");
    }

    tracing::info!("Spotify-Sync shutting down");
    Ok(())
}

async fn setup_rspotify(auth: &AuthResult) -> Result<AuthCodeSpotify> {
    let spotify = AuthCodeSpotify::with_config(
        Default::default(),
        Default::default(),
        Config {
            token_cached: false,
            token_refreshing: false,
            ..Default::default()
        },
    );

    let token = Token {
        access_token: auth.access_token.clone(),
        expires_in: chrono::Duration::seconds(3600),
        expires_at: Some(auth.expires_at),
        scopes: auth::SCOPES
            .split_whitespace()
            .map(|s| s.to_string())
            .collect::<HashSet<String>>(),
        refresh_token: None,
    };

    *spotify
        .token
        .lock()
        .await
        .map_err(|_| anyhow::anyhow!("rspotify token lock unavailable"))? = Some(token);
    tracing::debug!("rspotify token set");
    Ok(spotify)
}

/// Refresh ahead of expiry, and immediately whenever the engine reports
/// that credentials were rejected.
fn spawn_token_maintenance(client: SpotifyClient, auth: AuthSignal) {
    let periodic = client.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TOKEN_CHECK_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = periodic.refresh_token_if_needed(false).await {
                tracing::warn!(error = %e, "Token refresh check failed");
            }
        }
    });

    tokio::spawn(async move {
        let mut status = auth.subscribe();
        while status.wait_for(|s| *s == AuthStatus::Expired).await.is_ok() {
            match client.refresh_token_if_needed(true).await {
                Ok(_) => auth.resolve(),
                Err(e) => {
                    tracing::error!(error = %e, "Could not recover expired credentials");
                    tokio::time::sleep(TOKEN_CHECK_INTERVAL).await;
                }
            }
        }
    });
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    engine: &PlaybackEngine,
    config: &EngineConfig,
    controller: AppController,
) -> io::Result<()> {
    let playback = engine.subscribe_state();
    let position = engine.subscribe_position();
    let device = engine.subscribe_device();
    let lyrics = engine.subscribe_lyrics();
    let library = engine.library();
    let mut view = AppView::default();

    loop {
        let playback_state = playback.borrow().clone();
        let position_ms = *position.borrow();
        let device_state = device.borrow().clone();
        let lyric_frame = lyrics.borrow().clone();
        let liked = match playback_state.track_id() {
            Some(track_id) => library.is_liked(track_id).await,
            None => false,
        };

        let (error_message, up_next, show_help, should_quit) = {
            let mut ui = controller.ui.lock().await;
            ui.auto_clear_old_errors();
            (
                ui.error_message.clone(),
                ui.up_next.clone(),
                ui.show_help_popup,
                ui.should_quit,
            )
        };

        if should_quit {
            break;
        }

        terminal.draw(|f| {
            let screen = Screen {
                playback: &playback_state,
                position_ms,
                device: &device_state,
                device_name: &config.device_name,
                lyrics: &lyric_frame,
                liked,
                up_next: up_next.as_deref(),
                error_message: error_message.as_deref(),
                show_help,
            };
            view.render(f, &screen);
        })?;

        if event::poll(INPUT_POLL)? {
            if let Event::Key(key) = event::read()? {
                if let Err(e) = controller.handle_key_event(key).await {
                    tracing::warn!(error = %e, "Key handling failed");
                }
            }
        }
    }

    Ok(())
}
