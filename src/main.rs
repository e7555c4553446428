//! klangwerk - a small keyboard-driven music player.
//!
//! Scans a music library, searches it with space-separated keywords, and
//! plays the results through one audio backend. The main thread runs a
//! `select`-based reactor over two event queues: player lifecycle events
//! from the decode worker and commands from the stdin control surface.

pub mod audio;
pub mod cli;
pub mod config;
pub mod control;
pub mod error;
pub mod event;
pub mod library;
pub mod player;
pub mod search;

use anyhow::Context as _;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::control::{Control, ControlEvent};
use crate::event::{Reactor, ReactorCtl};
use crate::library::Library;
use crate::player::{Player, PlayerEvent, QueueItem};

/// Everything the reactor callbacks work on.
struct App {
    library: Library,
    player: Player,
    /// Keeps the stdin reader's queue alive.
    control: Control,
    current: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let default_directive = if args.verbose {
        "klangwerk=debug"
    } else {
        "klangwerk=info"
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::from_default_env().add_directive(default_directive.parse().unwrap()))
        .init();

    let config = config::load().unwrap_or_else(|e| {
        tracing::warn!("Ignoring broken config: {e}");
        config::Config::default()
    });

    let root = args
        .library
        .or(config.library.path)
        .context("no music library given (argument, config file, or $MUSICPATH)")?;
    let library = Library::scan(&root).context("could not open music library")?;
    if library.is_empty() {
        tracing::warn!("No audio files found under {}.", root.display());
    }

    let preferred_device =
        (!config.audio.output_device.is_empty()).then(|| config.audio.output_device.clone());
    let player =
        Player::with_default_backend(preferred_device).context("could not init player")?;
    let control = Control::spawn().context("could not start control surface")?;

    let mut reactor = Reactor::new(2).context("could not initialize event loop")?;
    let player_fd = player.event_fd();
    let control_fd = control.event_fd();

    let mut app = App {
        library,
        player,
        control,
        current: None,
    };
    reactor
        .register(player_fd, Box::new(on_player_event))
        .context("could not watch player events")?;
    reactor
        .register(control_fd, Box::new(on_control_event))
        .context("could not watch control events")?;

    tracing::info!(
        "Ready. Commands: add <keywords>, pause, next, seek <percent>, restart, clear, quit."
    );
    reactor.run(&mut app);

    app.player.stop();
    Ok(())
}

/// Drain the player queue completely: one reactor tick invokes each
/// callback once, so a backlog has to be cleared here.
fn on_player_event(app: &mut App, _ctl: &ReactorCtl) {
    loop {
        match app.player.events().read_record() {
            Ok(Some(record)) => match PlayerEvent::decode(&record) {
                Ok(event) => handle_player_event(app, event),
                Err(e) => tracing::warn!("Discarding bad player event: {e}"),
            },
            Ok(None) => break,
            Err(event::EventError::ShortRead(n)) => {
                tracing::warn!("Discarding torn player event ({n} bytes).");
            }
            Err(e) => {
                tracing::warn!("Player event queue failed: {e}");
                break;
            }
        }
    }
}

fn handle_player_event(app: &mut App, event: PlayerEvent) {
    match event {
        PlayerEvent::Started(file) => {
            let name = app
                .library
                .name(file)
                .unwrap_or("<unknown track>")
                .to_string();
            tracing::info!("Player started playing '{name}'.");
            if let Some(cover) = app.library.cover_path(file) {
                tracing::debug!("Cover art: {}", cover.display());
            }
            app.current = Some(name);
        }
        PlayerEvent::Stopped => {
            tracing::info!("Player stopped.");
            app.current = None;
        }
        PlayerEvent::Paused => {
            tracing::info!("Player pause toggled.");
        }
        PlayerEvent::Progress(fraction) => {
            if let Some(current) = &app.current {
                tracing::debug!("{current}: {:3.0}%", fraction * 100.0);
            }
        }
        PlayerEvent::Seeked(fraction) => {
            tracing::debug!("Player seeked to {:3.0}%.", fraction * 100.0);
        }
    }
}

fn on_control_event(app: &mut App, ctl: &ReactorCtl) {
    loop {
        match app.control.events().read_record() {
            Ok(Some(record)) => match ControlEvent::decode(&record) {
                Ok(event) => handle_control_event(app, ctl, event),
                Err(e) => tracing::warn!("Discarding bad control event: {e}"),
            },
            Ok(None) => break,
            Err(event::EventError::ShortRead(n)) => {
                tracing::warn!("Discarding torn control event ({n} bytes).");
            }
            Err(e) => {
                tracing::warn!("Control event queue failed: {e}");
                break;
            }
        }
    }
}

fn handle_control_event(app: &mut App, ctl: &ReactorCtl, event: ControlEvent) {
    match event {
        ControlEvent::Search(query) => enqueue_matches(app, &query),
        ControlEvent::Pause => app.player.pause(),
        ControlEvent::Next => match app.player.next() {
            Ok(()) => {}
            Err(player::PlayerError::QueueEmpty | player::PlayerError::NoPlayableTrack) => {
                tracing::info!("Queue exhausted.");
            }
            Err(e) => tracing::error!("Skipping to next track failed: {e}"),
        },
        ControlEvent::Seek(fraction) => {
            if let Err(e) = app.player.seek(fraction) {
                tracing::warn!("Seek failed: {e}");
            }
        }
        ControlEvent::Clear => {
            app.player.queue().clear();
            tracing::info!("Queue cleared.");
        }
        ControlEvent::Quit => ctl.request_exit(),
    }
}

/// Search the library and append all hits to the playback queue, starting
/// the player if it was idle.
fn enqueue_matches(app: &mut App, query: &str) {
    let hits = match app.library.find(query) {
        Ok(hits) => hits,
        Err(e) => {
            tracing::error!("Searching for '{query}' in library failed: {e}");
            return;
        }
    };
    tracing::info!("{} files matching '{query}'.", hits.len());
    if hits.is_empty() {
        return;
    }

    let items: Vec<QueueItem> = hits
        .into_iter()
        .filter_map(|id| {
            Some(QueueItem {
                file: id,
                path: app.library.path(id)?,
                name: app.library.name(id)?.to_string(),
            })
        })
        .collect();
    if let Err(e) = app.player.queue().add(items) {
        tracing::error!("Could not add search result for '{query}' to player queue: {e}");
        return;
    }
    match app.player.start() {
        Ok(()) => {}
        Err(e) => tracing::error!("Player start failed: {e}"),
    }
}
