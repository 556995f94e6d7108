//! keyflow-daemon: Background daemon for global keyboard automation
//!
//! This daemon runs as a LaunchAgent and provides:
//! - Global key interception via CGEventTap
//! - Shortcut and sequence resolution against keyboard-triggered workflows
//! - Per-application macro recording and playback
//! - IPC server for the UI (mode changes, frontmost app, notifications)

use std::sync::Arc;

use anyhow::Result;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use keyflow::config::Config;
use keyflow::events::CoordinatorEvent;
use keyflow::hotkey::{AnsiKeyCodeStore, HotkeyListener, SystemEventPoster};
use keyflow::ipc::{RequestHandler, Server};
use keyflow::lifecycle::ShutdownSignal;
use keyflow::runner::{EventNotifier, ProcessExecutor, SyntheticKeyboard, TaskRunner};
use keyflow::state::{Collaborators, EventCoordinator, Inputs};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "keyflow-daemon starting");

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, ?config.workflows_path, "configuration loaded");

    let workflows = config.load_workflows()?;

    // Create shutdown signal handler
    let shutdown = ShutdownSignal::new();

    // Coordinator -> IPC subscribers
    let (event_tx, _event_rx) = broadcast::channel::<CoordinatorEvent>(64);

    // Wire the collaborators the coordinator dispatches to
    let key_codes = Arc::new(AnsiKeyCodeStore::new());
    let poster = Arc::new(SystemEventPoster::new());
    let keyboard = Arc::new(SyntheticKeyboard::new(key_codes.clone(), poster.clone()));
    let executor = Arc::new(ProcessExecutor::new(keyboard.clone()));
    let collaborators = Collaborators {
        runner: Arc::new(TaskRunner::new(Handle::current(), executor)),
        keyboard,
        notifier: Arc::new(EventNotifier::new(event_tx.clone(), config.settings.notifications)),
        key_codes,
        poster,
    };

    let coordinator = EventCoordinator::new(
        &workflows,
        config.settings.macro_record_shortcut.clone(),
        collaborators,
        Arc::new(Inputs::new()),
        event_tx.clone(),
        Handle::current(),
    );

    // Start the event tap (runs on dedicated thread)
    let listener = Arc::new(HotkeyListener::new(coordinator.clone(), event_tx.clone()));
    match listener.start() {
        Ok(()) => {
            info!("hotkey listener started");
        }
        Err(e) => {
            error!(%e, "failed to start hotkey listener");
            warn!("continuing without key interception - check Accessibility permissions");
        }
    }

    let handler = Arc::new(RequestHandler::new(
        coordinator,
        Arc::clone(&listener),
        config.workflows_path.clone(),
    ));
    let server = Server::new(&config.socket_path, handler, event_tx)?;

    info!("daemon initialized, entering main loop");

    tokio::select! {
        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Wait for shutdown signal
        result = shutdown.wait() => match result {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => error!(?e, "failed to register signal handlers"),
        },
    }

    // Cleanup
    info!("shutting down...");

    listener.stop();
    server.shutdown().await;

    info!("keyflow-daemon stopped");

    Ok(())
}
