//! Unix domain socket server for IPC
//!
//! Provides request-response communication and pushes coordinator events
//! to subscribed clients.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::load_workflows;
use crate::events::CoordinatorEvent;
use crate::hotkey::HotkeyListener;
use crate::state::EventCoordinator;

use super::protocol::{DaemonStatus, Request, Response};

const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Applies requests to the coordinator
pub struct RequestHandler {
    coordinator: EventCoordinator,
    listener: Arc<HotkeyListener>,
    workflows_path: PathBuf,
    start_time: Instant,
}

impl RequestHandler {
    pub fn new(coordinator: EventCoordinator, listener: Arc<HotkeyListener>, workflows_path: PathBuf) -> Self {
        Self {
            coordinator,
            listener,
            workflows_path,
            start_time: Instant::now(),
        }
    }

    pub fn status(&self) -> DaemonStatus {
        let status = self.coordinator.status();
        DaemonStatus {
            mode: status.mode,
            macro_state: status.macro_state,
            tap_enabled: self.listener.is_tap_enabled(),
            workflows: status.workflows,
            macros: status.macros,
            uptime_secs: self.start_time.elapsed().as_secs(),
            ..DaemonStatus::default()
        }
    }

    /// Process a request and return a response
    pub fn process(&self, request: Request) -> Response {
        let inputs = self.coordinator.inputs();
        match request {
            Request::Ping => Response::Pong,
            Request::GetStatus => Response::Status(self.status()),
            Request::SetMode { mode } => {
                info!(%mode, "mode changed via IPC");
                self.coordinator.set_mode(mode);
                Response::Ok
            }
            Request::SetFrontmostApplication { bundle_identifier } => {
                debug!(app = %bundle_identifier, "frontmost application");
                inputs.set_frontmost_application(bundle_identifier);
                Response::Ok
            }
            Request::SetUserModes { modes } => {
                inputs.set_user_modes(modes.into_iter().collect::<HashSet<_>>());
                Response::Ok
            }
            Request::RecordKeystroke { allow_all_keys } => {
                self.coordinator.start_keystroke_recording(allow_all_keys);
                Response::Ok
            }
            Request::RecordMacro => {
                self.coordinator.start_macro_recording();
                Response::Ok
            }
            Request::RemoveMacro => {
                self.coordinator.start_macro_removal();
                Response::Ok
            }
            Request::SetRepeatCount { count } => {
                inputs.set_repeat_count(count);
                Response::Ok
            }
            Request::ReloadWorkflows => match load_workflows(&self.workflows_path) {
                Ok(workflows) => {
                    self.coordinator.reload(&workflows);
                    Response::Reloaded {
                        workflows: self.coordinator.status().workflows,
                    }
                }
                Err(e) => {
                    warn!(%e, "workflow reload failed");
                    Response::error("reload_failed", e.to_string())
                }
            },
            Request::Subscribe => Response::Subscribed,
        }
    }
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    handler: Arc<RequestHandler>,
    event_tx: broadcast::Sender<CoordinatorEvent>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Create a new IPC server
    pub fn new(
        socket_path: &Path,
        handler: Arc<RequestHandler>,
        event_tx: broadcast::Sender<CoordinatorEvent>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))
                .context("failed to set socket permissions")?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            handler,
            event_tx,
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let handler = Arc::clone(&self.handler);
                    let event_tx = self.event_tx.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = handle_client(stream, handler, event_tx) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Handle a single client connection
async fn handle_client(
    stream: UnixStream,
    handler: Arc<RequestHandler>,
    event_tx: broadcast::Sender<CoordinatorEvent>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let (request_tx, mut request_rx) = mpsc::channel(16);
    // Reads happen on their own task so a pushed notification never
    // interrupts a half-read frame
    let reader_task = tokio::spawn(read_requests(reader, request_tx));
    let mut notifications: Option<broadcast::Receiver<CoordinatorEvent>> = None;

    loop {
        tokio::select! {
            request = request_rx.recv() => {
                let Some(request) = request else {
                    debug!("client disconnected");
                    break;
                };
                let response = match request {
                    Ok(Request::Subscribe) => {
                        notifications = Some(event_tx.subscribe());
                        debug!("client subscribed to notifications");
                        Response::Subscribed
                    }
                    Ok(request) => {
                        debug!(?request, "received request");
                        handler.process(request)
                    }
                    Err(message) => Response::error("invalid_request", message),
                };
                send_message(&mut writer, &response).await?;
            }
            event = next_notification(&mut notifications) => match event {
                Ok(event) => send_message(&mut writer, &Response::Notification { event }).await?,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "notification receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => notifications = None,
            },
        }
    }

    reader_task.abort();
    Ok(())
}

async fn next_notification(
    notifications: &mut Option<broadcast::Receiver<CoordinatorEvent>>,
) -> Result<CoordinatorEvent, broadcast::error::RecvError> {
    match notifications {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Read length-prefixed requests until the client goes away
async fn read_requests(mut reader: OwnedReadHalf, request_tx: mpsc::Sender<Result<Request, String>>) {
    let mut len_buf = [0u8; 4];
    loop {
        // Read message length (4-byte little-endian)
        if let Err(e) = reader.read_exact(&mut len_buf).await {
            if e.kind() != std::io::ErrorKind::UnexpectedEof {
                warn!(?e, "read error");
            }
            return;
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_MESSAGE_LEN {
            warn!(len, "message too large, disconnecting");
            return;
        }

        let mut msg_buf = vec![0u8; len];
        if let Err(e) = reader.read_exact(&mut msg_buf).await {
            warn!(?e, "failed to read message body");
            return;
        }

        let request = serde_json::from_slice(&msg_buf).map_err(|e| e.to_string());
        if request_tx.send(request).await.is_err() {
            return;
        }
    }
}

/// Send a length-prefixed JSON message
async fn send_message<T: serde::Serialize>(writer: &mut OwnedWriteHalf, msg: &T) -> Result<()> {
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::AnsiKeyCodeStore;
    use crate::state::{Collaborators, Inputs, Mode};
    use crate::testing::{RecordingKeyboard, RecordingNotifier, RecordingPoster, RecordingRunner};
    use crate::workflow::KeyShortcut;

    fn handler(workflows_path: PathBuf) -> (Arc<RequestHandler>, broadcast::Sender<CoordinatorEvent>) {
        let (tx, _rx) = broadcast::channel(16);
        let collaborators = Collaborators {
            runner: Arc::new(RecordingRunner::default()),
            keyboard: Arc::new(RecordingKeyboard::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            key_codes: Arc::new(AnsiKeyCodeStore::new()),
            poster: Arc::new(RecordingPoster::default()),
        };
        let coordinator = EventCoordinator::new(
            &[],
            KeyShortcut::new("M", []),
            collaborators,
            Arc::new(Inputs::new()),
            tx.clone(),
            tokio::runtime::Handle::current(),
        );
        let listener = Arc::new(HotkeyListener::new(coordinator.clone(), tx.clone()));
        (
            Arc::new(RequestHandler::new(coordinator, listener, workflows_path)),
            tx,
        )
    }

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("keyflow-ipc-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    async fn request(stream: &mut UnixStream, request: &Request) -> Response {
        let bytes = serde_json::to_vec(request).unwrap();
        stream.write_all(&(bytes.len() as u32).to_le_bytes()).await.unwrap();
        stream.write_all(&bytes).await.unwrap();
        read_response(stream).await
    }

    async fn read_response(stream: &mut UnixStream) -> Response {
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await.unwrap();
        let mut body = vec![0u8; u32::from_le_bytes(len_buf) as usize];
        stream.read_exact(&mut body).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_requests_update_coordinator() {
        let (handler, _tx) = handler(scratch("process").join("workflows.json"));

        assert!(matches!(handler.process(Request::Ping), Response::Pong));
        handler.process(Request::SetMode { mode: Mode::Disabled });
        handler.process(Request::SetFrontmostApplication {
            bundle_identifier: "com.apple.Notes".into(),
        });
        handler.process(Request::SetRepeatCount { count: 3 });

        let Response::Status(status) = handler.process(Request::GetStatus) else {
            panic!("expected status");
        };
        assert_eq!(status.mode, Mode::Disabled);
        assert!(!status.tap_enabled);
        let inputs = handler.coordinator.inputs();
        assert_eq!(inputs.frontmost_application().as_str(), "com.apple.Notes");
        assert_eq!(inputs.take_repeat_count(), 3);
    }

    #[tokio::test]
    async fn test_reload_reads_workflows_file() {
        let dir = scratch("reload");
        let path = dir.join("workflows.json");
        std::fs::write(
            &path,
            r#"[{"name": "W", "trigger": {"type": "keyboard_shortcuts", "shortcuts": [{"key": "K"}]}}]"#,
        )
        .unwrap();
        let (handler, _tx) = handler(path.clone());

        assert!(matches!(
            handler.process(Request::ReloadWorkflows),
            Response::Reloaded { workflows: 1 }
        ));

        std::fs::write(&path, "[").unwrap();
        assert!(matches!(
            handler.process(Request::ReloadWorkflows),
            Response::Error { code, .. } if code == "reload_failed"
        ));
    }

    #[tokio::test]
    async fn test_subscribed_client_receives_events() {
        let dir = scratch("socket");
        let socket_path = dir.join("daemon.sock");
        let (handler, tx) = handler(dir.join("workflows.json"));
        let server = Arc::new(Server::new(&socket_path, handler.clone(), tx).unwrap());
        let running = Arc::clone(&server);
        tokio::spawn(async move { running.run().await });

        let mut client = UnixStream::connect(&socket_path).await.unwrap();
        assert!(matches!(request(&mut client, &Request::Ping).await, Response::Pong));
        assert!(matches!(
            request(&mut client, &Request::Subscribe).await,
            Response::Subscribed
        ));

        handler.process(Request::SetMode { mode: Mode::Disabled });
        let pushed = read_response(&mut client).await;
        assert!(matches!(
            pushed,
            Response::Notification {
                event: CoordinatorEvent::ModeChanged { mode: Mode::Disabled, .. }
            }
        ));

        server.shutdown().await;
        assert!(!socket_path.exists());
    }
}
