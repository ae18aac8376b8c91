//! Control-plane server
//!
//! Listens on the session's control socket, runs one task per connected
//! client and serializes every registry mutation behind a single lock.
//! Each client sends one command at a time and gets exactly one response.

pub mod registry;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use crate::config::VitrineConfig;
use crate::protocol::transport::{self, Incoming};
use crate::protocol::{Command, CommandFrame, Response, Status};
use crate::session::Session;
use crate::window::{Rectangle, Window};

pub use registry::{Registry, RegistryError};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// State shared between the server handle and its tasks
#[derive(Debug)]
struct Shared {
    session: Session,
    registry: RwLock<Registry>,
    default_origin: (i32, i32),
    queue_capacity: usize,
}

impl Shared {
    fn execute(&self, command: Command) -> Response {
        debug!("📨 {}", command.name());

        match command {
            Command::CreateWindow {
                title,
                width,
                height,
            } => {
                let id = match self.registry.write().allocate_id() {
                    Ok(id) => id,
                    Err(e) => {
                        warn!("⚠️ Refusing to create window {:?}: {}", title, e);
                        return Response::Error(e.status());
                    }
                };

                // Binding the event socket happens outside the lock.
                let (x, y) = self.default_origin;
                let window = Window::create(
                    id,
                    title,
                    Rectangle::new(x, y, width, height),
                    &self.session,
                    self.queue_capacity,
                );

                let rejected = self.registry.write().push(window).err();
                match rejected {
                    Some((e, window)) => {
                        warn!("⚠️ Dropping window {}: {}", window.id(), e);
                        drop(window);
                        Response::Error(e.status())
                    }
                    None => {
                        info!("🪟 Created window {}", id);
                        Response::WindowId(id)
                    }
                }
            }

            Command::CloseWindow { id } => {
                let removed = self.registry.write().remove(id);
                match removed {
                    Ok(window) => {
                        // Tear down the event channel and buffer after unlocking
                        drop(window);
                        info!("🗑️ Closed window {}", id);
                        Response::Empty
                    }
                    Err(e) => {
                        debug!("CloseWindow failed: {}", e);
                        Response::Error(e.status())
                    }
                }
            }

            Command::SetWindowBuffer {
                id,
                descriptor,
                handle,
            } => {
                let result = self.registry.write().set_buffer(id, descriptor, handle);
                match result {
                    Ok(previous) => {
                        drop(previous);
                        debug!(
                            "🖼️ Window {} buffer set to {}x{} format {:#x} stride {}",
                            id,
                            descriptor.width,
                            descriptor.height,
                            descriptor.pixel_format,
                            descriptor.stride
                        );
                        Response::Empty
                    }
                    Err(e) => {
                        debug!("SetWindowBuffer failed: {}", e);
                        Response::Error(e.status())
                    }
                }
            }
        }
    }
}

/// A running control-plane server
#[derive(Debug)]
pub struct Server {
    shared: Arc<Shared>,
    socket_path: PathBuf,
    shutdown: watch::Sender<bool>,
    accept_task: Option<JoinHandle<()>>,
}

impl Server {
    /// Bind the control socket and start accepting clients.
    ///
    /// Must be called from within a tokio runtime. Failing to bind is fatal.
    pub fn create(session: Session, config: &VitrineConfig) -> Result<Self> {
        let socket_path = session.channel_name();

        // Remove a stale socket left behind by a crashed run
        if socket_path.exists() {
            std::fs::remove_file(&socket_path).with_context(|| {
                format!("Failed to remove existing socket: {:?}", socket_path)
            })?;
        }

        let listener = UnixListener::bind(&socket_path)
            .with_context(|| format!("Failed to bind Unix socket: {:?}", socket_path))?;

        info!("🔗 vitrine server listening on: {:?}", socket_path);

        let shared = Arc::new(Shared {
            session,
            registry: RwLock::new(Registry::new(config.server.max_windows)),
            default_origin: (config.window.default_x, config.window.default_y),
            queue_capacity: config.events.queue_capacity,
        });

        let (shutdown, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_connections(
            Arc::clone(&shared),
            listener,
            shutdown_rx,
        ));

        Ok(Self {
            shared,
            socket_path,
            shutdown,
            accept_task: Some(accept_task),
        })
    }

    pub fn session(&self) -> &Session {
        &self.shared.session
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Run a command as if a client had sent it.
    pub fn execute(&self, command: Command) -> Response {
        self.shared.execute(command)
    }

    /// Read the window list, bottom to top, under the registry lock.
    pub fn with_windows<R>(&self, f: impl FnOnce(&[Window]) -> R) -> R {
        let registry = self.shared.registry.read();
        f(registry.windows())
    }

    /// Mutate the registry under the lock. The closure must not block.
    pub fn with_registry<R>(&self, f: impl FnOnce(&mut Registry) -> R) -> R {
        let mut registry = self.shared.registry.write();
        f(&mut registry)
    }

    pub fn window_count(&self) -> usize {
        self.shared.registry.read().len()
    }

    /// Stop accepting, disconnect every client and destroy all windows.
    pub async fn destroy(mut self) {
        info!("🛑 Shutting down vitrine server...");

        let _ = self.shutdown.send(true);
        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                warn!("⚠️ Accept task ended abnormally: {}", e);
            }
        }

        let windows = self.shared.registry.write().drain();
        let count = windows.len();
        drop(windows);

        self.remove_socket();
        info!("✅ Server stopped, {} window(s) destroyed", count);
    }

    fn remove_socket(&self) {
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("⚠️ Failed to remove socket file: {}", e);
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        self.remove_socket();
    }
}

/// Accept clients until shutdown, then stop every handler.
async fn accept_connections(
    shared: Arc<Shared>,
    listener: UnixListener,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut clients = JoinSet::new();
    let mut next_client: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let client = next_client;
                    next_client += 1;
                    info!("🤝 Client {} connected", client);
                    clients.spawn(handle_client(
                        Arc::clone(&shared),
                        stream,
                        shutdown.clone(),
                        client,
                    ));
                }
                Err(e) => {
                    error!("❌ Error accepting connection: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            // Reap finished handlers as we go
            Some(_) = clients.join_next(), if !clients.is_empty() => {}
        }
    }

    drop(listener);
    // Handlers watch the same signal; anything still stuck is aborted here.
    clients.shutdown().await;
    debug!("Accept loop finished");
}

/// Serve one client: read a command, answer it, repeat.
async fn handle_client(
    shared: Arc<Shared>,
    stream: UnixStream,
    mut shutdown: watch::Receiver<bool>,
    client: u64,
) {
    loop {
        let received = tokio::select! {
            _ = shutdown.changed() => break,
            received = transport::recv_frame::<CommandFrame>(&stream) => received,
        };

        let Incoming {
            frame,
            handle,
            surplus_handles,
        } = match received {
            Ok(Some(incoming)) => incoming,
            Ok(None) => {
                info!("📪 Client {} disconnected", client);
                break;
            }
            Err(e) => {
                warn!("⚠️ Client {} connection failed: {}", client, e);
                break;
            }
        };

        let response = if surplus_handles > 0 {
            warn!(
                "⚠️ Client {} attached {} descriptors to one command",
                client,
                surplus_handles + 1
            );
            drop(handle);
            Response::Error(Status::InvalidCommand)
        } else {
            match Command::decode(&frame, handle) {
                Ok(command) => shared.execute(command),
                Err(e) => {
                    warn!("⚠️ Client {} sent an invalid command: {}", client, e);
                    Response::Error(Status::InvalidCommand)
                }
            }
        };

        // A client that never reads its responses must not stall shutdown
        let reply = response.encode();
        let sent = tokio::select! {
            _ = shutdown.changed() => break,
            sent = transport::send_frame(&stream, &reply, None) => sent,
        };
        if let Err(e) = sent {
            warn!("⚠️ Failed to answer client {}: {}", client, e);
            break;
        }
    }
}
