//! Per-window event delivery
//!
//! Each window listens on its own socket and serves one event consumer at a
//! time. Events are drained from a bounded queue to that consumer in FIFO
//! order. When the consumer hangs up, whatever is still queued is discarded
//! and the socket goes back to accepting. Delivery is best-effort: with no
//! consumer connected, or with a full queue, events are dropped and counted.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace, warn};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::protocol::{transport, Event, WindowId};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// Producer side of a window's event channel.
///
/// Dropping the channel cancels the delivery task, disconnects the consumer
/// and removes the socket file, even if a write to the consumer is stuck.
#[derive(Debug)]
pub struct EventChannel {
    window: WindowId,
    path: PathBuf,
    queue: mpsc::Sender<Event>,
    connected: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl EventChannel {
    /// Bind the socket at `path` and start waiting for a consumer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(window: WindowId, path: PathBuf, capacity: usize) -> io::Result<Self> {
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        let listener = UnixListener::bind(&path)?;

        let (queue, receiver) = mpsc::channel(capacity.max(1));
        let (shutdown, shutdown_rx) = oneshot::channel();
        let connected = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicU64::new(0));

        tokio::spawn(deliver(
            Delivery {
                window,
                queue: receiver,
                connected: Arc::clone(&connected),
                dropped: Arc::clone(&dropped),
            },
            listener,
            shutdown_rx,
        ));

        debug!("Event socket for window {} listening on {:?}", window, path);

        Ok(Self {
            window,
            path,
            queue,
            connected,
            dropped,
            shutdown: Some(shutdown),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Number of events discarded so far.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Queue `event` for delivery without blocking.
    pub fn send(&self, event: Event) -> bool {
        if !self.is_connected() {
            debug!(
                "Window {} has no event client, dropping {:?}",
                self.window, event
            );
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        match self.queue.try_send(event) {
            Ok(()) => {
                trace!("Queued {:?} for window {}", event, self.window);
                true
            }
            Err(TrySendError::Full(event)) => {
                warn!(
                    "⚠️ Event queue of window {} is full, dropping {:?}",
                    self.window, event
                );
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Closed(event)) => {
                debug!(
                    "Event delivery for window {} has stopped, dropping {:?}",
                    self.window, event
                );
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("⚠️ Failed to remove event socket {:?}: {}", self.path, e);
            }
        }
    }
}

/// State the delivery task shares with its [`EventChannel`].
struct Delivery {
    window: WindowId,
    queue: mpsc::Receiver<Event>,
    connected: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

/// How serving one consumer ended.
enum Served {
    /// The consumer hung up or a write to it failed.
    ConsumerGone,
    /// The channel was dropped.
    Cancelled,
}

/// Serve consumers one at a time until the channel is dropped.
async fn deliver(
    mut delivery: Delivery,
    listener: UnixListener,
    mut shutdown: oneshot::Receiver<()>,
) {
    let window = delivery.window;

    loop {
        let stream = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => stream,
                Err(e) => {
                    warn!("⚠️ Event socket of window {} failed to accept: {}", window, e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            }
        };

        info!("🤝 Client connected to event socket of window {}", window);
        delivery.connected.store(true, Ordering::Release);

        let served = serve(&mut delivery, &stream, &mut shutdown).await;

        delivery.connected.store(false, Ordering::Release);
        drop(stream);

        match served {
            Served::Cancelled => break,
            Served::ConsumerGone => {
                let mut stale = 0u64;
                while delivery.queue.try_recv().is_ok() {
                    stale += 1;
                }
                delivery.dropped.fetch_add(stale, Ordering::Relaxed);
                info!(
                    "📪 Event client of window {} left, {} queued event(s) dropped",
                    window, stale
                );
            }
        }
    }

    debug!("Event delivery for window {} finished", window);
}

/// Forward queued events to one consumer. Every await here is raced against
/// `shutdown`, so a consumer that stops reading cannot hold the task.
async fn serve(
    delivery: &mut Delivery,
    stream: &UnixStream,
    shutdown: &mut oneshot::Receiver<()>,
) -> Served {
    let window = delivery.window;

    loop {
        let event = tokio::select! {
            biased;
            _ = &mut *shutdown => return Served::Cancelled,
            gone = hung_up(stream) => {
                if let Err(e) = gone {
                    debug!("Event client of window {} failed: {}", window, e);
                }
                return Served::ConsumerGone;
            }
            next = delivery.queue.recv() => match next {
                Some(event) => event,
                None => return Served::Cancelled,
            },
        };

        let frame = event.encode();
        let sent = tokio::select! {
            biased;
            _ = &mut *shutdown => return Served::Cancelled,
            sent = transport::send_frame(stream, &frame, None) => sent,
        };

        if let Err(e) = sent {
            warn!("⚠️ Failed to deliver {:?} to window {}: {}", event, window, e);
            delivery.dropped.fetch_add(1, Ordering::Relaxed);
            return Served::ConsumerGone;
        }
        trace!("Delivered {:?} to window {}", event, window);
    }
}

/// Resolve once the consumer closes its end. Consumers have nothing to say,
/// so anything they write is discarded.
async fn hung_up(stream: &UnixStream) -> io::Result<()> {
    let mut scratch = [0u8; 64];
    loop {
        stream.readable().await?;
        match stream.try_read(&mut scratch) {
            Ok(0) => return Ok(()),
            Ok(n) => trace!("Discarding {} bytes from event client", n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e),
        }
    }
}
