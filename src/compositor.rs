//! Frame loop
//!
//! Ties the subsystems together. Once per frame the compositor drains the
//! input feed, runs the window manager over the locked registry and hands
//! the window list to a [`Presenter`] for drawing.

use std::time::Duration;

use anyhow::Result;
use log::{debug, info, trace};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::config::VitrineConfig;
use crate::decoration::FrameMetrics;
use crate::input::{InputEvent, InputState};
use crate::protocol::{Event, WindowId};
use crate::server::Server;
use crate::window::Window;
use crate::wm::WindowManager;

/// Pending input events accepted before the device layer is pushed back.
const INPUT_QUEUE: usize = 256;

/// Renderer seam: receives the window list, bottom to top, once per frame.
///
/// Called with the registry lock held, so implementations must not block.
pub trait Presenter: Send {
    fn present(&mut self, windows: &[Window]);
}

/// Presenter that only logs what it would draw.
#[derive(Debug, Default)]
pub struct LogPresenter {
    frames: u64,
}

impl Presenter for LogPresenter {
    fn present(&mut self, windows: &[Window]) {
        self.frames += 1;
        for window in windows {
            let geometry = window.geometry();
            trace!(
                "frame {}: window {} {:?} at ({}, {}) {}x{} buffer: {}",
                self.frames,
                window.id(),
                window.title(),
                geometry.x,
                geometry.y,
                geometry.width,
                geometry.height,
                window.buffer().is_some()
            );
        }
    }
}

/// Main compositor struct that orchestrates all subsystems
pub struct Compositor {
    config: VitrineConfig,
    server: Server,
    window_manager: WindowManager,
    input: InputState,
    input_tx: mpsc::Sender<InputEvent>,
    input_rx: mpsc::Receiver<InputEvent>,
    presenter: Box<dyn Presenter>,
}

impl Compositor {
    pub fn new(config: VitrineConfig, server: Server, presenter: Box<dyn Presenter>) -> Self {
        info!("🏗️ Initializing vitrine compositor...");

        let window_manager = WindowManager::new(FrameMetrics::from(&config.decorations));
        let input = InputState::new(&config.input);
        let (input_tx, input_rx) = mpsc::channel(INPUT_QUEUE);

        Self {
            config,
            server,
            window_manager,
            input,
            input_tx,
            input_rx,
            presenter,
        }
    }

    /// Sender for the device layer to push input through.
    pub fn input_sender(&self) -> mpsc::Sender<InputEvent> {
        self.input_tx.clone()
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn config(&self) -> &VitrineConfig {
        &self.config
    }

    /// The output changed size; only the cursor bounds follow.
    pub fn resize_output(&mut self, width: i32, height: i32) {
        self.input.set_cursor_bounds(width, height);
    }

    /// Run a single frame. Returns the events the window manager emitted.
    pub fn frame(&mut self) -> Vec<(WindowId, Event)> {
        while let Ok(event) = self.input_rx.try_recv() {
            self.input.process(event);
        }
        let input = self.input.frame();

        let events = self.window_manager.update_server(&self.server, &input);

        let presenter = &mut self.presenter;
        self.server.with_windows(|windows| presenter.present(windows));

        events
    }

    /// Run frames at `general.max_fps` until SIGINT or SIGTERM, then destroy
    /// the server.
    pub async fn run(mut self) -> Result<()> {
        info!("🎬 Starting vitrine frame loop at {} fps", self.config.general.max_fps);

        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

        let period = Duration::from_secs_f64(1.0 / f64::from(self.config.general.max_fps.max(1)));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("📨 Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("📨 Received SIGINT (Ctrl+C), shutting down gracefully");
                    break;
                }
                _ = ticker.tick() => {
                    let events = self.frame();
                    if !events.is_empty() {
                        debug!("Frame emitted {} event(s)", events.len());
                    }
                }
            }
        }

        self.shutdown().await;
        info!("🛑 vitrine frame loop finished");
        Ok(())
    }

    async fn shutdown(self) {
        info!("🔽 Shutting down vitrine compositor...");
        self.server.destroy().await;
        info!("✅ vitrine compositor shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Command, MouseButton, Response};
    use crate::session::Session;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Vec<WindowId>>>>);

    impl Presenter for Recorder {
        fn present(&mut self, windows: &[Window]) {
            self.0.lock().push(windows.iter().map(Window::id).collect());
        }
    }

    fn create(server: &Server, size: i32) -> WindowId {
        match server.execute(Command::CreateWindow {
            title: "test".to_string(),
            width: size,
            height: size,
        }) {
            Response::WindowId(id) => id,
            other => panic!("Expected a window id, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_frame_routes_input_and_presents() {
        let dir = tempfile::tempdir().unwrap();
        let config = VitrineConfig::default();
        let server = Server::create(Session::create(dir.path()), &config).unwrap();
        let recorder = Recorder::default();
        let mut compositor = Compositor::new(config, server, Box::new(recorder.clone()));

        let a = create(compositor.server(), 100);
        let b = create(compositor.server(), 50);

        let input = compositor.input_sender();
        input.send(InputEvent::Motion { dx: 80, dy: 10 }).await.unwrap();
        input
            .send(InputEvent::Button {
                button: MouseButton::Left,
                pressed: true,
            })
            .await
            .unwrap();

        compositor.frame();

        let frames = recorder.0.lock().clone();
        assert_eq!(frames, vec![vec![b, a]]);

        compositor.shutdown().await;
    }

    #[tokio::test]
    async fn test_resize_clamps_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let config = VitrineConfig::default();
        let server = Server::create(Session::create(dir.path()), &config).unwrap();
        let mut compositor = Compositor::new(config, server, Box::<LogPresenter>::default());

        compositor
            .input_sender()
            .send(InputEvent::Motion { dx: 5000, dy: 5000 })
            .await
            .unwrap();
        compositor.frame();
        compositor.resize_output(640, 480);
        assert_eq!(compositor.input.cursor().x, 639);

        compositor.shutdown().await;
    }
}
