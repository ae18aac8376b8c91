//! # vitrine display server library
//!
//! A minimal display server control plane: clients create windows over a
//! Unix socket, publish DMA-buf handles for their contents and receive input
//! events on a per-window channel, while a frame loop runs window
//! management and hands the window list to a renderer.
//!
//! ## Architecture
//!
//! - `session`: per-run token and socket addresses
//! - `protocol`: fixed-size wire frames and descriptor passing
//! - `server`: control socket, client handlers and the window registry
//! - `window`: window entries and their event channels
//! - `decoration`: frame geometry for hit-testing
//! - `wm`: dragging, focus, close button and input forwarding
//! - `input`: abstract pointer feed
//! - `config`: configuration parsing and management
//! - `compositor`: the frame loop
//!
//! ## Usage
//!
//! ```rust,no_run
//! use vitrine::{Compositor, LogPresenter, Server, Session, VitrineConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = VitrineConfig::default();
//!     let session = Session::create(&config.server.runtime_dir);
//!     let server = Server::create(session, &config)?;
//!     Compositor::new(config, server, Box::<LogPresenter>::default()).run().await
//! }
//! ```

pub mod compositor;
pub mod config;
pub mod decoration;
pub mod input;
pub mod protocol;
pub mod server;
pub mod session;
pub mod window;
pub mod wm;

// Re-export main types for easy access
pub use compositor::{Compositor, LogPresenter, Presenter};
pub use config::VitrineConfig;
pub use protocol::{Command, Event, Response, Status, WindowId};
pub use server::Server;
pub use session::Session;
pub use window::Window;
pub use wm::WindowManager;

// Re-export common error types
pub use anyhow::{Context, Error, Result};

/// Version information for vitrine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
