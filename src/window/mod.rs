//! Window registry entries
//!
//! A [`Window`] is the server's record of one client window:
//! - identity and title
//! - geometry (size fixed at creation, origin moved by dragging)
//! - the currently published DMA-buf, if any
//! - the event channel used to push input back to the owner
//!
//! Windows are created and destroyed by the server. The window manager only
//! ever moves them, always under the registry lock.

pub mod event_channel;

use std::ops::Sub;

use log::{debug, warn};

use crate::protocol::{BufferDescriptor, BufferHandle, Event, WindowId};
use crate::session::Session;

pub use event_channel::EventChannel;

/// Integer point in screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0 && self.y == 0
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x.saturating_sub(rhs.x), self.y.saturating_sub(rhs.y))
    }
}

/// Rectangle for window positioning and hit-testing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rectangle {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Half-open containment: the right and bottom edges are outside.
    pub fn contains(&self, point: Point) -> bool {
        let (px, py) = (i64::from(point.x), i64::from(point.y));
        let (x, y) = (i64::from(self.x), i64::from(self.y));
        px >= x
            && px < x + i64::from(self.width)
            && py >= y
            && py < y + i64::from(self.height)
    }
}

/// A published buffer: descriptor plus the handle that keeps it alive.
#[derive(Debug)]
pub struct Buffer {
    pub descriptor: BufferDescriptor,
    handle: BufferHandle,
}

impl Buffer {
    pub fn new(descriptor: BufferDescriptor, handle: BufferHandle) -> Self {
        Self { descriptor, handle }
    }

    pub fn handle(&self) -> &BufferHandle {
        &self.handle
    }
}

/// One live client window.
#[derive(Debug)]
pub struct Window {
    id: WindowId,
    title: String,
    geometry: Rectangle,
    buffer: Option<Buffer>,
    events: Option<EventChannel>,
}

impl Window {
    /// Create a window and open its event socket.
    ///
    /// A window whose event socket cannot be opened is still created; it just
    /// never receives events.
    pub fn create(
        id: WindowId,
        title: String,
        geometry: Rectangle,
        session: &Session,
        queue_capacity: usize,
    ) -> Self {
        let path = session.window_resource_name(id);
        let events = match EventChannel::open(id, path, queue_capacity) {
            Ok(channel) => Some(channel),
            Err(e) => {
                warn!(
                    "⚠️ Failed to create event socket for window {}: {}. Window won't receive events",
                    id, e
                );
                None
            }
        };

        debug!(
            "Created window {} {:?} at ({}, {}) size {}x{}",
            id, title, geometry.x, geometry.y, geometry.width, geometry.height
        );

        Self {
            id,
            title,
            geometry,
            buffer: None,
            events,
        }
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn geometry(&self) -> Rectangle {
        self.geometry
    }

    pub fn buffer(&self) -> Option<&Buffer> {
        self.buffer.as_ref()
    }

    pub fn event_channel(&self) -> Option<&EventChannel> {
        self.events.as_ref()
    }

    pub(crate) fn set_position(&mut self, origin: Point) {
        self.geometry.x = origin.x;
        self.geometry.y = origin.y;
    }

    /// Install a new buffer, handing back the one it replaces.
    pub(crate) fn replace_buffer(&mut self, buffer: Buffer) -> Option<Buffer> {
        self.buffer.replace(buffer)
    }

    /// Queue an event for the window's owner. Returns whether it was queued;
    /// with no connected client the event is dropped.
    pub fn send_event(&self, event: Event) -> bool {
        match &self.events {
            Some(channel) => channel.send(event),
            None => {
                debug!("Window {} is not listening to events, dropping {:?}", self.id, event);
                false
            }
        }
    }
}
