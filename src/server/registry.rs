//! The window registry
//!
//! An ordered collection of live windows plus the id counter. Order is
//! stacking order: the last window is the topmost one and has focus.
//! The registry itself is not synchronized; the server wraps it in a lock
//! and every mutation below validates first, then mutates, so a failed call
//! leaves the registry untouched.

use log::debug;
use thiserror::Error;

use crate::protocol::{BufferDescriptor, BufferHandle, Status, WindowId};
use crate::window::{Buffer, Point, Window};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no window with id {0}")]
    InvalidWindowId(WindowId),

    #[error("no buffer handle was sent with the request")]
    InvalidBufferHandle,

    #[error("buffer is {got_width}x{got_height} but window {id} is {width}x{height}")]
    InvalidBufferSize {
        id: WindowId,
        width: i32,
        height: i32,
        got_width: i32,
        got_height: i32,
    },

    #[error("window limit of {0} reached")]
    WindowLimitReached(usize),
}

impl RegistryError {
    /// Wire status reported to the client.
    pub fn status(&self) -> Status {
        match self {
            RegistryError::InvalidWindowId(_) => Status::InvalidWindowId,
            RegistryError::InvalidBufferHandle => Status::InvalidBufferHandle,
            RegistryError::InvalidBufferSize { .. } => Status::InvalidBufferSize,
            RegistryError::WindowLimitReached(_) => Status::WindowLimitReached,
        }
    }
}

#[derive(Debug)]
pub struct Registry {
    windows: Vec<Window>,
    next_id: u32,
    capacity: usize,
}

impl Registry {
    pub fn new(capacity: usize) -> Self {
        Self {
            windows: Vec::new(),
            next_id: 0,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Windows bottom to top.
    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    pub fn ids(&self) -> Vec<WindowId> {
        self.windows.iter().map(Window::id).collect()
    }

    pub fn top(&self) -> Option<&Window> {
        self.windows.last()
    }

    pub fn is_top(&self, id: WindowId) -> bool {
        self.top().map(Window::id) == Some(id)
    }

    pub fn find(&self, id: WindowId) -> Option<&Window> {
        self.windows.iter().find(|window| window.id() == id)
    }

    fn position(&self, id: WindowId) -> Result<usize, RegistryError> {
        self.windows
            .iter()
            .position(|window| window.id() == id)
            .ok_or(RegistryError::InvalidWindowId(id))
    }

    /// Reserve the next id. Ids are handed out even if the window they were
    /// meant for never gets inserted, so they are never reused.
    pub fn allocate_id(&mut self) -> Result<WindowId, RegistryError> {
        self.ensure_room()?;
        let id = WindowId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        Ok(id)
    }

    fn ensure_room(&self) -> Result<(), RegistryError> {
        if self.windows.len() >= self.capacity {
            return Err(RegistryError::WindowLimitReached(self.capacity));
        }
        Ok(())
    }

    /// Insert a window on top. On failure the window is handed back so the
    /// caller can drop it outside the lock.
    pub fn push(&mut self, window: Window) -> Result<(), (RegistryError, Window)> {
        if let Err(e) = self.ensure_room() {
            return Err((e, window));
        }
        debug!("Window {} inserted on top", window.id());
        self.windows.push(window);
        Ok(())
    }

    /// Remove a window, keeping the relative order of the others.
    pub fn remove(&mut self, id: WindowId) -> Result<Window, RegistryError> {
        let index = self.position(id)?;
        Ok(self.windows.remove(index))
    }

    /// Attach a buffer to a window, returning the buffer it replaced.
    pub fn set_buffer(
        &mut self,
        id: WindowId,
        descriptor: BufferDescriptor,
        handle: Option<BufferHandle>,
    ) -> Result<Option<Buffer>, RegistryError> {
        let index = self.position(id)?;
        let handle = handle.ok_or(RegistryError::InvalidBufferHandle)?;

        let window = &mut self.windows[index];
        let geometry = window.geometry();
        if descriptor.width != geometry.width || descriptor.height != geometry.height {
            return Err(RegistryError::InvalidBufferSize {
                id,
                width: geometry.width,
                height: geometry.height,
                got_width: descriptor.width,
                got_height: descriptor.height,
            });
        }

        Ok(window.replace_buffer(Buffer::new(descriptor, handle)))
    }

    /// Move a window to the top of the stack. Returns whether the order changed.
    pub fn raise(&mut self, id: WindowId) -> Result<bool, RegistryError> {
        let index = self.position(id)?;
        if index + 1 == self.windows.len() {
            return Ok(false);
        }
        let window = self.windows.remove(index);
        self.windows.push(window);
        debug!("⬆️ Raised window {}", id);
        Ok(true)
    }

    pub fn move_window(&mut self, id: WindowId, origin: Point) -> Result<(), RegistryError> {
        let index = self.position(id)?;
        self.windows[index].set_position(origin);
        Ok(())
    }

    /// Take every window out, bottom to top.
    pub fn drain(&mut self) -> Vec<Window> {
        std::mem::take(&mut self.windows)
    }
}
