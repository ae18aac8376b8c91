//! Abstract input feed
//!
//! Device capture lives outside the server. Whatever owns the devices pushes
//! [`InputEvent`]s in; once per frame the compositor latches them into a
//! [`FrameInput`] snapshot for the window manager.

use log::{debug, trace};

use crate::config::InputConfig;
use crate::protocol::MouseButton;
use crate::window::Point;

/// Raw pointer input, as delivered by the device layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// Mouse button press/release
    Button { button: MouseButton, pressed: bool },
    /// Relative pointer motion
    Motion { dx: i32, dy: i32 },
    /// Scroll wheel detents; accepted but not forwarded to clients
    Scroll { detents: i32 },
}

/// Button transitions observed during one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ButtonEdges {
    pressed: [bool; 3],
    released: [bool; 3],
}

impl ButtonEdges {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_press(mut self, button: MouseButton) -> Self {
        self.pressed[button.index()] = true;
        self
    }

    pub fn with_release(mut self, button: MouseButton) -> Self {
        self.released[button.index()] = true;
        self
    }

    pub fn just_pressed(&self, button: MouseButton) -> bool {
        self.pressed[button.index()]
    }

    pub fn just_released(&self, button: MouseButton) -> bool {
        self.released[button.index()]
    }

    pub fn is_empty(&self) -> bool {
        !self.pressed.iter().chain(self.released.iter()).any(|&edge| edge)
    }
}

/// Everything the window manager needs to know about input for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameInput {
    pub cursor: Point,
    pub delta: Point,
    pub edges: ButtonEdges,
}

/// Cursor position and button state accumulated between frames
#[derive(Debug)]
pub struct InputState {
    cursor: Point,
    /// Cursor position at the last latch
    last_cursor: Point,
    bounds: (i32, i32),
    held: [bool; 3],
    edges: ButtonEdges,
}

impl InputState {
    pub fn new(config: &InputConfig) -> Self {
        debug!(
            "🖱️ Input state bounded to {}x{}",
            config.screen_width, config.screen_height
        );

        Self {
            cursor: Point::default(),
            last_cursor: Point::default(),
            bounds: (config.screen_width, config.screen_height),
            held: [false; 3],
            edges: ButtonEdges::none(),
        }
    }

    pub fn cursor(&self) -> Point {
        self.cursor
    }

    pub fn is_held(&self, button: MouseButton) -> bool {
        self.held[button.index()]
    }

    /// Resize the area the cursor may move in, e.g. after an output change.
    pub fn set_cursor_bounds(&mut self, width: i32, height: i32) {
        self.bounds = (width.max(1), height.max(1));
        self.cursor = self.clamp(self.cursor);
        debug!("🖥️ Cursor bounds now {}x{}", self.bounds.0, self.bounds.1);
    }

    pub fn process(&mut self, event: InputEvent) {
        trace!("Input event: {:?}", event);

        match event {
            InputEvent::Button { button, pressed } => {
                let slot = button.index();
                if self.held[slot] == pressed {
                    // Repeated press or release without a transition
                    return;
                }
                self.held[slot] = pressed;
                if pressed {
                    self.edges.pressed[slot] = true;
                } else {
                    self.edges.released[slot] = true;
                }
            }
            InputEvent::Motion { dx, dy } => {
                let moved = Point::new(
                    self.cursor.x.saturating_add(dx),
                    self.cursor.y.saturating_add(dy),
                );
                self.cursor = self.clamp(moved);
            }
            InputEvent::Scroll { .. } => {}
        }
    }

    /// Snapshot this frame's input and start a new frame.
    pub fn frame(&mut self) -> FrameInput {
        let frame = FrameInput {
            cursor: self.cursor,
            delta: self.cursor - self.last_cursor,
            edges: std::mem::take(&mut self.edges),
        };
        self.last_cursor = self.cursor;
        frame
    }

    fn clamp(&self, point: Point) -> Point {
        Point::new(
            point.x.clamp(0, self.bounds.0 - 1),
            point.y.clamp(0, self.bounds.1 - 1),
        )
    }
}
