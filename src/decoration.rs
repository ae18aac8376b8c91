//! Server-side decoration geometry
//!
//! Every window is framed by a border and a title bar with a close button at
//! its leading edge. Nothing here is drawn; the rectangles only drive
//! hit-testing in the window manager and tell a renderer where to paint.
//!
//! Layout, for a window at `(x, y)` with content size `w` x `h`, border `b`
//! and title bar height `t`:
//!
//! ```text
//! (x,y)
//!   +-----+--------------------------+
//!   |  X  |        title bar         |   t
//!   +--+--+--------------------------+
//!   |  |        content w x h      |  |
//!   |  |                           |  |
//!   +--+---------------------------+--+
//!    b                              b
//! ```

use log::trace;

use crate::config::DecorationsConfig;
use crate::window::{Point, Rectangle};

/// Decoration sizes shared by all windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMetrics {
    pub border_width: i32,
    pub title_bar_height: i32,
}

impl Default for FrameMetrics {
    fn default() -> Self {
        Self {
            border_width: 5,
            title_bar_height: 20,
        }
    }
}

impl From<&DecorationsConfig> for FrameMetrics {
    fn from(config: &DecorationsConfig) -> Self {
        Self {
            border_width: config.border_width,
            title_bar_height: config.title_bar_height,
        }
    }
}

/// Which part of a window frame a point landed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePart {
    CloseButton,
    TitleBar,
    Content,
    Border,
}

/// Hit-test rectangles of one window, in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowFrame {
    pub close_button: Rectangle,
    pub title_bar: Rectangle,
    pub content: Rectangle,
    pub border: Rectangle,
    /// Everything that belongs to the window: title bar, border and content.
    pub total: Rectangle,
}

impl WindowFrame {
    /// Derive the frame of a window from its geometry. `geometry` holds the
    /// outer origin and the content size.
    pub fn compute(geometry: &Rectangle, metrics: &FrameMetrics) -> Self {
        let b = metrics.border_width;
        let t = metrics.title_bar_height;
        let Rectangle {
            x,
            y,
            width,
            height,
        } = *geometry;

        let outer_width = width.saturating_add(b.saturating_mul(2));

        Self {
            close_button: Rectangle::new(x, y, t, t),
            title_bar: Rectangle::new(x.saturating_add(t), y, outer_width.saturating_sub(t), t),
            content: Rectangle::new(x.saturating_add(b), y.saturating_add(t), width, height),
            border: Rectangle::new(
                x,
                y.saturating_add(t.saturating_sub(b)),
                outer_width,
                height.saturating_add(b.saturating_mul(2)),
            ),
            total: Rectangle::new(x, y, outer_width, height.saturating_add(t.saturating_add(b))),
        }
    }

    /// Classify `point`. The close button wins over the title bar, and the
    /// content wins over the border it is inset into.
    pub fn hit(&self, point: Point) -> Option<FramePart> {
        let part = if self.close_button.contains(point) {
            FramePart::CloseButton
        } else if self.title_bar.contains(point) {
            FramePart::TitleBar
        } else if self.content.contains(point) {
            FramePart::Content
        } else if self.total.contains(point) {
            FramePart::Border
        } else {
            return None;
        };

        trace!("Hit {:?} at ({}, {})", part, point.x, point.y);
        Some(part)
    }

    /// Cursor position relative to the content origin.
    pub fn to_content(&self, point: Point) -> Point {
        point - self.content.origin()
    }
}
