//! Window manager
//!
//! Runs once per frame over the locked registry and turns pointer input into
//! window management: dragging by the title bar, click-to-focus, close
//! requests and forwarding of content input to the focused window.
//!
//! Nothing here can fail. With no windows, or with the cursor over empty
//! space, an update is a no-op.

use log::{debug, info};

use crate::decoration::{FrameMetrics, FramePart, WindowFrame};
use crate::input::FrameInput;
use crate::protocol::{ButtonAction, Event, MouseButton, WindowId};
use crate::server::{Registry, Server};
use crate::window::{Point, Rectangle};

/// A title bar drag in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Drag {
    window: WindowId,
    /// Cursor position relative to the window origin at drag start
    offset: Point,
}

/// The topmost window under the cursor
#[derive(Debug, Clone, Copy)]
struct Hit {
    id: WindowId,
    geometry: Rectangle,
    frame: WindowFrame,
}

#[derive(Debug)]
pub struct WindowManager {
    metrics: FrameMetrics,
    drag: Option<Drag>,
}

impl WindowManager {
    pub fn new(metrics: FrameMetrics) -> Self {
        info!(
            "🪟 Window manager ready (border {}px, title bar {}px)",
            metrics.border_width, metrics.title_bar_height
        );
        Self {
            metrics,
            drag: None,
        }
    }

    pub fn metrics(&self) -> &FrameMetrics {
        &self.metrics
    }

    /// Window currently being dragged, if any.
    pub fn drag_target(&self) -> Option<WindowId> {
        self.drag.map(|drag| drag.window)
    }

    /// Run one frame against the server's registry, holding its lock for the
    /// whole pass.
    pub fn update_server(&mut self, server: &Server, input: &FrameInput) -> Vec<(WindowId, Event)> {
        server.with_registry(|registry| self.update(registry, input))
    }

    /// Run one frame. Returns the events emitted to windows, in send order.
    pub fn update(&mut self, registry: &mut Registry, input: &FrameInput) -> Vec<(WindowId, Event)> {
        let cursor = input.cursor;
        let edges = &input.edges;
        let left_pressed = edges.just_pressed(MouseButton::Left);
        let left_released = edges.just_released(MouseButton::Left);

        let mut hit = self.hit_test(registry, cursor);
        let mut events = Vec::new();

        // Drag start
        if left_pressed {
            if let Some(target) = hit {
                if target.frame.hit(cursor) == Some(FramePart::TitleBar) {
                    debug!("✋ Dragging window {}", target.id);
                    self.drag = Some(Drag {
                        window: target.id,
                        offset: cursor - target.geometry.origin(),
                    });
                }
            }
        }

        // Drag continue
        if let Some(drag) = self.drag {
            if registry.find(drag.window).is_none() {
                debug!("Drag target {} is gone", drag.window);
                self.drag = None;
            } else {
                if registry.is_top(drag.window) {
                    let origin = cursor - drag.offset;
                    let moved = registry
                        .find(drag.window)
                        .map_or(false, |window| window.geometry().origin() != origin);
                    if moved && registry.move_window(drag.window, origin).is_ok() {
                        hit = self.hit_test(registry, cursor);
                    }
                }
                if left_released {
                    debug!("Drag of window {} released", drag.window);
                    self.drag = None;
                }
            }
        }

        // Close button
        if left_released {
            if let Some(target) = hit {
                if target.frame.hit(cursor) == Some(FramePart::CloseButton) {
                    info!("❎ Close button of window {} clicked", target.id);
                    events.push((target.id, Event::CloseWindow));
                }
            }
        }

        // Content forwarding, focused window only
        if let Some(top) = registry.top() {
            let frame = WindowFrame::compute(&top.geometry(), &self.metrics);
            if frame.content.contains(cursor) {
                for button in MouseButton::ALL {
                    if edges.just_pressed(button) {
                        events.push((
                            top.id(),
                            Event::MouseButton {
                                button,
                                action: ButtonAction::Press,
                            },
                        ));
                    }
                    if edges.just_released(button) {
                        events.push((
                            top.id(),
                            Event::MouseButton {
                                button,
                                action: ButtonAction::Release,
                            },
                        ));
                    }
                }

                if !input.delta.is_zero() {
                    let local = frame.to_content(cursor);
                    events.push((top.id(), Event::MouseMove { x: local.x, y: local.y }));
                }
            }
        }

        // Focus
        if left_pressed {
            if let Some(target) = hit {
                if let Ok(true) = registry.raise(target.id) {
                    info!("🎯 Focused window {}", target.id);
                }
            }
        }

        for (id, event) in &events {
            if let Some(window) = registry.find(*id) {
                window.send_event(*event);
            }
        }

        events
    }

    /// Topmost window whose total area contains `cursor`.
    fn hit_test(&self, registry: &Registry, cursor: Point) -> Option<Hit> {
        registry.windows().iter().rev().find_map(|window| {
            let geometry = window.geometry();
            let frame = WindowFrame::compute(&geometry, &self.metrics);
            frame.total.contains(cursor).then_some(Hit {
                id: window.id(),
                geometry,
                frame,
            })
        })
    }
}

impl Default for WindowManager {
    fn default() -> Self {
        Self::new(FrameMetrics::default())
    }
}
