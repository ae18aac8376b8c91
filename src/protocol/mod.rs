//! Wire protocol between the server and its clients
//!
//! Two kinds of connections exist:
//!
//! - the **control channel**, where a client sends one [`Command`] at a time
//!   and receives exactly one [`Response`];
//! - a per-window **event channel**, where the server pushes [`Event`]s.
//!
//! Every message travels as a fixed-size `#[repr(C)]` frame in host byte
//! order (both ends live on the same machine). A buffer handle accompanying
//! `SetWindowBuffer` is not part of the frame: it rides along as `SCM_RIGHTS`
//! ancillary data, see [`transport`].

pub mod transport;

use std::fmt;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

/// Maximum window title length in bytes.
pub const TITLE_MAX: usize = 256;

const CMD_CREATE_WINDOW: u32 = 0;
const CMD_CLOSE_WINDOW: u32 = 1;
const CMD_SET_WINDOW_BUFFER: u32 = 2;

const RESP_EMPTY: u32 = 0;
const RESP_WINDOW_ID: u32 = 1;

const EVENT_CLOSE_WINDOW: u32 = 0;
const EVENT_MOUSE_BUTTON: u32 = 1;
const EVENT_MOUSE_MOVE: u32 = 2;

/// Server-assigned window identifier. Never reused within one server run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u32);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown command kind {0}")]
    UnknownCommand(u32),

    #[error("title length {0} exceeds 256 bytes")]
    TitleTooLong(u32),

    #[error("invalid window size {width}x{height}")]
    InvalidSize { width: i32, height: i32 },

    #[error("unknown response kind {0}")]
    UnknownResponse(u32),

    #[error("unknown status code {0}")]
    UnknownStatus(u32),

    #[error("unknown event kind {0}")]
    UnknownEvent(u32),

    #[error("unknown mouse button {0}")]
    UnknownButton(u32),

    #[error("unknown button action {0}")]
    UnknownAction(u32),
}

/// Result code carried by every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Status {
    Ok = 0,
    InvalidCommand = 1,
    InvalidWindowId = 2,
    InvalidBufferHandle = 3,
    InvalidBufferSize = 4,
    WindowLimitReached = 5,
}

impl Status {
    pub fn from_raw(raw: u32) -> Result<Self, ProtocolError> {
        Ok(match raw {
            0 => Status::Ok,
            1 => Status::InvalidCommand,
            2 => Status::InvalidWindowId,
            3 => Status::InvalidBufferHandle,
            4 => Status::InvalidBufferSize,
            5 => Status::WindowLimitReached,
            other => return Err(ProtocolError::UnknownStatus(other)),
        })
    }
}

/// Metadata of a published GPU buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferDescriptor {
    pub width: i32,
    pub height: i32,
    /// DRM fourcc code
    pub pixel_format: i32,
    /// Row pitch in bytes
    pub stride: i32,
}

/// A DMA-buf handle received from a client.
///
/// The descriptor is closed when the handle is dropped, so whoever holds it
/// owns the buffer.
#[derive(Debug)]
pub struct BufferHandle(OwnedFd);

impl BufferHandle {
    pub fn into_inner(self) -> OwnedFd {
        self.0
    }
}

impl From<OwnedFd> for BufferHandle {
    fn from(fd: OwnedFd) -> Self {
        Self(fd)
    }
}

impl AsFd for BufferHandle {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

/// Requests accepted on the control channel.
#[derive(Debug)]
pub enum Command {
    CreateWindow {
        title: String,
        width: i32,
        height: i32,
    },
    CloseWindow {
        id: WindowId,
    },
    SetWindowBuffer {
        id: WindowId,
        descriptor: BufferDescriptor,
        handle: Option<BufferHandle>,
    },
}

impl Command {
    /// Decode a received frame. `handle` is whatever descriptor arrived with
    /// it; commands that don't take one close it immediately.
    pub fn decode(frame: &CommandFrame, handle: Option<OwnedFd>) -> Result<Self, ProtocolError> {
        match frame.kind {
            CMD_CREATE_WINDOW => {
                let len = frame.title_len as usize;
                if len > TITLE_MAX {
                    return Err(ProtocolError::TitleTooLong(frame.title_len));
                }
                if frame.width <= 0 || frame.height <= 0 {
                    return Err(ProtocolError::InvalidSize {
                        width: frame.width,
                        height: frame.height,
                    });
                }
                let title = String::from_utf8_lossy(&frame.title[..len]).into_owned();
                Ok(Command::CreateWindow {
                    title,
                    width: frame.width,
                    height: frame.height,
                })
            }
            CMD_CLOSE_WINDOW => Ok(Command::CloseWindow {
                id: WindowId(frame.window_id),
            }),
            CMD_SET_WINDOW_BUFFER => Ok(Command::SetWindowBuffer {
                id: WindowId(frame.window_id),
                descriptor: BufferDescriptor {
                    width: frame.width,
                    height: frame.height,
                    pixel_format: frame.pixel_format,
                    stride: frame.stride,
                },
                handle: handle.map(BufferHandle::from),
            }),
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }

    /// Encode into a frame. Titles longer than [`TITLE_MAX`] are cut at the
    /// last character boundary that fits.
    pub fn encode(&self) -> CommandFrame {
        let mut frame = CommandFrame::zeroed();
        match self {
            Command::CreateWindow {
                title,
                width,
                height,
            } => {
                let mut len = title.len().min(TITLE_MAX);
                while !title.is_char_boundary(len) {
                    len -= 1;
                }
                frame.kind = CMD_CREATE_WINDOW;
                frame.width = *width;
                frame.height = *height;
                frame.title_len = len as u32;
                frame.title[..len].copy_from_slice(&title.as_bytes()[..len]);
            }
            Command::CloseWindow { id } => {
                frame.kind = CMD_CLOSE_WINDOW;
                frame.window_id = id.0;
            }
            Command::SetWindowBuffer { id, descriptor, .. } => {
                frame.kind = CMD_SET_WINDOW_BUFFER;
                frame.window_id = id.0;
                frame.width = descriptor.width;
                frame.height = descriptor.height;
                frame.pixel_format = descriptor.pixel_format;
                frame.stride = descriptor.stride;
            }
        }
        frame
    }

    /// Descriptor to send alongside the frame, if any.
    pub fn handle(&self) -> Option<BorrowedFd<'_>> {
        match self {
            Command::SetWindowBuffer {
                handle: Some(handle),
                ..
            } => Some(handle.as_fd()),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateWindow { .. } => "CreateWindow",
            Command::CloseWindow { .. } => "CloseWindow",
            Command::SetWindowBuffer { .. } => "SetWindowBuffer",
        }
    }
}

/// Reply to a single command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    WindowId(WindowId),
    Empty,
    Error(Status),
}

impl Response {
    pub fn status(&self) -> Status {
        match self {
            Response::Error(status) => *status,
            _ => Status::Ok,
        }
    }

    pub fn encode(&self) -> ResponseFrame {
        match self {
            Response::WindowId(id) => ResponseFrame {
                kind: RESP_WINDOW_ID,
                status: Status::Ok as u32,
                window_id: id.0,
            },
            Response::Empty => ResponseFrame {
                kind: RESP_EMPTY,
                status: Status::Ok as u32,
                window_id: 0,
            },
            Response::Error(status) => ResponseFrame {
                kind: RESP_EMPTY,
                status: *status as u32,
                window_id: 0,
            },
        }
    }

    pub fn decode(frame: &ResponseFrame) -> Result<Self, ProtocolError> {
        let status = Status::from_raw(frame.status)?;
        if status != Status::Ok {
            return Ok(Response::Error(status));
        }
        match frame.kind {
            RESP_EMPTY => Ok(Response::Empty),
            RESP_WINDOW_ID => Ok(Response::WindowId(WindowId(frame.window_id))),
            other => Err(ProtocolError::UnknownResponse(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub const ALL: [MouseButton; 3] = [MouseButton::Left, MouseButton::Right, MouseButton::Middle];

    pub fn index(self) -> usize {
        match self {
            MouseButton::Left => 0,
            MouseButton::Right => 1,
            MouseButton::Middle => 2,
        }
    }

    fn from_raw(raw: u32) -> Result<Self, ProtocolError> {
        match raw {
            0 => Ok(MouseButton::Left),
            1 => Ok(MouseButton::Right),
            2 => Ok(MouseButton::Middle),
            other => Err(ProtocolError::UnknownButton(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonAction {
    Press,
    Release,
}

/// Notifications pushed to a window's owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The user clicked the close button. The client decides whether to
    /// actually send `CloseWindow`.
    CloseWindow,
    MouseButton {
        button: MouseButton,
        action: ButtonAction,
    },
    /// Cursor position relative to the window's content origin.
    MouseMove { x: i32, y: i32 },
}

impl Event {
    pub fn encode(&self) -> EventFrame {
        let mut frame = EventFrame::zeroed();
        match *self {
            Event::CloseWindow => frame.kind = EVENT_CLOSE_WINDOW,
            Event::MouseButton { button, action } => {
                frame.kind = EVENT_MOUSE_BUTTON;
                frame.button = button.index() as u32;
                frame.action = match action {
                    ButtonAction::Press => 0,
                    ButtonAction::Release => 1,
                };
            }
            Event::MouseMove { x, y } => {
                frame.kind = EVENT_MOUSE_MOVE;
                frame.x = x;
                frame.y = y;
            }
        }
        frame
    }

    pub fn decode(frame: &EventFrame) -> Result<Self, ProtocolError> {
        match frame.kind {
            EVENT_CLOSE_WINDOW => Ok(Event::CloseWindow),
            EVENT_MOUSE_BUTTON => {
                let button = MouseButton::from_raw(frame.button)?;
                let action = match frame.action {
                    0 => ButtonAction::Press,
                    1 => ButtonAction::Release,
                    other => return Err(ProtocolError::UnknownAction(other)),
                };
                Ok(Event::MouseButton { button, action })
            }
            EVENT_MOUSE_MOVE => Ok(Event::MouseMove {
                x: frame.x,
                y: frame.y,
            }),
            other => Err(ProtocolError::UnknownEvent(other)),
        }
    }
}

/// Raw control-channel request.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CommandFrame {
    pub kind: u32,
    pub window_id: u32,
    pub width: i32,
    pub height: i32,
    pub pixel_format: i32,
    pub stride: i32,
    pub title_len: u32,
    pub title: [u8; TITLE_MAX],
}

/// Raw control-channel reply.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ResponseFrame {
    pub kind: u32,
    pub status: u32,
    pub window_id: u32,
}

/// Raw event-channel message.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct EventFrame {
    pub kind: u32,
    pub button: u32,
    pub action: u32,
    pub x: i32,
    pub y: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_sizes_are_stable() {
        assert_eq!(std::mem::size_of::<CommandFrame>(), 284);
        assert_eq!(std::mem::size_of::<ResponseFrame>(), 12);
        assert_eq!(std::mem::size_of::<EventFrame>(), 20);
    }

    #[test]
    fn test_create_window_decodes_title() {
        let frame = Command::CreateWindow {
            title: "Terminal".to_string(),
            width: 640,
            height: 480,
        }
        .encode();

        match Command::decode(&frame, None).unwrap() {
            Command::CreateWindow {
                title,
                width,
                height,
            } => {
                assert_eq!(title, "Terminal");
                assert_eq!((width, height), (640, 480));
            }
            other => panic!("Wrong command: {:?}", other),
        }
    }

    #[test]
    fn test_long_title_is_cut_on_char_boundary() {
        // 'é' is two bytes; 200 of them overflow the title field.
        let title: String = std::iter::repeat('é').take(200).collect();
        let frame = Command::CreateWindow {
            title,
            width: 10,
            height: 10,
        }
        .encode();

        assert_eq!(frame.title_len as usize, TITLE_MAX);
        match Command::decode(&frame, None).unwrap() {
            Command::CreateWindow { title, .. } => assert_eq!(title.chars().count(), 128),
            other => panic!("Wrong command: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_commands_are_rejected() {
        let mut frame = CommandFrame::zeroed();
        frame.kind = 42;
        assert_eq!(
            Command::decode(&frame, None).unwrap_err(),
            ProtocolError::UnknownCommand(42)
        );

        frame.kind = CMD_CREATE_WINDOW;
        frame.width = 100;
        frame.height = 100;
        frame.title_len = 300;
        assert_eq!(
            Command::decode(&frame, None).unwrap_err(),
            ProtocolError::TitleTooLong(300)
        );

        frame.title_len = 0;
        frame.height = 0;
        assert!(matches!(
            Command::decode(&frame, None),
            Err(ProtocolError::InvalidSize { .. })
        ));
    }

    #[test]
    fn test_set_window_buffer_carries_handle() {
        let (a, _b) = std::os::unix::net::UnixStream::pair().unwrap();
        let frame = Command::SetWindowBuffer {
            id: WindowId(3),
            descriptor: BufferDescriptor {
                width: 50,
                height: 50,
                pixel_format: 0x34325258,
                stride: 200,
            },
            handle: None,
        }
        .encode();

        let command = Command::decode(&frame, Some(OwnedFd::from(a))).unwrap();
        assert!(command.handle().is_some());
        match command {
            Command::SetWindowBuffer { id, descriptor, .. } => {
                assert_eq!(id, WindowId(3));
                assert_eq!(descriptor.stride, 200);
            }
            other => panic!("Wrong command: {:?}", other),
        }

        let without = Command::decode(&frame, None).unwrap();
        assert!(without.handle().is_none());
    }

    #[test]
    fn test_error_response_wins_over_kind() {
        let frame = Response::Error(Status::InvalidBufferSize).encode();
        assert_eq!(frame.status, 4);
        assert_eq!(
            Response::decode(&frame).unwrap(),
            Response::Error(Status::InvalidBufferSize)
        );

        let frame = Response::WindowId(WindowId(9)).encode();
        assert_eq!(Response::decode(&frame).unwrap().status(), Status::Ok);
    }

    #[test]
    fn test_event_decoding() {
        let event = Event::MouseButton {
            button: MouseButton::Middle,
            action: ButtonAction::Release,
        };
        assert_eq!(Event::decode(&event.encode()).unwrap(), event);

        let mut frame = EventFrame::zeroed();
        frame.kind = EVENT_MOUSE_BUTTON;
        frame.button = 7;
        assert_eq!(
            Event::decode(&frame).unwrap_err(),
            ProtocolError::UnknownButton(7)
        );
    }
}
