// Resource lifecycle integration tests for vitrine
//
// Tests that sockets and buffer handles are released exactly when their
// owners go away: replaced buffers, closed windows and server shutdown.

mod common;

use std::io::{ErrorKind, Read};
use std::io::IoSlice;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream as StdUnixStream;

use common::{start_server, TestClient};

use nix::sys::socket::{sendmsg, ControlMessage, MsgFlags};
use vitrine::protocol::{BufferDescriptor, BufferHandle, Command, Response, Status, WindowId};

/// A stand-in DMA-buf: one end of a socket pair travels as the handle, the
/// other end tells us whether every copy of it has been closed.
struct ProbeBuffer {
    witness: StdUnixStream,
}

impl ProbeBuffer {
    fn new() -> (Self, BufferHandle) {
        let (witness, sent) = StdUnixStream::pair().unwrap();
        witness.set_nonblocking(true).unwrap();
        (Self { witness }, BufferHandle::from(OwnedFd::from(sent)))
    }

    fn is_released(&mut self) -> bool {
        let mut byte = [0u8; 1];
        match self.witness.read(&mut byte) {
            Ok(0) => true,
            Ok(_) => false,
            Err(e) if e.kind() == ErrorKind::WouldBlock => false,
            Err(e) => panic!("probe read failed: {}", e),
        }
    }
}

async fn attach(client: &TestClient, id: WindowId, size: i32) -> ProbeBuffer {
    let (probe, handle) = ProbeBuffer::new();
    let response = client
        .request(&Command::SetWindowBuffer {
            id,
            descriptor: BufferDescriptor {
                width: size,
                height: size,
                pixel_format: 0x34325258,
                stride: size * 4,
            },
            handle: Some(handle),
        })
        .await;
    assert_eq!(response, Response::Empty);
    probe
}

#[tokio::test]
async fn test_replaced_buffer_is_released() {
    let (_dir, server) = start_server().await;
    let client = TestClient::connect(server.session()).await;
    let id = client.create_window("A", 32, 32).await;

    let mut first = attach(&client, id, 32).await;
    assert!(!first.is_released());

    let mut second = attach(&client, id, 32).await;
    assert!(first.is_released());
    assert!(!second.is_released());

    assert_eq!(client.close_window(id).await, Response::Empty);
    assert!(second.is_released());

    server.destroy().await;
}

#[tokio::test]
async fn test_rejected_buffer_is_not_kept() {
    let (_dir, server) = start_server().await;
    let client = TestClient::connect(server.session()).await;
    let id = client.create_window("A", 32, 32).await;

    let (mut probe, handle) = ProbeBuffer::new();
    let response = client
        .request(&Command::SetWindowBuffer {
            id,
            descriptor: BufferDescriptor {
                width: 16,
                height: 16,
                pixel_format: 0,
                stride: 64,
            },
            handle: Some(handle),
        })
        .await;
    assert!(matches!(response, Response::Error(_)));
    assert!(probe.is_released());

    server.destroy().await;
}

#[tokio::test]
async fn test_handle_on_other_commands_is_closed() {
    let (_dir, server) = start_server().await;
    let client = TestClient::connect(server.session()).await;

    let (mut probe, handle) = ProbeBuffer::new();
    let command = Command::CreateWindow {
        title: "no buffer here".to_string(),
        width: 10,
        height: 10,
    };
    vitrine::protocol::transport::send_frame(
        client.stream(),
        &command.encode(),
        Some(std::os::fd::AsFd::as_fd(&handle)),
    )
    .await
    .unwrap();
    drop(handle);

    let incoming = vitrine::protocol::transport::recv_frame::<vitrine::protocol::ResponseFrame>(
        client.stream(),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(matches!(
        Response::decode(&incoming.frame).unwrap(),
        Response::WindowId(_)
    ));
    assert!(probe.is_released());

    server.destroy().await;
}

#[tokio::test]
async fn test_destroy_releases_everything() {
    let (_dir, server) = start_server().await;
    let client = TestClient::connect(server.session()).await;

    let control = server.socket_path().to_path_buf();
    let mut probes = Vec::new();
    let mut event_sockets = Vec::new();
    for i in 0..3 {
        let id = client.create_window(&format!("w{}", i), 8, 8).await;
        event_sockets.push(server.session().window_resource_name(id));
        probes.push(attach(&client, id, 8).await);
    }
    assert!(event_sockets.iter().all(|path| path.exists()));

    server.destroy().await;

    assert!(!control.exists());
    assert!(event_sockets.iter().all(|path| !path.exists()));
    for probe in &mut probes {
        assert!(probe.is_released());
    }
}

#[tokio::test]
async fn test_close_removes_event_socket() {
    let (_dir, server) = start_server().await;
    let client = TestClient::connect(server.session()).await;

    let id = client.create_window("A", 8, 8).await;
    let path = server.session().window_resource_name(id);
    assert!(path.exists());

    client.close_window(id).await;
    assert!(!path.exists());

    server.destroy().await;
}

#[tokio::test]
async fn test_command_with_several_handles_is_refused_and_released() {
    let (_dir, server) = start_server().await;
    let client = TestClient::connect(server.session()).await;
    let id = client.create_window("A", 16, 16).await;

    let (mut probes, handles): (Vec<_>, Vec<_>) = (0..5).map(|_| ProbeBuffer::new()).unzip();
    let raw: Vec<RawFd> = handles
        .iter()
        .map(|handle| std::os::fd::AsFd::as_fd(handle).as_raw_fd())
        .collect();

    let frame = Command::SetWindowBuffer {
        id,
        descriptor: BufferDescriptor {
            width: 16,
            height: 16,
            pixel_format: 0x34325258,
            stride: 64,
        },
        handle: None,
    }
    .encode();
    let iov = [IoSlice::new(bytemuck::bytes_of(&frame))];
    client.stream().writable().await.unwrap();
    sendmsg::<()>(
        client.stream().as_raw_fd(),
        &iov,
        &[ControlMessage::ScmRights(&raw)],
        MsgFlags::MSG_NOSIGNAL,
        None,
    )
    .unwrap();
    drop(handles);

    let response = client.read_response().await;
    assert_eq!(response, Response::Error(Status::InvalidCommand));
    for probe in &mut probes {
        assert!(probe.is_released());
    }
    server.with_windows(|windows| assert!(windows[0].buffer().is_none()));

    // The connection is still usable
    let probe = attach(&client, id, 16).await;
    drop(probe);

    server.destroy().await;
}
