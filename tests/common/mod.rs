//! Shared helpers for integration tests: a server in a scratch runtime
//! directory and a bare-bones protocol client.

#![allow(dead_code)]

use std::time::Duration;

use tempfile::TempDir;
use tokio::net::UnixStream;

use vitrine::protocol::transport::{recv_frame, send_frame};
use vitrine::protocol::{Command, CommandFrame, Response, ResponseFrame, WindowId};
use vitrine::{Server, Session, VitrineConfig};

pub async fn start_server() -> (TempDir, Server) {
    start_server_with(VitrineConfig::default()).await
}

pub async fn start_server_with(mut config: VitrineConfig) -> (TempDir, Server) {
    let dir = tempfile::tempdir().unwrap();
    config.server.runtime_dir = dir.path().to_path_buf();
    let session = Session::create(dir.path());
    let server = Server::create(session, &config).unwrap();
    (dir, server)
}

pub struct TestClient {
    stream: UnixStream,
}

impl TestClient {
    pub async fn connect(session: &Session) -> Self {
        let stream = UnixStream::connect(session.channel_name()).await.unwrap();
        Self { stream }
    }

    pub fn stream(&self) -> &UnixStream {
        &self.stream
    }

    pub async fn request(&self, command: &Command) -> Response {
        send_frame(&self.stream, &command.encode(), command.handle())
            .await
            .unwrap();
        self.read_response().await
    }

    pub async fn request_raw(&self, frame: &CommandFrame) -> Response {
        send_frame(&self.stream, frame, None).await.unwrap();
        self.read_response().await
    }

    pub async fn read_response(&self) -> Response {
        let incoming = tokio::time::timeout(
            Duration::from_secs(5),
            recv_frame::<ResponseFrame>(&self.stream),
        )
        .await
        .expect("server did not answer")
        .unwrap()
        .expect("server closed the connection");
        Response::decode(&incoming.frame).unwrap()
    }

    pub async fn create_window(&self, title: &str, width: i32, height: i32) -> WindowId {
        let response = self
            .request(&Command::CreateWindow {
                title: title.to_string(),
                width,
                height,
            })
            .await;
        match response {
            Response::WindowId(id) => id,
            other => panic!("Expected a window id, got {:?}", other),
        }
    }

    pub async fn close_window(&self, id: WindowId) -> Response {
        self.request(&Command::CloseWindow { id }).await
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never became true");
}

pub fn window_ids(server: &Server) -> Vec<WindowId> {
    server.with_windows(|windows| windows.iter().map(|window| window.id()).collect())
}
