//! Session identity
//!
//! Every server run picks a random token. The token namespaces the control
//! socket and the per-window event sockets so that several servers can share
//! one runtime directory without stepping on each other. Clients learn the
//! token through [`SESSION_ENV`] and derive the same addresses.

use std::path::{Path, PathBuf};

use rand::Rng;
use thiserror::Error;

use crate::protocol::WindowId;

/// Environment variable carrying the session token to clients.
pub const SESSION_ENV: &str = "VITRINE_SESSION";

const SOCKET_PREFIX: &str = "vitrine";
const MIN_TOKEN_LEN: usize = 8;
const MAX_TOKEN_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session token must be 8-16 ASCII alphanumerics, got {0:?}")]
    InvalidToken(String),

    #[error("environment variable VITRINE_SESSION is not set (is the server running?)")]
    MissingEnv,
}

/// Per-run identity of a server instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
    runtime_dir: PathBuf,
}

impl Session {
    /// Create a fresh session with a random 64-bit token.
    pub fn create<P: AsRef<Path>>(runtime_dir: P) -> Self {
        let token = format!("{:016x}", rand::thread_rng().gen::<u64>());
        Self {
            token,
            runtime_dir: runtime_dir.as_ref().to_path_buf(),
        }
    }

    /// Rebuild a session from a token obtained out-of-band.
    pub fn from_token<P: AsRef<Path>>(token: &str, runtime_dir: P) -> Result<Self, SessionError> {
        let valid_len = (MIN_TOKEN_LEN..=MAX_TOKEN_LEN).contains(&token.len());
        if !valid_len || !token.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SessionError::InvalidToken(token.to_string()));
        }

        Ok(Self {
            token: token.to_string(),
            runtime_dir: runtime_dir.as_ref().to_path_buf(),
        })
    }

    /// Read the token from [`SESSION_ENV`].
    pub fn from_env<P: AsRef<Path>>(runtime_dir: P) -> Result<Self, SessionError> {
        let token = std::env::var(SESSION_ENV).map_err(|_| SessionError::MissingEnv)?;
        Self::from_token(&token, runtime_dir)
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    /// Address of the control socket.
    pub fn channel_name(&self) -> PathBuf {
        self.runtime_dir
            .join(format!("{}-{}.sock", SOCKET_PREFIX, self.token))
    }

    /// Address of the event socket belonging to window `id`.
    pub fn window_resource_name(&self, id: WindowId) -> PathBuf {
        self.runtime_dir
            .join(format!("{}-{}-{}.sock", SOCKET_PREFIX, self.token, id.0))
    }
}
