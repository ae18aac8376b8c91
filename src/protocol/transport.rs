//! Frame transport over Unix stream sockets
//!
//! Frames are plain byte blobs of a known size. Reads and writes go through
//! `recvmsg`/`sendmsg` so that a descriptor can travel with the first byte of
//! a frame as `SCM_RIGHTS` ancillary data. Readiness comes from tokio; the
//! syscalls themselves are nonblocking and retried on `WouldBlock`.

use std::io::{self, IoSlice, IoSliceMut};
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use bytemuck::Pod;
use log::{debug, trace};
use nix::sys::socket::{recvmsg, sendmsg, ControlMessage, ControlMessageOwned, MsgFlags};
use thiserror::Error;
use tokio::io::Interest;
use tokio::net::UnixStream;

/// The kernel refuses to pass more than this many descriptors in one
/// message, so control space for it can never be truncated.
const SCM_MAX_FD: usize = 253;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer closed the connection mid-frame ({received} of {expected} bytes)")]
    Truncated { received: usize, expected: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A complete frame and the descriptor that came with it, if any.
///
/// Descriptors beyond the first are closed on arrival and only counted.
#[derive(Debug)]
pub struct Incoming<F> {
    pub frame: F,
    pub handle: Option<OwnedFd>,
    pub surplus_handles: usize,
}

/// Read one frame. Returns `Ok(None)` when the peer closed the connection
/// cleanly between frames.
pub async fn recv_frame<F: Pod>(stream: &UnixStream) -> Result<Option<Incoming<F>>, TransportError> {
    let mut frame = F::zeroed();
    let (handle, surplus_handles) = {
        let buf = bytemuck::bytes_of_mut(&mut frame);
        match read_exact_with_handle(stream, buf).await? {
            Some(received) => received,
            None => return Ok(None),
        }
    };
    Ok(Some(Incoming {
        frame,
        handle,
        surplus_handles,
    }))
}

/// Write one frame, optionally attaching a descriptor to it.
pub async fn send_frame<F: Pod>(
    stream: &UnixStream,
    frame: &F,
    handle: Option<BorrowedFd<'_>>,
) -> Result<(), TransportError> {
    let bytes = bytemuck::bytes_of(frame);
    let mut handle = handle;
    let mut sent = 0;

    while sent < bytes.len() {
        stream.writable().await?;
        let chunk = &bytes[sent..];
        match stream.try_io(Interest::WRITABLE, || {
            send_with_handle(stream.as_raw_fd(), chunk, handle)
        }) {
            Ok(n) => {
                sent += n;
                // The kernel attached the descriptor to the first chunk.
                handle = None;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e.into()),
        }
    }

    trace!("Sent {} byte frame", bytes.len());
    Ok(())
}

/// Fill `buf` completely. `Ok(None)` means EOF before the first byte;
/// otherwise the first descriptor received on the way is returned along
/// with the number of extra descriptors that were closed.
async fn read_exact_with_handle(
    stream: &UnixStream,
    buf: &mut [u8],
) -> Result<Option<(Option<OwnedFd>, usize)>, TransportError> {
    let expected = buf.len();
    let mut filled = 0;
    let mut handle: Option<OwnedFd> = None;
    let mut surplus = 0;

    while filled < expected {
        stream.readable().await?;
        let chunk = &mut buf[filled..];
        let (n, fds) = match stream.try_io(Interest::READABLE, || {
            recv_with_handles(stream.as_raw_fd(), chunk)
        }) {
            Ok(received) => received,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e.into()),
        };

        for fd in fds {
            if handle.is_none() {
                handle = Some(fd);
            } else {
                debug!("Closing extra descriptor {} sent with frame", fd.as_raw_fd());
                surplus += 1;
            }
        }

        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(TransportError::Truncated {
                received: filled,
                expected,
            });
        }
        filled += n;
    }

    Ok(Some((handle, surplus)))
}

fn recv_with_handles(fd: RawFd, buf: &mut [u8]) -> io::Result<(usize, Vec<OwnedFd>)> {
    let mut iov = [IoSliceMut::new(buf)];
    let mut cmsg_buffer = nix::cmsg_space!([RawFd; SCM_MAX_FD]);

    let msg = recvmsg::<()>(
        fd,
        &mut iov,
        Some(&mut cmsg_buffer),
        MsgFlags::MSG_CMSG_CLOEXEC,
    )?;

    let mut handles = Vec::new();
    for cmsg in msg.cmsgs()? {
        if let ControlMessageOwned::ScmRights(fds) = cmsg {
            // SAFETY: SCM_RIGHTS descriptors are freshly installed in this
            // process by the kernel and owned by nobody else yet.
            handles.extend(fds.into_iter().map(|raw| unsafe { OwnedFd::from_raw_fd(raw) }));
        }
    }

    Ok((msg.bytes, handles))
}

fn send_with_handle(fd: RawFd, bytes: &[u8], handle: Option<BorrowedFd<'_>>) -> io::Result<usize> {
    let iov = [IoSlice::new(bytes)];
    let raw = handle.map(|h| [h.as_raw_fd()]);
    let cmsgs: Vec<ControlMessage<'_>> = match &raw {
        Some(fds) => vec![ControlMessage::ScmRights(fds)],
        None => Vec::new(),
    };

    Ok(sendmsg::<()>(fd, &iov, &cmsgs, MsgFlags::MSG_NOSIGNAL, None)?)
}
