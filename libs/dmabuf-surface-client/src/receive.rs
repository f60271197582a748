// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Consumer side of the surface socket: connect, one `recvmsg`, disconnect.

use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::ptr;
use std::time::Duration;

use crate::descriptor::BufferDescriptor;
use crate::error::{Result, SurfaceClientError};

/// Descriptors the control buffer has room for. One is expected; the spare
/// slot lets an extra descriptor arrive (and be closed) instead of being
/// silently truncated.
const MAX_RECEIVED_FDS: usize = 2;

/// Inline bytes accepted by the single receive. Larger than the record so an
/// oversized message is reported as a size mismatch.
const RECEIVE_BUFFER_LEN: usize = BufferDescriptor::WIRE_SIZE + mem::size_of::<RawFd>();

/// `cmsghdr`-aligned backing store for the control message.
#[repr(C, align(8))]
struct ControlBuffer([u8; 64]);

/// A buffer descriptor together with the DMA-BUF it describes.
///
/// The caller owns the file descriptor; dropping this value closes it.
#[derive(Debug)]
pub struct ReceivedBuffer {
    pub descriptor: BufferDescriptor,
    pub fd: OwnedFd,
}

impl ReceivedBuffer {
    pub fn into_parts(self) -> (BufferDescriptor, OwnedFd) {
        (self.descriptor, self.fd)
    }
}

/// Capacity of `sockaddr_un.sun_path` on this platform, NUL terminator included.
pub fn sun_path_capacity() -> usize {
    // SAFETY: sockaddr_un is plain old data; all-zero is a valid value.
    let addr: libc::sockaddr_un = unsafe { mem::zeroed() };
    addr.sun_path.len()
}

/// Receive one buffer from the producer listening at `path`.
///
/// Blocks until the producer sends or closes its end. There is no timeout and
/// no retry; see [`receive_buffer_with_timeout`] for a bounded variant.
pub fn receive_buffer(path: impl AsRef<Path>) -> Result<ReceivedBuffer> {
    receive_buffer_with_timeout(path, None)
}

/// Like [`receive_buffer`], but gives up with [`SurfaceClientError::Receive`]
/// when the producer stays silent for longer than `timeout`.
pub fn receive_buffer_with_timeout(
    path: impl AsRef<Path>,
    timeout: Option<Duration>,
) -> Result<ReceivedBuffer> {
    let path = path.as_ref();
    let stream = connect(path)?;

    if timeout.is_some() {
        stream
            .set_read_timeout(timeout)
            .map_err(SurfaceClientError::Configure)?;
    }

    let buffer = receive_from(&stream)?;
    tracing::info!(
        width = buffer.descriptor.width,
        height = buffer.descriptor.height,
        pitch = buffer.descriptor.pitch,
        offset = buffer.descriptor.offset,
        fourcc = %buffer.descriptor.fourcc,
        fd = buffer.fd.as_raw_fd(),
        "Received DMA-BUF descriptor"
    );
    Ok(buffer)
}

fn connect(path: &Path) -> Result<UnixStream> {
    let len = path.as_os_str().as_bytes().len();
    let max = sun_path_capacity();
    if len >= max {
        tracing::error!(
            "Socket filename '{}' is too long ({} bytes), max {}",
            path.display(),
            len,
            max - 1
        );
        return Err(SurfaceClientError::PathTooLong {
            path: path.to_path_buf(),
            len,
            max: max - 1,
        });
    }

    let stream = UnixStream::connect(path).map_err(|source| {
        tracing::error!(
            "Cannot connect to unix socket '{}': {} (errno {:?})",
            path.display(),
            source,
            source.raw_os_error()
        );
        SurfaceClientError::Connect {
            path: path.to_path_buf(),
            source,
        }
    })?;
    tracing::debug!(sockfd = stream.as_raw_fd(), "connected");
    Ok(stream)
}

/// Read one record plus its descriptor from an already-connected stream.
///
/// The stream is left open; callers that own it close it by dropping it.
pub(crate) fn receive_from(stream: &UnixStream) -> Result<ReceivedBuffer> {
    let mut data = [0u8; RECEIVE_BUFFER_LEN];
    let mut control = ControlBuffer([0u8; 64]);

    let mut iov = libc::iovec {
        iov_base: data.as_mut_ptr().cast(),
        iov_len: data.len(),
    };

    // SAFETY: CMSG_SPACE is a pure size computation.
    let control_len = unsafe { libc::CMSG_SPACE((MAX_RECEIVED_FDS * mem::size_of::<RawFd>()) as u32) }
        as usize;
    debug_assert!(control_len <= control.0.len());

    // SAFETY: msghdr is plain old data; all-zero is a valid initial value.
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = control.0.as_mut_ptr().cast();
    msg.msg_controllen = control_len as _;

    // SAFETY: msg points at live buffers sized as advertised for the whole call.
    let received = unsafe { libc::recvmsg(stream.as_raw_fd(), &mut msg, libc::MSG_CMSG_CLOEXEC) };
    let recv_error = std::io::Error::last_os_error();
    tracing::debug!(received, "recvmsg");

    // Take ownership of whatever descriptors arrived before validating
    // anything else, so every early return below closes them.
    let fds = if received >= 0 {
        take_received_fds(&msg)
    } else {
        Vec::new()
    };

    if received < 0 {
        tracing::error!("cannot recvmsg: {} (errno {:?})", recv_error, recv_error.raw_os_error());
        return Err(SurfaceClientError::Receive(recv_error));
    }
    if received == 0 {
        tracing::error!("cannot recvmsg: producer closed the connection");
        return Err(SurfaceClientError::ConnectionClosed);
    }

    if msg.msg_flags & libc::MSG_CTRUNC != 0 {
        tracing::error!(
            kept = fds.len(),
            "Control message truncated, closing received descriptors"
        );
        return Err(SurfaceClientError::ControlTruncated);
    }

    let received = received as usize;
    if received != BufferDescriptor::WIRE_SIZE {
        tracing::error!(
            "Received metadata size mismatch: {} received, {} expected",
            received,
            BufferDescriptor::WIRE_SIZE
        );
        return Err(SurfaceClientError::MetadataSizeMismatch {
            received,
            expected: BufferDescriptor::WIRE_SIZE,
        });
    }

    if fds.len() != 1 {
        tracing::error!("Received fd count mismatch: {} received, 1 expected", fds.len());
        return Err(SurfaceClientError::HandleCountMismatch {
            received: fds.len(),
            expected: 1,
        });
    }

    let mut record = [0u8; BufferDescriptor::WIRE_SIZE];
    record.copy_from_slice(&data[..BufferDescriptor::WIRE_SIZE]);
    let descriptor = BufferDescriptor::from_wire(&record).inspect_err(|err| {
        tracing::error!("Rejecting buffer descriptor: {}", err);
    })?;

    let fd = fds
        .into_iter()
        .next()
        .ok_or(SurfaceClientError::HandleCountMismatch {
            received: 0,
            expected: 1,
        })?;

    Ok(ReceivedBuffer { descriptor, fd })
}

/// Collect every `SCM_RIGHTS` descriptor in `msg` as owned handles.
fn take_received_fds(msg: &libc::msghdr) -> Vec<OwnedFd> {
    let mut fds = Vec::new();

    // SAFETY: msg was filled in by a successful recvmsg; the CMSG_* macros
    // only walk within msg_control/msg_controllen.
    unsafe {
        let header_len = libc::CMSG_LEN(0) as usize;
        let mut cmsg = libc::CMSG_FIRSTHDR(msg);
        while !cmsg.is_null() {
            let header = &*cmsg;
            if header.cmsg_level == libc::SOL_SOCKET && header.cmsg_type == libc::SCM_RIGHTS {
                let payload = (header.cmsg_len as usize).saturating_sub(header_len);
                let count = payload / mem::size_of::<RawFd>();
                let data = libc::CMSG_DATA(cmsg).cast::<RawFd>();
                for index in 0..count {
                    let raw = ptr::read_unaligned(data.add(index));
                    if raw >= 0 {
                        fds.push(OwnedFd::from_raw_fd(raw));
                    }
                }
            }
            cmsg = libc::CMSG_NXTHDR(msg, cmsg);
        }
    }

    fds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::send::{send_buffer, send_message};
    use crate::Fourcc;
    use std::io::Write;
    use std::os::fd::AsFd;

    fn memfd() -> OwnedFd {
        // SAFETY: the name is NUL-terminated; the returned fd is checked.
        let raw = unsafe { libc::memfd_create(c"surface-client-test".as_ptr(), libc::MFD_CLOEXEC) };
        assert!(raw >= 0, "memfd_create failed");
        unsafe { OwnedFd::from_raw_fd(raw) }
    }

    fn descriptor() -> BufferDescriptor {
        BufferDescriptor {
            width: 64,
            height: 32,
            fourcc: Fourcc::XRGB8888,
            offset: 0,
            pitch: 256,
        }
    }

    #[test]
    fn test_receive_record_and_fd_from_pair() {
        let (producer, consumer) = UnixStream::pair().unwrap();
        let buffer_fd = memfd();
        send_buffer(&producer, &descriptor(), buffer_fd.as_fd()).unwrap();

        let received = receive_from(&consumer).unwrap();
        assert_eq!(received.descriptor, descriptor());
        assert_ne!(received.fd.as_raw_fd(), buffer_fd.as_raw_fd());
    }

    #[test]
    fn test_closed_producer_is_connection_failure() {
        let (producer, consumer) = UnixStream::pair().unwrap();
        drop(producer);

        let err = receive_from(&consumer).unwrap_err();
        assert!(matches!(err, SurfaceClientError::ConnectionClosed));
    }

    #[test]
    fn test_record_without_fd_is_rejected() {
        let (mut producer, consumer) = UnixStream::pair().unwrap();
        producer.write_all(&descriptor().to_wire()).unwrap();
        drop(producer);

        let err = receive_from(&consumer).unwrap_err();
        assert!(matches!(
            err,
            SurfaceClientError::HandleCountMismatch { received: 0, expected: 1 }
        ));
    }

    #[test]
    fn test_two_fds_are_rejected() {
        let (producer, consumer) = UnixStream::pair().unwrap();
        let (a, b) = (memfd(), memfd());
        send_message(&producer, &descriptor().to_wire(), &[a.as_fd(), b.as_fd()]).unwrap();

        let err = receive_from(&consumer).unwrap_err();
        assert!(matches!(
            err,
            SurfaceClientError::HandleCountMismatch { received: 2, expected: 1 }
        ));
    }

    #[test]
    fn test_short_record_is_rejected() {
        let (producer, consumer) = UnixStream::pair().unwrap();
        let fd = memfd();
        send_message(&producer, &descriptor().to_wire()[..12], &[fd.as_fd()]).unwrap();

        let err = receive_from(&consumer).unwrap_err();
        assert!(matches!(
            err,
            SurfaceClientError::MetadataSizeMismatch { received: 12, expected: 20 }
        ));
    }

    #[test]
    fn test_oversized_record_is_rejected() {
        let (producer, consumer) = UnixStream::pair().unwrap();
        let fd = memfd();
        let mut payload = descriptor().to_wire().to_vec();
        payload.extend_from_slice(&7i32.to_ne_bytes());
        send_message(&producer, &payload, &[fd.as_fd()]).unwrap();

        let err = receive_from(&consumer).unwrap_err();
        assert!(matches!(
            err,
            SurfaceClientError::MetadataSizeMismatch { received: 24, expected: 20 }
        ));
    }

    #[test]
    fn test_path_at_capacity_is_rejected_before_connect() {
        let max = sun_path_capacity();
        let path = format!("/tmp/{}", "s".repeat(max - 5));
        assert_eq!(path.len(), max);

        let err = receive_buffer(&path).unwrap_err();
        match err {
            SurfaceClientError::PathTooLong { len, max: limit, .. } => {
                assert_eq!(len, max);
                assert_eq!(limit, max - 1);
            }
            other => panic!("expected PathTooLong, got {other:?}"),
        }
    }
}
