// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Producer side of the surface socket.

use std::io;
use std::mem;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::ptr;

use crate::descriptor::BufferDescriptor;

/// Send `descriptor` with `fd` attached, as the single message a consumer expects.
pub fn send_buffer(
    stream: &UnixStream,
    descriptor: &BufferDescriptor,
    fd: BorrowedFd<'_>,
) -> io::Result<()> {
    let record = descriptor.to_wire();
    let sent = send_message(stream, &record, &[fd])?;
    if sent != record.len() {
        return Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("short sendmsg: {} of {} bytes", sent, record.len()),
        ));
    }
    tracing::debug!(
        width = descriptor.width,
        height = descriptor.height,
        fourcc = %descriptor.fourcc,
        fd = fd.as_raw_fd(),
        "Sent DMA-BUF descriptor"
    );
    Ok(())
}

/// One `sendmsg` carrying `payload` inline and `fds` as `SCM_RIGHTS`.
///
/// No framing or validation: any payload and any number of descriptors
/// (including none) go out as given. Returns the number of inline bytes sent.
pub fn send_message(stream: &UnixStream, payload: &[u8], fds: &[BorrowedFd<'_>]) -> io::Result<usize> {
    let mut iov = libc::iovec {
        iov_base: payload.as_ptr() as *mut libc::c_void,
        iov_len: payload.len(),
    };

    let fds_len = fds.len() * mem::size_of::<RawFd>();
    // SAFETY: CMSG_SPACE is a pure size computation.
    let control_len = if fds.is_empty() {
        0
    } else {
        unsafe { libc::CMSG_SPACE(fds_len as u32) as usize }
    };
    // u64 backing keeps the buffer cmsghdr-aligned.
    let mut control = vec![0u64; control_len.div_ceil(mem::size_of::<u64>())];

    // SAFETY: msghdr is plain old data; all-zero is a valid initial value.
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;

    if !fds.is_empty() {
        msg.msg_control = control.as_mut_ptr().cast();
        msg.msg_controllen = control_len as _;

        // SAFETY: the control buffer is CMSG_SPACE(fds_len) bytes, which holds
        // exactly one header plus the descriptor array.
        unsafe {
            let cmsg = libc::CMSG_FIRSTHDR(&msg);
            (*cmsg).cmsg_level = libc::SOL_SOCKET;
            (*cmsg).cmsg_type = libc::SCM_RIGHTS;
            (*cmsg).cmsg_len = libc::CMSG_LEN(fds_len as u32) as _;
            let data = libc::CMSG_DATA(cmsg).cast::<RawFd>();
            for (index, fd) in fds.iter().enumerate() {
                ptr::write_unaligned(data.add(index), fd.as_raw_fd());
            }
        }
    }

    // SAFETY: msg points at live buffers for the whole call; the kernel
    // duplicates the descriptors, ownership stays with the caller.
    let sent = unsafe { libc::sendmsg(stream.as_raw_fd(), &msg, libc::MSG_NOSIGNAL) };
    if sent < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(sent as usize)
}
