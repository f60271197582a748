// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Wire helpers for the DMA-BUF surface socket.
//!
//! A producer (screen grabber, compositor, `drmsend`) listens on a Unix-domain
//! stream socket. A consumer connects, receives exactly one message and
//! disconnects. The message is a 20-byte [`BufferDescriptor`] record in native
//! byte order, with the DMA-BUF file descriptor riding alongside it in a single
//! `SCM_RIGHTS` control message.
//!
//! Consumers call [`receive_buffer`] and get back a [`ReceivedBuffer`] that owns
//! the descriptor as an [`std::os::fd::OwnedFd`]. Every failure path closes
//! whatever descriptors arrived, so repeated failed attempts never grow the
//! process fd table.
//!
//! ```ignore
//! use dmabuf_surface_client::receive_buffer;
//!
//! let buffer = receive_buffer("/tmp/drmsend.sock")?;
//! let (descriptor, fd) = buffer.into_parts();
//! ```

mod descriptor;
mod error;

#[cfg(target_os = "linux")]
mod receive;
#[cfg(target_os = "linux")]
mod send;

pub use descriptor::{BufferDescriptor, Fourcc};
pub use error::{Result, SurfaceClientError};

#[cfg(target_os = "linux")]
pub use receive::{ReceivedBuffer, receive_buffer, receive_buffer_with_timeout, sun_path_capacity};
#[cfg(target_os = "linux")]
pub use send::{send_buffer, send_message};
