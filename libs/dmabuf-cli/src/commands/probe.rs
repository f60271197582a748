// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::os::fd::{AsRawFd, OwnedFd};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use dmabuf_surface_client::receive_buffer_with_timeout;

/// Receive one buffer and print what the producer sent.
pub fn run(sockpath: &Path, timeout_ms: Option<u64>) -> Result<()> {
    let timeout = timeout_ms.map(Duration::from_millis);
    let buffer = receive_buffer_with_timeout(sockpath, timeout)
        .with_context(|| format!("Failed to receive buffer from {}", sockpath.display()))?;
    let (descriptor, fd) = buffer.into_parts();

    println!("Received buffer from {}", sockpath.display());
    println!("  size:   {}x{}", descriptor.width, descriptor.height);
    println!("  fourcc: {} ({:#010x})", descriptor.fourcc, descriptor.fourcc.0);
    println!("  offset: {}", descriptor.offset);
    println!("  pitch:  {}", descriptor.pitch);
    match object_size(&fd) {
        Some(size) => println!("  fd:     {} ({} bytes)", fd.as_raw_fd(), size),
        None => println!("  fd:     {}", fd.as_raw_fd()),
    }

    let needed = u64::from(descriptor.offset)
        + u64::from(descriptor.pitch) * u64::from(descriptor.height);
    if let Some(size) = object_size(&fd).filter(|size| *size > 0 && *size < needed) {
        tracing::warn!(size, needed, "buffer is smaller than offset + pitch * height");
    }

    Ok(())
}

/// Size reported by fstat. DMA-BUFs report their allocation size; 0 means unknown.
fn object_size(fd: &OwnedFd) -> Option<u64> {
    let mut stat: libc::stat = unsafe { std::mem::zeroed() };
    // SAFETY: fstat only writes into `stat`; `fd` is open for the call.
    if unsafe { libc::fstat(fd.as_raw_fd(), &mut stat) } == 0 {
        u64::try_from(stat.st_size).ok()
    } else {
        None
    }
}
