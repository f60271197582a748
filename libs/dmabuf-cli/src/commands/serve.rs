// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::fs::File;
use std::os::fd::AsFd;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::UnixListener;
use std::path::Path;

use anyhow::{Context, Result, bail};
use dmabuf_surface_client::{BufferDescriptor, send_buffer, sun_path_capacity};

/// Listen on `sockpath` and send `file`'s descriptor with `descriptor` to each
/// consumer, one message per connection.
pub fn run(
    sockpath: &Path,
    file: &Path,
    descriptor: BufferDescriptor,
    count: Option<usize>,
) -> Result<()> {
    if descriptor.width == 0 || descriptor.height == 0 {
        bail!("width and height must be non-zero");
    }
    if sockpath.as_os_str().len() >= sun_path_capacity() {
        bail!(
            "Socket path is {} bytes, the limit is {}",
            sockpath.as_os_str().len(),
            sun_path_capacity() - 1
        );
    }

    let buffer =
        File::open(file).with_context(|| format!("Failed to open {}", file.display()))?;
    remove_stale_socket(sockpath)?;
    let listener = UnixListener::bind(sockpath)
        .with_context(|| format!("Failed to bind {}", sockpath.display()))?;

    tracing::info!(
        socket = %sockpath.display(),
        width = descriptor.width,
        height = descriptor.height,
        fourcc = %descriptor.fourcc,
        "Serving buffer"
    );

    let mut served = 0usize;
    while count.is_none_or(|limit| served < limit) {
        let (stream, _) = listener.accept().context("accept failed")?;
        match send_buffer(&stream, &descriptor, buffer.as_fd()) {
            Ok(()) => {
                served += 1;
                tracing::info!(served, "Sent buffer to consumer");
            }
            Err(err) => tracing::warn!("Consumer went away before receiving: {}", err),
        }
    }

    drop(listener);
    std::fs::remove_file(sockpath).ok();
    Ok(())
}

/// Remove a leftover socket from an earlier run. Anything else is left alone.
fn remove_stale_socket(sockpath: &Path) -> Result<()> {
    match std::fs::symlink_metadata(sockpath) {
        Ok(meta) if meta.file_type().is_socket() => {
            std::fs::remove_file(sockpath)
                .with_context(|| format!("Failed to remove stale socket {}", sockpath.display()))
        }
        Ok(_) => bail!("{} exists and is not a socket", sockpath.display()),
        Err(_) => Ok(()),
    }
}
