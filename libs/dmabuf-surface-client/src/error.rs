// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SurfaceClientError {
    #[error("Socket path '{}' is too long: {len} bytes, max {max}", path.display())]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    #[error("Cannot connect to unix socket '{}': {source}", path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot configure unix socket: {0}")]
    Configure(#[source] std::io::Error),

    #[error("recvmsg failed: {0}")]
    Receive(#[source] std::io::Error),

    #[error("Producer closed the connection before sending a descriptor")]
    ConnectionClosed,

    #[error("Received metadata size mismatch: {received} received, {expected} expected")]
    MetadataSizeMismatch { received: usize, expected: usize },

    #[error("Received fd count mismatch: {received} received, {expected} expected")]
    HandleCountMismatch { received: usize, expected: usize },

    #[error("Control message truncated; descriptors were dropped by the kernel")]
    ControlTruncated,

    #[error("Invalid buffer descriptor: {field}={value}")]
    InvalidDescriptor { field: &'static str, value: i32 },
}

pub type Result<T> = std::result::Result<T, SurfaceClientError>;
