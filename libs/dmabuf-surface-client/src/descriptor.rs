// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Buffer metadata record exchanged over the surface socket.

use std::fmt;

use crate::error::{Result, SurfaceClientError};

/// DRM four-character pixel format code.
///
/// Packed little-endian the way `drm_fourcc.h` does it, so `Fourcc::from_bytes(*b"AR24")`
/// equals `DRM_FORMAT_ARGB8888`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fourcc(pub u32);

impl Fourcc {
    /// `DRM_FORMAT_ARGB8888`, `[31:0] A:R:G:B`, memory order B,G,R,A.
    pub const ARGB8888: Fourcc = Fourcc::from_bytes(*b"AR24");
    /// `DRM_FORMAT_XRGB8888`.
    pub const XRGB8888: Fourcc = Fourcc::from_bytes(*b"XR24");
    /// `DRM_FORMAT_ABGR8888`.
    pub const ABGR8888: Fourcc = Fourcc::from_bytes(*b"AB24");
    /// `DRM_FORMAT_XBGR8888`.
    pub const XBGR8888: Fourcc = Fourcc::from_bytes(*b"XB24");

    pub const fn from_bytes(code: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(code))
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for Fourcc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.to_bytes() {
            let c = if byte.is_ascii_graphic() || byte == b' ' {
                byte as char
            } else {
                '?'
            };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fourcc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fourcc('{}', {:#x})", self, self.0)
    }
}

/// Layout of one single-plane DMA-BUF.
///
/// The file descriptor is deliberately not part of this type. It travels
/// out-of-band and is handed to the consumer as an owned handle next to the
/// descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub width: u32,
    pub height: u32,
    pub fourcc: Fourcc,
    /// Byte offset of the first pixel inside the allocation.
    pub offset: u32,
    /// Row stride in bytes.
    pub pitch: u32,
}

impl BufferDescriptor {
    /// Size of the inline record: width, height, fourcc, offset, pitch.
    pub const WIRE_SIZE: usize = 5 * 4;

    /// Decode the native-endian record a producer wrote.
    ///
    /// Width and height must be positive, offset and pitch non-negative.
    pub fn from_wire(record: &[u8; Self::WIRE_SIZE]) -> Result<Self> {
        let word = |index: usize| -> [u8; 4] {
            let start = index * 4;
            [
                record[start],
                record[start + 1],
                record[start + 2],
                record[start + 3],
            ]
        };

        let width = i32::from_ne_bytes(word(0));
        let height = i32::from_ne_bytes(word(1));
        let fourcc = Fourcc(u32::from_ne_bytes(word(2)));
        let offset = i32::from_ne_bytes(word(3));
        let pitch = i32::from_ne_bytes(word(4));

        Ok(Self {
            width: positive("width", width)?,
            height: positive("height", height)?,
            fourcc,
            offset: non_negative("offset", offset)?,
            pitch: non_negative("pitch", pitch)?,
        })
    }

    /// Encode the record a producer sends.
    pub fn to_wire(&self) -> [u8; Self::WIRE_SIZE] {
        let mut record = [0u8; Self::WIRE_SIZE];
        let words = [
            self.width.to_ne_bytes(),
            self.height.to_ne_bytes(),
            self.fourcc.0.to_ne_bytes(),
            self.offset.to_ne_bytes(),
            self.pitch.to_ne_bytes(),
        ];
        for (chunk, word) in record.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&word);
        }
        record
    }
}

fn positive(field: &'static str, value: i32) -> Result<u32> {
    if value > 0 {
        Ok(value as u32)
    } else {
        Err(SurfaceClientError::InvalidDescriptor { field, value })
    }
}

fn non_negative(field: &'static str, value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| SurfaceClientError::InvalidDescriptor { field, value })
}
