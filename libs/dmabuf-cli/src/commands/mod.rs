// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use dmabuf_surface_client::Fourcc;

pub mod probe;
pub mod serve;

/// Parse a DRM fourcc given as exactly four ASCII characters (`AR24`, `R8  `).
pub fn parse_fourcc(code: &str) -> Result<Fourcc, String> {
    let bytes: [u8; 4] = code
        .as_bytes()
        .try_into()
        .map_err(|_| format!("fourcc must be exactly 4 characters, got {:?}", code))?;
    if !bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        return Err(format!("fourcc must be printable ASCII, got {:?}", code));
    }
    Ok(Fourcc::from_bytes(bytes))
}
