// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use crate::device::{GraphicsDevice, PlatformError};

/// RAII bracket around [`GraphicsDevice::enter_graphics`] /
/// [`GraphicsDevice::leave_graphics`].
///
/// Every GPU call the source makes happens while one of these is alive. A
/// guard only exists if entering succeeded, so a failed enter issues no GPU
/// calls and no matching leave.
#[must_use = "the graphics scope is left as soon as the guard is dropped"]
pub struct GraphicsScope<'a> {
    device: &'a dyn GraphicsDevice,
}

impl<'a> GraphicsScope<'a> {
    pub fn enter(device: &'a dyn GraphicsDevice) -> Result<Self, PlatformError> {
        device.enter_graphics()?;
        Ok(Self { device })
    }

    pub fn device(&self) -> &'a dyn GraphicsDevice {
        self.device
    }
}

impl Drop for GraphicsScope<'_> {
    fn drop(&mut self) {
        self.device.leave_graphics();
    }
}
