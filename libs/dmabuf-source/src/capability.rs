// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Process-wide cache of GL extension entry points.
//!
//! `eglGetProcAddress` results are context independent, so one lookup serves
//! every source instance for the lifetime of the process. The registry is
//! safe to query from any thread: the first successful resolution wins and
//! later callers read it lock-free. A failed lookup is not cached, so a later
//! creation on a better-equipped device can still succeed.

use std::sync::OnceLock;

use crate::device::{GraphicsDevice, IMAGE_TARGET_TEXTURE_2D_OES, ImageTargetTexture2d};

pub struct ExtensionRegistry {
    image_target_texture_2d: OnceLock<ImageTargetTexture2d>,
}

static GLOBAL_REGISTRY: ExtensionRegistry = ExtensionRegistry::new();

impl ExtensionRegistry {
    pub const fn new() -> Self {
        Self {
            image_target_texture_2d: OnceLock::new(),
        }
    }

    /// The registry shared by every source in the process.
    pub fn global() -> &'static Self {
        &GLOBAL_REGISTRY
    }

    /// `glEGLImageTargetTexture2DOES`, resolving it through `device` on first use.
    pub fn image_target_texture_2d(
        &self,
        device: &dyn GraphicsDevice,
    ) -> Option<ImageTargetTexture2d> {
        if let Some(entry) = self.image_target_texture_2d.get() {
            return Some(*entry);
        }

        let resolved = device.get_proc_address(IMAGE_TARGET_TEXTURE_2D_OES)?;
        tracing::debug!(
            address = ?resolved.as_ptr(),
            "Resolved {}",
            IMAGE_TARGET_TEXTURE_2D_OES
        );
        Some(
            *self
                .image_target_texture_2d
                .get_or_init(|| ImageTargetTexture2d::new(resolved)),
        )
    }

    pub fn is_resolved(&self) -> bool {
        self.image_target_texture_2d.get().is_some()
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
