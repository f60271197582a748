// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Source lifecycle: create, update, render, destroy.

use std::sync::Arc;

use dmabuf_surface_client::{BufferDescriptor, receive_buffer};

use crate::capability::ExtensionRegistry;
use crate::device::{
    DMA_BUF_IMPORT_EXTENSION, DRAW_TECHNIQUE, EFFECT_IMAGE_PARAM, GraphicsDevice,
    IMAGE_TARGET_TEXTURE_2D_OES, ImageTargetTexture2d, REQUIRED_BACKEND,
};
use crate::error::{DmabufSourceError, Result};
use crate::settings::DmabufSourceSettings;
use crate::surface::ImportedSurface;

/// Externally observable binding state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    /// No texture; renders nothing and reports 0x0.
    Unbound,
    /// A DMA-BUF is imported and drawable.
    Bound,
}

/// One DMA-BUF video source instance.
///
/// Driven serially by the host on the thread that owns the GPU context;
/// nothing here synchronizes on its own.
pub struct DmabufSource {
    device: Arc<dyn GraphicsDevice>,
    entry: ImageTargetTexture2d,
    settings: DmabufSourceSettings,
    surface: Option<ImportedSurface>,
}

impl DmabufSource {
    /// Create a source on `device` and attempt the first import.
    ///
    /// Fails only when the device cannot host this source at all (wrong
    /// backend, missing extension, unresolvable entry point). A failed first
    /// import yields an unbound source that a later update can fix.
    pub fn create(device: Arc<dyn GraphicsDevice>, settings: &serde_json::Value) -> Result<Self> {
        Self::create_with_registry(device, settings, ExtensionRegistry::global())
    }

    pub fn create_with_registry(
        device: Arc<dyn GraphicsDevice>,
        settings: &serde_json::Value,
        registry: &ExtensionRegistry,
    ) -> Result<Self> {
        let entry = check_capabilities(device.as_ref(), registry)?;

        let mut source = Self {
            device,
            entry,
            settings: DmabufSourceSettings::default(),
            surface: None,
        };
        if let Err(err) = source.update(settings) {
            tracing::error!("Cannot create dmabuf input: {}", err);
        }
        Ok(source)
    }

    /// Apply new host settings: tear the current surface down completely,
    /// then receive and import from the configured socket.
    ///
    /// Unparsable settings still release the current surface.
    pub fn update(&mut self, settings: &serde_json::Value) -> Result<()> {
        let parsed = DmabufSourceSettings::from_value(settings);
        self.teardown();
        self.bind(parsed?)
    }

    /// Typed form of [`update`](Self::update).
    pub fn update_settings(&mut self, settings: DmabufSourceSettings) -> Result<()> {
        self.teardown();
        self.bind(settings)
    }

    /// Receive and import from `settings.sockpath`. Expects no bound surface.
    fn bind(&mut self, settings: DmabufSourceSettings) -> Result<()> {
        debug_assert!(self.surface.is_none());
        self.settings = settings;

        let buffer = receive_buffer(&self.settings.sockpath).inspect_err(|err| {
            tracing::error!(
                "Cannot create dmabuf input from socket {}: {}",
                self.settings.sockpath,
                err
            );
        })?;

        self.surface = Some(ImportedSurface::import(&self.device, self.entry, buffer)?);
        Ok(())
    }

    /// Draw the surface with the host's default effect. No-op when unbound.
    pub fn render(&self) {
        let Some(surface) = &self.surface else {
            return;
        };

        let texture = surface.texture();
        let mut effect = self.device.default_effect();
        if !effect.set_texture(EFFECT_IMAGE_PARAM, texture) {
            tracing::warn!("default effect has no '{}' parameter", EFFECT_IMAGE_PARAM);
        }

        let mut pass = 0;
        while effect.begin_pass(DRAW_TECHNIQUE, pass) {
            effect.draw_sprite(texture, surface.width(), surface.height());
            effect.end_pass();
            pass += 1;
        }
    }

    pub fn width(&self) -> u32 {
        self.surface.as_ref().map_or(0, ImportedSurface::width)
    }

    pub fn height(&self) -> u32 {
        self.surface.as_ref().map_or(0, ImportedSurface::height)
    }

    pub fn state(&self) -> SurfaceState {
        if self.surface.is_some() {
            SurfaceState::Bound
        } else {
            SurfaceState::Unbound
        }
    }

    pub fn descriptor(&self) -> Option<&BufferDescriptor> {
        self.surface.as_ref().map(ImportedSurface::descriptor)
    }

    pub fn surface(&self) -> Option<&ImportedSurface> {
        self.surface.as_ref()
    }

    pub fn settings(&self) -> &DmabufSourceSettings {
        &self.settings
    }

    /// Release the texture, image and fd. Safe to call repeatedly.
    pub fn destroy(&mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        // Dropping the surface destroys texture, then image, then closes the fd.
        self.surface = None;
    }
}

impl std::fmt::Debug for DmabufSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DmabufSource")
            .field("backend", &self.device.backend_name())
            .field("settings", &self.settings)
            .field("surface", &self.surface)
            .finish()
    }
}

impl Drop for DmabufSource {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn check_capabilities(
    device: &dyn GraphicsDevice,
    registry: &ExtensionRegistry,
) -> Result<ImageTargetTexture2d> {
    let backend = device.backend_name();
    if backend != REQUIRED_BACKEND {
        tracing::error!("dmabuf source requires EGL graphics: {}", backend);
        return Err(DmabufSourceError::UnsupportedBackend {
            found: backend.to_owned(),
            required: REQUIRED_BACKEND,
        });
    }

    if !device.has_extension(DMA_BUF_IMPORT_EXTENSION) {
        tracing::error!("{} extension is required", DMA_BUF_IMPORT_EXTENSION);
        return Err(DmabufSourceError::MissingExtension(DMA_BUF_IMPORT_EXTENSION));
    }

    registry.image_target_texture_2d(device).ok_or_else(|| {
        tracing::error!("GL_OES_EGL_image extension is required");
        DmabufSourceError::UnresolvedEntryPoint(IMAGE_TARGET_TEXTURE_2D_OES)
    })
}
