// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! DMA-BUF → EGLImage → texture binding.

use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::sync::Arc;

use dmabuf_surface_client::{BufferDescriptor, ReceivedBuffer};

use crate::device::{
    DmabufImageAttributes, GraphicsDevice, ImageHandle, ImageTargetTexture2d, TextureFilter,
    TextureFormat, TextureHandle, TextureUsage,
};
use crate::error::{DmabufSourceError, Result};
use crate::graphics_scope::GraphicsScope;

/// A DMA-BUF imported as a sampleable texture.
///
/// Owns the whole chain: texture → image → fd. Dropping it destroys them in
/// exactly that order, inside the host graphics scope.
pub struct ImportedSurface {
    device: Arc<dyn GraphicsDevice>,
    descriptor: BufferDescriptor,
    texture: TextureHandle,
    image: ImageHandle,
    fd: OwnedFd,
}

impl ImportedSurface {
    /// Import `buffer` on `device`. Either all three resources come back alive
    /// or everything acquired so far is released, fd included.
    pub fn import(
        device: &Arc<dyn GraphicsDevice>,
        entry: ImageTargetTexture2d,
        buffer: ReceivedBuffer,
    ) -> Result<Self> {
        let (descriptor, fd) = buffer.into_parts();
        let scope = GraphicsScope::enter(device.as_ref()).map_err(|code| {
            tracing::error!(%code, "Cannot enter graphics to import DMA-BUF");
            DmabufSourceError::GraphicsScope { code }
        })?;
        let gpu = scope.device();

        let attributes = DmabufImageAttributes {
            width: descriptor.width,
            height: descriptor.height,
            fourcc: descriptor.fourcc,
            fd: fd.as_fd(),
            offset: descriptor.offset,
            pitch: descriptor.pitch,
        };

        let image = gpu.create_dmabuf_image(&attributes).map_err(|code| {
            tracing::error!(%code, fd = fd.as_raw_fd(), "Cannot create EGLImage");
            DmabufSourceError::ImageCreation { code }
        })?;

        // TODO: map descriptor.fourcc to a matching texture format once
        // non-BGRA layouts need sampling with swizzles.
        let Some(texture) = gpu.create_texture(
            descriptor.width,
            descriptor.height,
            TextureFormat::Bgra8,
            TextureUsage::Dynamic,
        ) else {
            tracing::error!(
                width = descriptor.width,
                height = descriptor.height,
                "Cannot create texture for EGLImage"
            );
            gpu.destroy_image(image);
            return Err(DmabufSourceError::TextureCreation {
                width: descriptor.width,
                height: descriptor.height,
            });
        };
        tracing::debug!(texture = texture.as_raw(), "texture created");

        if let Err(code) = gpu.bind_image_to_texture(texture, image, entry) {
            tracing::error!(%code, texture = texture.as_raw(), "Cannot bind EGLImage to texture");
            gpu.destroy_texture(texture);
            gpu.destroy_image(image);
            return Err(DmabufSourceError::ImageBinding { code });
        }
        gpu.set_texture_filter(texture, TextureFilter::Nearest, TextureFilter::Nearest);
        drop(scope);

        tracing::info!(
            width = descriptor.width,
            height = descriptor.height,
            fourcc = %descriptor.fourcc,
            "Imported DMA-BUF surface"
        );

        Ok(Self {
            device: Arc::clone(device),
            descriptor,
            texture,
            image,
            fd,
        })
    }

    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    pub fn width(&self) -> u32 {
        self.descriptor.width
    }

    pub fn height(&self) -> u32 {
        self.descriptor.height
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    pub fn image(&self) -> ImageHandle {
        self.image
    }

    pub fn fd(&self) -> std::os::fd::BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl Drop for ImportedSurface {
    fn drop(&mut self) {
        match GraphicsScope::enter(self.device.as_ref()) {
            Ok(scope) => {
                scope.device().destroy_texture(self.texture);
                scope.device().destroy_image(self.image);
            }
            Err(code) => tracing::error!(
                %code,
                texture = self.texture.as_raw(),
                "Cannot enter graphics, leaking texture and EGLImage"
            ),
        }
        tracing::debug!(fd = self.fd.as_raw_fd(), "DMA-BUF surface released");
        // `fd` closes when the fields drop, after the image is gone.
    }
}

impl std::fmt::Debug for ImportedSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportedSurface")
            .field("descriptor", &self.descriptor)
            .field("texture", &self.texture)
            .field("image", &self.image)
            .field("fd", &self.fd)
            .finish()
    }
}
