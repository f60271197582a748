// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Host GPU collaborator contract.
//!
//! The source never talks to EGL or GL directly. Everything goes through a
//! [`GraphicsDevice`] the host hands in, so the import/teardown ordering can
//! be driven against a real EGL display ([`crate::EglDevice`]) or a recording
//! fake in tests.

use std::ffi::c_void;
use std::fmt;
use std::os::fd::BorrowedFd;
use std::ptr::NonNull;

use dmabuf_surface_client::Fourcc;

/// Backend identity the source requires. Compared against
/// [`GraphicsDevice::backend_name`] at creation time.
pub const REQUIRED_BACKEND: &str = "opengl-egl";

/// EGL extension providing the `EGL_LINUX_DMA_BUF_EXT` image target.
pub const DMA_BUF_IMPORT_EXTENSION: &str = "EGL_EXT_image_dma_buf_import";

/// GL entry point binding an EGLImage as a texture's storage (`GL_OES_EGL_image`).
pub const IMAGE_TARGET_TEXTURE_2D_OES: &str = "glEGLImageTargetTexture2DOES";

/// `GL_TEXTURE_2D`.
pub const GL_TEXTURE_2D: u32 = 0x0DE1;

/// Sampler parameter of the default effect.
pub const EFFECT_IMAGE_PARAM: &str = "image";

/// Technique of the default effect that draws a textured sprite.
pub const DRAW_TECHNIQUE: &str = "Draw";

/// Opaque platform image (an `EGLImage`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle(usize);

impl ImageHandle {
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> usize {
        self.0
    }
}

/// Opaque texture object (a GL texture name for the EGL device).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(u32);

impl TextureHandle {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    /// 32-bit BGRA, 8 bits per channel.
    Bgra8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureUsage {
    /// Storage may be replaced after creation (EGLImage rebinding).
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFilter {
    Nearest,
    Linear,
}

/// Everything `eglCreateImage(EGL_LINUX_DMA_BUF_EXT)` needs for one plane.
#[derive(Debug, Clone, Copy)]
pub struct DmabufImageAttributes<'fd> {
    pub width: u32,
    pub height: u32,
    pub fourcc: Fourcc,
    pub fd: BorrowedFd<'fd>,
    pub offset: u32,
    pub pitch: u32,
}

/// Platform error code reported by a failed GPU call (`eglGetError` or
/// `glGetError`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformError(pub i32);

impl PlatformError {
    /// Symbolic EGL or GL name for the code, when it is one.
    pub fn name(self) -> Option<&'static str> {
        Some(match self.0 {
            0x0500 => "GL_INVALID_ENUM",
            0x0501 => "GL_INVALID_VALUE",
            0x0502 => "GL_INVALID_OPERATION",
            0x0505 => "GL_OUT_OF_MEMORY",
            0x0506 => "GL_INVALID_FRAMEBUFFER_OPERATION",
            0x3000 => "EGL_SUCCESS",
            0x3001 => "EGL_NOT_INITIALIZED",
            0x3002 => "EGL_BAD_ACCESS",
            0x3003 => "EGL_BAD_ALLOC",
            0x3004 => "EGL_BAD_ATTRIBUTE",
            0x3005 => "EGL_BAD_CONFIG",
            0x3006 => "EGL_BAD_CONTEXT",
            0x3007 => "EGL_BAD_CURRENT_SURFACE",
            0x3008 => "EGL_BAD_DISPLAY",
            0x3009 => "EGL_BAD_MATCH",
            0x300A => "EGL_BAD_NATIVE_PIXMAP",
            0x300B => "EGL_BAD_NATIVE_WINDOW",
            0x300C => "EGL_BAD_PARAMETER",
            0x300D => "EGL_BAD_SURFACE",
            0x300E => "EGL_CONTEXT_LOST",
            _ => return None,
        })
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({:#06x})", self.0),
            None => write!(f, "{:#06x}", self.0),
        }
    }
}

/// A resolved extension entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionFn(NonNull<c_void>);

// SAFETY: an extension entry point is a process-wide code address; it carries
// no thread affinity of its own.
unsafe impl Send for ExtensionFn {}
unsafe impl Sync for ExtensionFn {}

impl ExtensionFn {
    pub fn new(address: *const c_void) -> Option<Self> {
        NonNull::new(address as *mut c_void).map(Self)
    }

    pub fn as_ptr(self) -> *const c_void {
        self.0.as_ptr()
    }
}

/// `glEGLImageTargetTexture2DOES`, resolved once per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageTargetTexture2d(ExtensionFn);

type ImageTargetTexture2dProc = unsafe extern "system" fn(target: u32, image: *const c_void);

impl ImageTargetTexture2d {
    pub fn new(entry: ExtensionFn) -> Self {
        Self(entry)
    }

    pub fn entry(self) -> ExtensionFn {
        self.0
    }

    /// Bind `image` as the storage of the texture currently bound to `target`.
    ///
    /// # Safety
    /// The entry must have been resolved from the GL implementation owning the
    /// current context, a context must be current, and `image` must be a live
    /// EGLImage of that display.
    pub unsafe fn call(self, target: u32, image: *const c_void) {
        // SAFETY: upheld by the caller; the address was resolved under this name.
        unsafe {
            let proc: ImageTargetTexture2dProc = std::mem::transmute(self.0.as_ptr());
            proc(target, image);
        }
    }
}

/// Host GPU context manager.
///
/// Every method except [`backend_name`](Self::backend_name),
/// [`has_extension`](Self::has_extension) and
/// [`get_proc_address`](Self::get_proc_address) must be called between
/// [`enter_graphics`](Self::enter_graphics) and
/// [`leave_graphics`](Self::leave_graphics). Use [`crate::GraphicsScope`]
/// rather than calling the pair by hand.
pub trait GraphicsDevice: Send + Sync {
    /// Identity of the graphics implementation, compared to [`REQUIRED_BACKEND`].
    fn backend_name(&self) -> &str;

    fn has_extension(&self, name: &str) -> bool;

    fn get_proc_address(&self, name: &str) -> Option<ExtensionFn>;

    /// Make the host context current on this thread. Nests.
    ///
    /// On error the scope was not entered and `leave_graphics` must not be
    /// called for it.
    fn enter_graphics(&self) -> Result<(), PlatformError>;

    fn leave_graphics(&self);

    /// Alias the DMA-BUF as a platform image. No pixel data is copied.
    fn create_dmabuf_image(
        &self,
        attributes: &DmabufImageAttributes<'_>,
    ) -> Result<ImageHandle, PlatformError>;

    fn destroy_image(&self, image: ImageHandle);

    fn create_texture(
        &self,
        width: u32,
        height: u32,
        format: TextureFormat,
        usage: TextureUsage,
    ) -> Option<TextureHandle>;

    /// Make `image` the backing store of `texture` through `entry`.
    fn bind_image_to_texture(
        &self,
        texture: TextureHandle,
        image: ImageHandle,
        entry: ImageTargetTexture2d,
    ) -> Result<(), PlatformError>;

    fn set_texture_filter(&self, texture: TextureHandle, min: TextureFilter, mag: TextureFilter);

    fn destroy_texture(&self, texture: TextureHandle);

    /// The host's pass-through effect used for plain textured sprites.
    fn default_effect(&self) -> Box<dyn ShaderEffect + '_>;
}

/// Host shader effect, driven pass by pass.
pub trait ShaderEffect {
    /// Bind `texture` to the sampler parameter `param`. Returns false when the
    /// effect has no such parameter.
    fn set_texture(&mut self, param: &str, texture: TextureHandle) -> bool;

    /// Begin pass `pass` of `technique`. Returns false once every pass ran.
    fn begin_pass(&mut self, technique: &str, pass: usize) -> bool;

    /// Draw `texture` as a `width` x `height` quad at the origin.
    fn draw_sprite(&mut self, texture: TextureHandle, width: u32, height: u32);

    fn end_pass(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_error_display() {
        assert_eq!(PlatformError(0x3004).to_string(), "EGL_BAD_ATTRIBUTE (0x3004)");
        assert_eq!(PlatformError(0x1234).to_string(), "0x1234");
        assert_eq!(PlatformError(0x3009).name(), Some("EGL_BAD_MATCH"));
        assert_eq!(
            PlatformError(0x0502).to_string(),
            "GL_INVALID_OPERATION (0x0502)"
        );
    }

    #[test]
    fn test_extension_fn_rejects_null() {
        assert!(ExtensionFn::new(std::ptr::null()).is_none());
        assert!(ExtensionFn::new(0x1000 as *const c_void).is_some());
    }
}
