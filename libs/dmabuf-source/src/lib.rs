// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Zero-copy DMA-BUF video source.
//!
//! A [`DmabufSource`] connects to a producer's Unix socket, receives one
//! DMA-BUF handle with its layout, aliases it as an `EGLImage` and binds that
//! image as the storage of a GL texture. Each frame the texture is drawn with
//! the host's default effect; no pixel data is ever copied by the CPU.
//!
//! The host is abstracted behind [`GraphicsDevice`] (GPU context and
//! resource calls), [`ShaderEffect`] (the draw pipeline) and
//! [`SourceRegistry`] (plugin registration). [`EglDevice`] implements the
//! device side on top of a live EGL context.

mod capability;
mod device;
mod error;
mod graphics_scope;
mod settings;

#[cfg(target_os = "linux")]
mod egl;
#[cfg(target_os = "linux")]
mod plugin;
#[cfg(target_os = "linux")]
mod source;
#[cfg(target_os = "linux")]
mod surface;

pub use capability::ExtensionRegistry;
pub use device::{
    DMA_BUF_IMPORT_EXTENSION, DRAW_TECHNIQUE, DmabufImageAttributes, EFFECT_IMAGE_PARAM,
    ExtensionFn, GL_TEXTURE_2D, GraphicsDevice, IMAGE_TARGET_TEXTURE_2D_OES, ImageHandle,
    ImageTargetTexture2d, PlatformError, REQUIRED_BACKEND, ShaderEffect, TextureFilter,
    TextureFormat, TextureHandle, TextureUsage,
};
pub use error::{DmabufSourceError, Result};
pub use graphics_scope::GraphicsScope;
pub use settings::{
    DmabufSourceSettings, PathKind, Property, PropertySheet, SOCKPATH_KEY, properties,
};

#[cfg(target_os = "linux")]
pub use egl::EglDevice;
#[cfg(target_os = "linux")]
pub use plugin::{
    DMABUF_SOURCE_INFO, HostSource, MODULE_DESCRIPTION, OutputFlags, SourceFactory, SourceInfo,
    SourceKind, SourceRegistry, module_load, module_unload,
};
#[cfg(target_os = "linux")]
pub use source::{DmabufSource, SurfaceState};
#[cfg(target_os = "linux")]
pub use surface::ImportedSurface;
