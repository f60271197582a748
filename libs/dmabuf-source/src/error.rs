// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use dmabuf_surface_client::SurfaceClientError;
use thiserror::Error;

use crate::device::PlatformError;

#[derive(Error, Debug)]
pub enum DmabufSourceError {
    #[error("dmabuf source requires the {required} graphics backend, host runs {found}")]
    UnsupportedBackend { found: String, required: &'static str },

    #[error("{0} extension is required")]
    MissingExtension(&'static str),

    #[error("Cannot resolve {0}")]
    UnresolvedEntryPoint(&'static str),

    #[error("Cannot receive DMA-BUF: {0}")]
    Transport(#[from] SurfaceClientError),

    #[error("Cannot create EGLImage: {code}")]
    ImageCreation { code: PlatformError },

    #[error("Cannot bind EGLImage to texture: {code}")]
    ImageBinding { code: PlatformError },

    #[error("Cannot enter graphics scope: {code}")]
    GraphicsScope { code: PlatformError },

    #[error("Cannot create {width}x{height} texture")]
    TextureCreation { width: u32, height: u32 },

    #[error("Invalid source settings: {0}")]
    Settings(#[from] serde_json::Error),

    #[cfg(target_os = "linux")]
    #[error("Cannot load libEGL: {0}")]
    EglLoad(#[from] khronos_egl::LoadError<libloading::Error>),

    #[error("No current EGL {0}")]
    NoCurrentContext(&'static str),

    #[error("EGL call failed: {0}")]
    Egl(String),
}

impl DmabufSourceError {
    /// Errors that leave an existing source unbound but alive, as opposed to
    /// errors that prevent the source from being created at all.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::ImageCreation { .. }
                | Self::ImageBinding { .. }
                | Self::GraphicsScope { .. }
                | Self::TextureCreation { .. }
                | Self::Settings(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DmabufSourceError>;
