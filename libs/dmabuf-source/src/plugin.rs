// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Registration of the DMA-BUF source with the host's plugin registry.
//!
//! The host owns object lifecycles: it calls the registered factory to create
//! an instance, then drives [`HostSource`] callbacks per frame and on
//! settings changes, and drops the instance to destroy it.

use std::sync::Arc;

use bitflags::bitflags;

use crate::device::GraphicsDevice;
use crate::error::Result;
use crate::settings::{self, PropertySheet};
use crate::source::DmabufSource;

pub const MODULE_DESCRIPTION: &str = "DMA-BUF-based zero-copy screen capture";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Produces video on its own, with no upstream source.
    Input,
}

bitflags! {
    /// Capabilities a source advertises to the host.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OutputFlags: u32 {
        const VIDEO = 1 << 0;
        /// The source draws itself instead of handing the host a frame.
        const CUSTOM_DRAW = 1 << 3;
        /// The host must not duplicate instances (the fd is single-owner).
        const DO_NOT_DUPLICATE = 1 << 7;
    }
}

/// Instance callbacks the host invokes on a created source.
pub trait HostSource {
    /// Settings changed. Failures are logged, never propagated to the host.
    fn update(&mut self, settings: &serde_json::Value);

    fn video_render(&self);

    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn properties(&self) -> PropertySheet;
}

pub type SourceFactory =
    fn(Arc<dyn GraphicsDevice>, &serde_json::Value) -> Result<Box<dyn HostSource>>;

/// Static description of a source type.
#[derive(Debug, Clone, Copy)]
pub struct SourceInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub kind: SourceKind,
    pub output_flags: OutputFlags,
    pub create: SourceFactory,
}

/// Host plugin registry.
pub trait SourceRegistry {
    fn register_source(&mut self, info: SourceInfo);
}

pub const DMABUF_SOURCE_INFO: SourceInfo = SourceInfo {
    id: "dmabuf-source",
    name: "DMA-BUF source",
    kind: SourceKind::Input,
    output_flags: OutputFlags::VIDEO
        .union(OutputFlags::CUSTOM_DRAW)
        .union(OutputFlags::DO_NOT_DUPLICATE),
    create: create_dmabuf_source,
};

fn create_dmabuf_source(
    device: Arc<dyn GraphicsDevice>,
    settings: &serde_json::Value,
) -> Result<Box<dyn HostSource>> {
    Ok(Box::new(DmabufSource::create(device, settings)?))
}

/// Register every source this module provides.
pub fn module_load(registry: &mut dyn SourceRegistry) -> bool {
    registry.register_source(DMABUF_SOURCE_INFO);
    tracing::debug!(id = DMABUF_SOURCE_INFO.id, "registered source");
    true
}

pub fn module_unload() {}

impl HostSource for DmabufSource {
    fn update(&mut self, settings: &serde_json::Value) {
        if let Err(err) = DmabufSource::update(self, settings) {
            tracing::error!("dmabuf source update failed: {}", err);
        }
    }

    fn video_render(&self) {
        self.render();
    }

    fn width(&self) -> u32 {
        DmabufSource::width(self)
    }

    fn height(&self) -> u32 {
        DmabufSource::height(self)
    }

    fn properties(&self) -> PropertySheet {
        settings::properties()
    }
}
