// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Recording graphics device and socket helpers shared by integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::ffi::c_void;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use dmabuf_source::{
    DMA_BUF_IMPORT_EXTENSION, DRAW_TECHNIQUE, DmabufImageAttributes, EFFECT_IMAGE_PARAM,
    ExtensionFn, GraphicsDevice, IMAGE_TARGET_TEXTURE_2D_OES, ImageHandle, ImageTargetTexture2d,
    PlatformError, REQUIRED_BACKEND, ShaderEffect, TextureFilter, TextureFormat, TextureHandle,
    TextureUsage,
};
use dmabuf_surface_client::{BufferDescriptor, Fourcc, send_buffer, send_message};
use parking_lot::Mutex;

/// EGL_BAD_MATCH
pub const BAD_MATCH: i32 = 0x3009;
/// EGL_CONTEXT_LOST
pub const CONTEXT_LOST: i32 = 0x300E;
/// GL_INVALID_OPERATION
pub const INVALID_OPERATION: i32 = 0x0502;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Enter,
    Leave,
    CreateImage {
        image: usize,
        width: u32,
        height: u32,
        fourcc: Fourcc,
        offset: u32,
        pitch: u32,
    },
    DestroyImage(usize),
    CreateTexture {
        texture: u32,
        width: u32,
        height: u32,
    },
    DestroyTexture(u32),
    Bind {
        texture: u32,
        image: usize,
    },
    Filter {
        texture: u32,
        min: TextureFilter,
        mag: TextureFilter,
    },
    SetTexture(u32),
    BeginPass(usize),
    Draw {
        texture: u32,
        width: u32,
        height: u32,
    },
    EndPass,
}

struct LiveImage {
    fd: RawFd,
    inode: u64,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<Call>,
    depth: usize,
    outside_scope: Vec<&'static str>,
    next_handle: usize,
    live_images: HashMap<usize, LiveImage>,
    live_textures: Vec<u32>,
    fd_closed_before_image: bool,
}

/// A [`GraphicsDevice`] that records every call instead of touching a GPU.
pub struct FakeDevice {
    backend: String,
    extensions: Vec<String>,
    resolves_entry: AtomicBool,
    fail_enter: AtomicBool,
    fail_image: AtomicBool,
    fail_texture: AtomicBool,
    fail_bind: AtomicBool,
    proc_lookups: AtomicUsize,
    state: Mutex<FakeState>,
}

extern "system" fn fake_image_target_texture(_target: u32, _image: *const c_void) {}

impl FakeDevice {
    pub fn new() -> Self {
        Self::with_backend(REQUIRED_BACKEND, &[DMA_BUF_IMPORT_EXTENSION])
    }

    pub fn with_backend(backend: &str, extensions: &[&str]) -> Self {
        Self {
            backend: backend.to_owned(),
            extensions: extensions.iter().map(|ext| (*ext).to_owned()).collect(),
            resolves_entry: AtomicBool::new(true),
            fail_enter: AtomicBool::new(false),
            fail_image: AtomicBool::new(false),
            fail_texture: AtomicBool::new(false),
            fail_bind: AtomicBool::new(false),
            proc_lookups: AtomicUsize::new(0),
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn set_resolves_entry(&self, resolves: bool) {
        self.resolves_entry.store(resolves, Ordering::SeqCst);
    }

    pub fn set_fail_enter(&self, fail: bool) {
        self.fail_enter.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_bind(&self, fail: bool) {
        self.fail_bind.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_image(&self, fail: bool) {
        self.fail_image.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_texture(&self, fail: bool) {
        self.fail_texture.store(fail, Ordering::SeqCst);
    }

    pub fn proc_lookups(&self) -> usize {
        self.proc_lookups.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn live_images(&self) -> usize {
        self.state.lock().live_images.len()
    }

    pub fn live_textures(&self) -> usize {
        self.state.lock().live_textures.len()
    }

    pub fn scope_depth(&self) -> usize {
        self.state.lock().depth
    }

    /// Resource calls issued with no graphics scope entered.
    pub fn calls_outside_scope(&self) -> Vec<&'static str> {
        self.state.lock().outside_scope.clone()
    }

    /// True if an image's fd was closed (or replaced) while the image lived.
    pub fn fd_closed_before_image(&self) -> bool {
        self.state.lock().fd_closed_before_image
    }

    pub fn draws(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Draw { .. }))
            .collect()
    }

    fn record(&self, name: &'static str, call: Call) {
        let mut state = self.state.lock();
        if state.depth == 0 {
            state.outside_scope.push(name);
        }
        state.calls.push(call);
    }

    fn next_handle(&self) -> usize {
        let mut state = self.state.lock();
        state.next_handle += 1;
        state.next_handle
    }
}

impl Default for FakeDevice {
    fn default() -> Self {
        Self::new()
    }
}

fn inode_of(fd: RawFd) -> Option<u64> {
    let mut stat: libc::stat = unsafe { std::mem::zeroed() };
    // SAFETY: fstat only writes into `stat`.
    if unsafe { libc::fstat(fd, &mut stat) } == 0 {
        Some(stat.st_ino)
    } else {
        None
    }
}

impl GraphicsDevice for FakeDevice {
    fn backend_name(&self) -> &str {
        &self.backend
    }

    fn has_extension(&self, name: &str) -> bool {
        self.extensions.iter().any(|ext| ext == name)
    }

    fn get_proc_address(&self, name: &str) -> Option<ExtensionFn> {
        self.proc_lookups.fetch_add(1, Ordering::SeqCst);
        if name != IMAGE_TARGET_TEXTURE_2D_OES || !self.resolves_entry.load(Ordering::SeqCst) {
            return None;
        }
        ExtensionFn::new(fake_image_target_texture as *const c_void)
    }

    fn enter_graphics(&self) -> Result<(), PlatformError> {
        if self.fail_enter.load(Ordering::SeqCst) {
            return Err(PlatformError(CONTEXT_LOST));
        }
        let mut state = self.state.lock();
        state.depth += 1;
        state.calls.push(Call::Enter);
        Ok(())
    }

    fn leave_graphics(&self) {
        let mut state = self.state.lock();
        assert!(state.depth > 0, "leave_graphics without enter_graphics");
        state.depth -= 1;
        state.calls.push(Call::Leave);
    }

    fn create_dmabuf_image(
        &self,
        attributes: &DmabufImageAttributes<'_>,
    ) -> Result<ImageHandle, PlatformError> {
        if self.fail_image.load(Ordering::SeqCst) {
            let mut state = self.state.lock();
            if state.depth == 0 {
                state.outside_scope.push("create_dmabuf_image");
            }
            return Err(PlatformError(BAD_MATCH));
        }

        let image = self.next_handle();
        let fd = attributes.fd.as_raw_fd();
        let inode = inode_of(fd).expect("image created from a closed fd");
        self.record(
            "create_dmabuf_image",
            Call::CreateImage {
                image,
                width: attributes.width,
                height: attributes.height,
                fourcc: attributes.fourcc,
                offset: attributes.offset,
                pitch: attributes.pitch,
            },
        );
        self.state
            .lock()
            .live_images
            .insert(image, LiveImage { fd, inode });
        Ok(ImageHandle::from_raw(image))
    }

    fn destroy_image(&self, image: ImageHandle) {
        self.record("destroy_image", Call::DestroyImage(image.as_raw()));
        let mut state = self.state.lock();
        let live = state
            .live_images
            .remove(&image.as_raw())
            .expect("destroying unknown image");
        if inode_of(live.fd) != Some(live.inode) {
            state.fd_closed_before_image = true;
        }
    }

    fn create_texture(
        &self,
        width: u32,
        height: u32,
        format: TextureFormat,
        usage: TextureUsage,
    ) -> Option<TextureHandle> {
        assert_eq!(format, TextureFormat::Bgra8);
        assert_eq!(usage, TextureUsage::Dynamic);
        if self.fail_texture.load(Ordering::SeqCst) {
            let mut state = self.state.lock();
            if state.depth == 0 {
                state.outside_scope.push("create_texture");
            }
            return None;
        }

        let texture = self.next_handle() as u32;
        self.record(
            "create_texture",
            Call::CreateTexture {
                texture,
                width,
                height,
            },
        );
        self.state.lock().live_textures.push(texture);
        Some(TextureHandle::from_raw(texture))
    }

    fn bind_image_to_texture(
        &self,
        texture: TextureHandle,
        image: ImageHandle,
        entry: ImageTargetTexture2d,
    ) -> Result<(), PlatformError> {
        assert_eq!(
            entry.entry().as_ptr(),
            fake_image_target_texture as *const c_void
        );
        self.record(
            "bind_image_to_texture",
            Call::Bind {
                texture: texture.as_raw(),
                image: image.as_raw(),
            },
        );
        if self.fail_bind.load(Ordering::SeqCst) {
            return Err(PlatformError(INVALID_OPERATION));
        }
        Ok(())
    }

    fn set_texture_filter(&self, texture: TextureHandle, min: TextureFilter, mag: TextureFilter) {
        self.record(
            "set_texture_filter",
            Call::Filter {
                texture: texture.as_raw(),
                min,
                mag,
            },
        );
    }

    fn destroy_texture(&self, texture: TextureHandle) {
        self.record("destroy_texture", Call::DestroyTexture(texture.as_raw()));
        let mut state = self.state.lock();
        let before = state.live_textures.len();
        state.live_textures.retain(|t| *t != texture.as_raw());
        assert_eq!(state.live_textures.len() + 1, before, "destroying unknown texture");
    }

    fn default_effect(&self) -> Box<dyn ShaderEffect + '_> {
        Box::new(FakeEffect { device: self })
    }
}

/// Single-technique, single-pass effect recording into its device.
struct FakeEffect<'a> {
    device: &'a FakeDevice,
}

impl ShaderEffect for FakeEffect<'_> {
    fn set_texture(&mut self, param: &str, texture: TextureHandle) -> bool {
        self.device.state.lock().calls.push(Call::SetTexture(texture.as_raw()));
        param == EFFECT_IMAGE_PARAM
    }

    fn begin_pass(&mut self, technique: &str, pass: usize) -> bool {
        if technique != DRAW_TECHNIQUE || pass > 0 {
            return false;
        }
        self.device.state.lock().calls.push(Call::BeginPass(pass));
        true
    }

    fn draw_sprite(&mut self, texture: TextureHandle, width: u32, height: u32) {
        self.device.state.lock().calls.push(Call::Draw {
            texture: texture.as_raw(),
            width,
            height,
        });
    }

    fn end_pass(&mut self) {
        self.device.state.lock().calls.push(Call::EndPass);
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("dmabuf_source=debug,dmabuf_surface_client=debug")
        .try_init();
}

pub fn memfd(len: i64) -> OwnedFd {
    // SAFETY: the name is NUL-terminated; the returned fd is checked.
    let raw = unsafe { libc::memfd_create(c"surface-lifecycle".as_ptr(), libc::MFD_CLOEXEC) };
    assert!(raw >= 0, "memfd_create failed");
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };
    assert_eq!(unsafe { libc::ftruncate(raw, len) }, 0);
    fd
}

pub fn open_fd_count() -> usize {
    std::fs::read_dir("/proc/self/fd").unwrap().count()
}

pub fn socket_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("drmsend.sock")
}

pub fn descriptor(width: u32, height: u32) -> BufferDescriptor {
    BufferDescriptor {
        width,
        height,
        fourcc: Fourcc::from_bytes(*b"ABGR"),
        offset: 0,
        pitch: width * 4,
    }
}

/// Serve one connection with whatever `producer` writes, then hang up.
pub fn serve_once<F>(path: &Path, producer: F) -> thread::JoinHandle<()>
where
    F: FnOnce(UnixStream) + Send + 'static,
{
    let listener = UnixListener::bind(path).unwrap();
    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        producer(stream);
    })
}

/// Serve a well-formed record with a fresh buffer of matching size.
pub fn serve_buffer(path: &Path, descriptor: BufferDescriptor) -> thread::JoinHandle<()> {
    serve_once(path, move |stream| {
        let buffer = memfd(i64::from(descriptor.pitch) * i64::from(descriptor.height));
        send_buffer(&stream, &descriptor, buffer.as_fd()).unwrap();
    })
}

/// Serve a well-formed record alongside `fd_count` descriptors.
pub fn serve_with_fd_count(
    path: &Path,
    descriptor: BufferDescriptor,
    fd_count: usize,
) -> thread::JoinHandle<()> {
    serve_once(path, move |stream| {
        let buffers: Vec<OwnedFd> = (0..fd_count).map(|_| memfd(4096)).collect();
        let fds: Vec<BorrowedFd<'_>> = buffers.iter().map(AsFd::as_fd).collect();
        send_message(&stream, &descriptor.to_wire(), &fds).unwrap();
    })
}

/// Settings object pointing a source at `path`.
pub fn settings_for(path: &Path) -> serde_json::Value {
    serde_json::json!({ "sockpath": path.to_str().unwrap() })
}
