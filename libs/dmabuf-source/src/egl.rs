// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! [`GraphicsDevice`] over the host's EGL display and OpenGL context.
//!
//! libEGL is loaded at runtime through `khronos-egl`'s dynamic loader, so the
//! crate builds on machines without EGL development files. GL entry points
//! are loaded through `eglGetProcAddress` into the `gl` crate's globals.

use std::cell::Cell;
use std::ffi::{CStr, CString, c_void};
use std::os::fd::AsRawFd;
use std::ptr;
use std::sync::OnceLock;

use gl::types::{GLchar, GLenum, GLint, GLsizei, GLuint};
use khronos_egl as egl;
use parking_lot::ReentrantMutex;

use crate::device::{
    DRAW_TECHNIQUE, DmabufImageAttributes, EFFECT_IMAGE_PARAM, ExtensionFn, GL_TEXTURE_2D,
    GraphicsDevice, ImageHandle, ImageTargetTexture2d, PlatformError, REQUIRED_BACKEND,
    ShaderEffect, TextureFilter, TextureFormat, TextureHandle, TextureUsage,
};
use crate::error::{DmabufSourceError, Result};

type EglInstance = egl::DynamicInstance<egl::EGL1_5>;

// EGL_EXT_image_dma_buf_import tokens.
const EGL_LINUX_DMA_BUF_EXT: egl::Enum = 0x3270;
const EGL_LINUX_DRM_FOURCC_EXT: egl::Attrib = 0x3271;
const EGL_DMA_BUF_PLANE0_FD_EXT: egl::Attrib = 0x3272;
const EGL_DMA_BUF_PLANE0_OFFSET_EXT: egl::Attrib = 0x3273;
const EGL_DMA_BUF_PLANE0_PITCH_EXT: egl::Attrib = 0x3274;

// Version lines are prepended per context; see `shader_header`.
const VERTEX_SHADER: &str = r#"
uniform vec2 u_size;
uniform vec2 u_viewport;
out vec2 v_uv;
void main() {
    vec2 corner = vec2(float(gl_VertexID & 1), float((gl_VertexID >> 1) & 1));
    v_uv = corner;
    vec2 ndc = (corner * u_size) / u_viewport * 2.0 - 1.0;
    gl_Position = vec4(ndc.x, -ndc.y, 0.0, 1.0);
}
"#;

const FRAGMENT_SHADER: &str = r#"
uniform sampler2D image;
in vec2 v_uv;
out vec4 color;
void main() {
    color = texture(image, v_uv);
}
"#;

/// Host EGL context captured from the calling thread.
pub struct EglDevice {
    egl: EglInstance,
    display: egl::Display,
    context: egl::Context,
    draw: Option<egl::Surface>,
    read: Option<egl::Surface>,
    extensions: Vec<String>,
    /// (nesting depth, whether the outermost enter made the context current)
    scope: ReentrantMutex<Cell<(usize, bool)>>,
    program: OnceLock<Option<PassThroughProgram>>,
}

// SAFETY: the EGL handles are plain identifiers; every GL/EGL call that uses
// them is serialized through `scope`, which is only released by the thread
// that acquired it.
unsafe impl Send for EglDevice {}
unsafe impl Sync for EglDevice {}

impl EglDevice {
    /// Capture the display, context and surfaces current on this thread.
    ///
    /// Call from the host's graphics thread while its context is current.
    pub fn from_current() -> Result<Self> {
        // SAFETY: loading libEGL runs its initializers; nothing else here
        // depends on symbols that could be missing.
        let egl = unsafe { EglInstance::load_required() }?;

        let display = egl
            .get_current_display()
            .ok_or(DmabufSourceError::NoCurrentContext("display"))?;
        let context = egl
            .get_current_context()
            .ok_or(DmabufSourceError::NoCurrentContext("context"))?;
        let draw = egl.get_current_surface(egl::DRAW);
        let read = egl.get_current_surface(egl::READ);

        let extensions = egl
            .query_string(Some(display), egl::EXTENSIONS)
            .map_err(|err| DmabufSourceError::Egl(format!("eglQueryString: {err}")))?;
        let extensions = parse_extensions(&extensions.to_string_lossy());
        tracing::debug!(count = extensions.len(), "EGL display extensions");

        gl::load_with(|name| {
            egl.get_proc_address(name)
                .map_or(ptr::null(), |f| f as *const c_void)
        });

        Ok(Self {
            egl,
            display,
            context,
            draw,
            read,
            extensions,
            scope: ReentrantMutex::new(Cell::new((0, false))),
            program: OnceLock::new(),
        })
    }

    fn program(&self) -> Option<&PassThroughProgram> {
        self.program
            .get_or_init(|| {
                // SAFETY: called from default_effect, inside the host's
                // render scope with the context current.
                unsafe { PassThroughProgram::compile() }
                    .inspect_err(|err| tracing::error!("Cannot build default effect: {}", err))
                    .ok()
            })
            .as_ref()
    }
}

impl GraphicsDevice for EglDevice {
    fn backend_name(&self) -> &str {
        REQUIRED_BACKEND
    }

    fn has_extension(&self, name: &str) -> bool {
        self.extensions.iter().any(|ext| ext == name)
    }

    fn get_proc_address(&self, name: &str) -> Option<ExtensionFn> {
        self.egl
            .get_proc_address(name)
            .and_then(|f| ExtensionFn::new(f as *const c_void))
    }

    fn enter_graphics(&self) -> std::result::Result<(), PlatformError> {
        let guard = self.scope.lock();
        let (depth, made_current) = guard.get();
        if depth == 0 {
            let already_current = self.egl.get_current_context() == Some(self.context);
            if !already_current {
                // The guard drops on this path, so a failed enter holds no lock.
                self.egl
                    .make_current(self.display, self.draw, self.read, Some(self.context))
                    .map_err(|err| {
                        tracing::error!("eglMakeCurrent failed: {}", err);
                        PlatformError(err.native())
                    })?;
            }
            guard.set((1, !already_current));
        } else {
            guard.set((depth + 1, made_current));
        }
        // Held until the matching leave_graphics.
        std::mem::forget(guard);
        Ok(())
    }

    fn leave_graphics(&self) {
        {
            let guard = self.scope.lock();
            let (depth, made_current) = guard.get();
            if depth == 0 {
                tracing::warn!("leave_graphics without matching enter_graphics");
                return;
            }
            if depth == 1 && made_current {
                if let Err(err) = self.egl.make_current(self.display, None, None, None) {
                    tracing::error!("eglMakeCurrent(release) failed: {}", err);
                }
            }
            let made_current = made_current && depth > 1;
            guard.set((depth - 1, made_current));
        }
        // SAFETY: balances the guard forgotten by enter_graphics on this thread.
        unsafe { self.scope.force_unlock() };
    }

    fn create_dmabuf_image(
        &self,
        attributes: &DmabufImageAttributes<'_>,
    ) -> std::result::Result<ImageHandle, PlatformError> {
        let attribs = dmabuf_image_attribs(attributes);
        // SAFETY: EGL_NO_CONTEXT and a NULL client buffer are exactly what
        // EGL_LINUX_DMA_BUF_EXT requires.
        let (no_context, no_buffer) = unsafe {
            (
                egl::Context::from_ptr(egl::NO_CONTEXT),
                egl::ClientBuffer::from_ptr(ptr::null_mut()),
            )
        };

        let image = self
            .egl
            .create_image(self.display, no_context, EGL_LINUX_DMA_BUF_EXT, no_buffer, &attribs)
            .map_err(|err| PlatformError(err.native()))?;
        Ok(ImageHandle::from_raw(image.as_ptr() as usize))
    }

    fn destroy_image(&self, image: ImageHandle) {
        // SAFETY: the handle came from create_dmabuf_image on this display.
        let image = unsafe { egl::Image::from_ptr(image.as_raw() as *mut c_void) };
        if let Err(err) = self.egl.destroy_image(self.display, image) {
            tracing::error!("eglDestroyImage failed: {}", err);
        }
    }

    fn create_texture(
        &self,
        width: u32,
        height: u32,
        format: TextureFormat,
        usage: TextureUsage,
    ) -> Option<TextureHandle> {
        let TextureFormat::Bgra8 = format;
        let TextureUsage::Dynamic = usage;

        let mut name: GLuint = 0;
        // SAFETY: inside the graphics scope; the pixel pointer is NULL so no
        // client memory is read.
        unsafe {
            gl::GenTextures(1, &mut name);
            if name == 0 {
                return None;
            }
            gl::BindTexture(gl::TEXTURE_2D, name);
            gl::TexImage2D(
                gl::TEXTURE_2D,
                0,
                gl::RGBA8 as GLint,
                width as GLsizei,
                height as GLsizei,
                0,
                gl::BGRA,
                gl::UNSIGNED_BYTE,
                ptr::null(),
            );
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAX_LEVEL, 0);
            gl::BindTexture(gl::TEXTURE_2D, 0);

            let error = gl::GetError();
            if error != gl::NO_ERROR {
                tracing::error!("glTexImage2D failed: {:#06x}", error);
                gl::DeleteTextures(1, &name);
                return None;
            }
        }
        Some(TextureHandle::from_raw(name))
    }

    fn bind_image_to_texture(
        &self,
        texture: TextureHandle,
        image: ImageHandle,
        entry: ImageTargetTexture2d,
    ) -> std::result::Result<(), PlatformError> {
        // SAFETY: inside the graphics scope; `entry` was resolved from this
        // EGL implementation and `image` is alive.
        let error = unsafe {
            gl::BindTexture(gl::TEXTURE_2D, texture.as_raw());
            entry.call(GL_TEXTURE_2D, image.as_raw() as *const c_void);
            let error = gl::GetError();
            gl::BindTexture(gl::TEXTURE_2D, 0);
            error
        };
        if error != gl::NO_ERROR {
            return Err(PlatformError(error as i32));
        }
        Ok(())
    }

    fn set_texture_filter(&self, texture: TextureHandle, min: TextureFilter, mag: TextureFilter) {
        // SAFETY: inside the graphics scope.
        unsafe {
            gl::BindTexture(gl::TEXTURE_2D, texture.as_raw());
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl_filter(min));
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, gl_filter(mag));
            gl::BindTexture(gl::TEXTURE_2D, 0);
        }
    }

    fn destroy_texture(&self, texture: TextureHandle) {
        let name = texture.as_raw();
        // SAFETY: inside the graphics scope.
        unsafe { gl::DeleteTextures(1, &name) };
    }

    fn default_effect(&self) -> Box<dyn ShaderEffect + '_> {
        Box::new(PassThroughEffect {
            program: self.program(),
            texture: None,
        })
    }
}

impl Drop for EglDevice {
    fn drop(&mut self) {
        let Some(Some(program)) = self.program.get() else {
            return;
        };
        if let Err(code) = self.enter_graphics() {
            tracing::error!(%code, "Cannot enter graphics, leaking default effect program");
            return;
        }
        // SAFETY: context is current for the duration of the scope.
        unsafe {
            gl::DeleteProgram(program.program);
            gl::DeleteVertexArrays(1, &program.vao);
        }
        self.leave_graphics();
    }
}

fn gl_filter(filter: TextureFilter) -> GLint {
    match filter {
        TextureFilter::Nearest => gl::NEAREST as GLint,
        TextureFilter::Linear => gl::LINEAR as GLint,
    }
}

/// `eglCreateImage` attribute list for a single-plane DMA-BUF.
fn dmabuf_image_attribs(attributes: &DmabufImageAttributes<'_>) -> [egl::Attrib; 13] {
    [
        egl::WIDTH as egl::Attrib,
        attributes.width as egl::Attrib,
        egl::HEIGHT as egl::Attrib,
        attributes.height as egl::Attrib,
        EGL_LINUX_DRM_FOURCC_EXT,
        attributes.fourcc.0 as egl::Attrib,
        EGL_DMA_BUF_PLANE0_FD_EXT,
        attributes.fd.as_raw_fd() as egl::Attrib,
        EGL_DMA_BUF_PLANE0_OFFSET_EXT,
        attributes.offset as egl::Attrib,
        EGL_DMA_BUF_PLANE0_PITCH_EXT,
        attributes.pitch as egl::Attrib,
        egl::NONE as egl::Attrib,
    ]
}

fn parse_extensions(extensions: &str) -> Vec<String> {
    extensions.split_whitespace().map(str::to_owned).collect()
}

/// `#version` preamble matching the context's `GL_SHADING_LANGUAGE_VERSION`.
fn shader_header(language_version: &str) -> &'static str {
    if language_version.contains("OpenGL ES") {
        "#version 300 es\nprecision mediump float;\n"
    } else {
        "#version 330 core\n"
    }
}

/// # Safety
/// A GL context must be current.
unsafe fn shading_language_version() -> String {
    // SAFETY: glGetString returns NULL or a static NUL-terminated string.
    let version = unsafe { gl::GetString(gl::SHADING_LANGUAGE_VERSION) };
    if version.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(version.cast()) }
        .to_string_lossy()
        .into_owned()
}

struct PassThroughProgram {
    program: GLuint,
    vao: GLuint,
    image_location: GLint,
    size_location: GLint,
    viewport_location: GLint,
}

impl PassThroughProgram {
    /// # Safety
    /// A GL context must be current.
    unsafe fn compile() -> std::result::Result<Self, String> {
        unsafe {
            let language_version = shading_language_version();
            let header = shader_header(&language_version);
            tracing::debug!(%language_version, "compiling default effect");

            let vertex = compile_shader(gl::VERTEX_SHADER, &format!("{header}{VERTEX_SHADER}"))?;
            let fragment = match compile_shader(
                gl::FRAGMENT_SHADER,
                &format!("{header}{FRAGMENT_SHADER}"),
            ) {
                Ok(shader) => shader,
                Err(err) => {
                    gl::DeleteShader(vertex);
                    return Err(err);
                }
            };

            let program = gl::CreateProgram();
            gl::AttachShader(program, vertex);
            gl::AttachShader(program, fragment);
            gl::LinkProgram(program);
            gl::DeleteShader(vertex);
            gl::DeleteShader(fragment);

            let mut status: GLint = 0;
            gl::GetProgramiv(program, gl::LINK_STATUS, &mut status);
            if status == 0 {
                let log = info_log(program, gl::GetProgramiv, gl::GetProgramInfoLog);
                gl::DeleteProgram(program);
                return Err(format!("link failed: {log}"));
            }

            let mut vao: GLuint = 0;
            gl::GenVertexArrays(1, &mut vao);

            let location = |name: &CStr| gl::GetUniformLocation(program, name.as_ptr());
            Ok(Self {
                program,
                vao,
                image_location: location(c"image"),
                size_location: location(c"u_size"),
                viewport_location: location(c"u_viewport"),
            })
        }
    }
}

unsafe fn compile_shader(kind: GLenum, source: &str) -> std::result::Result<GLuint, String> {
    let source = CString::new(source).map_err(|err| err.to_string())?;
    unsafe {
        let shader = gl::CreateShader(kind);
        gl::ShaderSource(shader, 1, &source.as_ptr(), ptr::null());
        gl::CompileShader(shader);

        let mut status: GLint = 0;
        gl::GetShaderiv(shader, gl::COMPILE_STATUS, &mut status);
        if status == 0 {
            let log = info_log(shader, gl::GetShaderiv, gl::GetShaderInfoLog);
            gl::DeleteShader(shader);
            return Err(format!("shader compile failed: {log}"));
        }
        Ok(shader)
    }
}

unsafe fn info_log(
    object: GLuint,
    get_iv: unsafe fn(GLuint, GLenum, *mut GLint),
    get_log: unsafe fn(GLuint, GLsizei, *mut GLsizei, *mut GLchar),
) -> String {
    unsafe {
        let mut len: GLint = 0;
        get_iv(object, gl::INFO_LOG_LENGTH, &mut len);
        let mut buf = vec![0u8; len.max(1) as usize];
        let mut written: GLsizei = 0;
        get_log(object, buf.len() as GLsizei, &mut written, buf.as_mut_ptr().cast());
        buf.truncate(written.max(0) as usize);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

struct PassThroughEffect<'a> {
    program: Option<&'a PassThroughProgram>,
    texture: Option<TextureHandle>,
}

impl ShaderEffect for PassThroughEffect<'_> {
    fn set_texture(&mut self, param: &str, texture: TextureHandle) -> bool {
        if self.program.is_none() || param != EFFECT_IMAGE_PARAM {
            return false;
        }
        self.texture = Some(texture);
        true
    }

    fn begin_pass(&mut self, technique: &str, pass: usize) -> bool {
        let Some(program) = self.program else {
            return false;
        };
        if technique != DRAW_TECHNIQUE || pass > 0 {
            return false;
        }
        // SAFETY: the host calls render inside its graphics scope.
        unsafe {
            gl::UseProgram(program.program);
            gl::BindVertexArray(program.vao);
            gl::ActiveTexture(gl::TEXTURE0);
            gl::Uniform1i(program.image_location, 0);
        }
        true
    }

    fn draw_sprite(&mut self, texture: TextureHandle, width: u32, height: u32) {
        let Some(program) = self.program else {
            return;
        };
        let texture = self.texture.unwrap_or(texture);
        // SAFETY: between begin_pass and end_pass, context current.
        unsafe {
            let mut viewport = [0 as GLint; 4];
            gl::GetIntegerv(gl::VIEWPORT, viewport.as_mut_ptr());
            gl::Uniform2f(
                program.viewport_location,
                viewport[2].max(1) as f32,
                viewport[3].max(1) as f32,
            );
            gl::Uniform2f(program.size_location, width as f32, height as f32);
            gl::BindTexture(gl::TEXTURE_2D, texture.as_raw());
            gl::DrawArrays(gl::TRIANGLE_STRIP, 0, 4);
        }
    }

    fn end_pass(&mut self) {
        // SAFETY: between begin_pass and end_pass, context current.
        unsafe {
            gl::BindTexture(gl::TEXTURE_2D, 0);
            gl::BindVertexArray(0);
            gl::UseProgram(0);
        }
    }
}
