//! Render driver for the fragbox shader sandbox.
//!
//! The crate draws one full-surface quad per frame with the user's fragment
//! shader and the session's textures bound to sampler uniforms by name:
//!
//! ```text
//!   session::Session
//!          │ SamplerBinding[] + OutputSize
//!          ▼
//!   RenderDriver::render ──▶ GraphicsBackend (unbind previous, bind 0..k, draw)
//!          ▲
//!          └── RenderDriver::reload_fragment ──▶ compile + link, keep last good
//! ```
//!
//! The graphics API itself stays behind [`GraphicsBackend`]. The crate ships
//! [`HeadlessBackend`], which validates GLSL through naga and records every
//! draw, for the CLI and for tests.

mod compile;
mod driver;
mod headless;
mod texture;
mod types;

pub use compile::{compile_glsl, ValidatedShader, DEFAULT_FRAGMENT_GLSL, VERTEX_SHADER_GLSL};
pub use driver::{CompiledProgram, GraphicsBackend, RenderDriver};
pub use headless::{FrameRecord, HeadlessBackend, HeadlessProgram, HeadlessTexture};
pub use texture::{decode_image, DecodeError, DecodedImage, PLACEHOLDER_PIXEL};
pub use types::{
    CompileError, CompileStage, FrameSummary, OutputSize, ReleaseTexture, SamplerBinding,
    SamplerMode, ShaderStage, TextureHandle, RESOLUTION_UNIFORM,
};
