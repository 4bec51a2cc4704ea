use std::fmt;

use thiserror::Error;

/// Uniform carrying the output surface size, set on every frame.
pub const RESOLUTION_UNIFORM: &str = "u_resolution";

/// Stage handed to the backend compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Step of program construction that produced a [`CompileError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompileStage {
    Vertex,
    Fragment,
    Link,
}

impl From<ShaderStage> for CompileStage {
    fn from(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => CompileStage::Vertex,
            ShaderStage::Fragment => CompileStage::Fragment,
        }
    }
}

impl fmt::Display for CompileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileStage::Vertex => f.write_str("vertex"),
            CompileStage::Fragment => f.write_str("fragment"),
            CompileStage::Link => f.write_str("link"),
        }
    }
}

/// Compiler or linker failure, carrying the raw diagnostic text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{stage} shader failed to compile: {diagnostic}")]
pub struct CompileError {
    pub stage: CompileStage,
    pub diagnostic: String,
}

impl CompileError {
    pub fn new(stage: impl Into<CompileStage>, diagnostic: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            diagnostic: diagnostic.into(),
        }
    }
}

/// Size of the surface a frame is drawn onto, in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputSize {
    pub width: u32,
    pub height: u32,
}

impl OutputSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn as_f32(&self) -> [f32; 2] {
        [self.width as f32, self.height as f32]
    }
}

impl fmt::Display for OutputSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Opaque reference to a texture owned by the [`RenderDriver`](crate::RenderDriver).
///
/// Handles are never reused within a driver, so a handle held past
/// [`ReleaseTexture::release`] simply stops resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub(crate) u64);

impl TextureHandle {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Anything that owns GPU textures and can give them back.
pub trait ReleaseTexture {
    fn release(&mut self, handle: TextureHandle);
}

/// One sampler uniform to bind for a frame.
///
/// `texture: None` binds the placeholder texture, used while an image is still
/// decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerBinding {
    pub name: String,
    pub texture: Option<TextureHandle>,
}

impl SamplerBinding {
    pub fn ready(name: impl Into<String>, texture: TextureHandle) -> Self {
        Self {
            name: name.into(),
            texture: Some(texture),
        }
    }

    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            texture: None,
        }
    }
}

/// What a single `render` call bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSummary {
    /// `(unit, sampler name)` in binding order; units are `0..len`.
    pub units: Vec<(u32, String)>,
    pub output: OutputSize,
    pub placeholders: usize,
}

/// Sampling behaviour chosen per texture.
///
/// Power-of-two images get mipmaps; anything else is clamped to edge with
/// nearest filtering, which is what WebGL1 requires for NPOT textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerMode {
    Mipmapped,
    ClampNearest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_mentions_stage() {
        let err = CompileError::new(ShaderStage::Fragment, "unknown identifier 'foo'");
        assert_eq!(err.stage, CompileStage::Fragment);
        assert_eq!(
            err.to_string(),
            "fragment shader failed to compile: unknown identifier 'foo'"
        );
    }

    #[test]
    fn output_size_displays_as_dimensions() {
        assert_eq!(OutputSize::new(640, 480).to_string(), "640x480");
        assert_eq!(OutputSize::new(3, 2).as_f32(), [3.0, 2.0]);
    }
}
