//! Binds the current texture set to sampler uniforms and issues one draw per
//! frame. The driver sits between the session controller and whatever
//! graphics API implements [`GraphicsBackend`]:
//!
//! - it owns every backend texture and hands out [`TextureHandle`]s, so the
//!   registry only ever holds references good for binding;
//! - it keeps the last program that compiled and linked, so a broken edit never
//!   blanks the preview;
//! - it remembers how many units the previous frame bound and clears them all
//!   before binding the next set, so a deleted or renamed texture cannot leak a
//!   stale binding into later frames.
use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::compile::VERTEX_SHADER_GLSL;
use crate::texture::{DecodedImage, PLACEHOLDER_PIXEL};
use crate::types::{
    CompileError, CompileStage, FrameSummary, OutputSize, ReleaseTexture, SamplerBinding,
    ShaderStage, TextureHandle, RESOLUTION_UNIFORM,
};

/// The graphics API seam. Implementations wrap a real context (WebGL, wgpu,
/// GL) or, like [`HeadlessBackend`](crate::HeadlessBackend), just validate and
/// record.
pub trait GraphicsBackend {
    type Shader;
    type Program;
    type Texture;

    fn compile_shader(&mut self, stage: ShaderStage, source: &str)
        -> Result<Self::Shader, String>;

    fn link_program(
        &mut self,
        vertex: Self::Shader,
        fragment: Self::Shader,
    ) -> Result<Self::Program, String>;

    fn delete_program(&mut self, program: Self::Program);

    fn upload_texture(&mut self, image: &DecodedImage) -> Result<Self::Texture>;

    fn delete_texture(&mut self, texture: Self::Texture);

    fn begin_frame(&mut self, program: &Self::Program, output: OutputSize);

    fn unbind_unit(&mut self, unit: u32);

    fn bind_unit(&mut self, unit: u32, texture: &Self::Texture);

    fn set_sampler_uniform(&mut self, program: &Self::Program, name: &str, unit: u32);

    fn set_resolution_uniform(&mut self, program: &Self::Program, name: &str, output: OutputSize);

    fn draw_fullscreen(&mut self);
}

/// A linked program that has not been installed yet.
pub struct CompiledProgram<B: GraphicsBackend> {
    program: B::Program,
}

impl<B: GraphicsBackend> CompiledProgram<B> {
    pub fn program(&self) -> &B::Program {
        &self.program
    }
}

pub struct RenderDriver<B: GraphicsBackend> {
    backend: B,
    vertex_source: String,
    program: Option<B::Program>,
    textures: HashMap<TextureHandle, B::Texture>,
    next_handle: u64,
    placeholder: Option<B::Texture>,
    placeholder_pixel: [u8; 4],
    bound_units: u32,
}

impl<B: GraphicsBackend> RenderDriver<B> {
    pub fn new(backend: B) -> Self {
        Self::with_vertex_source(backend, VERTEX_SHADER_GLSL)
    }

    pub fn with_vertex_source(backend: B, vertex_source: impl Into<String>) -> Self {
        Self {
            backend,
            vertex_source: vertex_source.into(),
            program: None,
            textures: HashMap::new(),
            next_handle: 0,
            placeholder: None,
            placeholder_pixel: PLACEHOLDER_PIXEL,
            bound_units: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn has_program(&self) -> bool {
        self.program.is_some()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Colour pending textures sample as. Takes effect on the next render.
    pub fn set_placeholder_color(&mut self, pixel: [u8; 4]) {
        if pixel == self.placeholder_pixel {
            return;
        }
        self.placeholder_pixel = pixel;
        if let Some(texture) = self.placeholder.take() {
            self.backend.delete_texture(texture);
        }
    }

    /// Compiles and links both stages without touching the active program.
    pub fn compile(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<CompiledProgram<B>, CompileError> {
        let vertex = self
            .backend
            .compile_shader(ShaderStage::Vertex, vertex_source)
            .map_err(|diagnostic| CompileError::new(ShaderStage::Vertex, diagnostic))?;
        let fragment = self
            .backend
            .compile_shader(ShaderStage::Fragment, fragment_source)
            .map_err(|diagnostic| CompileError::new(ShaderStage::Fragment, diagnostic))?;
        let program = self
            .backend
            .link_program(vertex, fragment)
            .map_err(|diagnostic| CompileError::new(CompileStage::Link, diagnostic))?;
        Ok(CompiledProgram { program })
    }

    /// Makes `program` the one used by subsequent renders.
    pub fn install(&mut self, program: CompiledProgram<B>) {
        if let Some(previous) = self.program.replace(program.program) {
            self.backend.delete_program(previous);
        }
    }

    /// Compiles `fragment_source` against the configured vertex shader and
    /// installs it. On failure the previous program stays active.
    pub fn reload_fragment(&mut self, fragment_source: &str) -> Result<(), CompileError> {
        let vertex_source = self.vertex_source.clone();
        match self.compile(&vertex_source, fragment_source) {
            Ok(program) => {
                self.install(program);
                debug!("installed new shader program");
                Ok(())
            }
            Err(err) => {
                warn!(
                    stage = %err.stage,
                    kept_previous = self.program.is_some(),
                    "shader compile failed"
                );
                Err(err)
            }
        }
    }

    pub fn upload(&mut self, image: &DecodedImage) -> Result<TextureHandle> {
        let texture = self
            .backend
            .upload_texture(image)
            .with_context(|| format!("uploading {}x{} texture", image.width, image.height))?;
        let handle = TextureHandle(self.next_handle);
        self.next_handle += 1;
        self.textures.insert(handle, texture);
        Ok(handle)
    }

    /// Draws one frame with the active program.
    ///
    /// Returns `None` when no program has compiled yet.
    pub fn render(
        &mut self,
        bindings: &[SamplerBinding],
        output: OutputSize,
    ) -> Option<FrameSummary> {
        let Some(program) = self.program.as_ref() else {
            debug!("render skipped; no shader program installed");
            return None;
        };

        if self.placeholder.is_none() && bindings.iter().any(|b| b.texture.is_none()) {
            let image = DecodedImage::solid(1, 1, self.placeholder_pixel);
            match self.backend.upload_texture(&image) {
                Ok(texture) => self.placeholder = Some(texture),
                Err(error) => warn!(error = %error, "failed to create placeholder texture"),
            }
        }

        self.backend.begin_frame(program, output);
        for unit in 0..self.bound_units {
            self.backend.unbind_unit(unit);
        }

        let mut units = Vec::with_capacity(bindings.len());
        let mut placeholders = 0;
        for (index, binding) in bindings.iter().enumerate() {
            let unit = index as u32;
            let texture = match binding.texture {
                Some(handle) => {
                    let texture = self.textures.get(&handle);
                    if texture.is_none() {
                        warn!(
                            sampler = %binding.name,
                            handle = handle.raw(),
                            "binding references a released texture"
                        );
                    }
                    texture
                }
                None => {
                    placeholders += 1;
                    self.placeholder.as_ref()
                }
            };
            if let Some(texture) = texture {
                self.backend.bind_unit(unit, texture);
            }
            self.backend
                .set_sampler_uniform(program, &binding.name, unit);
            units.push((unit, binding.name.clone()));
        }
        self.bound_units = bindings.len() as u32;

        self.backend
            .set_resolution_uniform(program, RESOLUTION_UNIFORM, output);
        self.backend.draw_fullscreen();

        Some(FrameSummary {
            units,
            output,
            placeholders,
        })
    }
}

impl<B: GraphicsBackend> ReleaseTexture for RenderDriver<B> {
    fn release(&mut self, handle: TextureHandle) {
        match self.textures.remove(&handle) {
            Some(texture) => self.backend.delete_texture(texture),
            None => debug!(handle = handle.raw(), "texture already released"),
        }
    }
}

impl<B: GraphicsBackend> Drop for RenderDriver<B> {
    fn drop(&mut self) {
        for (_, texture) in self.textures.drain() {
            self.backend.delete_texture(texture);
        }
        if let Some(texture) = self.placeholder.take() {
            self.backend.delete_texture(texture);
        }
        if let Some(program) = self.program.take() {
            self.backend.delete_program(program);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::DEFAULT_FRAGMENT_GLSL;
    use crate::HeadlessBackend;

    fn driver() -> RenderDriver<HeadlessBackend> {
        let mut driver = RenderDriver::new(HeadlessBackend::new());
        driver
            .reload_fragment(DEFAULT_FRAGMENT_GLSL)
            .expect("default shader compiles");
        driver
    }

    #[test]
    fn binds_each_sampler_to_its_own_unit() {
        let mut driver = driver();
        let a = driver.upload(&DecodedImage::solid(2, 2, [1; 4])).unwrap();
        let b = driver.upload(&DecodedImage::solid(2, 2, [2; 4])).unwrap();
        let summary = driver
            .render(
                &[SamplerBinding::ready("cat", a), SamplerBinding::ready("dog", b)],
                OutputSize::new(64, 32),
            )
            .expect("frame drawn");
        assert_eq!(
            summary.units,
            vec![(0, "cat".to_string()), (1, "dog".to_string())]
        );

        let frame = driver.backend().last_frame().unwrap();
        assert_eq!(frame.samplers, vec![("cat".into(), 0), ("dog".into(), 1)]);
        assert_eq!(frame.bound_units.len(), 2);
        assert_eq!(frame.resolution, Some(OutputSize::new(64, 32)));
    }

    #[test]
    fn shrinking_the_set_leaves_no_stale_units() {
        let mut driver = driver();
        let handles: Vec<_> = (0..3)
            .map(|_| driver.upload(&DecodedImage::solid(1, 1, [0; 4])).unwrap())
            .collect();
        let three: Vec<_> = handles
            .iter()
            .enumerate()
            .map(|(i, h)| SamplerBinding::ready(format!("t{i}"), *h))
            .collect();
        driver.render(&three, OutputSize::new(8, 8)).unwrap();
        driver.release(handles[2]);
        driver.render(&three[..2], OutputSize::new(8, 8)).unwrap();

        let frame = driver.backend().last_frame().unwrap();
        assert_eq!(frame.bound_units.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(frame.samplers.len(), 2);
    }

    #[test]
    fn pending_textures_bind_the_placeholder() {
        let mut driver = driver();
        let summary = driver
            .render(&[SamplerBinding::pending("tex0")], OutputSize::new(4, 4))
            .unwrap();
        assert_eq!(summary.placeholders, 1);
        assert_eq!(driver.backend().last_frame().unwrap().bound_units.len(), 1);
        // the placeholder is not a registry texture
        assert_eq!(driver.live_textures(), 0);
    }

    #[test]
    fn placeholder_colour_change_recreates_texture() {
        let mut driver = driver();
        let pending = [SamplerBinding::pending("tex0")];
        driver.render(&pending, OutputSize::new(4, 4)).unwrap();
        assert_eq!(driver.backend().live_textures(), 1);

        driver.set_placeholder_color([255, 0, 0, 255]);
        assert_eq!(driver.backend().live_textures(), 0);
        driver.render(&pending, OutputSize::new(4, 4)).unwrap();
        assert_eq!(driver.backend().live_textures(), 1);
    }

    #[test]
    fn failed_compile_keeps_previous_program() {
        let mut driver = driver();
        let err = driver
            .reload_fragment("#version 450\nvoid main() { nope(); }\n")
            .unwrap_err();
        assert_eq!(err.stage, CompileStage::Fragment);
        assert!(driver.has_program());
        assert!(driver.render(&[], OutputSize::new(1, 1)).is_some());
    }

    #[test]
    fn render_without_program_is_skipped() {
        let mut driver = RenderDriver::new(HeadlessBackend::new());
        assert!(driver.render(&[], OutputSize::new(1, 1)).is_none());
        assert!(driver.backend().frames().is_empty());
    }

    #[test]
    fn release_is_idempotent() {
        let mut driver = driver();
        let handle = driver.upload(&DecodedImage::placeholder()).unwrap();
        driver.release(handle);
        driver.release(handle);
        assert_eq!(driver.live_textures(), 0);
        assert_eq!(driver.backend().live_textures(), 0);
    }
}
