use std::collections::{BTreeMap, HashSet};

use anyhow::Result;

use crate::compile::{compile_glsl, ValidatedShader};
use crate::driver::GraphicsBackend;
use crate::texture::DecodedImage;
use crate::types::{OutputSize, SamplerMode, ShaderStage};

#[derive(Debug)]
pub struct HeadlessProgram {
    id: u64,
}

#[derive(Debug)]
pub struct HeadlessTexture {
    id: u64,
    pub width: u32,
    pub height: u32,
    pub sampler: SamplerMode,
}

/// Everything a single draw call saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    pub program: u64,
    pub output: OutputSize,
    /// `(name, unit)` pairs in the order the uniforms were set.
    pub samplers: Vec<(String, u32)>,
    /// Unit to texture id, as bound when the draw was issued.
    pub bound_units: BTreeMap<u32, u64>,
    pub resolution: Option<OutputSize>,
}

/// Backend without a GPU: shaders go through naga validation, textures are
/// tracked by id and each draw is recorded as a [`FrameRecord`].
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_id: u64,
    live_programs: HashSet<u64>,
    live_textures: HashSet<u64>,
    bound: BTreeMap<u32, u64>,
    current: Option<FrameRecord>,
    frames: Vec<FrameRecord>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> &[FrameRecord] {
        &self.frames
    }

    pub fn last_frame(&self) -> Option<&FrameRecord> {
        self.frames.last()
    }

    pub fn live_textures(&self) -> usize {
        self.live_textures.len()
    }

    pub fn live_programs(&self) -> usize {
        self.live_programs.len()
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl GraphicsBackend for HeadlessBackend {
    type Shader = ValidatedShader;
    type Program = HeadlessProgram;
    type Texture = HeadlessTexture;

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ValidatedShader, String> {
        compile_glsl(stage, source).map_err(|err| err.diagnostic)
    }

    fn link_program(
        &mut self,
        vertex: ValidatedShader,
        fragment: ValidatedShader,
    ) -> Result<HeadlessProgram, String> {
        if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
            return Err(format!(
                "expected vertex + fragment stages, got {} + {}",
                vertex.stage, fragment.stage
            ));
        }
        if fragment.module.entry_points.is_empty() {
            return Err("fragment shader has no entry point".to_string());
        }
        let id = self.allocate_id();
        self.live_programs.insert(id);
        Ok(HeadlessProgram { id })
    }

    fn delete_program(&mut self, program: HeadlessProgram) {
        self.live_programs.remove(&program.id);
    }

    fn upload_texture(&mut self, image: &DecodedImage) -> Result<HeadlessTexture> {
        let expected = (image.width as usize) * (image.height as usize) * 4;
        if image.width == 0 || image.height == 0 || image.rgba.len() != expected {
            anyhow::bail!(
                "texture data does not match {}x{} RGBA ({} bytes)",
                image.width,
                image.height,
                image.rgba.len()
            );
        }
        let id = self.allocate_id();
        self.live_textures.insert(id);
        Ok(HeadlessTexture {
            id,
            width: image.width,
            height: image.height,
            sampler: image.sampler_mode(),
        })
    }

    fn delete_texture(&mut self, texture: HeadlessTexture) {
        self.live_textures.remove(&texture.id);
        self.bound.retain(|_, id| *id != texture.id);
    }

    fn begin_frame(&mut self, program: &HeadlessProgram, output: OutputSize) {
        self.current = Some(FrameRecord {
            program: program.id,
            output,
            samplers: Vec::new(),
            bound_units: BTreeMap::new(),
            resolution: None,
        });
    }

    fn unbind_unit(&mut self, unit: u32) {
        self.bound.remove(&unit);
    }

    fn bind_unit(&mut self, unit: u32, texture: &HeadlessTexture) {
        self.bound.insert(unit, texture.id);
    }

    fn set_sampler_uniform(&mut self, _program: &HeadlessProgram, name: &str, unit: u32) {
        if let Some(frame) = self.current.as_mut() {
            frame.samplers.push((name.to_string(), unit));
        }
    }

    fn set_resolution_uniform(&mut self, _program: &HeadlessProgram, _name: &str, output: OutputSize) {
        if let Some(frame) = self.current.as_mut() {
            frame.resolution = Some(output);
        }
    }

    fn draw_fullscreen(&mut self) {
        let Some(mut frame) = self.current.take() else {
            tracing::warn!("draw issued outside of a frame");
            return;
        };
        frame.bound_units = self.bound.clone();
        self.frames.push(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{DEFAULT_FRAGMENT_GLSL, VERTEX_SHADER_GLSL};

    #[test]
    fn links_validated_stages() {
        let mut backend = HeadlessBackend::new();
        let vertex = backend
            .compile_shader(ShaderStage::Vertex, VERTEX_SHADER_GLSL)
            .unwrap();
        let fragment = backend
            .compile_shader(ShaderStage::Fragment, DEFAULT_FRAGMENT_GLSL)
            .unwrap();
        let program = backend.link_program(vertex, fragment).unwrap();
        assert_eq!(backend.live_programs(), 1);
        backend.delete_program(program);
        assert_eq!(backend.live_programs(), 0);
    }

    #[test]
    fn rejects_swapped_stages() {
        let mut backend = HeadlessBackend::new();
        let vertex = backend
            .compile_shader(ShaderStage::Vertex, VERTEX_SHADER_GLSL)
            .unwrap();
        let other_vertex = backend
            .compile_shader(ShaderStage::Vertex, VERTEX_SHADER_GLSL)
            .unwrap();
        assert!(backend.link_program(vertex, other_vertex).is_err());
    }

    #[test]
    fn rejects_mismatched_pixel_data() {
        let mut backend = HeadlessBackend::new();
        let bogus = DecodedImage {
            width: 2,
            height: 2,
            rgba: vec![0; 3],
        };
        assert!(backend.upload_texture(&bogus).is_err());
        assert_eq!(backend.live_textures(), 0);
    }
}
