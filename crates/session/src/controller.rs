//! The session: one shader project being edited.
//!
//! `Session` owns the registry, the render driver, the shader text and the
//! project dimensions. Slow work (decoding images, reading and writing
//! archives) runs on the [`Executor`]; results come back as completions that
//! are applied on the owning thread in [`Session::pump`]. Every completion
//! re-checks that what it targets still exists before touching state.
//!
//! Loading replays the archive's textures into a cleared registry and holds
//! the archive's shader back until every texture that is going to decode has
//! done so, so the first compile after a load sees the final set of samplers.
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use projectpack::{
    source_label_from_path, ArchiveError, ImportedProject, Project, ProjectDimensions,
};
use renderer::{
    decode_image, CompileError, DecodeError, DecodedImage, FrameSummary, GraphicsBackend,
    OutputSize, ReleaseTexture, RenderDriver, DEFAULT_FRAGMENT_GLSL,
};
use sandboxconfig::SandboxSettings;
use thiserror::Error;
use tracing::{debug, info};

use crate::executor::Executor;
use crate::registry::{RegistryError, Resolution, TextureId, TextureRegistry, TextureStatus};
use crate::status::{StatusChannel, StatusMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Editing,
    Saving,
    Loading,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveTarget {
    /// Keep the archive for [`Session::take_saved_archive`].
    Memory,
    File(PathBuf),
}

/// How the most recent save or load ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a project is still loading")]
    Loading,

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("{what} size {width}x{height} must be positive")]
    InvalidSize {
        what: &'static str,
        width: u32,
        height: u32,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

enum SavedArchive {
    Memory(Vec<u8>),
    File { path: PathBuf, size: usize },
}

enum Completion {
    Decoded {
        id: TextureId,
        result: Result<DecodedImage, DecodeError>,
    },
    Imported {
        generation: u64,
        result: Result<ImportedProject, ArchiveError>,
    },
    Saved {
        result: Result<SavedArchive>,
    },
}

/// Textures of the load in progress that have not settled yet, and the shader
/// waiting for them.
struct LoadBarrier {
    pending: HashSet<TextureId>,
    shader: Option<String>,
}

pub struct Session<B: GraphicsBackend> {
    registry: TextureRegistry,
    driver: RenderDriver<B>,
    shader_source: String,
    last_compile_error: Option<CompileError>,
    dimensions: ProjectDimensions,
    phase: Phase,
    status: StatusChannel,
    executor: Executor,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
    in_flight: usize,
    load_generation: u64,
    barrier: Option<LoadBarrier>,
    saved_archive: Option<Vec<u8>>,
    last_save: Option<Outcome>,
    last_load: Option<Outcome>,
    last_frame: Option<FrameSummary>,
}

impl<B: GraphicsBackend> Session<B> {
    /// A session showing the default shader with no textures.
    pub fn new(backend: B, executor: Executor) -> Self {
        Self::assemble(
            RenderDriver::new(backend),
            DEFAULT_FRAGMENT_GLSL.to_string(),
            ProjectDimensions::default(),
            executor,
        )
    }

    /// Builds a session from settings, reading any configured shader files.
    pub fn from_settings(backend: B, settings: &SandboxSettings, executor: Executor) -> Result<Self> {
        let mut driver = match &settings.vertex_shader {
            Some(path) => {
                let source = fs::read_to_string(path)
                    .with_context(|| format!("reading vertex shader {}", path.display()))?;
                RenderDriver::with_vertex_source(backend, source)
            }
            None => RenderDriver::new(backend),
        };
        driver.set_placeholder_color(settings.placeholder_color);

        let fragment = match &settings.fragment_shader {
            Some(path) => fs::read_to_string(path)
                .with_context(|| format!("reading fragment shader {}", path.display()))?,
            None => DEFAULT_FRAGMENT_GLSL.to_string(),
        };
        let dimensions = ProjectDimensions::new(settings.output.as_tuple(), settings.view.as_tuple());
        Ok(Self::assemble(driver, fragment, dimensions, executor))
    }

    fn assemble(
        driver: RenderDriver<B>,
        shader_source: String,
        dimensions: ProjectDimensions,
        executor: Executor,
    ) -> Self {
        let (completion_tx, completion_rx) = unbounded();
        let mut session = Self {
            registry: TextureRegistry::new(),
            driver,
            shader_source,
            last_compile_error: None,
            dimensions,
            phase: Phase::Idle,
            status: StatusChannel::new(),
            executor,
            completion_tx,
            completion_rx,
            in_flight: 0,
            load_generation: 0,
            barrier: None,
            saved_archive: None,
            last_save: None,
            last_load: None,
            last_frame: None,
        };
        let _ = session.compile_current();
        session
    }

    pub fn registry(&self) -> &TextureRegistry {
        &self.registry
    }

    pub fn driver(&self) -> &RenderDriver<B> {
        &self.driver
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn shader_source(&self) -> &str {
        &self.shader_source
    }

    pub fn dimensions(&self) -> ProjectDimensions {
        self.dimensions
    }

    pub fn output_size(&self) -> OutputSize {
        OutputSize::new(self.dimensions.output_width, self.dimensions.output_height)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn last_compile_error(&self) -> Option<&CompileError> {
        self.last_compile_error.as_ref()
    }

    /// `None` until a save finishes, and again while one is running.
    pub fn last_save(&self) -> Option<&Outcome> {
        self.last_save.as_ref()
    }

    /// `None` until a load settles or fails, and again while one is running.
    pub fn last_load(&self) -> Option<&Outcome> {
        self.last_load.as_ref()
    }

    pub fn last_frame(&self) -> Option<&FrameSummary> {
        self.last_frame.as_ref()
    }

    pub fn status_feed(&self) -> Receiver<StatusMessage> {
        self.status.feed()
    }

    /// Whether any background work has not been applied yet.
    pub fn is_busy(&self) -> bool {
        self.in_flight > 0
    }

    /// The archive produced by the last [`SaveTarget::Memory`] save.
    pub fn take_saved_archive(&mut self) -> Option<Vec<u8>> {
        self.saved_archive.take()
    }

    /// The current project as it would be saved.
    pub fn project(&self) -> Project {
        Project {
            shader_source: self.shader_source.clone(),
            dimensions: self.dimensions,
            textures: self.registry.snapshot().texture_bindings(),
        }
    }

    fn ensure_editable(&self) -> Result<(), SessionError> {
        if self.phase == Phase::Loading {
            self.status
                .warning("A project is loading; edits are disabled until it finishes");
            return Err(SessionError::Loading);
        }
        Ok(())
    }

    fn touch(&mut self) {
        if self.phase == Phase::Idle {
            self.phase = Phase::Editing;
        }
    }

    /// Adds an image under `name` (or a generated name) and starts decoding
    /// it. The texture renders as the placeholder until the decode lands.
    pub fn add_texture(
        &mut self,
        name: Option<&str>,
        source_label: &str,
        bytes: Vec<u8>,
    ) -> Result<TextureId, SessionError> {
        self.ensure_editable()?;
        let bytes: Arc<[u8]> = bytes.into();
        let id = match self.registry.add(name, source_label, bytes.clone()) {
            Ok(id) => id,
            Err(err) => {
                self.status.warning(format!("Texture not added: {err}"));
                return Err(err.into());
            }
        };
        self.spawn_decode(id, bytes);
        self.touch();
        if let Some(entry) = self.registry.get(id) {
            self.status.info(format!(
                "Added texture '{}' from {}",
                entry.name(),
                source_label
            ));
        }
        self.render();
        Ok(id)
    }

    pub fn add_texture_file(
        &mut self,
        name: Option<&str>,
        path: &Path,
    ) -> Result<TextureId, SessionError> {
        self.ensure_editable()?;
        let bytes = fs::read(path).map_err(|source| {
            self.status
                .warning(format!("Could not read {}: {source}", path.display()));
            SessionError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let label = source_label_from_path(&path.to_string_lossy());
        self.add_texture(name, &label, bytes)
    }

    pub fn rename_texture(&mut self, id: TextureId, proposed: &str) -> Result<(), SessionError> {
        self.ensure_editable()?;
        let old = self
            .registry
            .get(id)
            .map(|entry| entry.name().to_string())
            .unwrap_or_default();
        if let Err(err) = self.registry.rename(id, proposed) {
            self.status.warning(format!("Rename rejected: {err}"));
            return Err(err.into());
        }
        self.touch();
        if old != proposed {
            self.status
                .info(format!("Renamed texture '{old}' to '{proposed}'"));
        }
        self.render();
        Ok(())
    }

    /// Deletes a texture and its GPU copy. Removing twice is a no-op.
    pub fn remove_texture(&mut self, id: TextureId) -> Result<bool, SessionError> {
        self.ensure_editable()?;
        let name = self.registry.get(id).map(|entry| entry.name().to_string());
        let removed = self.registry.remove(id, &mut self.driver);
        if let Some(name) = name.filter(|_| removed) {
            self.touch();
            self.status.info(format!("Removed texture '{name}'"));
            self.render();
        }
        Ok(removed)
    }

    /// Replaces the shader text and recompiles. The text is kept even when
    /// compilation fails; the previous program keeps rendering.
    pub fn edit_shader(&mut self, source: impl Into<String>) -> Result<(), SessionError> {
        self.ensure_editable()?;
        self.shader_source = source.into();
        self.touch();
        let result = self.compile_current();
        self.render();
        result.map_err(SessionError::from)
    }

    pub fn set_output_size(&mut self, width: u32, height: u32) -> Result<(), SessionError> {
        self.ensure_editable()?;
        self.check_size("output", width, height)?;
        self.dimensions.output_width = width;
        self.dimensions.output_height = height;
        self.touch();
        self.render();
        Ok(())
    }

    pub fn set_view_size(&mut self, width: u32, height: u32) -> Result<(), SessionError> {
        self.ensure_editable()?;
        self.check_size("view", width, height)?;
        self.dimensions.view_width = width;
        self.dimensions.view_height = height;
        self.touch();
        Ok(())
    }

    fn check_size(&self, what: &'static str, width: u32, height: u32) -> Result<(), SessionError> {
        if width == 0 || height == 0 {
            let err = SessionError::InvalidSize {
                what,
                width,
                height,
            };
            self.status.warning(err.to_string());
            return Err(err);
        }
        Ok(())
    }

    fn compile_current(&mut self) -> Result<(), CompileError> {
        match self.driver.reload_fragment(&self.shader_source) {
            Ok(()) => {
                self.last_compile_error = None;
                self.status.info("Shader compiled");
                Ok(())
            }
            Err(err) => {
                self.status.error(err.to_string());
                self.last_compile_error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Draws a frame with the current snapshot. Skipped while a load is
    /// replaying textures.
    pub fn render(&mut self) -> Option<&FrameSummary> {
        if self.barrier.is_some() {
            debug!("render deferred until load settles");
            return None;
        }
        let bindings = self.registry.snapshot().sampler_bindings();
        let output = self.output_size();
        self.last_frame = self.driver.render(&bindings, output);
        self.last_frame.as_ref()
    }

    /// Starts writing the project. Ignored while a save or load is running.
    pub fn save(&mut self, target: SaveTarget) -> bool {
        if !self.start_exclusive("save") {
            return false;
        }
        let snapshot = self.registry.snapshot();
        let project = Project {
            shader_source: self.shader_source.clone(),
            dimensions: self.dimensions,
            textures: snapshot.texture_bindings(),
        };
        let assets = snapshot.assets();

        self.phase = Phase::Saving;
        self.last_save = None;
        self.status.info(format!(
            "Saving project with {} texture(s)",
            project.textures.len()
        ));
        let tx = self.completion_tx.clone();
        self.in_flight += 1;
        self.executor.spawn("save", move || {
            let result = write_archive(&project, &assets, target);
            let _ = tx.send(Completion::Saved { result });
        });
        true
    }

    /// Starts loading archive bytes. Ignored while a save or load is running.
    pub fn load(&mut self, archive: Vec<u8>) -> bool {
        if !self.start_exclusive("load") {
            return false;
        }
        self.phase = Phase::Loading;
        self.last_load = None;
        self.load_generation += 1;
        let generation = self.load_generation;
        self.status.info("Loading project");
        let tx = self.completion_tx.clone();
        self.in_flight += 1;
        self.executor.spawn("import", move || {
            let result = projectpack::import(&archive);
            let _ = tx.send(Completion::Imported { generation, result });
        });
        true
    }

    pub fn load_file(&mut self, path: &Path) -> Result<bool, SessionError> {
        if matches!(self.phase, Phase::Saving | Phase::Loading) {
            return Ok(self.start_exclusive("load"));
        }
        let bytes = fs::read(path).map_err(|source| {
            let text = format!("Could not read {}: {source}", path.display());
            self.status.error(text.clone());
            self.last_load = Some(Outcome::Failed(text));
            SessionError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Ok(self.load(bytes))
    }

    fn start_exclusive(&self, what: &str) -> bool {
        match self.phase {
            Phase::Saving | Phase::Loading => {
                let current = if self.phase == Phase::Saving {
                    "save"
                } else {
                    "load"
                };
                self.status.info(format!(
                    "Ignoring {what} request; a {current} is already in progress"
                ));
                false
            }
            Phase::Idle | Phase::Editing => true,
        }
    }

    fn spawn_decode(&mut self, id: TextureId, bytes: Arc<[u8]>) {
        let tx = self.completion_tx.clone();
        self.in_flight += 1;
        self.executor.spawn("decode", move || {
            let result = decode_image(&bytes);
            let _ = tx.send(Completion::Decoded { id, result });
        });
    }

    /// Applies every completion that has arrived. Returns how many.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.completion_rx.try_recv() {
            self.apply(completion);
            applied += 1;
        }
        applied
    }

    /// Pumps until no background work is outstanding or `timeout` passes.
    /// With a manual executor, queued jobs are run in order. Returns whether
    /// the session went idle.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump();
            if !self.is_busy() {
                return true;
            }
            if self.executor.is_manual() {
                if self.executor.run_next() {
                    continue;
                }
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            match self.completion_rx.recv_timeout(deadline - now) {
                Ok(completion) => self.apply(completion),
                Err(RecvTimeoutError::Timeout) => return false,
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
    }

    fn apply(&mut self, completion: Completion) {
        self.in_flight = self.in_flight.saturating_sub(1);
        match completion {
            Completion::Decoded { id, result } => self.apply_decoded(id, result),
            Completion::Imported { generation, result } => {
                if generation != self.load_generation || self.phase != Phase::Loading {
                    debug!(generation, "discarding stale import");
                    return;
                }
                match result {
                    Ok(imported) => self.replay(imported),
                    Err(err) => {
                        self.status.error(format!("Load failed: {err}"));
                        self.last_load = Some(Outcome::Failed(err.to_string()));
                        self.phase = Phase::Idle;
                    }
                }
            }
            Completion::Saved { result } => {
                self.phase = Phase::Idle;
                match result {
                    Ok(SavedArchive::Memory(bytes)) => {
                        self.last_save = Some(Outcome::Succeeded);
                        self.status
                            .info(format!("Saved project ({} bytes)", bytes.len()));
                        self.saved_archive = Some(bytes);
                    }
                    Ok(SavedArchive::File { path, size }) => {
                        self.last_save = Some(Outcome::Succeeded);
                        self.status.info(format!(
                            "Saved project to {} ({size} bytes)",
                            path.display()
                        ));
                    }
                    Err(err) => {
                        self.status.error(format!("Save failed: {err:#}"));
                        self.last_save = Some(Outcome::Failed(format!("{err:#}")));
                    }
                }
            }
        }
    }

    fn apply_decoded(&mut self, id: TextureId, result: Result<DecodedImage, DecodeError>) {
        if self.registry.status(id) != TextureStatus::Pending {
            debug!(?id, "dropping decode for texture that is no longer pending");
        } else {
            let (name, label) = self
                .registry
                .get(id)
                .map(|entry| (entry.name().to_string(), entry.source_label().to_string()))
                .unwrap_or_default();
            match result {
                Ok(image) => match self.driver.upload(&image) {
                    Ok(handle) => {
                        debug!(texture = %name, width = image.width, height = image.height, "texture ready");
                        if let Resolution::Discarded(handle) =
                            self.registry.resolve(id, handle, Arc::new(image))
                        {
                            self.driver.release(handle);
                        }
                    }
                    Err(err) => {
                        self.status
                            .warning(format!("Texture '{name}' ({label}) dropped: {err:#}"));
                        self.registry.remove(id, &mut self.driver);
                    }
                },
                Err(err) => {
                    self.status
                        .warning(format!("Texture '{name}' ({label}) dropped: {err}"));
                    self.registry.remove(id, &mut self.driver);
                }
            }
        }

        match self.barrier.as_mut() {
            Some(barrier) => {
                barrier.pending.remove(&id);
                self.settle_load();
            }
            None => {
                self.render();
            }
        }
    }

    fn replay(&mut self, imported: ImportedProject) {
        for warning in &imported.warnings {
            self.status.warning(warning.to_string());
        }
        if let Some(dimensions) = imported.dimensions {
            self.dimensions = dimensions;
        }

        self.registry.clear(&mut self.driver);
        let mut pending = HashSet::new();
        for texture in imported.textures {
            let bytes: Arc<[u8]> = texture.bytes.into();
            match self
                .registry
                .add(Some(texture.name.as_str()), texture.source_label, bytes.clone())
            {
                Ok(id) => {
                    pending.insert(id);
                    self.spawn_decode(id, bytes);
                }
                Err(err) => self
                    .status
                    .warning(format!("Texture '{}' skipped: {err}", texture.name)),
            }
        }
        debug!(pending = pending.len(), "load barrier armed");
        self.barrier = Some(LoadBarrier {
            pending,
            shader: imported.shader_source,
        });
        self.settle_load();
    }

    fn settle_load(&mut self) {
        let settled = self
            .barrier
            .as_ref()
            .is_some_and(|barrier| barrier.pending.is_empty());
        if !settled {
            return;
        }
        let Some(barrier) = self.barrier.take() else {
            return;
        };
        if let Some(shader) = barrier.shader {
            self.shader_source = shader;
        }
        // compile failures are already on the status channel
        let _ = self.compile_current();
        self.phase = Phase::Idle;
        self.last_load = Some(Outcome::Succeeded);
        info!(textures = self.registry.len(), "project load settled");
        self.status.info(format!(
            "Loaded project with {} texture(s)",
            self.registry.len()
        ));
        self.render();
    }
}

fn write_archive(
    project: &Project,
    assets: &HashMap<String, Arc<[u8]>>,
    target: SaveTarget,
) -> Result<SavedArchive> {
    let bytes = projectpack::export(project, |label| {
        assets
            .get(label)
            .map(|bytes| bytes.to_vec())
            .ok_or_else(|| anyhow!("no source bytes for '{label}'"))
    })?;
    match target {
        SaveTarget::Memory => Ok(SavedArchive::Memory(bytes)),
        SaveTarget::File(path) => {
            fs::write(&path, &bytes)
                .with_context(|| format!("writing archive {}", path.display()))?;
            Ok(SavedArchive::File {
                path,
                size: bytes.len(),
            })
        }
    }
}
