//! Named textures bound to the shader, in the order they were added.
//!
//! Each entry has a stable [`TextureId`] and a user-editable name that doubles
//! as the sampler uniform. Iteration order is insertion order and survives
//! renames, since it decides which texture unit every entry gets.
use std::collections::HashMap;
use std::sync::Arc;

use projectpack::{is_valid_identifier, TextureBinding};
use renderer::{DecodedImage, ReleaseTexture, SamplerBinding, TextureHandle};
use slotmap::{new_key_type, SlotMap};
use thiserror::Error;
use tracing::debug;

new_key_type! {
    pub struct TextureId;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error(
        "'{0}' is not a valid name; use a letter or underscore followed by letters, digits or underscores"
    )]
    InvalidName(String),

    #[error("a texture named '{0}' already exists")]
    DuplicateName(String),

    #[error("texture no longer exists")]
    UnknownTexture,
}

#[derive(Debug, Clone)]
pub enum TextureState {
    /// Image still decoding; renders bind the placeholder.
    Pending,
    Ready {
        gpu: TextureHandle,
        pixels: Arc<DecodedImage>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureStatus {
    Pending,
    Ready,
    Deleted,
}

/// Outcome of [`TextureRegistry::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Applied,
    /// The entry is gone or already resolved; the caller still owns the handle.
    Discarded(TextureHandle),
}

#[derive(Debug, Clone)]
pub struct TextureEntry {
    name: String,
    source_label: String,
    source_bytes: Arc<[u8]>,
    state: TextureState,
}

impl TextureEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_label(&self) -> &str {
        &self.source_label
    }

    pub fn source_bytes(&self) -> &Arc<[u8]> {
        &self.source_bytes
    }

    pub fn state(&self) -> &TextureState {
        &self.state
    }

    pub fn gpu(&self) -> Option<TextureHandle> {
        match &self.state {
            TextureState::Pending => None,
            TextureState::Ready { gpu, .. } => Some(*gpu),
        }
    }

    /// Decoded pixels, kept so the texture can be re-uploaded or inspected
    /// without decoding the source bytes again.
    pub fn pixels(&self) -> Option<&Arc<DecodedImage>> {
        match &self.state {
            TextureState::Pending => None,
            TextureState::Ready { pixels, .. } => Some(pixels),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, TextureState::Pending)
    }
}

#[derive(Debug, Default)]
pub struct TextureRegistry {
    entries: SlotMap<TextureId, TextureEntry>,
    order: Vec<TextureId>,
    names: HashMap<String, TextureId>,
    next_generated: u64,
}

impl TextureRegistry {
    pub fn new() -> Self {
        Self {
            entries: SlotMap::with_key(),
            order: Vec::new(),
            names: HashMap::new(),
            next_generated: 0,
        }
    }

    /// Reserves a pending entry. Without a name, a fresh `tex<N>` is issued.
    pub fn add(
        &mut self,
        name: Option<&str>,
        source_label: impl Into<String>,
        source_bytes: impl Into<Arc<[u8]>>,
    ) -> Result<TextureId, RegistryError> {
        let name = match name {
            Some(name) => {
                self.check_name(name, None)?;
                name.to_string()
            }
            None => self.generate_name(),
        };
        let entry = TextureEntry {
            name: name.clone(),
            source_label: source_label.into(),
            source_bytes: source_bytes.into(),
            state: TextureState::Pending,
        };
        let id = self.entries.insert(entry);
        self.order.push(id);
        self.names.insert(name, id);
        debug!(?id, len = self.order.len(), "texture slot reserved");
        Ok(id)
    }

    fn generate_name(&mut self) -> String {
        loop {
            let candidate = format!("tex{}", self.next_generated);
            self.next_generated += 1;
            if !self.names.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    fn check_name(&self, name: &str, owner: Option<TextureId>) -> Result<(), RegistryError> {
        if !is_valid_identifier(name) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        match self.names.get(name) {
            Some(existing) if Some(*existing) != owner => {
                Err(RegistryError::DuplicateName(name.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Completes a pending entry once its image is on the GPU.
    pub fn resolve(
        &mut self,
        id: TextureId,
        gpu: TextureHandle,
        pixels: Arc<DecodedImage>,
    ) -> Resolution {
        match self.entries.get_mut(id) {
            Some(entry) if entry.is_pending() => {
                entry.state = TextureState::Ready { gpu, pixels };
                Resolution::Applied
            }
            Some(_) => {
                debug!(?id, "texture already resolved");
                Resolution::Discarded(gpu)
            }
            None => {
                debug!(?id, "discarding decode for deleted texture");
                Resolution::Discarded(gpu)
            }
        }
    }

    /// Renames in place. `Ok` means accepted; on `Err` nothing changed.
    pub fn rename(&mut self, id: TextureId, proposed: &str) -> Result<(), RegistryError> {
        if !self.entries.contains_key(id) {
            return Err(RegistryError::UnknownTexture);
        }
        self.check_name(proposed, Some(id))?;
        let Some(entry) = self.entries.get_mut(id) else {
            return Err(RegistryError::UnknownTexture);
        };
        if entry.name == proposed {
            return Ok(());
        }
        let old = std::mem::replace(&mut entry.name, proposed.to_string());
        self.names.remove(&old);
        self.names.insert(proposed.to_string(), id);
        Ok(())
    }

    /// Deletes the entry and releases its GPU texture. Returns whether
    /// anything was removed.
    pub fn remove(&mut self, id: TextureId, gpu: &mut impl ReleaseTexture) -> bool {
        let Some(entry) = self.entries.remove(id) else {
            return false;
        };
        self.order.retain(|existing| *existing != id);
        self.names.remove(&entry.name);
        if let Some(handle) = entry.gpu() {
            gpu.release(handle);
        }
        true
    }

    pub fn clear(&mut self, gpu: &mut impl ReleaseTexture) {
        for id in std::mem::take(&mut self.order) {
            if let Some(entry) = self.entries.remove(id) {
                if let Some(handle) = entry.gpu() {
                    gpu.release(handle);
                }
            }
        }
        self.entries.clear();
        self.names.clear();
    }

    pub fn status(&self, id: TextureId) -> TextureStatus {
        match self.entries.get(id) {
            None => TextureStatus::Deleted,
            Some(entry) if entry.is_pending() => TextureStatus::Pending,
            Some(_) => TextureStatus::Ready,
        }
    }

    pub fn get(&self, id: TextureId) -> Option<&TextureEntry> {
        self.entries.get(id)
    }

    pub fn id_of(&self, name: &str) -> Option<TextureId> {
        self.names.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.entries.values().filter(|entry| entry.is_pending()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TextureId, &TextureEntry)> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(*id).map(|entry| (*id, entry)))
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            entries: self
                .iter()
                .map(|(id, entry)| SnapshotEntry {
                    id,
                    name: entry.name.clone(),
                    source_label: entry.source_label.clone(),
                    source_bytes: entry.source_bytes.clone(),
                    texture: entry.gpu(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    pub id: TextureId,
    pub name: String,
    pub source_label: String,
    pub source_bytes: Arc<[u8]>,
    pub texture: Option<TextureHandle>,
}

/// Point-in-time copy of the registry in iteration order.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: Vec<SnapshotEntry>,
}

impl Snapshot {
    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.name.as_str()).collect()
    }

    pub fn sampler_bindings(&self) -> Vec<SamplerBinding> {
        self.entries
            .iter()
            .map(|entry| SamplerBinding {
                name: entry.name.clone(),
                texture: entry.texture,
            })
            .collect()
    }

    pub fn texture_bindings(&self) -> Vec<TextureBinding> {
        self.entries
            .iter()
            .map(|entry| TextureBinding::new(&entry.name, &entry.source_label))
            .collect()
    }

    /// Source bytes per label; the first entry wins when labels repeat.
    pub fn assets(&self) -> HashMap<String, Arc<[u8]>> {
        let mut assets = HashMap::new();
        for entry in &self.entries {
            assets
                .entry(entry.source_label.clone())
                .or_insert_with(|| entry.source_bytes.clone());
        }
        assets
    }
}
