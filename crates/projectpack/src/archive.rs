//! Zip archive format for projects.
//!
//! ```text
//! shader.frag          fragment shader source (UTF-8)
//! project.json         ProjectManifest
//! assets/<label>       raw image bytes, one file per distinct source label
//! ```
//!
//! Export is deterministic: entries are written in a fixed order with a fixed
//! timestamp. Import is tolerant: anything short of an unreadable archive or an
//! unparsable manifest comes back as an [`ImportWarning`] next to whatever
//! could be recovered.
use std::collections::HashSet;
use std::io::{Cursor, Read, Seek, Write};

use thiserror::Error;
use tracing::{debug, warn};
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::manifest::{ProjectManifest, MANIFEST_VERSION};
use crate::project::{is_safe_label, is_valid_identifier, Project, ProjectDimensions};

pub const SHADER_ENTRY: &str = "shader.frag";
pub const MANIFEST_ENTRY: &str = "project.json";
pub const ASSET_DIR: &str = "assets";

/// Largest entry import will read. Sizes declared in the archive are not
/// trusted for allocation.
pub const MAX_ENTRY_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive is unreadable: {0}")]
    Zip(#[from] ZipError),

    #[error("failed to parse project.json: {0}")]
    ManifestParse(#[from] serde_json::Error),

    #[error("failed to read asset '{label}': {reason}")]
    Asset { label: String, reason: String },

    #[error("source label '{0}' cannot be stored as an asset file name")]
    UnsafeLabel(String),

    #[error("archive entry '{name}' is larger than {limit} bytes")]
    EntryTooLarge { name: String, limit: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A recoverable problem found while importing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportWarning {
    #[error("archive has no shader.frag; keeping the current shader")]
    MissingShader,

    #[error("shader.frag is not valid UTF-8; keeping the current shader")]
    ShaderNotUtf8,

    #[error("archive has no project.json; no textures imported")]
    MissingManifest,

    #[error("manifest version {0} is newer than this build understands; reading it anyway")]
    NewerVersion(u32),

    #[error("ignoring project dimensions: {0}")]
    InvalidDimensions(String),

    #[error("texture '{name}' is not a valid identifier; skipped")]
    InvalidTextureName { name: String },

    #[error("texture '{name}' has unusable source label '{label}'; skipped")]
    UnsafeAssetLabel { name: String, label: String },

    #[error("texture '{name}' is missing asset '{label}'; skipped")]
    MissingAsset { name: String, label: String },

    #[error("texture '{name}' asset '{label}' could not be read: {reason}")]
    UnreadableAsset {
        name: String,
        label: String,
        reason: String,
    },
}

#[derive(Clone, PartialEq, Eq)]
pub struct ImportedTexture {
    pub name: String,
    pub source_label: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for ImportedTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportedTexture")
            .field("name", &self.name)
            .field("source_label", &self.source_label)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// What an import recovered. `None` fields mean "leave the current value".
#[derive(Debug, Clone, Default)]
pub struct ImportedProject {
    pub shader_source: Option<String>,
    pub dimensions: Option<ProjectDimensions>,
    pub textures: Vec<ImportedTexture>,
    pub warnings: Vec<ImportWarning>,
}

fn asset_path(label: &str) -> String {
    format!("{ASSET_DIR}/{label}")
}

fn entry_options() -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644)
}

/// Packs `project` into zip bytes.
///
/// `provider` is asked once per distinct source label for the bytes to store
/// under `assets/`. A provider failure aborts the export.
pub fn export<F>(project: &Project, mut provider: F) -> Result<Vec<u8>, ArchiveError>
where
    F: FnMut(&str) -> anyhow::Result<Vec<u8>>,
{
    let manifest = serde_json::to_vec_pretty(&project.manifest())?;

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = entry_options();

    writer.start_file(SHADER_ENTRY, options)?;
    writer.write_all(project.shader_source.as_bytes())?;

    writer.start_file(MANIFEST_ENTRY, options)?;
    writer.write_all(&manifest)?;

    let mut written = HashSet::new();
    for binding in &project.textures {
        let label = binding.source_label.as_str();
        if !is_safe_label(label) {
            return Err(ArchiveError::UnsafeLabel(label.to_string()));
        }
        if !written.insert(label) {
            continue;
        }
        let bytes = provider(label).map_err(|err| ArchiveError::Asset {
            label: label.to_string(),
            reason: format!("{err:#}"),
        })?;
        writer.start_file(asset_path(label), options)?;
        writer.write_all(&bytes)?;
        debug!(label, bytes = bytes.len(), "packed asset");
    }

    let cursor = writer.finish()?;
    let bytes = cursor.into_inner();
    debug!(
        textures = project.textures.len(),
        assets = written.len(),
        bytes = bytes.len(),
        "exported project archive"
    );
    Ok(bytes)
}

enum Entry {
    Found(Vec<u8>),
    Missing,
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
    limit: u64,
) -> Result<Entry, ArchiveError> {
    match archive.by_name(name) {
        Ok(file) => {
            // one byte past the limit tells "exactly at the limit" from "over it"
            let mut bytes = Vec::new();
            file.take(limit.saturating_add(1)).read_to_end(&mut bytes)?;
            if bytes.len() as u64 > limit {
                return Err(ArchiveError::EntryTooLarge {
                    name: name.to_string(),
                    limit,
                });
            }
            Ok(Entry::Found(bytes))
        }
        Err(ZipError::FileNotFound) => Ok(Entry::Missing),
        Err(err) => Err(err.into()),
    }
}

/// Unpacks archive bytes.
///
/// Fails only when the archive itself cannot be opened or its manifest is not
/// valid JSON; in that case nothing was recovered and the caller should leave
/// its state untouched.
pub fn import(bytes: &[u8]) -> Result<ImportedProject, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut imported = ImportedProject::default();

    let manifest = match read_entry(&mut archive, MANIFEST_ENTRY, MAX_ENTRY_BYTES)? {
        Entry::Found(raw) => Some(serde_json::from_slice::<ProjectManifest>(&raw)?),
        Entry::Missing => {
            imported.warnings.push(ImportWarning::MissingManifest);
            None
        }
    };

    match read_entry(&mut archive, SHADER_ENTRY, MAX_ENTRY_BYTES)? {
        Entry::Found(raw) => match String::from_utf8(raw) {
            Ok(source) => imported.shader_source = Some(source),
            Err(_) => imported.warnings.push(ImportWarning::ShaderNotUtf8),
        },
        Entry::Missing => imported.warnings.push(ImportWarning::MissingShader),
    }

    let Some(manifest) = manifest else {
        return Ok(finish(imported));
    };

    if manifest.version > MANIFEST_VERSION {
        imported
            .warnings
            .push(ImportWarning::NewerVersion(manifest.version));
    }

    let issues = manifest.validate();
    let dimensions = ProjectDimensions::new(
        (manifest.output_width, manifest.output_height),
        (manifest.view_width, manifest.view_height),
    );
    if dimensions.is_valid() {
        imported.dimensions = Some(dimensions);
    }
    for issue in issues {
        imported.warnings.push(ImportWarning::InvalidDimensions(issue));
    }

    for (name, label) in manifest.textures.iter() {
        if !is_valid_identifier(name) {
            imported.warnings.push(ImportWarning::InvalidTextureName {
                name: name.to_string(),
            });
            continue;
        }
        if !is_safe_label(label) {
            imported.warnings.push(ImportWarning::UnsafeAssetLabel {
                name: name.to_string(),
                label: label.to_string(),
            });
            continue;
        }
        match read_entry(&mut archive, &asset_path(label), MAX_ENTRY_BYTES) {
            Ok(Entry::Found(bytes)) => imported.textures.push(ImportedTexture {
                name: name.to_string(),
                source_label: label.to_string(),
                bytes,
            }),
            Ok(Entry::Missing) => imported.warnings.push(ImportWarning::MissingAsset {
                name: name.to_string(),
                label: label.to_string(),
            }),
            Err(err) => imported.warnings.push(ImportWarning::UnreadableAsset {
                name: name.to_string(),
                label: label.to_string(),
                reason: err.to_string(),
            }),
        }
    }

    Ok(finish(imported))
}

fn finish(imported: ImportedProject) -> ImportedProject {
    for warning in &imported.warnings {
        warn!(%warning, "archive import");
    }
    debug!(
        textures = imported.textures.len(),
        warnings = imported.warnings.len(),
        has_shader = imported.shader_source.is_some(),
        "imported project archive"
    );
    imported
}
