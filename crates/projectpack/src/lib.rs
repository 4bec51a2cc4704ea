//! Project model and archive format for fragbox.
//!
//! A project is the fragment shader source, the output/view dimensions and an
//! ordered list of texture bindings (`name -> source label`). [`export`] packs
//! it into a zip with the image bytes under `assets/`; [`import`] reads one
//! back and reports every recoverable problem as an [`ImportWarning`].

mod archive;
mod manifest;
mod project;

pub use archive::{
    export, import, ArchiveError, ImportWarning, ImportedProject, ImportedTexture, ASSET_DIR,
    MANIFEST_ENTRY, MAX_ENTRY_BYTES, SHADER_ENTRY,
};
pub use manifest::{ProjectManifest, TextureTable, MANIFEST_VERSION};
pub use project::{
    is_safe_label, is_valid_identifier, source_label_from_path, Project, ProjectDimensions,
    TextureBinding,
};
