use std::fmt;

use crate::manifest::{ProjectManifest, TextureTable, MANIFEST_VERSION};

/// Output and view sizes of a project, all in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectDimensions {
    pub output_width: u32,
    pub output_height: u32,
    pub view_width: u32,
    pub view_height: u32,
}

impl ProjectDimensions {
    pub const fn new(output: (u32, u32), view: (u32, u32)) -> Self {
        Self {
            output_width: output.0,
            output_height: output.1,
            view_width: view.0,
            view_height: view.1,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.output_width > 0 && self.output_height > 0 && self.view_width > 0 && self.view_height > 0
    }

    pub fn output(&self) -> (u32, u32) {
        (self.output_width, self.output_height)
    }

    pub fn view(&self) -> (u32, u32) {
        (self.view_width, self.view_height)
    }
}

impl Default for ProjectDimensions {
    fn default() -> Self {
        Self::new((512, 512), (512, 512))
    }
}

impl fmt::Display for ProjectDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "output {}x{}, view {}x{}",
            self.output_width, self.output_height, self.view_width, self.view_height
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureBinding {
    pub name: String,
    pub source_label: String,
}

impl TextureBinding {
    pub fn new(name: impl Into<String>, source_label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_label: source_label.into(),
        }
    }
}

/// Everything that goes into an archive, with bindings in registry order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub shader_source: String,
    pub dimensions: ProjectDimensions,
    pub textures: Vec<TextureBinding>,
}

impl Project {
    pub fn manifest(&self) -> ProjectManifest {
        ProjectManifest {
            version: MANIFEST_VERSION,
            output_width: self.dimensions.output_width,
            output_height: self.dimensions.output_height,
            view_width: self.dimensions.view_width,
            view_height: self.dimensions.view_height,
            textures: self
                .textures
                .iter()
                .map(|binding| (binding.name.as_str(), binding.source_label.as_str()))
                .collect::<TextureTable>(),
        }
    }
}

/// Identifier grammar shared by texture names and sampler uniforms:
/// a letter or underscore followed by letters, digits or underscores.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Display label for an image picked from a path or URL: the last segment,
/// with Windows separators treated like `/`.
pub fn source_label_from_path(path: &str) -> String {
    let normalised = path.replace('\\', "/");
    normalised
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Labels become archive paths under `assets/`, so anything that could
/// escape that directory is refused.
pub fn is_safe_label(label: &str) -> bool {
    !label.is_empty()
        && label != "."
        && label != ".."
        && !label.contains('/')
        && !label.contains('\\')
        && !label.contains('\0')
}
