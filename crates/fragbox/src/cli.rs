use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use sandboxconfig::Dimensions;

#[derive(Parser, Debug)]
#[command(
    name = "fragbox",
    author,
    version,
    about = "Fragment shader sandbox",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Settings file (TOML); can also be supplied via the `FRAGBOX_CONFIG` env var.
    #[arg(long, global = true, env = "FRAGBOX_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a project from a shader and images and save it as an archive.
    Pack(PackArgs),
    /// Print the manifest and import warnings of an archive.
    Inspect(InspectArgs),
    /// Load an archive or shader, compile it and render one frame.
    Check(CheckArgs),
    /// Print GLSL literals for an 8-bit RGB colour.
    Color(ColorArgs),
}

#[derive(Args, Debug)]
pub struct PackArgs {
    /// Fragment shader source.
    #[arg(long, value_name = "FILE")]
    pub shader: PathBuf,

    /// Image to bind, optionally under an explicit sampler name.
    #[arg(long = "texture", value_name = "[NAME=]PATH", value_parser = parse_texture_spec)]
    pub textures: Vec<TextureSpec>,

    /// Output size (e.g. `1280x720` or `1280, 720`).
    #[arg(long, value_name = "W,H", value_parser = parse_dimensions)]
    pub output: Option<Dimensions>,

    /// Editor view size.
    #[arg(long, value_name = "W,H", value_parser = parse_dimensions)]
    pub view: Option<Dimensions>,

    /// Where to write the archive.
    #[arg(short = 'o', long = "archive", value_name = "ARCHIVE")]
    pub archive: PathBuf,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[arg(value_name = "ARCHIVE", required_unless_present = "shader")]
    pub archive: Option<PathBuf>,

    /// Check a bare fragment shader instead of an archive.
    #[arg(long, value_name = "FILE", conflicts_with = "archive")]
    pub shader: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ColorArgs {
    #[arg(value_name = "R,G,B", value_parser = parse_color)]
    pub rgb: [u8; 3],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureSpec {
    pub name: Option<String>,
    pub path: PathBuf,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_texture_spec(value: &str) -> Result<TextureSpec, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("texture path must not be empty".to_string());
    }

    // a '=' inside a directory name is part of the path, not a sampler name
    let named = trimmed
        .split_once('=')
        .filter(|(name, _)| !name.contains(['/', '\\']));
    match named {
        Some((name, path)) => {
            let name = name.trim();
            let path = path.trim();
            if name.is_empty() || path.is_empty() {
                return Err(format!("invalid texture '{trimmed}'; expected NAME=PATH"));
            }
            Ok(TextureSpec {
                name: Some(name.to_string()),
                path: PathBuf::from(path),
            })
        }
        None => Ok(TextureSpec {
            name: None,
            path: PathBuf::from(trimmed),
        }),
    }
}

pub fn parse_dimensions(value: &str) -> Result<Dimensions, String> {
    value.parse()
}

pub fn parse_color(value: &str) -> Result<[u8; 3], String> {
    session::color::parse_rgb(value)
}
