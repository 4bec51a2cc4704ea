//! Editing session for the fragbox shader sandbox.
//!
//! - `registry`: named textures in unit order, with stable ids.
//! - `controller`: [`Session`], which applies user edits, runs decodes and
//!   archive work in the background and reports through the status channel.
//! - `executor`: threaded or manually stepped background jobs.
//! - `status`: the append-only message feed.
//! - `color`: GLSL snippets for the colour picker.

pub mod color;
mod controller;
mod executor;
mod registry;
mod status;

pub use controller::{Outcome, Phase, SaveTarget, Session, SessionError};
pub use executor::Executor;
pub use registry::{
    RegistryError, Resolution, Snapshot, SnapshotEntry, TextureEntry, TextureId, TextureRegistry,
    TextureState, TextureStatus,
};
pub use status::{StatusChannel, StatusLevel, StatusMessage, STATUS_CAPACITY};
