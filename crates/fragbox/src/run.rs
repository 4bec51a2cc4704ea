use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use renderer::{HeadlessBackend, SamplerMode};
use sandboxconfig::SandboxSettings;
use session::{Executor, Outcome, SaveTarget, Session};
use tracing_subscriber::EnvFilter;

use crate::cli::{CheckArgs, ColorArgs, InspectArgs, PackArgs};

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn load_settings(config: Option<&Path>) -> Result<SandboxSettings> {
    let settings = SandboxSettings::load_or_default(config)?;
    let issues = settings.validate();
    if !issues.is_empty() {
        bail!("invalid settings:\n  {}", issues.join("\n  "));
    }
    if let Some(path) = config {
        tracing::debug!(path = %path.display(), "loaded settings");
    }
    Ok(settings)
}

fn headless_session(settings: &SandboxSettings) -> Result<Session<HeadlessBackend>> {
    Session::from_settings(HeadlessBackend::new(), settings, Executor::threaded())
}

fn settle(session: &mut Session<HeadlessBackend>, settings: &SandboxSettings) -> Result<()> {
    if session.wait_idle(settings.settle_timeout) {
        return Ok(());
    }
    Err(anyhow!(
        "background work did not finish within {:?}",
        settings.settle_timeout
    ))
}

pub fn pack(mut settings: SandboxSettings, args: PackArgs) -> Result<()> {
    if let Some(output) = args.output {
        settings.output = output;
    }
    if let Some(view) = args.view {
        settings.view = view;
    }
    settings.fragment_shader = Some(args.shader.clone());

    let mut session = headless_session(&settings)?;
    if let Some(err) = session.last_compile_error() {
        tracing::warn!(shader = %args.shader.display(), "packing a shader that does not compile: {err}");
    }

    for texture in &args.textures {
        session
            .add_texture_file(texture.name.as_deref(), &texture.path)
            .with_context(|| format!("adding texture {}", texture.path.display()))?;
    }
    settle(&mut session, &settings)?;

    if !session.save(SaveTarget::File(args.archive.clone())) {
        bail!("session refused to save");
    }
    settle(&mut session, &settings)?;

    match session.last_save() {
        Some(Outcome::Succeeded) => {}
        Some(Outcome::Failed(reason)) => bail!("saving {}: {reason}", args.archive.display()),
        None => bail!("save of {} did not complete", args.archive.display()),
    }

    let snapshot = session.registry().snapshot();
    println!("Wrote {}", args.archive.display());
    println!("  {}", session.dimensions());
    for entry in snapshot.entries() {
        println!("  {:<16} {}", entry.name, entry.source_label);
    }
    Ok(())
}

pub fn inspect(args: InspectArgs) -> Result<()> {
    let bytes = fs::read(&args.archive)
        .with_context(|| format!("reading archive {}", args.archive.display()))?;
    let imported = projectpack::import(&bytes)
        .with_context(|| format!("importing {}", args.archive.display()))?;

    println!("Archive: {}", args.archive.display());
    match &imported.shader_source {
        Some(source) => println!("Shader: {} line(s)", source.lines().count()),
        None => println!("Shader: (missing)"),
    }
    match &imported.dimensions {
        Some(dimensions) => println!("Dimensions: {dimensions}"),
        None => println!("Dimensions: (not set)"),
    }

    if imported.textures.is_empty() {
        println!("Textures: none");
    } else {
        println!("Textures:");
        for texture in &imported.textures {
            println!(
                "  {:<16} {:<24} {} bytes",
                texture.name,
                texture.source_label,
                texture.bytes.len()
            );
        }
    }

    if !imported.warnings.is_empty() {
        println!("Warnings:");
        for warning in &imported.warnings {
            println!("  - {warning}");
        }
    }
    Ok(())
}

pub fn check(mut settings: SandboxSettings, args: CheckArgs) -> Result<()> {
    if let Some(shader) = &args.shader {
        settings.fragment_shader = Some(shader.clone());
    }
    let mut session = headless_session(&settings)?;

    if let Some(archive) = &args.archive {
        session.load_file(archive)?;
        settle(&mut session, &settings)?;
        match session.last_load() {
            Some(Outcome::Succeeded) => {}
            Some(Outcome::Failed(reason)) => bail!("loading {}: {reason}", archive.display()),
            None => bail!("load of {} did not complete", archive.display()),
        }
    }
    if let Some(err) = session.last_compile_error() {
        println!("{err}");
        bail!("shader failed to compile");
    }

    let frame = session
        .render()
        .cloned()
        .ok_or_else(|| anyhow!("no frame was rendered"))?;
    println!("Shader compiled; rendered {}x{}", frame.output.width, frame.output.height);
    for (unit, name) in &frame.units {
        let pixels = session
            .registry()
            .id_of(name)
            .and_then(|id| session.registry().get(id))
            .and_then(|entry| entry.pixels());
        match pixels {
            Some(image) => {
                let sampling = match image.sampler_mode() {
                    SamplerMode::Mipmapped => "mipmapped",
                    SamplerMode::ClampNearest => "clamp/nearest",
                };
                println!(
                    "  unit {unit} -> {name} ({}x{}, {sampling})",
                    image.width, image.height
                );
            }
            None => println!("  unit {unit} -> {name} (pending)"),
        }
    }
    if frame.placeholders > 0 {
        println!("  {} sampler(s) still on the placeholder", frame.placeholders);
    }
    Ok(())
}

pub fn color(args: ColorArgs) -> Result<()> {
    println!("{}", session::color::color_snippet(args.rgb));
    Ok(())
}
