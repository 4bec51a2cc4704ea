use std::io::{Cursor, Write};
use std::time::Duration;

use crossbeam_channel::Receiver;
use renderer::HeadlessBackend;
use session::{
    Executor, Outcome, Phase, RegistryError, SaveTarget, Session, SessionError, StatusLevel,
    StatusMessage, TextureId, TextureStatus,
};

const RED: &str = "#version 450
layout(location = 0) in vec2 texcoord;
layout(location = 0) out vec4 fragColor;

void main() {
    fragColor = vec4(1.0, 0.0, 0.0, 1.0);
}
";

fn png(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 10, 10, 255]));
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

fn manual_session() -> Session<HeadlessBackend> {
    Session::new(HeadlessBackend::new(), Executor::manual())
}

fn name_of(session: &Session<HeadlessBackend>, id: TextureId) -> String {
    session.registry().get(id).unwrap().name().to_string()
}

fn settle(session: &mut Session<HeadlessBackend>) {
    assert!(session.wait_idle(Duration::from_secs(5)));
}

fn messages(feed: &Receiver<StatusMessage>, level: StatusLevel) -> Vec<String> {
    feed.try_iter()
        .filter(|message| message.level == level)
        .map(|message| message.text)
        .collect()
}

fn zip_with(entries: Vec<(&str, Vec<u8>)>) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer
            .start_file(name, zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(&data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// A saved project with two textures, a red shader and a 64x32 output.
fn two_texture_archive() -> Vec<u8> {
    let mut source = manual_session();
    source.edit_shader(RED).unwrap();
    source.add_texture(Some("a"), "cat.png", png(4, 4)).unwrap();
    source.add_texture(Some("b"), "dog.png", png(3, 5)).unwrap();
    source.set_output_size(64, 32).unwrap();
    settle(&mut source);
    assert!(source.save(SaveTarget::Memory));
    settle(&mut source);
    source.take_saved_archive().expect("archive saved")
}

#[test]
fn naming_rename_and_round_trip_scenario() {
    let mut session = manual_session();
    let first = session.add_texture(None, "cat.png", png(2, 2)).unwrap();
    assert_eq!(name_of(&session, first), "tex0");

    let err = session.rename_texture(first, "2bad").unwrap_err();
    assert!(matches!(
        err,
        SessionError::Registry(RegistryError::InvalidName(_))
    ));
    assert_eq!(name_of(&session, first), "tex0");
    session.rename_texture(first, "cat_tex").unwrap();

    // tex0 is free again but never reissued
    let second = session.add_texture(None, "dog.png", png(2, 2)).unwrap();
    assert_eq!(name_of(&session, second), "tex1");
    assert!(session.remove_texture(second).unwrap());
    assert!(!session.remove_texture(second).unwrap());

    settle(&mut session);
    assert!(session.save(SaveTarget::Memory));
    settle(&mut session);
    let archive = session.take_saved_archive().unwrap();

    let imported = projectpack::import(&archive).unwrap();
    let pairs: Vec<_> = imported
        .textures
        .iter()
        .map(|t| (t.name.as_str(), t.source_label.as_str()))
        .collect();
    assert_eq!(pairs, vec![("cat_tex", "cat.png")]);
}

#[test]
fn load_applies_shader_only_after_textures_settle() {
    let archive = two_texture_archive();
    let mut session = manual_session();
    session.add_texture(Some("old"), "old.png", png(1, 1)).unwrap();
    settle(&mut session);

    assert!(session.load(archive));
    assert_eq!(session.phase(), Phase::Loading);
    assert_eq!(session.executor().queued(), vec!["import"]);

    session.executor().run_next();
    session.pump();
    assert_eq!(session.executor().queued(), vec!["decode", "decode"]);
    assert_eq!(session.registry().len(), 2);
    assert!(session.registry().id_of("old").is_none());
    assert_ne!(session.shader_source(), RED);
    assert!(session.render().is_none());

    session.executor().run_last();
    session.pump();
    assert_ne!(session.shader_source(), RED);
    assert_eq!(session.phase(), Phase::Loading);

    session.executor().run_next();
    session.pump();
    assert_eq!(session.shader_source(), RED);
    assert_eq!(session.phase(), Phase::Idle);
    assert_eq!(session.dimensions().output(), (64, 32));

    let frame = session.last_frame().expect("rendered after load");
    assert_eq!(
        frame.units,
        vec![(0, "a".to_string()), (1, "b".to_string())]
    );
    assert_eq!(frame.placeholders, 0);
}

#[test]
fn decode_completion_order_does_not_change_the_result() {
    let archive = two_texture_archive();
    let mut states = Vec::new();
    for reverse in [false, true] {
        let mut session = manual_session();
        session.load(archive.clone());
        session.executor().run_next();
        session.pump();
        loop {
            let ran = if reverse {
                session.executor().run_last()
            } else {
                session.executor().run_next()
            };
            if !ran {
                break;
            }
            session.pump();
        }
        let snapshot = session.registry().snapshot();
        let names: Vec<String> = snapshot.names().into_iter().map(String::from).collect();
        let statuses: Vec<_> = snapshot
            .entries()
            .iter()
            .map(|entry| session.registry().status(entry.id))
            .collect();
        states.push((names, statuses, session.shader_source().to_string()));
    }
    assert_eq!(states[0], states[1]);
    assert_eq!(
        states[0].1,
        vec![TextureStatus::Ready, TextureStatus::Ready]
    );
}

#[test]
fn malformed_manifest_aborts_without_touching_state() {
    let mut session = manual_session();
    let feed = session.status_feed();
    session.edit_shader(RED).unwrap();
    let kept = session.add_texture(Some("kept"), "kept.png", png(2, 2)).unwrap();
    settle(&mut session);
    feed.try_iter().count();

    let broken = zip_with(vec![
        ("shader.frag", b"void main() {}".to_vec()),
        ("project.json", b"{ nope".to_vec()),
    ]);
    assert!(session.load(broken));
    settle(&mut session);

    assert_eq!(session.phase(), Phase::Idle);
    assert_eq!(session.shader_source(), RED);
    assert_eq!(session.registry().status(kept), TextureStatus::Ready);
    assert_eq!(session.registry().len(), 1);
    assert_eq!(messages(&feed, StatusLevel::Error).len(), 1);
    assert!(matches!(session.last_load(), Some(Outcome::Failed(_))));
}

#[test]
fn archive_without_manifest_keeps_dimensions_and_imports_no_textures() {
    let mut session = manual_session();
    let feed = session.status_feed();
    session.add_texture(Some("kept"), "kept.png", png(2, 2)).unwrap();
    session.set_output_size(100, 60).unwrap();
    session.set_view_size(50, 30).unwrap();
    settle(&mut session);
    feed.try_iter().count();

    session.load(zip_with(vec![("shader.frag", RED.as_bytes().to_vec())]));
    settle(&mut session);

    let warnings = messages(&feed, StatusLevel::Warning);
    assert!(
        warnings.iter().any(|w| w.contains("no project.json")),
        "{warnings:?}"
    );
    assert_eq!(session.dimensions().output(), (100, 60));
    assert_eq!(session.dimensions().view(), (50, 30));
    // the archive is the whole project; it brings no textures
    assert!(session.registry().is_empty());
    assert_eq!(session.driver().live_textures(), 0);
    assert_eq!(session.shader_source(), RED);
    assert_eq!(session.last_load(), Some(&Outcome::Succeeded));
}

#[test]
fn missing_asset_drops_one_binding_with_a_warning() {
    let manifest = br#"{"outputWidth":8,"outputHeight":8,"viewWidth":8,"viewHeight":8,
        "textures":{"a":"a.png","gone":"gone.png","c":"c.png"}}"#;
    let archive = zip_with(vec![
        ("shader.frag", RED.as_bytes().to_vec()),
        ("project.json", manifest.to_vec()),
        ("assets/a.png", png(2, 2)),
        ("assets/c.png", png(2, 2)),
    ]);

    let mut session = manual_session();
    let feed = session.status_feed();
    session.load(archive);
    settle(&mut session);

    assert_eq!(session.registry().snapshot().names(), vec!["a", "c"]);
    let warnings = messages(&feed, StatusLevel::Warning);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("gone.png"));
    assert_eq!(session.shader_source(), RED);
}

#[test]
fn archive_without_shader_keeps_current_one() {
    let manifest = br#"{"outputWidth":8,"outputHeight":8,"viewWidth":8,"viewHeight":8}"#;
    let mut session = manual_session();
    session.edit_shader(RED).unwrap();
    session.load(zip_with(vec![("project.json", manifest.to_vec())]));
    settle(&mut session);
    assert_eq!(session.shader_source(), RED);
    assert_eq!(session.dimensions().view(), (8, 8));
    assert!(session.registry().is_empty());
}

#[test]
fn save_and_load_are_not_reentrant() {
    let mut session = manual_session();
    assert!(session.save(SaveTarget::Memory));
    assert_eq!(session.phase(), Phase::Saving);
    assert!(!session.save(SaveTarget::Memory));
    assert!(!session.load(Vec::new()));
    assert_eq!(session.executor().queued(), vec!["save"]);

    settle(&mut session);
    assert_eq!(session.phase(), Phase::Idle);
    assert_eq!(session.last_save(), Some(&Outcome::Succeeded));
    assert!(session.take_saved_archive().is_some());
    assert!(session.take_saved_archive().is_none());
}

#[test]
fn edits_are_refused_while_loading() {
    let archive = two_texture_archive();
    let mut session = manual_session();
    let id = session.add_texture(None, "x.png", png(1, 1)).unwrap();
    settle(&mut session);

    session.load(archive);
    assert!(matches!(
        session.add_texture(None, "y.png", png(1, 1)),
        Err(SessionError::Loading)
    ));
    assert!(matches!(
        session.rename_texture(id, "renamed"),
        Err(SessionError::Loading)
    ));
    assert!(matches!(session.remove_texture(id), Err(SessionError::Loading)));
    assert!(matches!(session.edit_shader(RED), Err(SessionError::Loading)));
    assert!(matches!(
        session.set_output_size(1, 1),
        Err(SessionError::Loading)
    ));

    settle(&mut session);
    assert!(session.add_texture(None, "y.png", png(1, 1)).is_ok());
}

#[test]
fn decode_for_removed_texture_is_discarded() {
    let mut session = manual_session();
    let id = session.add_texture(None, "cat.png", png(2, 2)).unwrap();
    session.remove_texture(id).unwrap();
    settle(&mut session);

    assert_eq!(session.registry().status(id), TextureStatus::Deleted);
    assert_eq!(session.driver().live_textures(), 0);
}

#[test]
fn pending_textures_render_with_placeholder() {
    let mut session = manual_session();
    session.add_texture(None, "cat.png", png(2, 2)).unwrap();
    let frame = session.render().unwrap();
    assert_eq!(frame.placeholders, 1);

    settle(&mut session);
    let frame = session.last_frame().unwrap();
    assert_eq!(frame.placeholders, 0);
}

#[test]
fn undecodable_image_is_dropped_with_warning() {
    let mut session = manual_session();
    let feed = session.status_feed();
    let bad = session
        .add_texture(Some("bad"), "bad.png", b"not an image".to_vec())
        .unwrap();
    let good = session.add_texture(Some("good"), "good.png", png(2, 2)).unwrap();
    settle(&mut session);

    assert_eq!(session.registry().status(bad), TextureStatus::Deleted);
    assert_eq!(session.registry().status(good), TextureStatus::Ready);
    let warnings = messages(&feed, StatusLevel::Warning);
    assert!(warnings.iter().any(|w| w.contains("'bad'")));
}

#[test]
fn compile_failure_keeps_previous_program() {
    let mut session = manual_session();
    let feed = session.status_feed();
    session.edit_shader(RED).unwrap();
    let broken = "#version 450\nvoid main() { missing(); }\n";

    let err = session.edit_shader(broken).unwrap_err();
    assert!(matches!(err, SessionError::Compile(_)));
    assert_eq!(session.shader_source(), broken);
    assert!(session.last_compile_error().is_some());
    assert!(session.driver().has_program());
    assert!(session.render().is_some());
    assert_eq!(messages(&feed, StatusLevel::Error).len(), 1);

    session.edit_shader(RED).unwrap();
    assert!(session.last_compile_error().is_none());
}

#[test]
fn render_never_leaves_stale_units_bound() {
    let mut session = manual_session();
    let ids: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|name| session.add_texture(Some(name), "t.png", png(1, 1)).unwrap())
        .collect();
    settle(&mut session);
    session.render();
    session.remove_texture(ids[1]).unwrap();

    let frame = session.driver().backend().last_frame().unwrap();
    assert_eq!(
        frame.samplers,
        vec![("a".to_string(), 0), ("c".to_string(), 1)]
    );
    assert_eq!(frame.bound_units.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
}

#[test]
fn invalid_sizes_are_rejected() {
    let mut session = manual_session();
    assert!(matches!(
        session.set_output_size(0, 10),
        Err(SessionError::InvalidSize { what: "output", .. })
    ));
    assert!(session.set_view_size(10, 0).is_err());
    session.set_view_size(320, 200).unwrap();
    assert_eq!(session.dimensions().view(), (320, 200));
    assert_eq!(session.phase(), Phase::Editing);
}

#[test]
fn save_to_unwritable_path_reports_failure() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("missing").join("project.zip");
    let mut session = manual_session();
    assert!(session.save(SaveTarget::File(target.clone())));
    assert_eq!(session.last_save(), None);
    settle(&mut session);

    assert!(matches!(session.last_save(), Some(Outcome::Failed(_))));
    assert_eq!(session.phase(), Phase::Idle);
    assert!(!target.exists());
}

#[test]
fn ready_textures_keep_their_decoded_pixels() {
    let mut session = manual_session();
    let id = session.add_texture(None, "wide.png", png(6, 2)).unwrap();
    assert!(session.registry().get(id).unwrap().pixels().is_none());
    settle(&mut session);

    let pixels = session.registry().get(id).unwrap().pixels().unwrap();
    assert_eq!((pixels.width, pixels.height), (6, 2));
    assert_eq!(pixels.rgba.len(), 6 * 2 * 4);
    assert_eq!(pixels.sampler_mode(), renderer::SamplerMode::ClampNearest);
}

#[test]
fn file_round_trip_with_threaded_executor() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("noise.png");
    std::fs::write(&image_path, png(8, 8)).unwrap();
    let archive_path = dir.path().join("project.zip");

    let mut session = Session::new(HeadlessBackend::new(), Executor::threaded());
    let id = session.add_texture_file(None, &image_path).unwrap();
    assert_eq!(session.registry().get(id).unwrap().source_label(), "noise.png");
    session.edit_shader(RED).unwrap();
    settle(&mut session);
    assert!(session.save(SaveTarget::File(archive_path.clone())));
    settle(&mut session);
    assert!(archive_path.exists());

    let mut reloaded = Session::new(HeadlessBackend::new(), Executor::threaded());
    assert!(reloaded.load_file(&archive_path).unwrap());
    settle(&mut reloaded);
    assert_eq!(reloaded.last_load(), Some(&Outcome::Succeeded));
    assert_eq!(reloaded.shader_source(), RED);
    assert_eq!(reloaded.registry().snapshot().names(), vec!["tex0"]);
    assert_eq!(
        reloaded.last_frame().unwrap().units,
        vec![(0, "tex0".to_string())]
    );
}
