//! Headless playback demo.
//!
//! Drives a player through a short session against the in-memory backend and
//! prints every signal it emits.
//!
//! Run with: `RUST_LOG=crossplay_media=debug cargo run -p crossplay-media --example headless_demo`

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crossplay_media::backend::headless::{HeadlessAsset, HeadlessBackend, HeadlessSurface};
use crossplay_media::backend::{NativeError, Rect, SurfaceKind, TimeRange};
use crossplay_media::{AspectMode, MediaFile, PlayerConfig, VideoPlayer};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let backend = HeadlessBackend::new()
        .with_asset(HeadlessAsset::movie("trailer.mp4", 120.0))
        .with_asset(HeadlessAsset::caption("trailer.en.vtt"));

    let config = PlayerConfig::builder()
        .request_header("User-Agent", "crossplay-demo")
        .build();
    let player = VideoPlayer::builder(Arc::new(backend.clone()))
        .config(config)
        .build()?;

    player.on_status_changed(|status| println!("status     -> {status}"));
    player.on_playing_changed(|p| {
        println!("progress   -> {:>5.1}% ({:?} of {:?})", p.progress * 100.0, p.position, p.duration)
    });
    player.on_buffering_changed(|b| println!("buffering  -> {:>5.1}% ({:?})", b.fraction * 100.0, b.buffered));
    player.on_media_finished(|f| println!("finished   -> {}", f.file.url()));
    player.on_media_failed(|f| println!("failed     ->\n{}", f.message));

    let surface = Arc::new(HeadlessSurface::new(
        SurfaceKind::Offscreen,
        Rect::new(0.0, 0.0, 1280.0, 720.0),
    ));
    player.set_render_surface(Some(surface))?;
    player.set_aspect_mode(AspectMode::AspectFill);

    player.set_closed_caption(Some("trailer.en.vtt".into()));
    player.play(Some(MediaFile::video("trailer.mp4")))?;
    player.wait_idle()?;

    let engine = backend.engine().ok_or("engine was not created")?;
    engine.set_loaded_ranges(vec![TimeRange::new(0.0, 30.0), TimeRange::new(30.0, 30.0)]);
    engine.advance_to(45.0);
    player.seek_secs(90.0)?;
    player.wait_idle()?;

    if let Some(snapshot) = player.session_snapshot() {
        println!("session    -> {} {:?}", snapshot.id, snapshot.track_kinds);
    }

    engine.finish_item();
    player.wait_idle()?;

    engine.fail(
        NativeError::new("HeadlessErrorDomain", -1100, "The connection was lost")
            .with_reason("The network went away")
            .with_recovery_suggestion("Check the connection and try again."),
    );
    player.wait_idle()?;

    player.shutdown();
    Ok(())
}
