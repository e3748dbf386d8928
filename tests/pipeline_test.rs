use std::fs;
use std::io::Cursor;
use std::path::Path;

use image::{Rgb, RgbImage};

use posetrack_rs::integration::{
    DirectorySnapshotStore, ImageSequenceSink, ImageSequenceSource, ReplayExtractor, StreamEnd,
};
use posetrack_rs::{FrameOrchestrator, PipelineConfig};

const FRAMES: u32 = 8;

fn write_frames(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    for idx in 1..=FRAMES {
        let frame = RgbImage::from_pixel(64, 48, Rgb([30, 30, 30]));
        frame.save(dir.join(format!("{idx:04}.png"))).unwrap();
    }
}

fn replay_lines() -> String {
    let mut lines = String::new();
    for idx in 0..FRAMES {
        let x = 20.0 + idx as f32;
        // the ankle is below threshold and must be dropped
        lines.push_str(&format!(
            r#"{{"poses": [[{{"part": "Neck", "x": {x}, "y": 14.0, "confidence": 0.9}}, {{"part": "RShoulder", "x": {}, "y": 16.0, "confidence": 0.8}}, {{"part": "LShoulder", "x": {}, "y": 16.0, "confidence": 0.8}}, {{"part": "RAnkle", "x": {x}, "y": 45.0, "confidence": 0.1}}]]}}"#,
            x - 6.0,
            x + 6.0,
        ));
        lines.push('\n');
    }
    lines
}

#[test]
fn test_stream_is_annotated_and_sampled() {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("walk");
    let output = root.path().join("out");
    write_frames(&input);

    let config = PipelineConfig {
        fps: 4.0,
        ..PipelineConfig::default()
    };
    let extractor = ReplayExtractor::from_reader(Cursor::new(replay_lines()))
        .unwrap()
        .with_confidence_threshold(config.keypoint_confidence_threshold);
    let mut orchestrator = FrameOrchestrator::new(extractor, config);

    let mut source = ImageSequenceSource::open(&input, 4.0).unwrap();
    let mut sink = ImageSequenceSink::create(output.join("processed_walk"), 4.0).unwrap();
    let mut snapshots = DirectorySnapshotStore::create(output.join("screenshots")).unwrap();

    let summary = orchestrator
        .run("walk", &mut source, &mut sink, &mut snapshots)
        .unwrap();

    assert_eq!(summary.frames_read, u64::from(FRAMES));
    assert_eq!(summary.frames_processed, u64::from(FRAMES));
    assert_eq!(summary.tracks_created, 1);
    assert_eq!(summary.end, StreamEnd::Exhausted);

    let processed = output.join("processed_walk");
    assert!(processed.join("frame_000008.png").is_file());
    let manifest: serde_json::Value =
        serde_json::from_slice(&fs::read(processed.join("sequence.json")).unwrap()).unwrap();
    assert_eq!(manifest["frames"], 8);
    assert_eq!(manifest["width"], 64);

    let names: Vec<String> = summary
        .snapshots
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["walk_frame_4.png", "walk_frame_8.png"]);
    assert!(output.join("screenshots/walk_frame_4.png").is_file());

    // skeleton was drawn on the copy
    let annotated = image::open(processed.join("frame_000001.png")).unwrap().to_rgb8();
    assert!(annotated.pixels().any(|p| *p != Rgb([30, 30, 30])));
}

#[test]
fn test_exhausted_replay_passes_frames_through() {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("short");
    write_frames(&input);

    let extractor = ReplayExtractor::from_reader(Cursor::new(
        replay_lines().lines().take(2).collect::<Vec<_>>().join("\n"),
    ))
    .unwrap();
    let mut orchestrator = FrameOrchestrator::new(extractor, PipelineConfig::default());

    let mut source = ImageSequenceSource::open(&input, 30.0).unwrap();
    let mut sink = ImageSequenceSink::create(root.path().join("processed_short"), 30.0).unwrap();
    let mut snapshots = DirectorySnapshotStore::create(root.path().join("screenshots")).unwrap();

    let summary = orchestrator
        .run("short", &mut source, &mut sink, &mut snapshots)
        .unwrap();

    assert_eq!(summary.frames_processed, 2);
    assert_eq!(summary.frames_skipped, u64::from(FRAMES) - 2);
    assert_eq!(sink.frames_written(), u64::from(FRAMES));
    assert!(summary.snapshots.is_empty());

    let raw = image::open(root.path().join("processed_short/frame_000008.png"))
        .unwrap()
        .to_rgb8();
    assert!(raw.pixels().all(|p| *p == Rgb([30, 30, 30])));
}
