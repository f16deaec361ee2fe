//! E2E 測試 - 透過 ffmpeg 解碼真實影片檔
//!
//! 需要 ffmpeg / ffprobe，找不到時跳過

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use scene_keyframe::component::keyframe_extractor::{
    KEYFRAMES_DIR, KeyframeExtractor, KeyframeOutcome, SourceSpec, Termination,
};
use scene_keyframe::config::{Config, UserSettings};
use scene_keyframe::tools::get_video_info;
use tempfile::TempDir;

fn ffmpeg_available() -> bool {
    ["ffmpeg", "ffprobe"].iter().all(|tool| {
        Command::new(tool)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    })
}

/// 3 秒黑畫面接 3 秒 testsrc，10 fps，場景變換約在第 31 幀
fn generate_test_video(dir: &Path) -> PathBuf {
    let output = dir.join("two_scenes.mp4");
    let status = Command::new("ffmpeg")
        .args(["-y", "-loglevel", "error"])
        .args(["-f", "lavfi", "-i", "color=c=black:s=64x48:r=10:d=3"])
        .args(["-f", "lavfi", "-i", "testsrc=s=64x48:r=10:d=3"])
        .args(["-filter_complex", "[0:v][1:v]concat=n=2:v=1[out]", "-map", "[out]"])
        .args(["-c:v", "mpeg4", "-q:v", "2", "-pix_fmt", "yuv420p"])
        .arg(&output)
        .status()
        .unwrap();
    assert!(status.success(), "ffmpeg 無法產生測試影片");
    output
}

#[test]
fn test_video_file_pipeline_e2e() {
    if !ffmpeg_available() {
        println!("跳過測試：找不到 ffmpeg");
        return;
    }

    let temp_dir = TempDir::new().unwrap();
    let video = generate_test_video(temp_dir.path());

    let info = get_video_info(&video).unwrap();
    assert_eq!((info.width, info.height), (64, 48));

    let config = Config::load_embedded_media_type_table().unwrap();
    let spec = SourceSpec::parse(video.to_str().unwrap(), &config).unwrap();
    assert!(matches!(spec, SourceSpec::VideoFile(_)));

    let output_dir = temp_dir.path().join("out");
    let mut settings = UserSettings::default();
    settings.keyframe.output_dir = output_dir.clone();
    let extractor = KeyframeExtractor::new(
        Config {
            media_type_table: config,
            settings,
        },
        Arc::new(AtomicBool::new(false)),
    );

    let backend = spec.open((640, 480)).unwrap();
    let report = extractor.extract(&spec.to_string(), backend).unwrap();

    assert!(report.frames_processed >= 55, "幀數過少: {}", report.frames_processed);
    assert_eq!(report.source_summary.termination, Termination::EndOfStream);

    let cut = report
        .cuts
        .iter()
        .find(|c| (29..=33).contains(&c.frame_number))
        .expect("應偵測到黑畫面到 testsrc 的場景變換");

    let KeyframeOutcome::Resolved(keyframe) = cut.keyframe else {
        panic!("場景變換 {} 沒有關鍵幀", cut.frame_number);
    };
    assert!(keyframe >= cut.frame_number);
    assert!(
        output_dir
            .join(KEYFRAMES_DIR)
            .join(format!("frame_{keyframe}.png"))
            .exists()
    );
}
