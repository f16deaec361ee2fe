use super::cut_detector::CutEvent;
use super::frame::FrameRecord;
use super::keyframe_selector::KeyframeAssignment;
use super::store::FrozenMap;
use crate::config::ImageFormat;
use crate::error::{PipelineError, PipelineResult};
use crate::tools::{calculate_pixel_hash, ensure_directory_exists};
use image::RgbImage;
use log::{debug, error};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// 場景變換幀輸出資料夾
pub const SCENE_CHANGES_DIR: &str = "scene_changes";
/// 關鍵幀輸出資料夾
pub const KEYFRAMES_DIR: &str = "no_blur_scene_changes";

/// 影像寫入（外部協作者介面）
pub trait ImageWriter: Send + Sync {
    fn write(&self, path: &Path, image: &RgbImage) -> PipelineResult<()>;
}

/// 依副檔名決定編碼格式，寫入本機檔案
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFileWriter;

impl ImageWriter for ImageFileWriter {
    fn write(&self, path: &Path, image: &RgbImage) -> PipelineResult<()> {
        image
            .save(path)
            .map_err(|e| PipelineError::PersistenceFailure {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistKind {
    SceneChange,
    Keyframe,
}

/// 寫入任務
#[derive(Debug, Clone)]
pub struct PersistTask {
    pub kind: PersistKind,
    pub frame_number: u64,
    pub output_path: PathBuf,
}

/// 寫入結果
#[derive(Debug, Clone, Serialize)]
pub struct PersistResult {
    pub kind: PersistKind,
    pub frame_number: u64,
    pub output_path: PathBuf,
    pub success: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct PersistOptions {
    pub save_scene_changes: bool,
    pub save_keyframes: bool,
    pub image_format: ImageFormat,
    /// 寫入後重新讀回並比對像素 hash（僅限無損格式）
    pub verify_writes: bool,
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self {
            save_scene_changes: true,
            save_keyframes: true,
            image_format: ImageFormat::Png,
            verify_writes: false,
        }
    }
}

#[must_use]
pub fn frame_file_name(frame_number: u64, format: ImageFormat) -> String {
    format!("frame_{frame_number}.{}", format.extension())
}

/// 建立寫入任務列表
#[must_use]
pub fn create_persist_tasks(
    cuts: &[CutEvent],
    assignment: &KeyframeAssignment,
    output_dir: &Path,
    options: &PersistOptions,
) -> Vec<PersistTask> {
    let mut tasks = Vec::new();

    if options.save_scene_changes {
        let dir = output_dir.join(SCENE_CHANGES_DIR);
        tasks.extend(cuts.iter().map(|cut| PersistTask {
            kind: PersistKind::SceneChange,
            frame_number: cut.frame_number,
            output_path: dir.join(frame_file_name(cut.frame_number, options.image_format)),
        }));
    }

    if options.save_keyframes {
        let dir = output_dir.join(KEYFRAMES_DIR);
        tasks.extend(
            assignment
                .values()
                .filter_map(super::keyframe_selector::KeyframeOutcome::frame_number)
                .map(|frame_number| PersistTask {
                    kind: PersistKind::Keyframe,
                    frame_number,
                    output_path: dir.join(frame_file_name(frame_number, options.image_format)),
                }),
        );
    }

    tasks
}

/// 影像寫入器
///
/// 每個檔案各自成功或失敗，失敗只記錄不中斷其他寫入。
pub struct Persister {
    writer: Box<dyn ImageWriter>,
    options: PersistOptions,
}

impl Persister {
    pub fn new(writer: impl ImageWriter + 'static, options: PersistOptions) -> Self {
        Self {
            writer: Box::new(writer),
            options,
        }
    }

    #[must_use]
    pub fn with_options(options: PersistOptions) -> Self {
        Self::new(ImageFileWriter, options)
    }

    /// 平行寫入所有場景變換幀與關鍵幀
    pub fn persist(
        &self,
        cuts: &[CutEvent],
        assignment: &KeyframeAssignment,
        timeline: &FrozenMap<FrameRecord>,
        output_dir: &Path,
    ) -> Vec<PersistResult> {
        let tasks = create_persist_tasks(cuts, assignment, output_dir, &self.options);
        if tasks.is_empty() {
            return Vec::new();
        }

        let mut directories: Vec<&Path> = tasks
            .iter()
            .filter_map(|task| task.output_path.parent())
            .collect();
        directories.sort_unstable();
        directories.dedup();
        let directory_errors: Vec<(PathBuf, String)> = directories
            .into_iter()
            .filter_map(|dir| {
                ensure_directory_exists(dir)
                    .err()
                    .map(|e| (dir.to_path_buf(), e.to_string()))
            })
            .collect();

        tasks
            .par_iter()
            .map(|task| {
                let result = match directory_errors
                    .iter()
                    .find(|(dir, _)| task.output_path.starts_with(dir))
                {
                    Some((dir, reason)) => Err(PipelineError::PersistenceFailure {
                        path: dir.clone(),
                        reason: format!("無法建立資料夾: {reason}"),
                    }),
                    None => self.persist_one(task, timeline),
                };

                match result {
                    Ok(()) => {
                        debug!("已寫入第 {} 幀: {}", task.frame_number, task.output_path.display());
                        PersistResult {
                            kind: task.kind,
                            frame_number: task.frame_number,
                            output_path: task.output_path.clone(),
                            success: true,
                            error_message: None,
                        }
                    }
                    Err(e) => {
                        error!("第 {} 幀寫入失敗: {e}", task.frame_number);
                        PersistResult {
                            kind: task.kind,
                            frame_number: task.frame_number,
                            output_path: task.output_path.clone(),
                            success: false,
                            error_message: Some(e.to_string()),
                        }
                    }
                }
            })
            .collect()
    }

    fn persist_one(&self, task: &PersistTask, timeline: &FrozenMap<FrameRecord>) -> PipelineResult<()> {
        let record = timeline
            .get(task.frame_number)
            .ok_or_else(|| PipelineError::PersistenceFailure {
                path: task.output_path.clone(),
                reason: format!("找不到第 {} 幀", task.frame_number),
            })?;

        self.writer.write(&task.output_path, &record.image)?;

        if self.options.verify_writes && self.options.image_format.is_lossless() {
            verify_round_trip(&task.output_path, &record.image)?;
        }
        Ok(())
    }
}

/// 讀回檔案並比對像素 hash
pub fn verify_round_trip(path: &Path, expected: &RgbImage) -> PipelineResult<()> {
    let failure = |reason: String| PipelineError::PersistenceFailure {
        path: path.to_path_buf(),
        reason,
    };

    let reread = image::open(path)
        .map_err(|e| failure(format!("無法讀回: {e}")))?
        .to_rgb8();

    let (width, height) = expected.dimensions();
    let expected_hash = calculate_pixel_hash(width, height, expected.as_raw());
    let (reread_width, reread_height) = reread.dimensions();
    let actual_hash = calculate_pixel_hash(reread_width, reread_height, reread.as_raw());

    if expected_hash == actual_hash {
        Ok(())
    } else {
        Err(failure("讀回內容與原始幀不一致".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::keyframe_extractor::keyframe_selector::KeyframeOutcome;
    use image::Rgb;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn cut(frame_number: u64) -> CutEvent {
        CutEvent {
            frame_number,
            detection_time: SystemTime::now(),
            elapsed_since_ingestion: Duration::ZERO,
            content_score: 20.0,
        }
    }

    fn timeline(count: u64) -> FrozenMap<FrameRecord> {
        (1..=count)
            .map(|n| {
                let image = RgbImage::from_fn(8, 6, |x, y| Rgb([(x * 30) as u8, (y * 40) as u8, n as u8]));
                (n, FrameRecord::new(n, image))
            })
            .collect()
    }

    struct FailingWriter;

    impl ImageWriter for FailingWriter {
        fn write(&self, path: &Path, _image: &RgbImage) -> PipelineResult<()> {
            if path.to_string_lossy().contains("frame_2.") {
                return Err(PipelineError::PersistenceFailure {
                    path: path.to_path_buf(),
                    reason: "disk full".to_string(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn test_create_persist_tasks_layout() {
        let mut assignment = KeyframeAssignment::new();
        assignment.insert(1, KeyframeOutcome::Resolved(3));
        assignment.insert(10, KeyframeOutcome::Unresolved);

        let tasks = create_persist_tasks(
            &[cut(1), cut(10)],
            &assignment,
            Path::new("/out"),
            &PersistOptions::default(),
        );

        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].output_path, PathBuf::from("/out/scene_changes/frame_1.png"));
        assert_eq!(tasks[1].output_path, PathBuf::from("/out/scene_changes/frame_10.png"));
        assert_eq!(
            tasks[2].output_path,
            PathBuf::from("/out/no_blur_scene_changes/frame_3.png")
        );
    }

    #[test]
    fn test_create_persist_tasks_respects_flags() {
        let mut assignment = KeyframeAssignment::new();
        assignment.insert(1, KeyframeOutcome::Resolved(2));
        let options = PersistOptions {
            save_scene_changes: false,
            image_format: ImageFormat::Jpg,
            ..PersistOptions::default()
        };

        let tasks = create_persist_tasks(&[cut(1)], &assignment, Path::new("/out"), &options);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].kind, PersistKind::Keyframe);
        assert!(tasks[0].output_path.ends_with("frame_2.jpg"));
    }

    #[test]
    fn test_persisted_keyframe_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let timeline = timeline(4);
        let mut assignment = KeyframeAssignment::new();
        assignment.insert(1, KeyframeOutcome::Resolved(3));

        let persister = Persister::with_options(PersistOptions {
            verify_writes: true,
            ..PersistOptions::default()
        });
        let results = persister.persist(&[cut(1)], &assignment, &timeline, temp_dir.path());

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success));

        let keyframe_path = temp_dir.path().join(KEYFRAMES_DIR).join("frame_3.png");
        let reread = image::open(&keyframe_path).unwrap().to_rgb8();
        assert_eq!(reread.as_raw(), timeline.get(3).unwrap().image.as_raw());
    }

    #[test]
    fn test_failed_write_does_not_abort_others() {
        let temp_dir = TempDir::new().unwrap();
        let timeline = timeline(5);
        let assignment = KeyframeAssignment::new();

        let persister = Persister::new(FailingWriter, PersistOptions::default());
        let results = persister.persist(&[cut(1), cut(2), cut(4)], &assignment, &timeline, temp_dir.path());

        assert_eq!(results.len(), 3);
        let failed: Vec<u64> = results.iter().filter(|r| !r.success).map(|r| r.frame_number).collect();
        assert_eq!(failed, vec![2]);
    }

    #[test]
    fn test_missing_frame_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let persister = Persister::with_options(PersistOptions::default());
        let results = persister.persist(&[cut(9)], &KeyframeAssignment::new(), &timeline(2), temp_dir.path());

        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert!(results[0].error_message.is_some());
    }

    #[test]
    fn test_verify_round_trip_detects_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("frame.png");
        let original = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));
        original.save(&path).unwrap();

        assert!(verify_round_trip(&path, &original).is_ok());
        let different = RgbImage::from_pixel(4, 4, Rgb([9, 9, 9]));
        assert!(verify_round_trip(&path, &different).is_err());
    }
}
