//! 場景變換關鍵幀擷取元件
//!
//! 四階段流程：
//! A. 逐幀擷取，幀序號從 1 連續遞增
//! B. 每幀同時計算清晰度與場景差異（逐幀屏障）
//! C. 擷取結束後為每個場景變換選出清晰的關鍵幀
//! D. 平行寫出場景變換幀、關鍵幀與報告

mod capture;
mod cut_detector;
mod focus_scorer;
mod frame;
mod frame_source;
mod keyframe_selector;
mod main;
mod orchestrator;
mod persister;
mod report;
mod store;

pub use capture::{CaptureBackend, FfmpegCapture, ImageSequenceCapture, MemoryCapture, SourceSpec};
pub use cut_detector::{
    ContentDetector, CutDetector, CutDetectorConfig, CutEvent, CutSignal, DEFAULT_MIN_SCENE_LEN,
    OrderedCutDetector,
};
pub use focus_scorer::{FocusMeasure, FocusScorer, LaplacianVariance};
pub use frame::{FrameImage, FrameRecord};
pub use frame_source::{DEFAULT_FRAME_CAP, FrameSource, SourceSummary, Termination};
pub use keyframe_selector::{KeyframeAssignment, KeyframeOutcome, KeyframeSelector};
pub use main::KeyframeExtractor;
pub use orchestrator::{FrameFailure, Orchestrator, PipelineOutput};
pub use persister::{
    ImageFileWriter, ImageWriter, KEYFRAMES_DIR, PersistKind, PersistOptions, PersistResult,
    PersistTask, Persister, SCENE_CHANGES_DIR, create_persist_tasks, frame_file_name,
    verify_round_trip,
};
pub use report::{CutReport, REPORT_FILE, RunReport};
pub use store::{AppendOnlyMap, FrozenMap};
