//! 逐幀分析流程
//!
//! 擷取執行緒把幀送進 FIFO 通道，主迴圈一次取一幀：
//! 1. 寫入時間軸
//! 2. 同一幀同時交給清晰度評分與場景偵測
//! 3. 兩者都完成（屏障）才取下一幀，確保場景偵測器依序收到每一幀
//!
//! 單幀分析失敗只記錄，不中斷整個流程。

use super::cut_detector::{CutDetector, CutEvent};
use super::focus_scorer::FocusScorer;
use super::frame::FrameRecord;
use super::frame_source::{FrameSource, SourceSummary};
use super::store::{AppendOnlyMap, FrozenMap};
use crate::error::PipelineError;
use anyhow::{Context, Result, anyhow};
use indicatif::ProgressBar;
use log::{error, info};
use serde::Serialize;

/// 單幀分析失敗紀錄
#[derive(Debug, Clone, Serialize)]
pub struct FrameFailure {
    pub frame_number: u64,
    pub analyzer: &'static str,
    pub reason: String,
}

impl FrameFailure {
    fn from_error(frame_number: u64, analyzer: &'static str, error: &PipelineError) -> Self {
        let reason = match error {
            PipelineError::AnalyzerFailure { reason, .. } => reason.clone(),
            other => other.to_string(),
        };
        Self {
            frame_number,
            analyzer,
            reason,
        }
    }
}

/// 擷取結束後凍結的結果，之後只會被唯讀使用
#[derive(Debug)]
pub struct PipelineOutput {
    pub timeline: FrozenMap<FrameRecord>,
    pub focus: FrozenMap<f64>,
    /// 依幀序號遞增排序
    pub cuts: Vec<CutEvent>,
    pub failures: Vec<FrameFailure>,
    pub frames_processed: u64,
    pub source: SourceSummary,
}

pub struct Orchestrator {
    focus_scorer: FocusScorer,
    cut_detector: CutDetector,
    pool: rayon::ThreadPool,
    progress: ProgressBar,
}

impl Orchestrator {
    pub fn new(focus_scorer: FocusScorer, cut_detector: CutDetector) -> Result<Self> {
        // 每幀只有兩個分析任務，固定兩條執行緒
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .thread_name(|index| format!("frame-analyzer-{index}"))
            .build()
            .context("無法建立分析執行緒池")?;

        Ok(Self {
            focus_scorer,
            cut_detector,
            pool,
            progress: ProgressBar::hidden(),
        })
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn run(mut self, source: FrameSource) -> Result<PipelineOutput> {
        let frame_cap = source.frame_cap();
        let (sender, receiver) = crossbeam_channel::unbounded();
        let producer = source
            .spawn_producer(sender)
            .context("無法啟動擷取執行緒")?;

        let timeline = AppendOnlyMap::new();
        let focus = AppendOnlyMap::new();
        let cuts = AppendOnlyMap::new();
        let mut failures = Vec::new();
        let mut highest_processed = 0;

        // 通道關閉即為結束標記，空佇列時阻塞等待
        for frame in &receiver {
            let frame_number = frame.frame_number;
            self.process_frame(frame, &timeline, &focus, &cuts, &mut failures);

            highest_processed = frame_number;
            self.progress.inc(1);
            if highest_processed >= frame_cap {
                break;
            }
        }
        drop(receiver);

        let source = producer
            .join()
            .map_err(|_| anyhow!("擷取執行緒異常結束"))?;
        self.progress.finish_and_clear();

        let output = PipelineOutput {
            timeline: timeline.freeze(),
            focus: focus.freeze(),
            cuts: cuts.freeze().values().cloned().collect(),
            failures,
            frames_processed: highest_processed,
            source,
        };

        info!(
            "分析完成: {} 幀，{} 個場景變換，{} 筆分析失敗",
            output.frames_processed,
            output.cuts.len(),
            output.failures.len()
        );
        Ok(output)
    }

    fn process_frame(
        &mut self,
        frame: FrameRecord,
        timeline: &AppendOnlyMap<FrameRecord>,
        focus: &AppendOnlyMap<f64>,
        cuts: &AppendOnlyMap<CutEvent>,
        failures: &mut Vec<FrameFailure>,
    ) {
        let frame_number = frame.frame_number;
        timeline.put_if_absent(frame_number, frame.clone());

        let Self {
            focus_scorer,
            cut_detector,
            pool,
            ..
        } = self;

        let (focus_result, cut_result) = pool.join(
            || {
                focus_scorer
                    .score(&frame)
                    .map(|score| focus.put_if_absent(frame_number, score))
            },
            || {
                cut_detector.process(&frame).map(|event| {
                    if let Some(event) = &event {
                        cuts.put_if_absent(event.frame_number, event.clone());
                    }
                    event
                })
            },
        );

        if let Err(e) = focus_result {
            error!("第 {frame_number} 幀清晰度評分失敗: {e}");
            failures.push(FrameFailure::from_error(frame_number, "focus", &e));
        }

        match cut_result {
            Ok(Some(event)) => {
                info!(
                    "偵測到場景變換: 第 {} 幀，清晰度 {}，擷取後經過 {:.3} 秒",
                    event.frame_number,
                    focus
                        .get(event.frame_number)
                        .map_or_else(|| "unknown".to_string(), |s| format!("{s:.2}")),
                    event.elapsed_since_ingestion.as_secs_f64()
                );
            }
            Ok(None) => {}
            Err(e) => {
                error!("第 {frame_number} 幀場景偵測失敗: {e}");
                failures.push(FrameFailure::from_error(frame_number, "cut", &e));
            }
        }
    }
}
