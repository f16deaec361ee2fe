use super::keyframe_selector::{KeyframeAssignment, KeyframeOutcome};
use super::orchestrator::{FrameFailure, PipelineOutput};
use super::persister::PersistResult;
use super::frame_source::SourceSummary;
use crate::config::KeyframeSettings;
use anyhow::{Context, Result};
use console::style;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use uuid::Uuid;

pub const REPORT_FILE: &str = "report.json";

/// 單一場景變換的報告列
#[derive(Debug, Clone, Serialize)]
pub struct CutReport {
    pub frame_number: u64,
    pub content_score: f64,
    pub focus_score: Option<f64>,
    pub detected_at_unix_secs: f64,
    pub elapsed_since_ingestion_secs: f64,
    pub keyframe: KeyframeOutcome,
}

/// 一次擷取的完整結果
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub source: String,
    pub settings: KeyframeSettings,
    pub source_summary: SourceSummary,
    pub frames_processed: u64,
    pub cuts: Vec<CutReport>,
    pub failures: Vec<FrameFailure>,
    pub persisted: Vec<PersistResult>,
    /// `report.json` 寫入失敗的原因
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_error: Option<String>,
}

impl RunReport {
    pub fn new(
        source: &str,
        settings: &KeyframeSettings,
        output: &PipelineOutput,
        assignment: &KeyframeAssignment,
        persisted: Vec<PersistResult>,
    ) -> Self {
        let cuts = output
            .cuts
            .iter()
            .map(|cut| CutReport {
                frame_number: cut.frame_number,
                content_score: cut.content_score,
                focus_score: output.focus.get(cut.frame_number).copied(),
                detected_at_unix_secs: cut
                    .detection_time
                    .duration_since(UNIX_EPOCH)
                    .map_or(0.0, |d| d.as_secs_f64()),
                elapsed_since_ingestion_secs: cut.elapsed_since_ingestion.as_secs_f64(),
                keyframe: assignment
                    .get(&cut.frame_number)
                    .copied()
                    .unwrap_or(KeyframeOutcome::Unresolved),
            })
            .collect();

        Self {
            run_id: Uuid::new_v4(),
            source: source.to_string(),
            settings: settings.clone(),
            source_summary: output.source.clone(),
            frames_processed: output.frames_processed,
            cuts,
            failures: output.failures.clone(),
            persisted,
            report_error: None,
        }
    }

    fn count_outcomes(&self, predicate: impl Fn(&KeyframeOutcome) -> bool) -> usize {
        self.cuts.iter().filter(|cut| predicate(&cut.keyframe)).count()
    }

    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.count_outcomes(|o| matches!(o, KeyframeOutcome::Resolved(_)))
    }

    #[must_use]
    pub fn unresolved_count(&self) -> usize {
        self.count_outcomes(|o| matches!(o, KeyframeOutcome::Unresolved))
    }

    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.count_outcomes(|o| matches!(o, KeyframeOutcome::SkippedTooClose))
    }

    #[must_use]
    pub fn failed_writes(&self) -> usize {
        self.persisted.iter().filter(|r| !r.success).count()
    }

    /// 寫入 `<output_dir>/report.json`
    pub fn write_json(&self, output_dir: &Path) -> Result<PathBuf> {
        let path = output_dir.join(REPORT_FILE);
        let content = serde_json::to_string_pretty(self).context("無法序列化報告")?;
        fs::write(&path, content)
            .with_context(|| format!("無法寫入報告: {}", path.display()))?;
        Ok(path)
    }

    pub fn print_summary(&self) {
        println!();
        println!("{}", style("=== 關鍵幀擷取摘要 ===").cyan().bold());
        println!("  來源: {}", self.source);
        println!(
            "  處理幀數: {}（{}）",
            self.frames_processed, self.source_summary.termination
        );
        if let Some(fps) = self.source_summary.average_fps {
            println!("  平均擷取 FPS: {fps:.2}");
        }
        println!("  場景變換: {} 個", self.cuts.len());
        println!("  找到關鍵幀: {} 個", style(self.resolved_count()).green());

        if self.unresolved_count() > 0 {
            println!("  找不到清晰幀: {} 個", style(self.unresolved_count()).yellow());
        }
        if self.skipped_count() > 0 {
            println!("  距離太近略過: {} 個", style(self.skipped_count()).dim());
        }
        if !self.failures.is_empty() {
            println!("  分析失敗: {} 幀", style(self.failures.len()).red());
        }

        let written = self.persisted.len() - self.failed_writes();
        println!("  寫入圖片: {} 張", style(written).green());
        if self.failed_writes() > 0 {
            println!("  寫入失敗: {} 張", style(self.failed_writes()).red());
        }
        if let Some(reason) = &self.report_error {
            println!("  報告寫入失敗: {}", style(reason).red());
        }

        for cut in &self.cuts {
            let focus = cut
                .focus_score
                .map_or_else(|| "-".to_string(), |s| format!("{s:.2}"));
            let keyframe = match cut.keyframe {
                KeyframeOutcome::Resolved(n) => style(format!("→ 第 {n} 幀")).green(),
                KeyframeOutcome::Unresolved => style("→ 無".to_string()).yellow(),
                KeyframeOutcome::SkippedTooClose => style("→ 略過".to_string()).dim(),
            };
            println!(
                "    第 {} 幀（差異 {:.2}，清晰度 {}） {}",
                cut.frame_number, cut.content_score, focus, keyframe
            );
        }
    }
}
