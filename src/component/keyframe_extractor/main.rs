use super::capture::{CaptureBackend, SourceSpec};
use super::cut_detector::{CutDetector, CutDetectorConfig};
use super::focus_scorer::FocusScorer;
use super::frame_source::FrameSource;
use super::keyframe_selector::KeyframeSelector;
use super::orchestrator::Orchestrator;
use super::persister::{PersistOptions, Persister};
use super::report::RunReport;
use crate::config::save::{add_recent_source, save_settings};
use crate::config::{Config, KeyframeSettings};
use crate::tools::ensure_directory_exists;
use anyhow::Result;
use console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// 場景變換關鍵幀擷取器
///
/// 四階段流程：
/// A. 逐幀擷取（影片檔、圖片序列或攝影機）
/// B. 每幀同時計算清晰度與場景差異
/// C. 為每個場景變換選出之後第一個清晰幀
/// D. 平行寫出圖片與報告
pub struct KeyframeExtractor {
    config: Config,
    shutdown_signal: Arc<AtomicBool>,
}

impl KeyframeExtractor {
    pub const fn new(config: Config, shutdown_signal: Arc<AtomicBool>) -> Self {
        Self {
            config,
            shutdown_signal,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub fn run(&mut self) -> Result<()> {
        println!("{}", style("=== 場景變換關鍵幀擷取 ===").cyan().bold());

        self.config.settings.keyframe.validate()?;

        let Some(input) = self.prompt_source()? else {
            return Ok(());
        };
        let spec = SourceSpec::parse(&input, &self.config.media_type_table)?;
        println!("{} {}", style("來源:").dim(), spec);
        println!(
            "{} {}",
            style("輸出資料夾:").dim(),
            self.config.settings.keyframe.output_dir.display()
        );

        add_recent_source(&mut self.config.settings, &input);
        if let Err(e) = save_settings(&self.config.settings) {
            warn!("無法儲存最近使用的來源: {e:#}");
        }

        let settings = &self.config.settings.keyframe;
        let backend = spec.open((settings.camera_width, settings.camera_height))?;

        println!("{}", style("開始擷取...（Ctrl-C 可提前結束）").cyan());
        let report = self.extract(&spec.to_string(), backend)?;
        report.print_summary();

        Ok(())
    }

    fn prompt_source(&self) -> Result<Option<String>> {
        let recent = &self.config.settings.recent_sources;

        if !recent.is_empty() {
            let mut items = recent.clone();
            items.push("輸入新的來源...".to_string());

            let selection = Select::with_theme(&ColorfulTheme::default())
                .with_prompt("請選擇來源")
                .items(&items)
                .default(0)
                .interact_opt()?;

            match selection {
                None => return Ok(None),
                Some(index) if index < recent.len() => return Ok(Some(recent[index].clone())),
                Some(_) => {}
            }
        }

        let input: String = Input::new()
            .with_prompt("請輸入影片檔、圖片序列資料夾或攝影機編號")
            .interact_text()?;
        Ok(Some(input.trim().to_string()))
    }

    /// 對已開啟的擷取來源執行完整流程
    pub fn extract(&self, source_label: &str, backend: Box<dyn CaptureBackend>) -> Result<RunReport> {
        let settings = &self.config.settings.keyframe;
        settings.validate()?;
        ensure_directory_exists(&settings.output_dir)?;

        let source = FrameSource::with_stop_signal(
            backend,
            settings.frame_cap,
            Arc::clone(&self.shutdown_signal),
        );
        let orchestrator = Orchestrator::new(FocusScorer::default(), cut_detector(settings))?
            .with_progress(progress_bar(settings.frame_cap)?);
        let output = orchestrator.run(source)?;
        if output.timeline.is_empty() {
            warn!("來源沒有產生任何幀: {source_label}");
        }

        let assignment = KeyframeSelector::new(settings.blur_threshold, settings.frame_cap)
            .with_policy(settings.keyframe_policy)
            .select(&output.cuts, &output.focus);

        let persister = Persister::with_options(persist_options(settings));
        let persisted = persister.persist(
            &output.cuts,
            &assignment,
            &output.timeline,
            &settings.output_dir,
        );

        let mut report = RunReport::new(source_label, settings, &output, &assignment, persisted);
        if settings.write_report {
            // 報告寫不出來不影響已寫出的圖片，記在回傳的報告裡
            match report.write_json(&settings.output_dir) {
                Ok(path) => info!("報告已寫入: {}", path.display()),
                Err(e) => {
                    error!("報告寫入失敗: {e:#}");
                    report.report_error = Some(format!("{e:#}"));
                }
            }
        }

        Ok(report)
    }
}

fn cut_detector(settings: &KeyframeSettings) -> CutDetector {
    CutDetector::with_config(CutDetectorConfig {
        content_threshold: settings.content_threshold,
        min_scene_len: settings.min_scene_len,
    })
}

const fn persist_options(settings: &KeyframeSettings) -> PersistOptions {
    PersistOptions {
        save_scene_changes: settings.save_scene_changes,
        save_keyframes: settings.save_blur_frames,
        image_format: settings.image_format,
        verify_writes: settings.verify_writes,
    }
}

fn progress_bar(frame_cap: u64) -> Result<ProgressBar> {
    let progress_bar = ProgressBar::new(frame_cap);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    progress_bar.set_message("分析中...");
    Ok(progress_bar)
}
