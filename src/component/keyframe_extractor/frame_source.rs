use super::capture::CaptureBackend;
use super::frame::FrameRecord;
use crossbeam_channel::Sender;
use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// 預設幀數上限
pub const DEFAULT_FRAME_CAP: u64 = 500;

/// 每多少幀計算一次擷取 FPS
const FPS_WINDOW: u64 = 30;

/// 串流結束的原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Termination {
    EndOfStream,
    FrameCap,
    Stopped,
    /// 擷取中途失敗，視為正常結束
    ReadError(String),
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndOfStream => write!(f, "end of stream"),
            Self::FrameCap => write!(f, "frame cap reached"),
            Self::Stopped => write!(f, "stopped"),
            Self::ReadError(reason) => write!(f, "read error: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub frames_produced: u64,
    pub termination: Termination,
    /// 整段擷取的平均 FPS，少於兩幀時為 None
    pub average_fps: Option<f64>,
}

#[derive(Debug)]
struct FpsMeter {
    first_frame: Option<Instant>,
    last_frame: Option<Instant>,
    window_start: Option<Instant>,
    window_count: u64,
}

impl FpsMeter {
    const fn new() -> Self {
        Self {
            first_frame: None,
            last_frame: None,
            window_start: None,
            window_count: 0,
        }
    }

    fn tick(&mut self, now: Instant) {
        self.first_frame.get_or_insert(now);
        self.last_frame = Some(now);

        let window_start = *self.window_start.get_or_insert(now);
        self.window_count += 1;
        if self.window_count == FPS_WINDOW {
            let elapsed = now.duration_since(window_start).as_secs_f64();
            if elapsed > 0.0 {
                debug!("擷取 FPS: {:.2}", FPS_WINDOW as f64 / elapsed);
            }
            self.window_start = Some(now);
            self.window_count = 0;
        }
    }

    fn average(&self, frames: u64) -> Option<f64> {
        let (first, last) = (self.first_frame?, self.last_frame?);
        let elapsed = last.duration_since(first).as_secs_f64();
        (frames > 1 && elapsed > 0.0).then(|| (frames - 1) as f64 / elapsed)
    }
}

/// 有上限、依序編號的幀來源
///
/// 幀序號從 1 開始連續遞增；讀取錯誤、停止訊號與幀數上限都會讓 `next` 回傳 `None`。
pub struct FrameSource {
    backend: Box<dyn CaptureBackend>,
    frame_cap: u64,
    produced: u64,
    stop_signal: Arc<AtomicBool>,
    termination: Option<Termination>,
    fps: FpsMeter,
}

impl FrameSource {
    pub fn new(backend: Box<dyn CaptureBackend>, frame_cap: u64) -> Self {
        Self::with_stop_signal(backend, frame_cap, Arc::new(AtomicBool::new(false)))
    }

    pub fn with_stop_signal(
        backend: Box<dyn CaptureBackend>,
        frame_cap: u64,
        stop_signal: Arc<AtomicBool>,
    ) -> Self {
        Self {
            backend,
            frame_cap: frame_cap.max(1),
            produced: 0,
            stop_signal,
            termination: None,
            fps: FpsMeter::new(),
        }
    }

    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub const fn frame_cap(&self) -> u64 {
        self.frame_cap
    }

    #[must_use]
    pub const fn termination(&self) -> Option<&Termination> {
        self.termination.as_ref()
    }

    pub fn next(&mut self) -> Option<FrameRecord> {
        if self.termination.is_some() {
            return None;
        }

        if self.stop_signal.load(Ordering::SeqCst) {
            self.finish(Termination::Stopped);
            return None;
        }

        if self.produced >= self.frame_cap {
            self.finish(Termination::FrameCap);
            return None;
        }

        match self.backend.read() {
            Ok(Some(image)) => {
                self.produced += 1;
                let record = FrameRecord::new(self.produced, image);
                self.fps.tick(record.ingestion_time);
                Some(record)
            }
            Ok(None) => {
                self.finish(Termination::EndOfStream);
                None
            }
            Err(e) => {
                warn!("第 {} 幀讀取失敗，結束串流: {e}", self.produced + 1);
                self.finish(Termination::ReadError(e.to_string()));
                None
            }
        }
    }

    fn finish(&mut self, termination: Termination) {
        info!("來源結束（{termination}），共 {} 幀", self.produced);
        self.backend.release();
        self.termination = Some(termination);
    }

    #[must_use]
    pub fn summary(&self) -> SourceSummary {
        SourceSummary {
            frames_produced: self.produced,
            termination: self
                .termination
                .clone()
                .unwrap_or(Termination::EndOfStream),
            average_fps: self.fps.average(self.produced),
        }
    }

    /// 在獨立執行緒中持續產生幀，送完後關閉通道作為結束標記
    pub fn spawn_producer(mut self, sender: Sender<FrameRecord>) -> std::io::Result<JoinHandle<SourceSummary>> {
        thread::Builder::new()
            .name("frame-source".to_string())
            .spawn(move || {
                while let Some(frame) = self.next() {
                    if sender.send(frame).is_err() {
                        warn!("消費端已關閉，停止擷取");
                        self.finish(Termination::Stopped);
                        break;
                    }
                }
                drop(sender);
                self.summary()
            })
    }
}
