//! 擷取／解碼協作者
//!
//! `CaptureBackend` 對應「開啟 → 逐幀讀取 → 釋放」的生命週期，開啟即為建構。

use crate::config::MediaTypeTable;
use crate::error::{PipelineError, PipelineResult};
use crate::tools::{get_video_info, validate_directory_exists};
use image::RgbImage;
use log::{debug, info, warn};
use regex::Regex;
use std::collections::VecDeque;
use std::fmt;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};
use walkdir::WalkDir;

/// 讀取結果為 `Ok(None)` 代表來源已正常結束
pub trait CaptureBackend: Send {
    fn read(&mut self) -> PipelineResult<Option<RgbImage>>;

    fn release(&mut self) {}
}

/// 使用者輸入的來源描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// 攝影機裝置編號（Linux 上為 /dev/video<N>）
    Camera(u32),
    VideoFile(PathBuf),
    /// 內含靜態影像的資料夾，依檔名中的數字排序
    ImageSequence(PathBuf),
}

impl SourceSpec {
    /// 資料夾視為影像序列，影片副檔名視為影片檔，不存在的純數字視為攝影機編號
    pub fn parse(input: &str, media_types: &MediaTypeTable) -> PipelineResult<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(PipelineError::source_unavailable(input, "來源為空"));
        }

        // 已存在的路徑優先，避免名為數字的資料夾被當成攝影機
        let path = PathBuf::from(input);
        if !path.exists() {
            if let Ok(index) = input.parse::<u32>() {
                return Ok(Self::Camera(index));
            }
        }

        if path.is_dir() {
            return Ok(Self::ImageSequence(path));
        }
        if !path.exists() {
            return Err(PipelineError::source_unavailable(input, "檔案不存在"));
        }
        if media_types.is_video_file(&path) {
            return Ok(Self::VideoFile(path));
        }

        Err(PipelineError::source_unavailable(input, "不支援的檔案類型"))
    }

    pub fn open(&self, camera_size: (u32, u32)) -> PipelineResult<Box<dyn CaptureBackend>> {
        match self {
            Self::Camera(index) => Ok(Box::new(FfmpegCapture::open_camera(*index, camera_size)?)),
            Self::VideoFile(path) => Ok(Box::new(FfmpegCapture::open_video(path)?)),
            Self::ImageSequence(dir) => Ok(Box::new(ImageSequenceCapture::open(dir)?)),
        }
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Camera(index) => write!(f, "camera:{index}"),
            Self::VideoFile(path) => write!(f, "video:{}", path.display()),
            Self::ImageSequence(dir) => write!(f, "images:{}", dir.display()),
        }
    }
}

/// ffmpeg 錯誤輸出保留的最後幾行
const STDERR_TAIL_LINES: usize = 8;

/// 透過 ffmpeg 子程序輸出 RGB24 原始幀
///
/// 開啟時會先讀第一幀：ffmpeg 在產生任何幀之前就失敗，視為來源無法開啟。
pub struct FfmpegCapture {
    source_id: String,
    child: Option<Child>,
    stdout: Option<BufReader<ChildStdout>>,
    stderr_tail: Option<JoinHandle<String>>,
    first_frame: Option<RgbImage>,
    width: u32,
    height: u32,
    frames_read: u64,
}

impl FfmpegCapture {
    pub fn open_video(path: &Path) -> PipelineResult<Self> {
        let source_id = path.display().to_string();
        if !path.is_file() {
            return Err(PipelineError::source_unavailable(source_id, "檔案不存在"));
        }

        let info = get_video_info(path)
            .map_err(|e| PipelineError::source_unavailable(source_id.clone(), format!("{e:#}")))?;
        // ffmpeg 預設會依旋轉資訊轉正畫面，輸出尺寸以轉正後為準
        let (width, height) = info.output_dimensions();
        info!(
            "開啟影片 {}: {}x{}（旋轉 {}°）@ {:.2} fps，長度 {}",
            source_id,
            width,
            height,
            info.rotation,
            info.frame_rate,
            info.duration_seconds
                .map_or_else(|| "unknown".to_string(), |d| format!("{d:.1} 秒"))
        );

        let mut command = Self::base_command();
        command.arg("-i").arg(path);
        Self::add_output_args(&mut command);
        Self::spawn(source_id, command, width, height)
    }

    pub fn open_camera(index: u32, (width, height): (u32, u32)) -> PipelineResult<Self> {
        let device = format!("/dev/video{index}");
        if !Path::new(&device).exists() {
            return Err(PipelineError::source_unavailable(device, "找不到攝影機裝置"));
        }
        info!("開啟攝影機 {device}: {width}x{height}");

        let video_size = format!("{width}x{height}");
        let scale = format!("scale={width}:{height}");
        let mut command = Self::base_command();
        command.args([
            "-f",
            "v4l2",
            "-video_size",
            video_size.as_str(),
            "-i",
            device.as_str(),
            "-vf",
            scale.as_str(),
        ]);
        Self::add_output_args(&mut command);
        Self::spawn(device, command, width, height)
    }

    fn base_command() -> Command {
        let mut command = Command::new("ffmpeg");
        command.args(["-hide_banner", "-nostdin", "-loglevel", "error"]);
        command
    }

    fn add_output_args(command: &mut Command) {
        command.args(["-an", "-sn", "-dn", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"]);
    }

    /// 啟動子程序並預讀第一幀
    fn spawn(source_id: String, mut command: Command, width: u32, height: u32) -> PipelineResult<Self> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| PipelineError::source_unavailable(source_id.clone(), format!("無法執行 ffmpeg: {e}")))?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let mut capture = Self {
            source_id,
            child: Some(child),
            stdout: stdout.map(BufReader::new),
            stderr_tail: None,
            first_frame: None,
            width,
            height,
            frames_read: 0,
        };

        if capture.stdout.is_none() {
            return Err(PipelineError::source_unavailable(capture.source_id.clone(), "無法取得 ffmpeg 輸出"));
        }
        if let Some(stderr) = stderr {
            let tail = collect_stderr_tail(stderr)
                .map_err(|e| PipelineError::source_unavailable(capture.source_id.clone(), e))?;
            capture.stderr_tail = Some(tail);
        }

        match capture.read_frame() {
            Ok(first_frame) => {
                capture.first_frame = first_frame;
                Ok(capture)
            }
            Err(e) => {
                let reason = match e {
                    PipelineError::ReadError { reason, .. } => reason,
                    other => other.to_string(),
                };
                Err(PipelineError::source_unavailable(capture.source_id.clone(), reason))
            }
        }
    }

    const fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    fn read_frame(&mut self) -> PipelineResult<Option<RgbImage>> {
        let frame_bytes = self.frame_bytes();
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let mut buffer = vec![0u8; frame_bytes];
        let filled = read_full(stdout, &mut buffer).map_err(|e| PipelineError::ReadError {
            frame_number: self.frames_read + 1,
            reason: e.to_string(),
        })?;

        if filled < frame_bytes {
            // 輸出結束：只有 ffmpeg 正常結束且沒有殘缺幀才算串流結束
            let failure = self.wait_child();
            if filled == 0 && failure.is_none() {
                return Ok(None);
            }
            return Err(PipelineError::ReadError {
                frame_number: self.frames_read + 1,
                reason: failure
                    .unwrap_or_else(|| format!("幀資料不完整: {filled}/{frame_bytes} bytes")),
            });
        }

        self.frames_read += 1;
        RgbImage::from_raw(self.width, self.height, buffer)
            .map(Some)
            .ok_or_else(|| PipelineError::ReadError {
                frame_number: self.frames_read,
                reason: "無法建立影像".to_string(),
            })
    }

    /// 等待子程序結束，非零結束碼回傳錯誤描述（含 stderr 最後幾行）
    fn wait_child(&mut self) -> Option<String> {
        self.stdout = None;
        let mut child = self.child.take()?;
        let status = child.wait();
        let tail = self.take_stderr_tail();

        match status {
            Ok(status) if status.success() => None,
            Ok(status) if tail.is_empty() => Some(format!("ffmpeg 異常結束（{status}）")),
            Ok(status) => Some(format!("ffmpeg 異常結束（{status}）: {tail}")),
            Err(e) => Some(format!("無法取得 ffmpeg 結束狀態: {e}")),
        }
    }

    fn take_stderr_tail(&mut self) -> String {
        self.stderr_tail
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }
}

impl CaptureBackend for FfmpegCapture {
    fn read(&mut self) -> PipelineResult<Option<RgbImage>> {
        if let Some(frame) = self.first_frame.take() {
            return Ok(Some(frame));
        }
        self.read_frame()
    }

    fn release(&mut self) {
        self.stdout = None;
        self.first_frame = None;
        if let Some(mut child) = self.child.take() {
            // 提前結束時 ffmpeg 仍在輸出，直接終止
            let _ = child.kill();
            let _ = child.wait();
            debug!("已釋放 ffmpeg 來源: {}（讀取 {} 幀）", self.source_id, self.frames_read);
        }
        self.take_stderr_tail();
    }
}

impl Drop for FfmpegCapture {
    fn drop(&mut self) {
        self.release();
    }
}

/// 在背景執行緒讀完 stderr，避免管線塞滿卡住 ffmpeg
fn collect_stderr_tail(stderr: ChildStderr) -> std::io::Result<JoinHandle<String>> {
    thread::Builder::new()
        .name("ffmpeg-stderr".to_string())
        .spawn(move || {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Vec::from(tail).join(" | ")
        })
}

/// 盡量填滿 buffer，回傳實際讀到的位元組數（0 代表 EOF）
fn read_full(reader: &mut impl Read, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// 資料夾中的靜態影像序列
pub struct ImageSequenceCapture {
    pending: VecDeque<PathBuf>,
    frames_read: u64,
}

impl ImageSequenceCapture {
    pub fn open(directory: &Path) -> PipelineResult<Self> {
        let source_id = directory.display().to_string();
        validate_directory_exists(directory)
            .map_err(|e| PipelineError::source_unavailable(source_id.clone(), e))?;

        let media_types = crate::config::Config::load_embedded_media_type_table()
            .map_err(|e| PipelineError::source_unavailable(source_id.clone(), format!("{e:#}")))?;

        let mut files: Vec<PathBuf> = WalkDir::new(directory)
            .max_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| media_types.is_image_file(entry.path()))
            .map(walkdir::DirEntry::into_path)
            .collect();

        if files.is_empty() {
            return Err(PipelineError::source_unavailable(source_id, "資料夾中沒有影像"));
        }

        sort_by_frame_index(&mut files);
        info!("開啟影像序列 {}: {} 張", source_id, files.len());

        Ok(Self {
            pending: files.into(),
            frames_read: 0,
        })
    }
}

impl CaptureBackend for ImageSequenceCapture {
    fn read(&mut self) -> PipelineResult<Option<RgbImage>> {
        let Some(path) = self.pending.pop_front() else {
            return Ok(None);
        };

        let frame_number = self.frames_read + 1;
        let image = image::open(&path).map_err(|e| {
            warn!("無法解碼影像 {}: {e}", path.display());
            PipelineError::ReadError {
                frame_number,
                reason: format!("{}: {e}", path.display()),
            }
        })?;

        self.frames_read = frame_number;
        Ok(Some(image.to_rgb8()))
    }

    fn release(&mut self) {
        self.pending.clear();
    }
}

/// 依檔名中第一段數字排序，沒有數字的排在最後，再以檔名排序
fn sort_by_frame_index(files: &mut [PathBuf]) {
    let digits = Regex::new(r"\d+").ok();
    let index_of = |path: &Path| -> Option<u64> {
        let name = path.file_stem()?.to_str()?;
        digits.as_ref()?.find(name)?.as_str().parse().ok()
    };

    files.sort_by(|a, b| {
        let key_a = (index_of(a).unwrap_or(u64::MAX), a.file_name());
        let key_b = (index_of(b).unwrap_or(u64::MAX), b.file_name());
        key_a.cmp(&key_b)
    });
}

/// 記憶體中的影像清單，可指定在某幀讀取失敗
#[derive(Debug, Default)]
pub struct MemoryCapture {
    frames: VecDeque<RgbImage>,
    fail_after: Option<usize>,
    frames_read: usize,
}

impl MemoryCapture {
    #[must_use]
    pub fn new(frames: Vec<RgbImage>) -> Self {
        Self {
            frames: frames.into(),
            fail_after: None,
            frames_read: 0,
        }
    }

    /// 成功讀取 `count` 幀後回傳讀取錯誤
    #[must_use]
    pub fn failing_after(frames: Vec<RgbImage>, count: usize) -> Self {
        Self {
            fail_after: Some(count),
            ..Self::new(frames)
        }
    }
}

impl CaptureBackend for MemoryCapture {
    fn read(&mut self) -> PipelineResult<Option<RgbImage>> {
        if self.fail_after == Some(self.frames_read) {
            return Err(PipelineError::ReadError {
                frame_number: self.frames_read as u64 + 1,
                reason: "模擬擷取中斷".to_string(),
            });
        }
        let frame = self.frames.pop_front();
        if frame.is_some() {
            self.frames_read += 1;
        }
        Ok(frame)
    }

    fn release(&mut self) {
        self.frames.clear();
    }
}
