use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

pub const MAX_RECENT_SOURCES: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaTypeTable {
    #[serde(rename = "VIDEO_FILE")]
    pub video_file: Vec<String>,
    #[serde(rename = "IMAGE_FILE")]
    pub image_file: Vec<String>,
}

impl MediaTypeTable {
    fn extension_set(extensions: &[String]) -> HashSet<String> {
        extensions.iter().map(|ext| ext.to_lowercase()).collect()
    }

    fn has_extension(extensions: &[String], path: &Path) -> bool {
        let set = Self::extension_set(extensions);
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| set.contains(&format!(".{}", ext.to_lowercase())))
    }

    #[must_use]
    pub fn is_video_file(&self, path: &Path) -> bool {
        Self::has_extension(&self.video_file, path)
    }

    #[must_use]
    pub fn is_image_file(&self, path: &Path) -> bool {
        Self::has_extension(&self.image_file, path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Language {
    #[default]
    #[serde(rename = "en-US")]
    EnUs,
    #[serde(rename = "zh-TW")]
    ZhTw,
}

impl Language {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EnUs => "en-US",
            Self::ZhTw => "zh-TW",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnUs => write!(f, "English"),
            Self::ZhTw => write!(f, "繁體中文"),
        }
    }
}

/// 輸出影像格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpg,
}

impl ImageFormat {
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg => "jpg",
        }
    }

    /// 無損格式才能驗證寫回後像素一致
    #[must_use]
    pub const fn is_lossless(&self) -> bool {
        matches!(self, Self::Png)
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension().to_uppercase())
    }
}

/// 場景變換後尋找清晰幀的範圍
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyframePolicy {
    /// 一路往後找到幀數上限
    #[default]
    ContinueToCap,
    /// 遇到下一個場景變換就停止
    StopAtNextCut,
}

impl fmt::Display for KeyframePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContinueToCap => write!(f, "continue_to_cap"),
            Self::StopAtNextCut => write!(f, "stop_at_next_cut"),
        }
    }
}

/// 關鍵幀擷取設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyframeSettings {
    /// 清晰度分數 >= 此值才算清晰
    pub blur_threshold: f64,
    /// 場景變換靈敏度，越低越敏感
    pub content_threshold: f64,
    pub min_scene_len: u64,
    pub frame_cap: u64,
    pub save_scene_changes: bool,
    pub save_blur_frames: bool,
    pub output_dir: PathBuf,
    pub image_format: ImageFormat,
    pub keyframe_policy: KeyframePolicy,
    pub verify_writes: bool,
    pub write_report: bool,
    /// 攝影機擷取解析度
    pub camera_width: u32,
    pub camera_height: u32,
}

impl Default for KeyframeSettings {
    fn default() -> Self {
        Self {
            blur_threshold: 60.0,
            content_threshold: 15.0,
            min_scene_len: 20,
            frame_cap: 500,
            save_scene_changes: true,
            save_blur_frames: true,
            output_dir: PathBuf::from("."),
            image_format: ImageFormat::Png,
            keyframe_policy: KeyframePolicy::ContinueToCap,
            verify_writes: false,
            write_report: true,
            camera_width: 640,
            camera_height: 480,
        }
    }
}

impl KeyframeSettings {
    /// 檢查設定值是否可用
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.blur_threshold.is_finite() || self.blur_threshold < 0.0 {
            anyhow::bail!("blur_threshold 必須 >= 0: {}", self.blur_threshold);
        }
        if !self.content_threshold.is_finite() || self.content_threshold <= 0.0 {
            anyhow::bail!("content_threshold 必須 > 0: {}", self.content_threshold);
        }
        if self.min_scene_len == 0 {
            anyhow::bail!("min_scene_len 必須 >= 1");
        }
        if self.frame_cap == 0 {
            anyhow::bail!("frame_cap 必須 >= 1");
        }
        if self.camera_width == 0 || self.camera_height == 0 {
            anyhow::bail!(
                "攝影機解析度無效: {}x{}",
                self.camera_width,
                self.camera_height
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct UserSettings {
    pub language: Language,
    pub keyframe: KeyframeSettings,
    pub recent_sources: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub media_type_table: MediaTypeTable,
    pub settings: UserSettings,
}
