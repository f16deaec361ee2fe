use image::RgbImage;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 幀影像，建立後唯讀，由各階段共享
pub type FrameImage = Arc<RgbImage>;

/// 單一幀紀錄
///
/// `ingestion_time` 在來源產生該幀的瞬間記錄，之後所有「擷取後經過時間」都以此為基準。
#[derive(Debug, Clone)]
pub struct FrameRecord {
    pub frame_number: u64,
    pub ingestion_time: Instant,
    pub image: FrameImage,
}

impl FrameRecord {
    #[must_use]
    pub fn new(frame_number: u64, image: RgbImage) -> Self {
        Self {
            frame_number,
            ingestion_time: Instant::now(),
            image: Arc::new(image),
        }
    }

    #[must_use]
    pub fn elapsed_since_ingestion(&self) -> Duration {
        self.ingestion_time.elapsed()
    }
}
