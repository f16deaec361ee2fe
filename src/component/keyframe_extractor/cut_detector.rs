use super::frame::FrameRecord;
use crate::error::{PipelineError, PipelineResult};
use image::RgbImage;
use log::debug;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, SystemTime};

/// 預設最短場景長度（幀）
pub const DEFAULT_MIN_SCENE_LEN: u64 = 20;

/// 外部場景偵測演算法回報的訊號
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutSignal {
    /// 觸發時的內容差異分數
    pub score: f64,
}

/// 有狀態、依序的場景偵測演算法（外部協作者介面）
///
/// 呼叫端必須以遞增且無缺口的幀序號餵入，否則內部狀態失效。
pub trait OrderedCutDetector: Send {
    fn feed(&mut self, frame_number: u64, image: &RgbImage) -> PipelineResult<Option<CutSignal>>;
}

/// 以 HSV 平均差異判斷場景變換
///
/// 分數為相鄰兩幀 H、S、V 三通道平均絕對差的平均值，H 以 0-180 計，S、V 以 0-255 計。
#[derive(Debug, Clone)]
pub struct ContentDetector {
    threshold: f64,
    last_hsv: Option<HsvPlanes>,
}

impl ContentDetector {
    #[must_use]
    pub const fn new(threshold: f64) -> Self {
        Self {
            threshold,
            last_hsv: None,
        }
    }
}

impl OrderedCutDetector for ContentDetector {
    fn feed(&mut self, _frame_number: u64, image: &RgbImage) -> PipelineResult<Option<CutSignal>> {
        let current = HsvPlanes::from_image(image);

        let score = self
            .last_hsv
            .as_ref()
            .map(|previous| previous.content_delta(&current));
        self.last_hsv = Some(current);

        Ok(score
            .filter(|&score| score >= self.threshold)
            .map(|score| CutSignal { score }))
    }
}

#[derive(Debug, Clone)]
struct HsvPlanes {
    width: u32,
    height: u32,
    hue: Vec<u8>,
    saturation: Vec<u8>,
    value: Vec<u8>,
}

impl HsvPlanes {
    fn from_image(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let len = (width * height) as usize;
        let mut hue = Vec::with_capacity(len);
        let mut saturation = Vec::with_capacity(len);
        let mut value = Vec::with_capacity(len);

        for pixel in image.pixels() {
            let (h, s, v) = rgb_to_hsv(pixel[0], pixel[1], pixel[2]);
            hue.push(h);
            saturation.push(s);
            value.push(v);
        }

        Self {
            width,
            height,
            hue,
            saturation,
            value,
        }
    }

    /// 尺寸不同時視為完全不同的畫面
    fn content_delta(&self, other: &Self) -> f64 {
        if self.width != other.width || self.height != other.height || self.hue.is_empty() {
            return 255.0;
        }

        let mean_abs_diff = |a: &[u8], b: &[u8]| {
            let total: u64 = a
                .iter()
                .zip(b)
                .map(|(&x, &y)| u64::from(x.abs_diff(y)))
                .sum();
            total as f64 / a.len() as f64
        };

        let delta_h = mean_abs_diff(&self.hue, &other.hue);
        let delta_s = mean_abs_diff(&self.saturation, &other.saturation);
        let delta_v = mean_abs_diff(&self.value, &other.value);
        (delta_h + delta_s + delta_v) / 3.0
    }
}

/// RGB 轉 HSV（H: 0-179, S/V: 0-255）
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let saturation = if max > 0.0 { delta / max * 255.0 } else { 0.0 };
    let hue_degrees = if delta <= 0.0 {
        0.0
    } else if (max - r).abs() < f64::EPSILON {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if (max - g).abs() < f64::EPSILON {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    (
        ((hue_degrees / 2.0).round() as u32 % 180) as u8,
        saturation.round() as u8,
        max as u8,
    )
}

/// 場景變換事件
#[derive(Debug, Clone)]
pub struct CutEvent {
    pub frame_number: u64,
    pub detection_time: SystemTime,
    pub elapsed_since_ingestion: Duration,
    pub content_score: f64,
}

/// 場景偵測器設定
#[derive(Debug, Clone, Copy)]
pub struct CutDetectorConfig {
    /// 內容差異閾值，越低越敏感
    pub content_threshold: f64,
    /// 兩個場景變換之間至少相隔的幀數
    pub min_scene_len: u64,
}

impl Default for CutDetectorConfig {
    fn default() -> Self {
        Self {
            content_threshold: 15.0,
            min_scene_len: DEFAULT_MIN_SCENE_LEN,
        }
    }
}

/// 場景偵測器，包裝外部的 `OrderedCutDetector`
///
/// 負責兩件事：
/// 1. 順序把關：只接受下一個預期的幀序號，拒絕的幀不會餵給演算法
/// 2. 最短場景長度：距離上一個場景變換不足 `min_scene_len` 的訊號直接吸收
pub struct CutDetector {
    algorithm: Box<dyn OrderedCutDetector>,
    min_scene_len: u64,
    next_expected: u64,
    last_cut: Option<u64>,
}

impl CutDetector {
    pub fn new(algorithm: impl OrderedCutDetector + 'static, min_scene_len: u64) -> Self {
        Self {
            algorithm: Box::new(algorithm),
            min_scene_len: min_scene_len.max(1),
            next_expected: 1,
            last_cut: None,
        }
    }

    #[must_use]
    pub fn with_config(config: CutDetectorConfig) -> Self {
        Self::new(
            ContentDetector::new(config.content_threshold),
            config.min_scene_len,
        )
    }

    #[must_use]
    pub const fn next_expected(&self) -> u64 {
        self.next_expected
    }

    pub fn process(&mut self, frame: &FrameRecord) -> PipelineResult<Option<CutEvent>> {
        if frame.frame_number != self.next_expected {
            return Err(PipelineError::OutOfOrder {
                expected: self.next_expected,
                actual: frame.frame_number,
            });
        }
        // 演算法失敗時下一幀仍要能繼續餵入
        self.next_expected += 1;

        let signal = catch_unwind(AssertUnwindSafe(|| {
            self.algorithm.feed(frame.frame_number, &frame.image)
        }))
        .map_err(|_| PipelineError::analyzer("cut", frame.frame_number, "場景偵測發生 panic"))??;

        let Some(signal) = signal else {
            return Ok(None);
        };

        if let Some(last_cut) = self.last_cut {
            if frame.frame_number - last_cut < self.min_scene_len {
                debug!(
                    "場景變換過近，略過第 {} 幀（上一個: {}, 最短場景長度: {}）",
                    frame.frame_number, last_cut, self.min_scene_len
                );
                return Ok(None);
            }
        }

        self.last_cut = Some(frame.frame_number);
        Ok(Some(CutEvent {
            frame_number: frame.frame_number,
            detection_time: SystemTime::now(),
            elapsed_since_ingestion: frame.elapsed_since_ingestion(),
            content_score: signal.score,
        }))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Rgb;

    /// 依幀序號決定是否觸發的假演算法
    pub(crate) struct SpikeDetector {
        pattern: Box<dyn Fn(u64) -> bool + Send>,
        pub(crate) fed: Vec<u64>,
    }

    impl SpikeDetector {
        pub(crate) fn with_pattern(pattern: impl Fn(u64) -> bool + Send + 'static) -> Self {
            Self {
                pattern: Box::new(pattern),
                fed: Vec::new(),
            }
        }

        pub(crate) fn with_fixed_frames(frames: Vec<u64>) -> Self {
            Self::with_pattern(move |n| frames.contains(&n))
        }
    }

    impl OrderedCutDetector for SpikeDetector {
        fn feed(&mut self, frame_number: u64, _image: &RgbImage) -> PipelineResult<Option<CutSignal>> {
            self.fed.push(frame_number);
            Ok((self.pattern)(frame_number).then_some(CutSignal { score: 100.0 }))
        }
    }

    fn solid(color: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(16, 16, Rgb(color))
    }

    fn frame(n: u64) -> FrameRecord {
        FrameRecord::new(n, solid([0, 0, 0]))
    }

    fn run_detector(detector: &mut CutDetector, count: u64) -> Vec<u64> {
        (1..=count)
            .filter_map(|n| detector.process(&frame(n)).unwrap())
            .map(|event| event.frame_number)
            .collect()
    }

    #[test]
    fn test_close_cuts_are_suppressed() {
        let mut detector = CutDetector::new(SpikeDetector::with_fixed_frames(vec![2, 3]), 20);
        assert_eq!(run_detector(&mut detector, 10), vec![2]);
    }

    #[test]
    fn test_cuts_respect_min_scene_len() {
        let spikes = vec![1, 5, 25, 30, 44, 45, 50, 90];
        let mut detector = CutDetector::new(SpikeDetector::with_fixed_frames(spikes), 20);
        let cuts = run_detector(&mut detector, 100);

        assert_eq!(cuts, vec![1, 25, 45, 90]);
        for pair in cuts.windows(2) {
            assert!(pair[1] - pair[0] >= 20);
        }
    }

    #[test]
    fn test_min_scene_len_one_allows_adjacent_cuts() {
        let mut detector = CutDetector::new(SpikeDetector::with_pattern(|_| true), 1);
        assert_eq!(run_detector(&mut detector, 4), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_out_of_order_frame_is_rejected() {
        let mut detector = CutDetector::new(SpikeDetector::with_pattern(|_| false), 20);
        detector.process(&frame(1)).unwrap();

        let err = detector.process(&frame(3)).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::OutOfOrder {
                expected: 2,
                actual: 3
            }
        ));
        assert_eq!(detector.next_expected(), 2);
        assert!(detector.process(&frame(2)).is_ok());
    }

    #[test]
    fn test_content_detector_fires_on_color_change() {
        let mut detector = ContentDetector::new(15.0);
        assert!(detector.feed(1, &solid([10, 10, 10])).unwrap().is_none());
        assert!(detector.feed(2, &solid([10, 10, 10])).unwrap().is_none());

        let signal = detector.feed(3, &solid([250, 20, 20])).unwrap();
        assert!(signal.is_some_and(|s| s.score >= 15.0));
        assert!(detector.feed(4, &solid([250, 20, 20])).unwrap().is_none());
    }

    #[test]
    fn test_content_detector_ignores_small_changes() {
        let mut detector = ContentDetector::new(15.0);
        detector.feed(1, &solid([100, 100, 100])).unwrap();
        assert!(detector.feed(2, &solid([104, 104, 104])).unwrap().is_none());
    }

    #[test]
    fn test_content_detector_dimension_change_is_cut() {
        let mut detector = ContentDetector::new(15.0);
        detector.feed(1, &solid([0, 0, 0])).unwrap();
        let other = RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]));
        assert!(detector.feed(2, &other).unwrap().is_some());
    }

    #[test]
    fn test_rgb_to_hsv_primaries() {
        assert_eq!(rgb_to_hsv(255, 0, 0), (0, 255, 255));
        assert_eq!(rgb_to_hsv(0, 255, 0), (60, 255, 255));
        assert_eq!(rgb_to_hsv(0, 0, 255), (120, 255, 255));
        assert_eq!(rgb_to_hsv(0, 0, 0), (0, 0, 0));
    }
}
