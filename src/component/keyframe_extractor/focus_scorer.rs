use super::frame::FrameRecord;
use crate::error::{PipelineError, PipelineResult};
use image::{GrayImage, RgbImage};
use std::panic::{AssertUnwindSafe, catch_unwind};

/// 清晰度量測（外部協作者介面）
///
/// 必須是決定性、無狀態的純函式，回傳值 >= 0，越大越清晰。
pub trait FocusMeasure: Send + Sync {
    fn measure(&self, image: &RgbImage) -> PipelineResult<f64>;
}

/// Laplacian 變異數：灰階化後套用 3x3 Laplacian，再取變異數
#[derive(Debug, Clone, Copy, Default)]
pub struct LaplacianVariance;

impl FocusMeasure for LaplacianVariance {
    fn measure(&self, image: &RgbImage) -> PipelineResult<f64> {
        let gray = image::imageops::grayscale(image);
        Ok(laplacian_variance(&gray))
    }
}

/// 邊界一圈不計入，小於 3x3 的影像視為 0
fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    // [ 0  1  0 ]
    // [ 1 -4  1 ]
    // [ 0  1  0 ]
    let pixel = |x: u32, y: u32| f64::from(gray.get_pixel(x, y)[0]);
    let count = f64::from((width - 2) * (height - 2));

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let value = pixel(x, y - 1) + pixel(x, y + 1) + pixel(x - 1, y) + pixel(x + 1, y)
                - 4.0 * pixel(x, y);
            sum += value;
            sum_sq += value * value;
        }
    }

    let mean = sum / count;
    (sum_sq / count - mean * mean).max(0.0)
}

/// 清晰度評分器，包裝外部的 `FocusMeasure`
///
/// 協作者回傳錯誤、負值、NaN 或直接 panic 時，一律轉成 `AnalyzerFailure`。
pub struct FocusScorer {
    measure: Box<dyn FocusMeasure>,
}

impl FocusScorer {
    pub fn new(measure: impl FocusMeasure + 'static) -> Self {
        Self {
            measure: Box::new(measure),
        }
    }

    pub fn score(&self, frame: &FrameRecord) -> PipelineResult<f64> {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.measure.measure(&frame.image)))
            .map_err(|_| PipelineError::analyzer("focus", frame.frame_number, "清晰度量測發生 panic"))?;

        let score = outcome?;
        if !score.is_finite() || score < 0.0 {
            return Err(PipelineError::analyzer(
                "focus",
                frame.frame_number,
                format!("無效的清晰度分數 {score}"),
            ));
        }
        Ok(score)
    }
}

impl Default for FocusScorer {
    fn default() -> Self {
        Self::new(LaplacianVariance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn checkerboard(size: u32, cell: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| {
            if ((x / cell) + (y / cell)) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    struct FixedMeasure(f64);

    impl FocusMeasure for FixedMeasure {
        fn measure(&self, _image: &RgbImage) -> PipelineResult<f64> {
            Ok(self.0)
        }
    }

    struct PanickingMeasure;

    impl FocusMeasure for PanickingMeasure {
        fn measure(&self, _image: &RgbImage) -> PipelineResult<f64> {
            panic!("boom")
        }
    }

    #[test]
    fn test_uniform_image_has_zero_focus() {
        let image = RgbImage::from_pixel(32, 32, Rgb([128, 128, 128]));
        let score = LaplacianVariance.measure(&image).unwrap();
        assert!(score.abs() < f64::EPSILON);
    }

    #[test]
    fn test_sharp_edges_score_higher_than_soft_edges() {
        let sharp = checkerboard(64, 2);
        let soft = image::imageops::blur(&checkerboard(64, 2), 3.0);

        let sharp_score = LaplacianVariance.measure(&sharp).unwrap();
        let soft_score = LaplacianVariance.measure(&soft).unwrap();
        assert!(sharp_score > soft_score);
    }

    #[test]
    fn test_measure_is_deterministic() {
        let image = checkerboard(40, 3);
        let first = LaplacianVariance.measure(&image).unwrap();
        let second = LaplacianVariance.measure(&image).unwrap();
        assert!((first - second).abs() < f64::EPSILON);
    }

    #[test]
    fn test_tiny_image_scores_zero() {
        let image = RgbImage::new(2, 2);
        assert!(LaplacianVariance.measure(&image).unwrap().abs() < f64::EPSILON);
    }

    #[test]
    fn test_scorer_rejects_negative_scores() {
        let scorer = FocusScorer::new(FixedMeasure(-1.0));
        let frame = FrameRecord::new(7, RgbImage::new(4, 4));
        let err = scorer.score(&frame).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::AnalyzerFailure { frame_number: 7, .. }
        ));
    }

    #[test]
    fn test_scorer_converts_panic_to_failure() {
        let scorer = FocusScorer::new(PanickingMeasure);
        let frame = FrameRecord::new(3, RgbImage::new(4, 4));
        assert!(scorer.score(&frame).is_err());
    }
}
