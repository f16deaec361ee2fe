//! 關鍵幀擷取流程的錯誤分類
//!
//! 只有 `SourceUnavailable` 會中止整個流程，其餘錯誤都侷限在單一幀或單一檔案。

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// 無法開啟來源（裝置或檔案），啟動階段即失敗
    #[error("無法開啟來源 {source_id}: {reason}")]
    SourceUnavailable { source_id: String, reason: String },

    /// 擷取中途讀取失敗，視為串流正常結束
    #[error("讀取第 {frame_number} 幀失敗: {reason}")]
    ReadError { frame_number: u64, reason: String },

    /// 單一幀的分析器失敗，該幀資料記為缺漏
    #[error("{analyzer} 分析第 {frame_number} 幀失敗: {reason}")]
    AnalyzerFailure {
        analyzer: &'static str,
        frame_number: u64,
        reason: String,
    },

    /// 場景偵測器收到非遞增或有缺口的幀序號
    #[error("場景偵測器預期第 {expected} 幀，卻收到第 {actual} 幀")]
    OutOfOrder { expected: u64, actual: u64 },

    /// 單一檔案寫入失敗
    #[error("寫入 {} 失敗: {reason}", path.display())]
    PersistenceFailure { path: PathBuf, reason: String },
}

impl PipelineError {
    pub fn source_unavailable(source_id: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            source_id: source_id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn analyzer(analyzer: &'static str, frame_number: u64, reason: impl ToString) -> Self {
        Self::AnalyzerFailure {
            analyzer,
            frame_number,
            reason: reason.to_string(),
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
