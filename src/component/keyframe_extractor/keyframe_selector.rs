//! 場景變換後的關鍵幀選取
//!
//! 依場景變換幀序號由小到大處理，游標只會往前：
//! 1. 游標已越過此場景變換 → 視為「距離上一個太近」略過
//! 2. 從場景變換幀往後找，直到清晰度 >= 閾值或到達上限
//! 3. 到達上限仍不清晰 → 無法決定，不會退而選模糊幀
//!
//! 選中的幀會被消耗（游標移到其後一幀），同一幀不會分配給兩個場景變換。

use super::cut_detector::CutEvent;
use super::store::FrozenMap;
use crate::config::KeyframePolicy;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

/// 單一場景變換的選取結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "frame_number", rename_all = "snake_case")]
pub enum KeyframeOutcome {
    Resolved(u64),
    /// 上限前沒有任何清晰幀
    Unresolved,
    /// 前一個場景變換的搜尋已越過此幀
    SkippedTooClose,
}

impl KeyframeOutcome {
    #[must_use]
    pub const fn frame_number(&self) -> Option<u64> {
        match self {
            Self::Resolved(frame_number) => Some(*frame_number),
            Self::Unresolved | Self::SkippedTooClose => None,
        }
    }
}

/// 場景變換幀序號 → 選取結果
pub type KeyframeAssignment = BTreeMap<u64, KeyframeOutcome>;

#[derive(Debug, Clone, Copy)]
pub struct KeyframeSelector {
    blur_threshold: f64,
    frame_cap: u64,
    policy: KeyframePolicy,
}

impl KeyframeSelector {
    #[must_use]
    pub const fn new(blur_threshold: f64, frame_cap: u64) -> Self {
        Self {
            blur_threshold,
            frame_cap,
            policy: KeyframePolicy::ContinueToCap,
        }
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: KeyframePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 沒有分數（分析失敗）的幀一律不算清晰
    fn is_sharp(&self, focus: &FrozenMap<f64>, frame_number: u64) -> bool {
        focus
            .get(frame_number)
            .is_some_and(|&score| score >= self.blur_threshold)
    }

    /// 純函式：相同輸入必定得到相同結果
    #[must_use]
    pub fn select(&self, cuts: &[CutEvent], focus: &FrozenMap<f64>) -> KeyframeAssignment {
        // 實際上限為設定上限與最後一個已處理幀的較小者
        let cap = focus
            .last_key()
            .map_or(0, |last| last.min(self.frame_cap));

        let mut cut_frames: Vec<u64> = cuts.iter().map(|cut| cut.frame_number).collect();
        cut_frames.sort_unstable();
        cut_frames.dedup();

        let mut assignment = KeyframeAssignment::new();
        let mut cursor = 1;
        let mut exhausted = false;

        for (index, &cut) in cut_frames.iter().enumerate() {
            if exhausted || cut > cap {
                assignment.insert(cut, KeyframeOutcome::Unresolved);
                continue;
            }
            if cursor > cut {
                debug!("場景變換 {cut} 距離上一個太近（游標: {cursor}），略過");
                assignment.insert(cut, KeyframeOutcome::SkippedTooClose);
                continue;
            }

            let limit = match self.policy {
                KeyframePolicy::ContinueToCap => cap,
                KeyframePolicy::StopAtNextCut => cut_frames
                    .get(index + 1)
                    .map_or(cap, |&next_cut| (next_cut - 1).min(cap)),
            };

            cursor = cut;
            while cursor < limit && !self.is_sharp(focus, cursor) {
                cursor += 1;
            }

            if self.is_sharp(focus, cursor) {
                debug!("場景變換 {cut} → 關鍵幀 {cursor}");
                assignment.insert(cut, KeyframeOutcome::Resolved(cursor));
                cursor += 1;
            } else {
                debug!("場景變換 {cut} 在第 {limit} 幀前找不到清晰幀");
                assignment.insert(cut, KeyframeOutcome::Unresolved);
                if limit >= cap {
                    exhausted = true;
                }
                cursor = limit + 1;
            }
        }

        assignment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn cut(frame_number: u64) -> CutEvent {
        CutEvent {
            frame_number,
            detection_time: SystemTime::now(),
            elapsed_since_ingestion: Duration::ZERO,
            content_score: 30.0,
        }
    }

    fn focus(scores: &[(u64, f64)]) -> FrozenMap<f64> {
        scores.iter().copied().collect()
    }

    fn uniform_focus(count: u64, score: f64) -> FrozenMap<f64> {
        (1..=count).map(|n| (n, score)).collect()
    }

    #[test]
    fn test_selects_first_sharp_frame_after_cut() {
        let focus = focus(&[(1, 10.0), (2, 10.0), (3, 70.0), (4, 10.0)]);
        let assignment = KeyframeSelector::new(50.0, 500).select(&[cut(1)], &focus);
        assert_eq!(assignment.get(&1), Some(&KeyframeOutcome::Resolved(3)));
    }

    #[test]
    fn test_cut_near_cap_without_sharp_frame_is_unresolved() {
        let focus = uniform_focus(5, 10.0);
        let assignment = KeyframeSelector::new(50.0, 5).select(&[cut(4)], &focus);
        assert_eq!(assignment.get(&4), Some(&KeyframeOutcome::Unresolved));
    }

    #[test]
    fn test_sharp_frame_at_cap_is_selected() {
        let focus = focus(&[(1, 0.0), (2, 0.0), (3, 90.0)]);
        let assignment = KeyframeSelector::new(50.0, 3).select(&[cut(1)], &focus);
        assert_eq!(assignment.get(&1), Some(&KeyframeOutcome::Resolved(3)));
    }

    #[test]
    fn test_all_blurry_means_all_unresolved() {
        let focus = uniform_focus(100, 5.0);
        let cuts: Vec<_> = [3, 25, 47, 80].into_iter().map(cut).collect();
        let assignment = KeyframeSelector::new(50.0, 100).select(&cuts, &focus);

        assert_eq!(assignment.len(), 4);
        assert!(
            assignment
                .values()
                .all(|outcome| *outcome == KeyframeOutcome::Unresolved)
        );
    }

    #[test]
    fn test_cursor_passing_next_cut_skips_it() {
        // 場景變換 2 一路找到 30 才清晰，越過了 20
        let mut scores: Vec<(u64, f64)> = (1..=40).map(|n| (n, 0.0)).collect();
        scores[29].1 = 80.0;
        scores[34].1 = 80.0;
        let focus = focus(&scores);

        let assignment = KeyframeSelector::new(50.0, 40).select(&[cut(2), cut(20), cut(33)], &focus);
        assert_eq!(assignment.get(&2), Some(&KeyframeOutcome::Resolved(30)));
        assert_eq!(assignment.get(&20), Some(&KeyframeOutcome::SkippedTooClose));
        assert_eq!(assignment.get(&33), Some(&KeyframeOutcome::Resolved(35)));
    }

    #[test]
    fn test_frame_never_assigned_twice() {
        // 第 5 幀是場景變換 3 的關鍵幀，同時也是下一個場景變換
        let focus = focus(&[(1, 0.0), (2, 0.0), (3, 0.0), (4, 0.0), (5, 90.0), (6, 90.0)]);
        let assignment = KeyframeSelector::new(50.0, 6).select(&[cut(3), cut(5)], &focus);

        assert_eq!(assignment.get(&3), Some(&KeyframeOutcome::Resolved(5)));
        assert_eq!(assignment.get(&5), Some(&KeyframeOutcome::SkippedTooClose));

        let selected: Vec<u64> = assignment.values().filter_map(KeyframeOutcome::frame_number).collect();
        let mut unique = selected.clone();
        unique.dedup();
        assert_eq!(selected, unique);
    }

    #[test]
    fn test_missing_scores_never_qualify() {
        let focus = focus(&[(1, 0.0), (3, 90.0)]);
        let assignment = KeyframeSelector::new(50.0, 10).select(&[cut(1)], &focus);
        assert_eq!(assignment.get(&1), Some(&KeyframeOutcome::Resolved(3)));

        let gap_at_end = focus_without_tail();
        let assignment = KeyframeSelector::new(50.0, 10).select(&[cut(1)], &gap_at_end);
        assert_eq!(assignment.get(&1), Some(&KeyframeOutcome::Unresolved));
    }

    fn focus_without_tail() -> FrozenMap<f64> {
        focus(&[(1, 0.0), (2, 0.0)])
    }

    #[test]
    fn test_selection_is_idempotent() {
        let scores: Vec<(u64, f64)> = (1..=200)
            .map(|n| (n, if n % 17 == 0 { 75.0 } else { 12.0 }))
            .collect();
        let focus = focus(&scores);
        let cuts: Vec<_> = [4, 30, 33, 90, 150, 199].into_iter().map(cut).collect();

        let selector = KeyframeSelector::new(50.0, 200);
        let first = selector.select(&cuts, &focus);
        let second = selector.select(&cuts, &focus);
        assert_eq!(first, second);

        let resolved: Vec<u64> = first.values().filter_map(KeyframeOutcome::frame_number).collect();
        for pair in resolved.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_cut_order_in_ledger_does_not_matter() {
        let focus = uniform_focus(50, 80.0);
        let selector = KeyframeSelector::new(50.0, 50);
        let forward = selector.select(&[cut(10), cut(30)], &focus);
        let reversed = selector.select(&[cut(30), cut(10)], &focus);
        assert_eq!(forward, reversed);
    }

    #[test]
    fn test_stop_at_next_cut_policy() {
        let mut scores: Vec<(u64, f64)> = (1..=30).map(|n| (n, 0.0)).collect();
        scores[24].1 = 90.0;
        let focus = focus(&scores);
        let cuts = [cut(2), cut(20)];

        let continue_to_cap = KeyframeSelector::new(50.0, 30).select(&cuts, &focus);
        assert_eq!(continue_to_cap.get(&2), Some(&KeyframeOutcome::Resolved(25)));
        assert_eq!(continue_to_cap.get(&20), Some(&KeyframeOutcome::SkippedTooClose));

        let bounded = KeyframeSelector::new(50.0, 30)
            .with_policy(KeyframePolicy::StopAtNextCut)
            .select(&cuts, &focus);
        assert_eq!(bounded.get(&2), Some(&KeyframeOutcome::Unresolved));
        assert_eq!(bounded.get(&20), Some(&KeyframeOutcome::Resolved(25)));
    }

    #[test]
    fn test_no_cuts_no_assignment() {
        let focus = uniform_focus(10, 80.0);
        assert!(KeyframeSelector::new(50.0, 10).select(&[], &focus).is_empty());
    }
}
