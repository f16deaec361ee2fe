//! 只增不改的幀序號對應表
//!
//! 擷取階段由各分析任務寫入（每個 key 只寫一次），結束後 `freeze` 成不需鎖的唯讀檢視。

use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug)]
pub struct AppendOnlyMap<V> {
    entries: Mutex<BTreeMap<u64, V>>,
}

impl<V> AppendOnlyMap<V> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// 僅在 key 不存在時寫入，回傳是否寫入成功
    pub fn put_if_absent(&self, key: u64, value: V) -> bool {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if entries.contains_key(&key) {
            return false;
        }
        entries.insert(key, value);
        true
    }

    /// 凍結為唯讀檢視，之後不再接受寫入
    pub fn freeze(self) -> FrozenMap<V> {
        FrozenMap {
            entries: self
                .entries
                .into_inner()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        }
    }
}

impl<V: Clone> AppendOnlyMap<V> {
    pub fn get(&self, key: u64) -> Option<V> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&key)
            .cloned()
    }
}

impl<V> Default for AppendOnlyMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// 凍結後的唯讀檢視，依 key 遞增排序
#[derive(Debug, Clone)]
pub struct FrozenMap<V> {
    entries: BTreeMap<u64, V>,
}

impl<V> FrozenMap<V> {
    #[must_use]
    pub fn get(&self, key: u64) -> Option<&V> {
        self.entries.get(&key)
    }

    #[must_use]
    pub fn contains(&self, key: u64) -> bool {
        self.entries.contains_key(&key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.keys().copied()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.entries.values()
    }

    #[must_use]
    pub fn last_key(&self) -> Option<u64> {
        self.entries.keys().next_back().copied()
    }

    /// key 是否恰好為 1..=N 且無缺口
    #[must_use]
    pub fn is_contiguous_from_one(&self) -> bool {
        self.entries
            .keys()
            .enumerate()
            .all(|(index, &key)| key == index as u64 + 1)
    }
}

impl<V> FromIterator<(u64, V)> for FrozenMap<V> {
    fn from_iter<I: IntoIterator<Item = (u64, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
