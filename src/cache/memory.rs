//! # 内存缓存
//!
//! ## 设计思路
//!
//! 严格 LRU，按字节预算而不是条目数限容。写入导致超限时，在同一次加锁内
//! 同步淘汰最久未使用的条目，直到总字节数不超过预算。
//!
//! ## 实现思路
//!
//! - `lru::LruCache` 只负责顺序，容量设为无界；字节记账由本模块维护。
//! - 位图以 `Arc<Raster>` 保存：缓存与目标共享同一份像素，淘汰只释放缓存这一份引用。
//! - 互斥锁中毒时读取降级为未命中、写入降级为 no-op。

use lru::LruCache;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::raster::Raster;

struct Entry {
    raster: Arc<Raster>,
    cost: u64,
}

struct Inner {
    entries: LruCache<String, Entry>,
    current_bytes: u64,
    stats: MemoryCacheStats,
}

/// 命中与淘汰统计。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
}

/// 指纹 → 位图 的字节预算 LRU。
pub struct MemoryCache {
    inner: Mutex<Inner>,
    max_bytes: u64,
}

impl MemoryCache {
    pub fn new(max_bytes: u64) -> Self {
        log::info!(
            "🧠 内存缓存初始化：容量 {:.2} MB",
            max_bytes as f64 / 1024.0 / 1024.0
        );
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                current_bytes: 0,
                stats: MemoryCacheStats::default(),
            }),
            max_bytes,
        }
    }

    fn lock(&self) -> Option<MutexGuard<'_, Inner>> {
        match self.inner.lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                log::warn!("⚠️ 内存缓存锁已中毒，本次操作忽略");
                None
            }
        }
    }

    /// 写入或替换；空 key 静默忽略。
    pub fn put(&self, key: &str, raster: Arc<Raster>) {
        if key.is_empty() {
            return;
        }

        let Some(mut inner) = self.lock() else {
            return;
        };

        let cost = raster.byte_cost();
        if let Some(old) = inner.entries.put(key.to_string(), Entry { raster, cost }) {
            inner.current_bytes = inner.current_bytes.saturating_sub(old.cost);
        }
        inner.current_bytes = inner.current_bytes.saturating_add(cost);
        inner.stats.insertions += 1;

        while inner.current_bytes > self.max_bytes {
            let Some((evicted_key, evicted)) = inner.entries.pop_lru() else {
                break;
            };
            inner.current_bytes = inner.current_bytes.saturating_sub(evicted.cost);
            inner.stats.evictions += 1;
            log::debug!("🧹 内存缓存淘汰：{}（{} bytes）", evicted_key, evicted.cost);
        }
    }

    /// 读取并标记为最近使用。
    pub fn get(&self, key: &str) -> Option<Arc<Raster>> {
        let mut inner = self.lock()?;
        let found = inner.entries.get(key).map(|entry| entry.raster.clone());
        if found.is_some() {
            inner.stats.hits += 1;
        } else {
            inner.stats.misses += 1;
        }
        found
    }

    /// 只判断是否存在，不改变顺序。
    pub fn contains(&self, key: &str) -> bool {
        self.lock()
            .map(|inner| inner.entries.contains(key))
            .unwrap_or(false)
    }

    pub fn remove(&self, key: &str) -> Option<Arc<Raster>> {
        let mut inner = self.lock()?;
        let entry = inner.entries.pop(key)?;
        inner.current_bytes = inner.current_bytes.saturating_sub(entry.cost);
        Some(entry.raster)
    }

    pub fn clear(&self) {
        if let Some(mut inner) = self.lock() {
            inner.entries.clear();
            inner.current_bytes = 0;
        }
    }

    /// 当前占用字节数。
    pub fn size(&self) -> u64 {
        self.lock().map(|inner| inner.current_bytes).unwrap_or(0)
    }

    pub fn max_size(&self) -> u64 {
        self.max_bytes
    }

    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> MemoryCacheStats {
        self.lock().map(|inner| inner.stats).unwrap_or_default()
    }
}
