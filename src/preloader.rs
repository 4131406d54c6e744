//! # 滚动预加载
//!
//! ## 设计思路
//!
//! 列表滚动时，沿滚动方向把即将出现的条目提前拉进缓存，
//! 真正绑定时就能直接命中内存或磁盘。预加载器只预热缓存，从不产生目标回调。
//!
//! ## 实现思路
//!
//! ```text
//! 向下滚动（dy > 0）：start = last + 1,             end = min(start + max, count - 1)
//! 向上滚动（dy ≤ 0）：end   = max(0, first - 1),    start = max(0, end - max)
//! ```
//!
//! 可见区间与上一次相同时直接跳过，避免同一屏重复提交。

use std::ops::RangeInclusive;
use std::sync::Arc;

use crate::loader::ImageLoader;
use crate::request::RequestDescriptor;

/// 默认每次预加载的条目跨度。
pub const DEFAULT_MAX_PRELOAD: usize = 3;

/// 可滚动容器的布局信息。
pub trait Viewport {
    fn first_visible(&self) -> Option<usize>;

    fn last_visible(&self) -> Option<usize>;

    fn item_count(&self) -> usize;
}

/// 宿主提供：某个位置需要预加载哪些 URL、按什么尺寸。
pub trait PreloadModelProvider: Send + Sync {
    fn preload_urls(&self, position: usize) -> Vec<String>;

    /// `(0, 0)` 表示不缩放。
    fn preload_size(&self, position: usize) -> (u32, u32);
}

/// 挂在列表上的滚动监听器。
pub struct ScrollPreloader<P: PreloadModelProvider> {
    loader: Arc<ImageLoader>,
    provider: P,
    max_preload: usize,
    last_visible_range: Option<(usize, usize)>,
}

impl<P: PreloadModelProvider> ScrollPreloader<P> {
    pub fn new(loader: Arc<ImageLoader>, provider: P, max_preload: usize) -> Self {
        Self {
            loader,
            provider,
            max_preload,
            last_visible_range: None,
        }
    }

    pub fn max_preload(&self) -> usize {
        self.max_preload
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// 处理一次滚动事件，返回本次提交的预加载数。
    pub fn on_scrolled(&mut self, viewport: &dyn Viewport, dy: i32) -> usize {
        let (Some(first), Some(last)) = (viewport.first_visible(), viewport.last_visible()) else {
            return 0;
        };

        if self.last_visible_range == Some((first, last)) {
            return 0;
        }
        self.last_visible_range = Some((first, last));

        let forward = dy > 0;
        let Some(range) = preload_range(first, last, viewport.item_count(), forward, self.max_preload)
        else {
            return 0;
        };

        let mut submitted = 0;
        for position in range {
            let (width, height) = self.provider.preload_size(position);
            for url in self.provider.preload_urls(position) {
                if url.trim().is_empty() {
                    continue;
                }
                let request = RequestDescriptor::new(url).with_resize(width, height);
                self.loader.preload(request);
                submitted += 1;
            }
        }

        if submitted > 0 {
            log::debug!(
                "📥 滚动预加载：可见 {}..={}，方向 {}，提交 {} 个",
                first,
                last,
                if forward { "↓" } else { "↑" },
                submitted
            );
        }
        submitted
    }
}

/// 按滚动方向计算需要预加载的条目区间。
pub fn preload_range(
    first_visible: usize,
    last_visible: usize,
    item_count: usize,
    forward: bool,
    max_preload: usize,
) -> Option<RangeInclusive<usize>> {
    if item_count == 0 {
        return None;
    }

    let (start, end) = if forward {
        let start = last_visible + 1;
        (start, (start + max_preload).min(item_count - 1))
    } else {
        let end = first_visible.saturating_sub(1);
        (end.saturating_sub(max_preload), end)
    };

    (start <= end).then_some(start..=end)
}
