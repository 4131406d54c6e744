//! 列表条目目标与全局注册表。
//!
//! 注册表维护 `target_key → 目标`，`target_key = 31 · holder_id + view_id`（按 i32 回绕）。
//! 同一 key 任意时刻最多一个活跃目标：重新绑定时在锁内替换，锁外通知旧目标 `on_cleared`。
//! 旧目标在调用方线程上立即标记为已清理，控件复位投递到 UI 上下文执行。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use super::{ImageView, Target, ViewHolder};
use crate::error::ImageError;
use crate::executor::UiDispatcher;
use crate::raster::{Drawable, Raster};

/// `target_key → 目标` 的注册表。
///
/// 未配置派发器时，清理回调在调用方线程就地执行。
#[derive(Default)]
pub struct TargetRegistry {
    targets: Mutex<HashMap<i32, Arc<ViewHolderTarget>>>,
    ui: Option<Arc<dyn UiDispatcher>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 清理回调经 `ui` 派发到 UI 上下文。
    pub fn with_dispatcher(ui: Arc<dyn UiDispatcher>) -> Self {
        Self {
            targets: Mutex::new(HashMap::new()),
            ui: Some(ui),
        }
    }

    pub fn target_key(holder_id: i32, view_id: i32) -> i32 {
        31_i32.wrapping_mul(holder_id).wrapping_add(view_id)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<i32, Arc<ViewHolderTarget>>>, ImageError> {
        self.targets
            .lock()
            .map_err(|_| ImageError::ResourceLimit("目标注册表锁已中毒".to_string()))
    }

    /// 为 (控件, 容器) 创建新目标并替换同 key 的旧目标。
    pub fn bind(
        self: &Arc<Self>,
        view: Weak<dyn ImageView>,
        holder: Weak<dyn ViewHolder>,
    ) -> Result<Arc<ViewHolderTarget>, ImageError> {
        let view_id = view
            .upgrade()
            .ok_or_else(|| ImageError::InvalidArgument("目标控件已销毁".to_string()))?
            .view_id();
        let holder_id = holder
            .upgrade()
            .ok_or_else(|| ImageError::InvalidArgument("目标容器已销毁".to_string()))?
            .holder_id();

        let key = Self::target_key(holder_id, view_id);
        let target = Arc::new(ViewHolderTarget {
            key,
            view,
            holder,
            registry: Arc::downgrade(self),
            cleared: AtomicBool::new(false),
        });

        let previous = self.lock()?.insert(key, Arc::clone(&target));
        if let Some(previous) = previous {
            log::debug!("♻️ 目标 key={} 重新绑定，清理旧目标", key);
            self.retire(previous);
        }

        Ok(target)
    }

    pub fn get(&self, key: i32) -> Option<Arc<ViewHolderTarget>> {
        self.lock().ok()?.get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|targets| targets.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 清理全部目标，每个目标都会收到 `on_cleared`。
    pub fn clear_all(&self) {
        let drained: Vec<Arc<ViewHolderTarget>> = match self.lock() {
            Ok(mut targets) => targets.drain().map(|(_, target)| target).collect(),
            Err(err) => {
                log::warn!("⚠️ 清理目标失败：{}", err);
                return;
            }
        };

        let count = drained.len();
        for target in drained {
            self.retire(target);
        }
        log::debug!("🧹 已清理 {} 个列表目标", count);
    }

    /// 目标已不在表中：立即标记清理，控件复位走 UI 上下文。
    fn retire(&self, target: Arc<ViewHolderTarget>) {
        if !target.mark_cleared() {
            return;
        }
        match &self.ui {
            Some(ui) => ui.run(Box::new(move || target.reset_view())),
            None => target.reset_view(),
        }
    }

    /// 仅当注册的仍是 `target` 本身时移除。
    fn remove_if_current(&self, key: i32, target: &ViewHolderTarget) {
        if let Ok(mut targets) = self.lock() {
            let is_current = targets
                .get(&key)
                .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), target));
            if is_current {
                targets.remove(&key);
            }
        }
    }
}

/// 列表条目中的控件目标。
///
/// 容器已解绑（无列表位置）时跳过控件更新，但仍会从注册表移除自己。
/// 被 `on_cleared` 之后，所有交付都被忽略。
pub struct ViewHolderTarget {
    key: i32,
    view: Weak<dyn ImageView>,
    holder: Weak<dyn ViewHolder>,
    registry: Weak<TargetRegistry>,
    cleared: AtomicBool,
}

impl ViewHolderTarget {
    pub fn key(&self) -> i32 {
        self.key
    }

    pub fn is_cleared(&self) -> bool {
        self.cleared.load(Ordering::SeqCst)
    }

    fn holder_is_bound(&self) -> bool {
        self.holder
            .upgrade()
            .and_then(|holder| holder.adapter_position())
            .is_some()
    }

    fn apply_if_bound(&self, drawable: Option<Drawable>) {
        if let Some(view) = self.view.upgrade() {
            if self.holder_is_bound() {
                view.set_drawable(drawable);
            }
        }
    }

    /// 首次标记时返回 `true`。
    fn mark_cleared(&self) -> bool {
        !self.cleared.swap(true, Ordering::SeqCst)
    }

    fn reset_view(&self) {
        if let Some(view) = self.view.upgrade() {
            view.set_drawable(None);
        }
    }

    fn unregister(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_if_current(self.key, self);
        }
    }
}

impl Target for ViewHolderTarget {
    fn on_load_started(&self, placeholder: Option<Drawable>) {
        if self.is_cleared() {
            return;
        }
        self.apply_if_bound(placeholder);
    }

    fn on_resource_ready(&self, raster: Arc<Raster>) {
        if self.is_cleared() {
            return;
        }
        self.apply_if_bound(Some(Drawable::Raster(raster)));
        self.unregister();
    }

    fn on_load_failed(&self, error_drawable: Option<Drawable>) {
        if self.is_cleared() {
            return;
        }
        self.apply_if_bound(error_drawable);
        self.unregister();
    }

    fn on_cleared(&self) {
        if !self.mark_cleared() {
            return;
        }
        self.reset_view();
        self.unregister();
    }
}
