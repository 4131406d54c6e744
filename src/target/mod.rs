//! # 交付目标
//!
//! ## 设计思路
//!
//! 协调器只认识 `Target` 的四个生命周期回调，全部在 UI 上下文执行：
//!
//! ```text
//! on_load_started(placeholder)
//!        ↓
//! on_resource_ready(raster) ｜ on_load_failed(error_drawable)
//!
//! on_cleared()     被新的加载替换时
//! ```
//!
//! 宿主控件通过 `ImageView` / `ViewHolder` 两个窄接口接入，目标只持有它们的弱引用：
//! 控件销毁后交付自动变成 no-op，位图生命周期与控件解耦。
//!
//! ## 实现思路
//!
//! - `ImageViewTarget`：单个控件。
//! - `ViewHolderTarget` + `TargetRegistry`：列表复用场景，同一 key 重新绑定时
//!   旧目标收到 `on_cleared`，之后对它的交付全部忽略。

mod holder;
mod view;

pub use holder::{TargetRegistry, ViewHolderTarget};
pub use view::ImageViewTarget;

use std::sync::Arc;

use crate::raster::{Drawable, Raster};

/// 加载结果的接收方。
pub trait Target: Send + Sync {
    fn on_load_started(&self, placeholder: Option<Drawable>);

    fn on_resource_ready(&self, raster: Arc<Raster>);

    fn on_load_failed(&self, error_drawable: Option<Drawable>);

    fn on_cleared(&self);
}

/// 宿主图片控件。
pub trait ImageView: Send + Sync {
    /// 控件在其容器内的稳定 id。
    fn view_id(&self) -> i32;

    fn set_drawable(&self, drawable: Option<Drawable>);
}

/// 宿主列表条目容器。
pub trait ViewHolder: Send + Sync {
    /// 容器身份，用于计算目标 key。
    fn holder_id(&self) -> i32;

    /// 当前绑定的列表位置；已解绑时为 `None`。
    fn adapter_position(&self) -> Option<usize>;
}
