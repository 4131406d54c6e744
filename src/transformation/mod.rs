//! # 位图变换
//!
//! ## 设计思路
//!
//! 变换是纯函数 `Raster → Raster`，外加一个只由参数决定的稳定 `key()`。
//! key 会按插入顺序拼进指纹，因此“先模糊再灰度”和“先灰度再模糊”是两条不同的缓存记录。
//!
//! ## 实现思路
//!
//! - `transform` 按值接收位图：输入所有权交给步骤，步骤返回新位图后旧位图随即释放，
//!   流水线任意时刻最多同时存活两张位图。
//! - 内置实现分两组：`filter`（逐像素颜色运算）与 `shape`（几何与遮罩）。

mod filter;
mod shape;

pub use filter::{Blur, Brightness, ColorFilter, Grayscale};
pub use shape::{CircleCrop, CornerType, Rotate, RoundedCorners};

use crate::error::ImageError;
use crate::raster::Raster;

/// 位图变换契约。
///
/// `key()` 必须只依赖参数：相同参数在任何时刻都产生相同的 key。
pub trait Transformation: Send + Sync {
    fn transform(&self, raster: Raster) -> Result<Raster, ImageError>;

    fn key(&self) -> String;
}

/// 像素分量截断到 `0..=255`。
pub(crate) fn clamp_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// ARGB 颜色拆成 `[r, g, b, a]`。
pub(crate) fn argb_to_rgba(color: u32) -> [u8; 4] {
    [
        ((color >> 16) & 0xff) as u8,
        ((color >> 8) & 0xff) as u8,
        (color & 0xff) as u8,
        ((color >> 24) & 0xff) as u8,
    ]
}
