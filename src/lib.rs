//! # PicFly：带两级缓存与请求合并的图片加载库
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  宿主 UI                                                 │
//! │                                                          │
//! │  PicFly::load(url) ── RequestBuilder ── into / preload   │
//! │        │                                   ↑             │
//! │        │                 Target 回调（UI 上下文）         │
//! └────────┼───────────────────────────────────┼─────────────┘
//!          ↓                                   │
//! ┌────────┼───────────────────────────────────┼─────────────┐
//! │  ImageLoader（协调器）                      │             │
//! │                                                          │
//! │  fingerprint ─► MemoryCache ─► DiskCache ─► in-flight 表 │
//! │                                               │          │
//! │              Fetcher ─► Decoder ─► pipeline（缩放 + 变换）│
//! │                                               │          │
//! │              写回内存 ─► 异步写回磁盘 ─► 交付所有等待方  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `ImageError`，附带错误码与阶段 |
//! | [`config`] | `PicFlyConfig`：缓存容量、超时、解码上限等 |
//! | [`raster`] | 解码后的位图、像素格式与字节开销；占位资源 `Drawable` |
//! | [`transformation`] | 变换契约与内置实现（模糊、灰度、旋转、圆形、圆角、滤镜、亮度） |
//! | [`fetcher`] | 拉取契约与基于 reqwest 的 `HttpFetcher` |
//! | [`codec`] | 解码 / 编码契约与基于 image 的 `ImageCodec` |
//! | [`cache`] | 字节上限的内存 LRU 与 md5 命名的磁盘缓存 |
//! | [`executor`] | 后台工作池与 UI 上下文派发器 |
//! | [`request`] | 请求描述与缓存指纹 |
//! | [`builder`] | 链式请求构建器 |
//! | [`target`] | 交付目标：单控件、列表条目与目标注册表 |
//! | [`loader`] | 请求协调器：single-flight、交付与取消 |
//! | [`preloader`] | 列表滚动预加载 |
//! | [`picfly`] | 门面与进程级单例 |

pub mod builder;
pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod executor;
pub mod fetcher;
pub mod loader;
mod pipeline;
pub mod picfly;
pub mod preloader;
pub mod raster;
pub mod request;
pub mod target;
pub mod transformation;

pub use builder::RequestBuilder;
pub use cache::{DiskCache, MemoryCache, MemoryCacheStats};
pub use codec::{Decoder, Encoder, ImageCodec};
pub use config::{PicFlyConfig, ResizeFilter};
pub use error::ImageError;
pub use executor::{BackgroundPool, UiDispatcher, UiTask, UiThread};
pub use fetcher::{FetchOptions, FetchResponse, Fetcher, HttpFetcher};
pub use loader::{ImageLoader, LoaderComponents};
pub use picfly::{PicFly, PicFlyBuilder};
pub use preloader::{PreloadModelProvider, ScrollPreloader, Viewport};
pub use raster::{Drawable, PixelFormat, Raster};
pub use request::RequestDescriptor;
pub use target::{ImageView, ImageViewTarget, Target, TargetRegistry, ViewHolder, ViewHolderTarget};
pub use transformation::{
    Blur, Brightness, CircleCrop, ColorFilter, CornerType, Grayscale, Rotate, RoundedCorners,
    Transformation,
};
