//! # 门面与全局实例
//!
//! ## 设计思路
//!
//! `PicFly` 把两级缓存、拉取器、编解码器、UI 派发器与协调器装配在一起，
//! 对外只暴露 `load(url)` 链式入口与少量缓存管理操作。
//!
//! ## 实现思路
//!
//! - 进程级单例放在 `once_cell::sync::OnceCell` 里：`get()` 首次调用时按默认配置懒加载，
//!   `init(config)` / `PicFlyBuilder::install()` 可在此之前显式安装。
//! - 所有平台能力（拉取、解码、编码、UI 线程、缓存目录）都可以通过 `PicFlyBuilder` 注入，
//!   测试和宿主不必走全局实例，直接持有 `PicFly` 即可。
//!
//! # 示例
//!
//! ```rust,ignore
//! let picfly = picfly::PicFly::get()?;
//! picfly
//!     .load("https://example.com/cat.jpg")
//!     .resize(320, 240)
//!     .rounded_corners(12.0)
//!     .into_view(&image_view)?;
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::builder::RequestBuilder;
use crate::cache::{DiskCache, MemoryCache};
use crate::codec::{Decoder, Encoder, ImageCodec};
use crate::config::PicFlyConfig;
use crate::error::ImageError;
use crate::executor::{BackgroundPool, UiDispatcher, UiThread};
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::loader::{ImageLoader, LoaderComponents};
use crate::preloader::{PreloadModelProvider, ScrollPreloader};
use crate::target::TargetRegistry;

static INSTANCE: OnceCell<Arc<PicFly>> = OnceCell::new();

/// 图片加载门面。
pub struct PicFly {
    config: PicFlyConfig,
    loader: Arc<ImageLoader>,
    registry: Arc<TargetRegistry>,
    ui: Arc<dyn UiDispatcher>,
    pool: Arc<BackgroundPool>,
}

impl PicFly {
    /// 全局实例；尚未安装时按默认配置创建。
    pub fn get() -> Result<Arc<PicFly>, ImageError> {
        INSTANCE
            .get_or_try_init(|| PicFly::builder().build().map(Arc::new))
            .cloned()
    }

    /// 按给定配置创建并安装全局实例。
    pub fn init(config: PicFlyConfig) -> Result<Arc<PicFly>, ImageError> {
        PicFly::builder().config(config).install()
    }

    pub fn builder() -> PicFlyBuilder {
        PicFlyBuilder::default()
    }

    /// 开始一次加载请求。
    pub fn load(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, url)
    }

    pub fn clear_memory_cache(&self) {
        self.loader.clear_memory();
    }

    pub fn clear_disk_cache(&self) -> Result<(), ImageError> {
        self.loader.clear_disk()
    }

    pub fn clear_all_caches(&self) -> Result<(), ImageError> {
        self.clear_memory_cache();
        self.clear_disk_cache()
    }

    /// 取消全部进行中的请求，缓存保持不变。
    pub fn cancel_all(&self) {
        self.loader.cancel_all();
    }

    /// 按配置中的 `max_preload` 创建滚动预加载器。
    pub fn preloader_for<P: PreloadModelProvider>(&self, provider: P) -> ScrollPreloader<P> {
        self.preloader_for_with_max(provider, self.config.max_preload)
    }

    pub fn preloader_for_with_max<P: PreloadModelProvider>(
        &self,
        provider: P,
        max_preload: usize,
    ) -> ScrollPreloader<P> {
        ScrollPreloader::new(Arc::clone(&self.loader), provider, max_preload)
    }

    /// 清理全部列表目标：立即失效，控件复位在 UI 上下文执行。
    pub fn clear_viewholder_targets(&self) {
        self.registry.clear_all();
    }

    pub fn config(&self) -> &PicFlyConfig {
        &self.config
    }

    pub fn loader(&self) -> &Arc<ImageLoader> {
        &self.loader
    }

    pub fn registry(&self) -> &Arc<TargetRegistry> {
        &self.registry
    }

    pub fn memory_cache(&self) -> &Arc<MemoryCache> {
        self.loader.memory_cache()
    }

    pub fn disk_cache(&self) -> &Arc<DiskCache> {
        self.loader.disk_cache()
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        self.loader.fetcher()
    }

    pub fn ui(&self) -> &Arc<dyn UiDispatcher> {
        &self.ui
    }

    pub fn background_workers(&self) -> usize {
        self.pool.workers()
    }
}

/// 装配 `PicFly`，未注入的能力使用默认实现。
#[derive(Default)]
pub struct PicFlyBuilder {
    config: PicFlyConfig,
    fetcher: Option<Arc<dyn Fetcher>>,
    decoder: Option<Arc<dyn Decoder>>,
    encoder: Option<Arc<dyn Encoder>>,
    ui: Option<Arc<dyn UiDispatcher>>,
    disk_cache_dir: Option<PathBuf>,
}

impl PicFlyBuilder {
    pub fn config(mut self, config: PicFlyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn encoder(mut self, encoder: Arc<dyn Encoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn ui_dispatcher(mut self, ui: Arc<dyn UiDispatcher>) -> Self {
        self.ui = Some(ui);
        self
    }

    /// 覆盖配置里的磁盘缓存目录。
    pub fn disk_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.disk_cache_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> Result<PicFly, ImageError> {
        let config = self.config;
        config.validate()?;

        let pool = Arc::new(BackgroundPool::new(config.resolved_background_workers())?);
        let codec = Arc::new(ImageCodec::from_config(&config));

        let decoder: Arc<dyn Decoder> = match self.decoder {
            Some(decoder) => decoder,
            None => Arc::clone(&codec) as Arc<dyn Decoder>,
        };
        let encoder: Arc<dyn Encoder> = match self.encoder {
            Some(encoder) => encoder,
            None => codec as Arc<dyn Encoder>,
        };
        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new(&config)?),
        };
        let ui: Arc<dyn UiDispatcher> = match self.ui {
            Some(ui) => ui,
            None => Arc::new(UiThread::spawn("picfly-ui")?),
        };

        let disk_dir = match self.disk_cache_dir {
            Some(dir) => dir,
            None => config.resolved_disk_cache_dir()?,
        };
        let disk = Arc::new(DiskCache::open(
            disk_dir,
            config.disk_cache_max_bytes,
            config.disk_cache_quality,
            encoder,
            Arc::clone(&decoder),
        )?);
        let memory = Arc::new(MemoryCache::new(config.memory_cache_bytes()));

        log::info!(
            "🚀 PicFly 初始化完成：内存缓存 {:.2} MB，后台线程 {} 个",
            config.memory_cache_bytes() as f64 / 1024.0 / 1024.0,
            pool.workers()
        );

        let loader = Arc::new(ImageLoader::new(
            LoaderComponents {
                memory,
                disk,
                fetcher,
                decoder,
                ui: Arc::clone(&ui),
            },
            Arc::clone(&pool),
            &config,
        ));

        Ok(PicFly {
            config,
            loader,
            registry: Arc::new(TargetRegistry::with_dispatcher(Arc::clone(&ui))),
            ui,
            pool,
        })
    }

    /// 创建并发布为全局实例；已存在全局实例时返回 `InvalidArgument`。
    pub fn install(self) -> Result<Arc<PicFly>, ImageError> {
        let picfly = Arc::new(self.build()?);
        INSTANCE
            .set(Arc::clone(&picfly))
            .map_err(|_| ImageError::InvalidArgument("PicFly 全局实例已初始化".to_string()))?;
        Ok(picfly)
    }
}
