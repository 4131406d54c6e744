//! # 配置模块
//!
//! ## 设计思路
//!
//! 把所有“可调策略”集中到 `PicFlyConfig`：缓存容量、网络超时、解码上限、
//! 缩放滤镜与后台线程数。默认值即生产可用配置，宿主只需覆盖关心的字段。
//!
//! ## 实现思路
//!
//! - `Default` 提供默认参数（内存缓存 25%、磁盘 250MB、连接 15s / 读取 20s）。
//! - 通过 serde 支持从 JSON 字符串或文件加载，缺省字段回落到默认值。
//! - `validate()` 在装配前做范围校验，越界时返回 `InvalidArgument`。

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ImageError;

const MIB: u64 = 1024 * 1024;

/// 默认的磁盘缓存子目录名。
pub const DISK_CACHE_DIR_NAME: &str = "picfly_cache";

/// 缩放滤镜策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    Bilinear,
    CatmullRom,
    Lanczos3,
}

impl ResizeFilter {
    pub(crate) fn to_image_filter(self) -> image::imageops::FilterType {
        match self {
            Self::Nearest => image::imageops::FilterType::Nearest,
            Self::Bilinear => image::imageops::FilterType::Triangle,
            Self::CatmullRom => image::imageops::FilterType::CatmullRom,
            Self::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }

    pub(crate) fn to_fast_filter(self) -> fast_image_resize::FilterType {
        match self {
            Self::Nearest => fast_image_resize::FilterType::Box,
            Self::Bilinear => fast_image_resize::FilterType::Bilinear,
            Self::CatmullRom => fast_image_resize::FilterType::CatmullRom,
            Self::Lanczos3 => fast_image_resize::FilterType::Lanczos3,
        }
    }
}

/// PicFly 运行配置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PicFlyConfig {
    /// 内存缓存占设备内存等级的百分比。
    pub memory_cache_percentage: u8,
    /// 宿主提供的设备内存等级（MB）。
    pub memory_class_mb: u64,
    /// 磁盘缓存目录；为空时使用 `<系统缓存目录>/picfly_cache`。
    pub disk_cache_dir: Option<PathBuf>,
    /// 磁盘缓存容量上限（字节）。
    pub disk_cache_max_bytes: u64,
    /// 磁盘缓存有损编码质量（1..=100）。
    pub disk_cache_quality: u8,
    /// 建立连接超时（毫秒）。
    pub connect_timeout_ms: u64,
    /// 读取超时（毫秒），同时作用于首包与后续分块。
    pub read_timeout_ms: u64,
    /// 下载体积上限（字节）。
    pub max_file_size: u64,
    /// 最大重定向次数。
    pub max_redirects: usize,
    /// 单次拉取的最大尝试次数（含首次）。
    pub network_retry_attempts: u8,
    /// 解码后像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// 缩放滤镜。
    pub resize_filter: ResizeFilter,
    /// 后台线程数；为空时取 `max(2, CPU 核数)`。
    pub background_workers: Option<usize>,
    /// 滚动预加载默认向前看的条目数。
    pub max_preload: usize,
}

impl Default for PicFlyConfig {
    fn default() -> Self {
        Self {
            memory_cache_percentage: 25,
            memory_class_mb: 256,
            disk_cache_dir: None,
            disk_cache_max_bytes: 250 * MIB,
            disk_cache_quality: 90,
            connect_timeout_ms: 15_000,
            read_timeout_ms: 20_000,
            max_file_size: 50 * MIB,
            max_redirects: 5,
            network_retry_attempts: 3,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * MIB,
            resize_filter: ResizeFilter::Bilinear,
            background_workers: None,
            max_preload: 3,
        }
    }
}

impl PicFlyConfig {
    /// 从 JSON 字符串解析配置并校验。
    ///
    /// # 示例
    /// ```rust,ignore
    /// use picfly::PicFlyConfig;
    ///
    /// let config = PicFlyConfig::from_json_str(r#"{ "disk_cache_quality": 80 }"#)?;
    /// assert_eq!(config.disk_cache_quality, 80);
    /// assert_eq!(config.max_preload, 3);
    /// # Ok::<(), picfly::ImageError>(())
    /// ```
    pub fn from_json_str(text: &str) -> Result<Self, ImageError> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| ImageError::InvalidArgument(format!("配置解析失败：{}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 从 JSON 文件加载配置。
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ImageError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ImageError::InvalidArgument(format!("无法读取配置文件 {}：{}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    /// 参数范围校验。
    pub fn validate(&self) -> Result<(), ImageError> {
        if !(1..=100).contains(&self.memory_cache_percentage) {
            return Err(ImageError::InvalidArgument(format!(
                "memory_cache_percentage 超出范围：{}（允许 1..=100）",
                self.memory_cache_percentage
            )));
        }

        if self.memory_class_mb == 0 {
            return Err(ImageError::InvalidArgument(
                "memory_class_mb 必须大于 0".to_string(),
            ));
        }

        if self.disk_cache_max_bytes < MIB {
            return Err(ImageError::InvalidArgument(format!(
                "disk_cache_max_bytes 过小：{}（至少 1MB）",
                self.disk_cache_max_bytes
            )));
        }

        if !(1..=100).contains(&self.disk_cache_quality) {
            return Err(ImageError::InvalidArgument(format!(
                "disk_cache_quality 超出范围：{}（允许 1..=100）",
                self.disk_cache_quality
            )));
        }

        for (name, value) in [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("read_timeout_ms", self.read_timeout_ms),
        ] {
            if !(500..=120_000).contains(&value) {
                return Err(ImageError::InvalidArgument(format!(
                    "{} 超出范围：{}（允许 500..=120000）",
                    name, value
                )));
            }
        }

        if !(1..=10).contains(&self.network_retry_attempts) {
            return Err(ImageError::InvalidArgument(format!(
                "network_retry_attempts 超出范围：{}（允许 1..=10）",
                self.network_retry_attempts
            )));
        }

        if self.max_file_size == 0 || self.max_decoded_pixels == 0 || self.max_decoded_bytes == 0 {
            return Err(ImageError::InvalidArgument(
                "体积与像素上限必须大于 0".to_string(),
            ));
        }

        if self.background_workers == Some(0) {
            return Err(ImageError::InvalidArgument(
                "background_workers 不能为 0".to_string(),
            ));
        }

        Ok(())
    }

    /// 内存缓存字节预算：`memory_class_mb · 1MB · percentage / 100`。
    pub fn memory_cache_bytes(&self) -> u64 {
        self.memory_class_mb
            .saturating_mul(MIB)
            .saturating_mul(self.memory_cache_percentage as u64)
            / 100
    }

    /// 实际生效的磁盘缓存目录。
    pub fn resolved_disk_cache_dir(&self) -> Result<PathBuf, ImageError> {
        if let Some(dir) = &self.disk_cache_dir {
            return Ok(dir.clone());
        }

        let root = dirs::cache_dir()
            .ok_or_else(|| ImageError::CacheIo("无法定位系统缓存目录".to_string()))?;
        Ok(root.join(DISK_CACHE_DIR_NAME))
    }

    /// 实际生效的后台线程数。
    pub fn resolved_background_workers(&self) -> usize {
        self.background_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .max(2)
        })
    }
}
