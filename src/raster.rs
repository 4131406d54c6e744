//! # 位图原语
//!
//! `Raster` 是流水线中流转的解码位图。它自带声明的像素格式，
//! 内存缓存按 `width · height · bytes_per_pixel` 计算占用。
//!
//! 变换步骤按值接收、按值返回 `Raster`，旧位图在步骤返回后即被释放。

use image::{ColorType, DynamicImage, GenericImageView, ImageBuffer, Rgba, RgbaImage};
use std::sync::Arc;

use crate::error::ImageError;

/// 位图声明的像素格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    L8,
    La8,
    Rgb8,
    Rgba8,
    L16,
    La16,
    Rgb16,
    Rgba16,
    Rgb32F,
    Rgba32F,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> u64 {
        match self {
            Self::L8 => 1,
            Self::La8 | Self::L16 => 2,
            Self::Rgb8 => 3,
            Self::Rgba8 | Self::La16 => 4,
            Self::Rgb16 => 6,
            Self::Rgba16 => 8,
            Self::Rgb32F => 12,
            Self::Rgba32F => 16,
        }
    }

    fn from_color_type(color: ColorType) -> Self {
        match color {
            ColorType::L8 => Self::L8,
            ColorType::La8 => Self::La8,
            ColorType::Rgb8 => Self::Rgb8,
            ColorType::Rgba8 => Self::Rgba8,
            ColorType::L16 => Self::L16,
            ColorType::La16 => Self::La16,
            ColorType::Rgb16 => Self::Rgb16,
            ColorType::Rgba16 => Self::Rgba16,
            ColorType::Rgb32F => Self::Rgb32F,
            ColorType::Rgba32F => Self::Rgba32F,
            _ => Self::Rgba8,
        }
    }
}

/// 解码后的位图。
#[derive(Debug, Clone)]
pub struct Raster {
    image: DynamicImage,
    format: PixelFormat,
}

impl Raster {
    pub fn new(image: DynamicImage) -> Self {
        let format = PixelFormat::from_color_type(image.color());
        Self { image, format }
    }

    /// 由 RGBA 原始字节构建位图，长度必须与尺寸一致。
    pub fn from_rgba(width: u32, height: u32, bytes: Vec<u8>) -> Result<Self, ImageError> {
        let buffer = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(width, height, bytes)
            .ok_or_else(|| ImageError::Decode("RGBA 缓冲长度与尺寸不一致".to_string()))?;
        Ok(Self::new(DynamicImage::ImageRgba8(buffer)))
    }

    pub(crate) fn from_rgba_image(image: RgbaImage) -> Self {
        Self::new(DynamicImage::ImageRgba8(image))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// LRU 记账使用的字节占用。
    pub fn byte_cost(&self) -> u64 {
        (self.width() as u64)
            .saturating_mul(self.height() as u64)
            .saturating_mul(self.format.bytes_per_pixel())
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_image(self) -> DynamicImage {
        self.image
    }

    /// 取出 RGBA8 缓冲；已经是 RGBA8 时不复制。
    pub fn into_rgba8(self) -> RgbaImage {
        match self.image {
            DynamicImage::ImageRgba8(buffer) => buffer,
            other => other.to_rgba8(),
        }
    }
}

/// 占位图 / 错误图资源：位图或宿主侧资源 id。
#[derive(Debug, Clone)]
pub enum Drawable {
    Raster(Arc<Raster>),
    Resource(u32),
}

impl PartialEq for Drawable {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Raster(a), Self::Raster(b)) => Arc::ptr_eq(a, b),
            (Self::Resource(a), Self::Resource(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Raster> for Drawable {
    fn from(raster: Raster) -> Self {
        Self::Raster(Arc::new(raster))
    }
}

impl From<Arc<Raster>> for Drawable {
    fn from(raster: Arc<Raster>) -> Self {
        Self::Raster(raster)
    }
}
