//! # 编解码模块
//!
//! ## 设计思路
//!
//! 协调器只依赖两个窄接口：`Decoder`（字节 → 位图）与 `Encoder`（位图 → 有损字节）。
//! 宿主可以注入自己的实现；默认实现 `ImageCodec` 基于 `image` crate。
//!
//! ## 实现思路
//!
//! 1. 通过文件签名（magic bytes）确认输入确实是图片
//! 2. 只读 header 取宽高，按像素/内存上限快速拒绝
//! 3. 完整解码并再次校验尺寸
//! 4. 编码时丢弃 alpha，按给定质量输出 JPEG

use image::ImageReader;
use image::codecs::jpeg::JpegEncoder;
use std::io::Cursor;

use crate::config::PicFlyConfig;
use crate::error::ImageError;
use crate::raster::Raster;

/// 字节 → 位图。
pub trait Decoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Raster, ImageError>;
}

/// 位图 → 有损编码字节。
pub trait Encoder: Send + Sync {
    fn encode(&self, raster: &Raster, quality: u8) -> Result<Vec<u8>, ImageError>;
}

/// 基于 `image` crate 的默认编解码器。
#[derive(Debug, Clone)]
pub struct ImageCodec {
    max_decoded_pixels: u64,
    max_decoded_bytes: u64,
}

impl Default for ImageCodec {
    fn default() -> Self {
        Self::from_config(&PicFlyConfig::default())
    }
}

impl ImageCodec {
    pub fn from_config(config: &PicFlyConfig) -> Self {
        Self {
            max_decoded_pixels: config.max_decoded_pixels,
            max_decoded_bytes: config.max_decoded_bytes,
        }
    }

    /// 通过文件签名校验输入是否为图片。
    fn validate_image_signature(bytes: &[u8]) -> Result<(), ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::Decode("图片内容为空".to_string()));
        }

        let kind = infer::get(bytes)
            .ok_or_else(|| ImageError::Decode("无法识别图片类型".to_string()))?;

        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(ImageError::Decode(format!(
                "文件签名不是图片类型：{}",
                kind.mime_type()
            )));
        }

        Ok(())
    }

    /// 仅通过内存中的图片头信息读取宽高。
    fn inspect_dimensions(bytes: &[u8]) -> Result<(u32, u32), ImageError> {
        ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| ImageError::Decode(format!("无法识别图片格式：{}", e)))?
            .into_dimensions()
            .map_err(|e| ImageError::Decode(format!("无法读取图片尺寸：{}", e)))
    }

    fn validate_limits(&self, width: u32, height: u32) -> Result<(), ImageError> {
        let pixels = (width as u64)
            .checked_mul(height as u64)
            .ok_or_else(|| ImageError::ResourceLimit("图片像素数溢出".to_string()))?;

        if pixels > self.max_decoded_pixels {
            return Err(ImageError::ResourceLimit(format!(
                "图片像素过大：{} 像素（限制：{} 像素）",
                pixels, self.max_decoded_pixels
            )));
        }

        let estimated = pixels
            .checked_mul(4)
            .ok_or_else(|| ImageError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

        if estimated > self.max_decoded_bytes {
            return Err(ImageError::ResourceLimit(format!(
                "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
                estimated as f64 / 1024.0 / 1024.0,
                self.max_decoded_bytes as f64 / 1024.0 / 1024.0
            )));
        }

        Ok(())
    }
}

impl Decoder for ImageCodec {
    fn decode(&self, bytes: &[u8]) -> Result<Raster, ImageError> {
        Self::validate_image_signature(bytes)?;

        let (header_width, header_height) = Self::inspect_dimensions(bytes)?;
        self.validate_limits(header_width, header_height)?;

        let decoded = image::load_from_memory(bytes)
            .map_err(|e| ImageError::Decode(format!("图片解码失败：{}", e)))?;

        let raster = Raster::new(decoded);
        let (width, height) = raster.dimensions();
        if width == 0 || height == 0 {
            return Err(ImageError::Decode("解码结果尺寸为 0".to_string()));
        }
        self.validate_limits(width, height)?;

        Ok(raster)
    }
}

impl Encoder for ImageCodec {
    fn encode(&self, raster: &Raster, quality: u8) -> Result<Vec<u8>, ImageError> {
        let rgb = raster.image().to_rgb8();
        let mut out = Vec::with_capacity(rgb.as_raw().len() / 8);
        rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)))
            .map_err(|e| ImageError::CacheIo(format!("JPEG 编码失败：{}", e)))?;
        Ok(out)
    }
}
