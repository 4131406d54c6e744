//! 逐像素颜色变换：模糊、灰度、色彩滤镜、亮度。

use super::{Transformation, argb_to_rgba, clamp_channel};
use crate::error::ImageError;
use crate::raster::Raster;

const DEFAULT_BLUR_RADIUS: f32 = 10.0;
const MAX_BLUR_RADIUS: f32 = 25.0;

/// 高斯模糊，半径上限 25。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blur {
    radius: f32,
}

impl Blur {
    pub fn new(radius: f32) -> Self {
        Self {
            radius: radius.min(MAX_BLUR_RADIUS),
        }
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }
}

impl Default for Blur {
    fn default() -> Self {
        Self::new(DEFAULT_BLUR_RADIUS)
    }
}

impl Transformation for Blur {
    fn transform(&self, raster: Raster) -> Result<Raster, ImageError> {
        if !(self.radius > 0.0) {
            return Ok(raster);
        }

        let rgba = raster.into_rgba8();
        // 半径按 2σ 换算
        let blurred = image::imageops::blur(&rgba, self.radius / 2.0);
        Ok(Raster::from_rgba_image(blurred))
    }

    fn key(&self) -> String {
        format!("blur_{:?}", self.radius)
    }
}

/// 灰度化，保留 alpha。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Grayscale;

impl Transformation for Grayscale {
    fn transform(&self, raster: Raster) -> Result<Raster, ImageError> {
        let mut rgba = raster.into_rgba8();
        for pixel in rgba.pixels_mut() {
            let [r, g, b, a] = pixel.0;
            let luma = clamp_channel(0.213 * r as f32 + 0.715 * g as f32 + 0.072 * b as f32);
            pixel.0 = [luma, luma, luma, a];
        }
        Ok(Raster::from_rgba_image(rgba))
    }

    fn key(&self) -> String {
        "grayscale".to_string()
    }
}

/// 以 SRC_ATOP 方式叠加纯色，结果 alpha 与源像素一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorFilter {
    color: u32,
}

impl ColorFilter {
    /// `color` 为 ARGB。
    pub fn new(color: u32) -> Self {
        Self { color }
    }
}

impl Transformation for ColorFilter {
    fn transform(&self, raster: Raster) -> Result<Raster, ImageError> {
        let [cr, cg, cb, ca] = argb_to_rgba(self.color);
        let coverage = ca as f32 / 255.0;
        let keep = 1.0 - coverage;

        let mut rgba = raster.into_rgba8();
        for pixel in rgba.pixels_mut() {
            let [r, g, b, a] = pixel.0;
            pixel.0 = [
                clamp_channel(cr as f32 * coverage + r as f32 * keep),
                clamp_channel(cg as f32 * coverage + g as f32 * keep),
                clamp_channel(cb as f32 * coverage + b as f32 * keep),
                a,
            ];
        }
        Ok(Raster::from_rgba_image(rgba))
    }

    fn key(&self) -> String {
        format!("color_filter_{}", self.color)
    }
}

/// 亮度偏移：`-1` 全黑、`0` 不变、`1` 全白，超出范围的值截断到 `[-1, 1]`。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Brightness {
    value: f32,
}

impl Brightness {
    pub fn new(value: f32) -> Self {
        Self {
            value: value.clamp(-1.0, 1.0),
        }
    }
}

impl Transformation for Brightness {
    fn transform(&self, raster: Raster) -> Result<Raster, ImageError> {
        if !self.value.is_finite() {
            return Err(ImageError::Transform(format!(
                "亮度参数无效：{}",
                self.value
            )));
        }

        let offset = self.value * 255.0;
        let mut rgba = raster.into_rgba8();
        for pixel in rgba.pixels_mut() {
            let [r, g, b, a] = pixel.0;
            pixel.0 = [
                clamp_channel(r as f32 + offset),
                clamp_channel(g as f32 + offset),
                clamp_channel(b as f32 + offset),
                a,
            ];
        }
        Ok(Raster::from_rgba_image(rgba))
    }

    fn key(&self) -> String {
        format!("brightness_{:?}", self.value)
    }
}
