//! 几何与遮罩变换：旋转、圆形裁剪、圆角。
//!
//! 遮罩边缘按像素中心到圆弧的距离做 1 像素宽的抗锯齿过渡。

use image::{Rgba, RgbaImage, imageops};

use super::{Transformation, argb_to_rgba, clamp_channel};
use crate::error::ImageError;
use crate::raster::Raster;

/// 顺时针旋转任意角度，画布扩展到旋转后的包围盒。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotate {
    degrees: f32,
}

impl Rotate {
    pub fn new(degrees: f32) -> Self {
        Self { degrees }
    }
}

impl Transformation for Rotate {
    fn transform(&self, raster: Raster) -> Result<Raster, ImageError> {
        if !self.degrees.is_finite() {
            return Err(ImageError::Transform(format!(
                "旋转角度无效：{}",
                self.degrees
            )));
        }

        let normalized = self.degrees.rem_euclid(360.0);
        if normalized == 0.0 {
            return Ok(raster);
        }
        if normalized == 90.0 {
            return Ok(Raster::new(raster.into_image().rotate90()));
        }
        if normalized == 180.0 {
            return Ok(Raster::new(raster.into_image().rotate180()));
        }
        if normalized == 270.0 {
            return Ok(Raster::new(raster.into_image().rotate270()));
        }

        Ok(Raster::from_rgba_image(rotate_arbitrary(
            &raster.into_rgba8(),
            normalized,
        )))
    }

    fn key(&self) -> String {
        format!("rotate_{:?}", self.degrees)
    }
}

fn rotate_arbitrary(src: &RgbaImage, degrees: f32) -> RgbaImage {
    let (width, height) = src.dimensions();
    let (sin, cos) = degrees.to_radians().sin_cos();

    let out_width = ((width as f32 * cos.abs() + height as f32 * sin.abs()).ceil() as u32).max(1);
    let out_height = ((width as f32 * sin.abs() + height as f32 * cos.abs()).ceil() as u32).max(1);

    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
    let (ocx, ocy) = (out_width as f32 / 2.0, out_height as f32 / 2.0);

    RgbaImage::from_fn(out_width, out_height, |x, y| {
        let dx = x as f32 + 0.5 - ocx;
        let dy = y as f32 + 0.5 - ocy;
        let sx = dx * cos + dy * sin + cx - 0.5;
        let sy = -dx * sin + dy * cos + cy - 0.5;
        sample_bilinear(src, sx, sy)
    })
}

fn sample_bilinear(src: &RgbaImage, x: f32, y: f32) -> Rgba<u8> {
    let (width, height) = src.dimensions();
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let fetch = |px: f32, py: f32| -> [f32; 4] {
        if px < 0.0 || py < 0.0 || px >= width as f32 || py >= height as f32 {
            return [0.0; 4];
        }
        let p = src.get_pixel(px as u32, py as u32).0;
        [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
    };

    let tl = fetch(x0, y0);
    let tr = fetch(x0 + 1.0, y0);
    let bl = fetch(x0, y0 + 1.0);
    let br = fetch(x0 + 1.0, y0 + 1.0);

    let mut out = [0u8; 4];
    for i in 0..4 {
        let top = tl[i] + (tr[i] - tl[i]) * fx;
        let bottom = bl[i] + (br[i] - bl[i]) * fx;
        out[i] = clamp_channel(top + (bottom - top) * fy);
    }
    Rgba(out)
}

/// 居中裁成正方形后做圆形遮罩，可选描边。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleCrop {
    border_color: u32,
    border_width: f32,
}

impl CircleCrop {
    pub fn new() -> Self {
        Self {
            border_color: 0,
            border_width: 0.0,
        }
    }

    /// `border_color` 为 ARGB。
    pub fn with_border(border_color: u32, border_width: f32) -> Self {
        Self {
            border_color,
            border_width: border_width.max(0.0),
        }
    }
}

impl Default for CircleCrop {
    fn default() -> Self {
        Self::new()
    }
}

impl Transformation for CircleCrop {
    fn transform(&self, raster: Raster) -> Result<Raster, ImageError> {
        let rgba = raster.into_rgba8();
        let (width, height) = rgba.dimensions();
        let size = width.min(height);
        if size == 0 {
            return Err(ImageError::Transform("圆形裁剪输入尺寸为 0".to_string()));
        }

        let square = imageops::crop_imm(&rgba, (width - size) / 2, (height - size) / 2, size, size)
            .to_image();
        drop(rgba);

        let radius = size as f32 / 2.0;
        let inner = radius - self.border_width;
        let [br, bg, bb, ba] = argb_to_rgba(self.border_color);

        let mut out = square;
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            let dx = x as f32 + 0.5 - radius;
            let dy = y as f32 + 0.5 - radius;
            let distance = (dx * dx + dy * dy).sqrt();

            let image_cov = coverage(inner, distance);
            let [r, g, b, a] = pixel.0;
            let mut rgba = [r as f32, g as f32, b as f32, a as f32 * image_cov];

            if self.border_width > 0.0 {
                let border_cov = (coverage(radius, distance) - image_cov).max(0.0);
                rgba = blend_over(rgba, [br as f32, bg as f32, bb as f32, ba as f32 * border_cov]);
            }

            pixel.0 = rgba.map(clamp_channel);
        }

        Ok(Raster::from_rgba_image(out))
    }

    fn key(&self) -> String {
        if self.border_width > 0.0 {
            format!("circle_border_{}_{:?}", self.border_color, self.border_width)
        } else {
            "circle".to_string()
        }
    }
}

/// 圆角位置组合。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CornerType {
    All,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Top,
    Bottom,
    Left,
    Right,
    OtherTopLeft,
    OtherTopRight,
    OtherBottomLeft,
    OtherBottomRight,
    DiagonalFromTopLeft,
    DiagonalFromTopRight,
}

impl CornerType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::TopLeft => "TOP_LEFT",
            Self::TopRight => "TOP_RIGHT",
            Self::BottomLeft => "BOTTOM_LEFT",
            Self::BottomRight => "BOTTOM_RIGHT",
            Self::Top => "TOP",
            Self::Bottom => "BOTTOM",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::OtherTopLeft => "OTHER_TOP_LEFT",
            Self::OtherTopRight => "OTHER_TOP_RIGHT",
            Self::OtherBottomLeft => "OTHER_BOTTOM_LEFT",
            Self::OtherBottomRight => "OTHER_BOTTOM_RIGHT",
            Self::DiagonalFromTopLeft => "DIAGONAL_FROM_TOP_LEFT",
            Self::DiagonalFromTopRight => "DIAGONAL_FROM_TOP_RIGHT",
        }
    }

    /// 返回 `[左上, 右上, 左下, 右下]` 是否为圆角。
    fn rounded(self) -> [bool; 4] {
        match self {
            Self::All => [true, true, true, true],
            Self::TopLeft => [true, false, false, false],
            Self::TopRight => [false, true, false, false],
            Self::BottomLeft => [false, false, true, false],
            Self::BottomRight => [false, false, false, true],
            Self::Top => [true, true, false, false],
            Self::Bottom => [false, false, true, true],
            Self::Left => [true, false, true, false],
            Self::Right => [false, true, false, true],
            Self::OtherTopLeft => [false, true, true, true],
            Self::OtherTopRight => [true, false, true, true],
            Self::OtherBottomLeft => [true, true, false, true],
            Self::OtherBottomRight => [true, true, true, false],
            Self::DiagonalFromTopLeft => [true, false, false, true],
            Self::DiagonalFromTopRight => [false, true, true, false],
        }
    }
}

/// 圆角遮罩；`margin` 以外的像素变为全透明。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundedCorners {
    radius: f32,
    margin: u32,
    corner_type: CornerType,
}

impl RoundedCorners {
    pub fn new(radius: f32, margin: u32, corner_type: CornerType) -> Self {
        Self {
            radius: radius.max(0.0),
            margin,
            corner_type,
        }
    }
}

impl Transformation for RoundedCorners {
    fn transform(&self, raster: Raster) -> Result<Raster, ImageError> {
        let mut rgba = raster.into_rgba8();
        let (width, height) = rgba.dimensions();

        let left = self.margin as f32;
        let top = self.margin as f32;
        let right = width as f32 - self.margin as f32;
        let bottom = height as f32 - self.margin as f32;
        if right <= left || bottom <= top {
            return Err(ImageError::Transform(format!(
                "圆角边距过大：margin={} 尺寸={}x{}",
                self.margin, width, height
            )));
        }

        let radius = self.radius.min((right - left) / 2.0).min((bottom - top) / 2.0);
        let [tl, tr, bl, br] = self.corner_type.rounded();
        let centers = [
            (tl, left + radius, top + radius, true, true),
            (tr, right - radius, top + radius, false, true),
            (bl, left + radius, bottom - radius, true, false),
            (br, right - radius, bottom - radius, false, false),
        ];

        for (x, y, pixel) in rgba.enumerate_pixels_mut() {
            let px = x as f32 + 0.5;
            let py = y as f32 + 0.5;

            if px < left || px > right || py < top || py > bottom {
                pixel.0 = [0, 0, 0, 0];
                continue;
            }

            if radius <= 0.0 {
                continue;
            }

            for (rounded, cx, cy, is_left, is_top) in centers {
                let in_corner_x = if is_left { px < cx } else { px > cx };
                let in_corner_y = if is_top { py < cy } else { py > cy };
                if rounded && in_corner_x && in_corner_y {
                    let distance = ((px - cx).powi(2) + (py - cy).powi(2)).sqrt();
                    let cov = coverage(radius, distance);
                    pixel.0[3] = clamp_channel(pixel.0[3] as f32 * cov);
                }
            }
        }

        Ok(Raster::from_rgba_image(rgba))
    }

    fn key(&self) -> String {
        format!(
            "rounded_{:?}_{}_{}",
            self.radius,
            self.margin,
            self.corner_type.as_str()
        )
    }
}

fn coverage(radius: f32, distance: f32) -> f32 {
    (radius - distance + 0.5).clamp(0.0, 1.0)
}

/// 非预乘 src-over 合成。
fn blend_over(dst: [f32; 4], src: [f32; 4]) -> [f32; 4] {
    let sa = src[3] / 255.0;
    let da = dst[3] / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return [0.0; 4];
    }

    let mix = |s: f32, d: f32| (s * sa + d * da * (1.0 - sa)) / out_a;
    [
        mix(src[0], dst[0]),
        mix(src[1], dst[1]),
        mix(src[2], dst[2]),
        out_a * 255.0,
    ]
}
