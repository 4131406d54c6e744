//! # 处理链模块
//!
//! ## 设计思路
//!
//! 解码后的原图依次经过“缩放 → 变换链”得到最终位图。每一步都按值接收上一步结果，
//! 因此任意时刻最多只有当前与下一张两张位图存活。
//!
//! ## 实现思路
//!
//! 1. 仅当宽高都为正且与原图不同才缩放
//! 2. 缩放优先走 `fast_image_resize`，失败时回退 `image::resize_exact`
//! 3. 变换按插入顺序执行，任一步失败即整体失败

use fast_image_resize as fr;
use image::{DynamicImage, ImageBuffer, Rgba};
use std::time::Instant;

use crate::config::ResizeFilter;
use crate::error::ImageError;
use crate::raster::Raster;
use crate::request::RequestDescriptor;

/// 对原图执行缩放与变换链。
pub(crate) fn process(
    original: Raster,
    request: &RequestDescriptor,
    filter: ResizeFilter,
) -> Result<Raster, ImageError> {
    let started = Instant::now();
    let mut current = original;

    if let Some((width, height)) = request.resize_target() {
        if current.dimensions() != (width, height) {
            current = resize(current, width, height, filter)?;
        }
    }

    for transformation in request.transformations() {
        current = transformation.transform(current)?;
    }

    log::debug!(
        "🧩 处理链完成：resize={:?} transforms={} 输出={}x{} 耗时={}ms",
        request.resize_target(),
        request.transformations().len(),
        current.width(),
        current.height(),
        started.elapsed().as_millis()
    );

    Ok(current)
}

fn resize(
    raster: Raster,
    target_width: u32,
    target_height: u32,
    filter: ResizeFilter,
) -> Result<Raster, ImageError> {
    match resize_with_fast_image_resize(raster.image(), target_width, target_height, filter) {
        Ok(resized) => Ok(Raster::new(resized)),
        Err(err) => {
            log::warn!(
                "⚠️ fast_image_resize 缩放失败，回退 image::resize_exact：{}",
                err
            );
            Ok(Raster::new(raster.into_image().resize_exact(
                target_width,
                target_height,
                filter.to_image_filter(),
            )))
        }
    }
}

fn resize_with_fast_image_resize(
    image: &DynamicImage,
    target_width: u32,
    target_height: u32,
    filter: ResizeFilter,
) -> Result<DynamicImage, ImageError> {
    let src = image.to_rgba8();
    let (src_width, src_height) = src.dimensions();

    let src_image = fr::images::Image::from_vec_u8(
        src_width,
        src_height,
        src.into_raw(),
        fr::PixelType::U8x4,
    )
    .map_err(|e| ImageError::Transform(format!("构建源图像缓冲失败：{}", e)))?;

    let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x4);

    let mut resizer = fr::Resizer::new();
    let options =
        fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(filter.to_fast_filter()));

    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| ImageError::Transform(format!("fast_image_resize 执行失败：{}", e)))?;

    let rgba = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(
        target_width,
        target_height,
        dst_image.into_vec(),
    )
    .ok_or_else(|| ImageError::Transform("fast_image_resize 输出缓冲长度异常".to_string()))?;

    Ok(DynamicImage::ImageRgba8(rgba))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformation::{Grayscale, Rotate, Transformation};
    use std::sync::Arc;

    fn gradient(width: u32, height: u32) -> Raster {
        Raster::from_rgba_image(ImageBuffer::from_fn(width, height, |x, y| {
            Rgba([(x * 4 % 256) as u8, (y * 4 % 256) as u8, 200, 255])
        }))
    }

    #[test]
    fn resize_runs_before_transformations() {
        let request = RequestDescriptor::new("http://host/a.png")
            .with_resize(20, 10)
            .with_transformation(Arc::new(Rotate::new(90.0)));

        let out = process(gradient(64, 64), &request, ResizeFilter::Bilinear).expect("process failed");

        assert_eq!(out.dimensions(), (10, 20));
    }

    #[test]
    fn matching_size_skips_resize() {
        let request = RequestDescriptor::new("http://host/a.png").with_resize(64, 32);

        let source = gradient(64, 32);
        let before = source.image().to_rgba8();
        let out = process(source, &request, ResizeFilter::Lanczos3).expect("process failed");

        assert_eq!(out.image().to_rgba8(), before);
    }

    #[test]
    fn failing_step_aborts_chain() {
        struct Broken;
        impl Transformation for Broken {
            fn transform(&self, _raster: Raster) -> Result<Raster, ImageError> {
                Err(ImageError::Transform("boom".to_string()))
            }
            fn key(&self) -> String {
                "broken".to_string()
            }
        }

        let request = RequestDescriptor::new("http://host/a.png")
            .with_transformation(Arc::new(Broken))
            .with_transformation(Arc::new(Grayscale));

        let result = process(gradient(8, 8), &request, ResizeFilter::Bilinear);
        assert!(matches!(result, Err(ImageError::Transform(_))));
    }
}
