//! # 请求描述与指纹
//!
//! `RequestDescriptor` 是构建器产出的不可变记录，协调器接收后拥有它。
//!
//! 指纹格式：
//!
//! ```text
//! url [ "_" width "x" height ]  ( "_" key )*
//! ```
//!
//! 缩放段仅在宽高都为正时出现；变换 key 按插入顺序拼接。
//! 指纹是内存与磁盘两级缓存共用的唯一 key。

use std::fmt;
use std::sync::Arc;

use crate::raster::Drawable;
use crate::transformation::Transformation;

/// 单次加载请求。
#[derive(Clone, Default)]
pub struct RequestDescriptor {
    url: String,
    placeholder: Option<Drawable>,
    error_drawable: Option<Drawable>,
    transformations: Vec<Arc<dyn Transformation>>,
    width: u32,
    height: u32,
}

impl RequestDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_placeholder(mut self, placeholder: Drawable) -> Self {
        self.placeholder = Some(placeholder);
        self
    }

    pub fn with_error_drawable(mut self, error_drawable: Drawable) -> Self {
        self.error_drawable = Some(error_drawable);
        self
    }

    pub fn with_transformation(mut self, transformation: Arc<dyn Transformation>) -> Self {
        self.transformations.push(transformation);
        self
    }

    /// 设置目标尺寸；只有一边为正时视为不缩放。
    pub fn with_resize(mut self, width: u32, height: u32) -> Self {
        if (width > 0) != (height > 0) {
            log::warn!(
                "⚠️ 缩放尺寸只有一边为正（{}x{}），按不缩放处理",
                width,
                height
            );
            self.width = 0;
            self.height = 0;
        } else {
            self.width = width;
            self.height = height;
        }
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn placeholder(&self) -> Option<&Drawable> {
        self.placeholder.as_ref()
    }

    pub fn error_drawable(&self) -> Option<&Drawable> {
        self.error_drawable.as_ref()
    }

    pub fn transformations(&self) -> &[Arc<dyn Transformation>] {
        &self.transformations
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// 需要缩放时返回目标尺寸。
    pub fn resize_target(&self) -> Option<(u32, u32)> {
        (self.width > 0 && self.height > 0).then_some((self.width, self.height))
    }

    pub fn has_url(&self) -> bool {
        !self.url.trim().is_empty()
    }

    /// 缓存指纹。
    ///
    /// # 示例
    /// ```rust,ignore
    /// use std::sync::Arc;
    /// use picfly::{Blur, RequestDescriptor};
    ///
    /// let request = RequestDescriptor::new("http://host/x.png")
    ///     .with_resize(100, 50)
    ///     .with_transformation(Arc::new(Blur::new(10.0)));
    /// assert_eq!(request.fingerprint(), "http://host/x.png_100x50_blur_10.0");
    /// ```
    pub fn fingerprint(&self) -> String {
        let mut key = self.url.clone();

        if let Some((width, height)) = self.resize_target() {
            key.push('_');
            key.push_str(&width.to_string());
            key.push('x');
            key.push_str(&height.to_string());
        }

        for transformation in &self.transformations {
            key.push('_');
            key.push_str(&transformation.key());
        }

        key
    }
}

impl fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self.transformations.iter().map(|t| t.key()).collect();
        f.debug_struct("RequestDescriptor")
            .field("url", &self.url)
            .field("placeholder", &self.placeholder)
            .field("error_drawable", &self.error_drawable)
            .field("transformations", &keys)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}
