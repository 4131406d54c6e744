//! 链式请求构建器。
//!
//! ```rust,ignore
//! PicFly::get()?
//!     .load("https://example.com/a.png")
//!     .placeholder(Drawable::Resource(1))
//!     .resize(200, 200)
//!     .circle_crop()
//!     .into_view(&view)?;
//! ```

use std::sync::{Arc, Weak};

use crate::error::ImageError;
use crate::picfly::PicFly;
use crate::raster::Drawable;
use crate::request::RequestDescriptor;
use crate::target::{ImageView, ImageViewTarget, Target, ViewHolder, ViewHolderTarget};
use crate::transformation::{
    Blur, Brightness, CircleCrop, ColorFilter, CornerType, Grayscale, Rotate, RoundedCorners,
    Transformation,
};

/// 累积一次请求的配置，终结操作把描述交给协调器。
#[must_use = "请求只有在调用 into / preload 之后才会执行"]
pub struct RequestBuilder<'a> {
    picfly: &'a PicFly,
    request: RequestDescriptor,
}

impl<'a> RequestBuilder<'a> {
    pub(crate) fn new(picfly: &'a PicFly, url: impl Into<String>) -> Self {
        Self {
            picfly,
            request: RequestDescriptor::new(url),
        }
    }

    pub fn placeholder(mut self, placeholder: impl Into<Drawable>) -> Self {
        self.request = self.request.with_placeholder(placeholder.into());
        self
    }

    pub fn error(mut self, error_drawable: impl Into<Drawable>) -> Self {
        self.request = self.request.with_error_drawable(error_drawable.into());
        self
    }

    pub fn transform(mut self, transformation: Arc<dyn Transformation>) -> Self {
        self.request = self.request.with_transformation(transformation);
        self
    }

    pub fn blur(self) -> Self {
        self.transform(Arc::new(Blur::default()))
    }

    pub fn blur_radius(self, radius: f32) -> Self {
        self.transform(Arc::new(Blur::new(radius)))
    }

    pub fn grayscale(self) -> Self {
        self.transform(Arc::new(Grayscale))
    }

    pub fn rotate(self, degrees: f32) -> Self {
        self.transform(Arc::new(Rotate::new(degrees)))
    }

    pub fn circle_crop(self) -> Self {
        self.transform(Arc::new(CircleCrop::new()))
    }

    pub fn circle_crop_with_border(self, border_color: u32, border_width: f32) -> Self {
        self.transform(Arc::new(CircleCrop::with_border(border_color, border_width)))
    }

    pub fn rounded_corners(self, radius: f32) -> Self {
        self.rounded_corners_with_type(radius, 0, CornerType::All)
    }

    pub fn rounded_corners_with_margin(self, radius: f32, margin: u32) -> Self {
        self.rounded_corners_with_type(radius, margin, CornerType::All)
    }

    pub fn rounded_corners_with_type(self, radius: f32, margin: u32, corner_type: CornerType) -> Self {
        self.transform(Arc::new(RoundedCorners::new(radius, margin, corner_type)))
    }

    pub fn color_filter(self, color: u32) -> Self {
        self.transform(Arc::new(ColorFilter::new(color)))
    }

    pub fn brightness(self, value: f32) -> Self {
        self.transform(Arc::new(Brightness::new(value)))
    }

    pub fn resize(mut self, width: u32, height: u32) -> Self {
        self.request = self.request.with_resize(width, height);
        self
    }

    /// 当前累积的请求描述。
    pub fn build(self) -> RequestDescriptor {
        self.request
    }

    /// 交付给任意目标。URL 为空时目标收到 `on_load_failed`。
    pub fn into(self, target: Arc<dyn Target>) {
        self.picfly.loader().load(self.request, target);
    }

    /// 交付给单个控件；控件已销毁时返回 `InvalidArgument`。
    pub fn into_view<V>(self, view: &Weak<V>) -> Result<Arc<ImageViewTarget>, ImageError>
    where
        V: ImageView + 'static,
    {
        if view.strong_count() == 0 {
            return Err(ImageError::InvalidArgument("目标控件已销毁".to_string()));
        }

        let view: Weak<dyn ImageView> = view.clone();
        let target = Arc::new(ImageViewTarget::new(view));
        self.into(Arc::clone(&target) as Arc<dyn Target>);
        Ok(target)
    }

    /// 交付给列表条目中的控件，同一 (容器, 控件) 上的旧请求会被清理。
    pub fn into_holder<V, H>(
        self,
        view: &Weak<V>,
        holder: &Weak<H>,
    ) -> Result<Arc<ViewHolderTarget>, ImageError>
    where
        V: ImageView + 'static,
        H: ViewHolder + 'static,
    {
        let view: Weak<dyn ImageView> = view.clone();
        let holder: Weak<dyn ViewHolder> = holder.clone();
        let target = self.picfly.registry().bind(view, holder)?;
        self.into(Arc::clone(&target) as Arc<dyn Target>);
        Ok(target)
    }

    /// 只预热缓存；URL 为空时返回 `InvalidArgument`。
    pub fn preload(self) -> Result<(), ImageError> {
        if !self.request.has_url() {
            return Err(ImageError::InvalidArgument("预加载 URL 为空".to_string()));
        }
        self.picfly.loader().preload(self.request);
        Ok(())
    }
}
