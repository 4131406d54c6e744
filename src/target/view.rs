use std::sync::{Arc, Weak};

use super::{ImageView, Target};
use crate::raster::{Drawable, Raster};

/// 持有控件弱引用的目标；控件已销毁时所有回调都是 no-op。
pub struct ImageViewTarget {
    view: Weak<dyn ImageView>,
}

impl ImageViewTarget {
    pub fn new(view: Weak<dyn ImageView>) -> Self {
        Self { view }
    }

    pub fn is_alive(&self) -> bool {
        self.view.strong_count() > 0
    }

    fn apply(&self, drawable: Option<Drawable>) {
        if let Some(view) = self.view.upgrade() {
            view.set_drawable(drawable);
        }
    }
}

impl Target for ImageViewTarget {
    fn on_load_started(&self, placeholder: Option<Drawable>) {
        self.apply(placeholder);
    }

    fn on_resource_ready(&self, raster: Arc<Raster>) {
        self.apply(Some(Drawable::Raster(raster)));
    }

    fn on_load_failed(&self, error_drawable: Option<Drawable>) {
        self.apply(error_drawable);
    }

    fn on_cleared(&self) {
        self.apply(None);
    }
}
