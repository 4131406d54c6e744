//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 整条加载链路（请求构建 → 拉取 → 解码 → 变换 → 缓存）只使用一个错误枚举，
//! 调用侧可以按分支匹配，也可以通过 `code()` / `stage()` 拿到稳定的机器可读标识。
//!
//! ## 实现思路
//!
//! - 变体携带中文描述字符串，保持与日志一致的可读性。
//! - `HttpStatus` 单独携带状态码，协调器据此把非 2xx 归入拉取失败。
//! - 缓存读写错误（`CacheIo`）只会被记录日志并降级为未命中，不会传给目标。

/// 图片加载统一错误类型。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    #[error("参数错误：{0}")]
    InvalidArgument(String),

    #[error("网络错误：{0}")]
    Network(String),

    #[error("HTTP 状态异常：{0}")]
    HttpStatus(u16),

    #[error("超时错误：{0}")]
    Timeout(String),

    #[error("已取消：{0}")]
    Cancelled(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("变换错误：{0}")]
    Transform(String),

    #[error("缓存读写错误：{0}")]
    CacheIo(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),
}

impl ImageError {
    /// 稳定错误码，便于宿主侧统计与分支处理。
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "E_INVALID_ARGUMENT",
            Self::Network(_) => "E_NETWORK",
            Self::HttpStatus(_) => "E_HTTP_STATUS",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::Cancelled(_) => "E_CANCELLED",
            Self::Decode(_) => "E_DECODE",
            Self::Transform(_) => "E_TRANSFORM",
            Self::CacheIo(_) => "E_CACHE_IO",
            Self::ResourceLimit(_) => "E_RESOURCE_LIMIT",
        }
    }

    /// 错误所属流水线阶段。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "request",
            Self::Network(_) | Self::HttpStatus(_) | Self::Timeout(_) | Self::Cancelled(_) => {
                "fetch"
            }
            Self::Decode(_) | Self::ResourceLimit(_) => "decode",
            Self::Transform(_) => "transform",
            Self::CacheIo(_) => "cache",
        }
    }
}

impl From<ImageError> for String {
    fn from(error: ImageError) -> Self {
        error.to_string()
    }
}
