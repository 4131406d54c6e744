//! # 两级缓存
//!
//! 两级缓存共用同一个 key：请求指纹。
//!
//! | 层级 | 类型 | 限容方式 | 淘汰策略 |
//! |------|------|----------|----------|
//! | 内存 | [`MemoryCache`] | 位图字节数 | 最近最少使用 |
//! | 磁盘 | [`DiskCache`] | 目录文件总字节数 | 修改时间最早优先 |

mod disk;
mod memory;

pub use disk::DiskCache;
pub use memory::{MemoryCache, MemoryCacheStats};
