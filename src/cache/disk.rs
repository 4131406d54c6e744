//! # 磁盘缓存
//!
//! ## 设计思路
//!
//! 单目录内容存储：文件名为指纹 MD5 的 32 位小写十六进制，内容为有损编码后的位图，
//! 不带额外头部或校验。目录总大小超过预算时按修改时间从旧到新删除。
//!
//! ## 实现思路
//!
//! - 写入：锁外编码 → 加写锁 → 写临时文件 → rename 到目标文件名 → 容量整理。
//! - 读取不加锁；文件不存在视为未命中，解码失败视为未命中并删除坏文件。
//!   删除在写锁内进行，且只在文件长度与修改时间仍和读取时一致时执行。
//! - 异步写入通过后台运行时的 `spawn_blocking` 执行，错误只记日志。

use std::fs;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Instant, SystemTime};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::codec::{Decoder, Encoder};
use crate::error::ImageError;
use crate::raster::Raster;

const TEMP_SUFFIX: &str = ".tmp";

/// 读取时刻的文件长度与修改时间。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

impl FileStamp {
    fn of(meta: &fs::Metadata) -> Self {
        Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        }
    }
}

fn read_with_stamp(path: &Path) -> std::io::Result<(Vec<u8>, FileStamp)> {
    let mut file = fs::File::open(path)?;
    let stamp = FileStamp::of(&file.metadata()?);
    let mut bytes = Vec::with_capacity(stamp.len as usize);
    file.read_to_end(&mut bytes)?;
    Ok((bytes, stamp))
}

/// 有容量上限的磁盘位图缓存。
pub struct DiskCache {
    dir: PathBuf,
    max_bytes: u64,
    quality: u8,
    encoder: Arc<dyn Encoder>,
    decoder: Arc<dyn Decoder>,
    write_lock: Mutex<()>,
    temp_seq: AtomicU64,
}

impl DiskCache {
    /// 打开（必要时创建）缓存目录。
    pub fn open(
        dir: impl Into<PathBuf>,
        max_bytes: u64,
        quality: u8,
        encoder: Arc<dyn Encoder>,
        decoder: Arc<dyn Decoder>,
    ) -> Result<Self, ImageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            ImageError::CacheIo(format!("无法创建缓存目录 {}：{}", dir.display(), e))
        })?;

        log::info!(
            "💾 磁盘缓存目录：{}（容量 {:.2} MB，质量 {}）",
            dir.display(),
            max_bytes as f64 / 1024.0 / 1024.0,
            quality
        );

        Ok(Self {
            dir,
            max_bytes,
            quality,
            encoder,
            decoder,
            write_lock: Mutex::new(()),
            temp_seq: AtomicU64::new(0),
        })
    }

    /// 指纹对应的文件名（MD5 小写十六进制）。
    pub fn file_name_for(key: &str) -> String {
        format!("{:x}", md5::compute(key.as_bytes()))
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(Self::file_name_for(key))
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    pub fn max_size(&self) -> u64 {
        self.max_bytes
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    fn lock_writes(&self) -> Result<MutexGuard<'_, ()>, ImageError> {
        self.write_lock
            .lock()
            .map_err(|_| ImageError::CacheIo("磁盘缓存写锁已中毒".to_string()))
    }

    /// 同步写入；成功后执行容量整理。
    pub fn put(&self, key: &str, raster: &Raster) -> Result<(), ImageError> {
        if key.is_empty() {
            return Ok(());
        }

        let started = Instant::now();
        let encoded = self.encoder.encode(raster, self.quality)?;
        if encoded.is_empty() {
            return Err(ImageError::CacheIo("编码结果为空".to_string()));
        }

        let target = self.path_for(key);
        let temp = self.dir.join(format!(
            "{}.{}{}",
            Self::file_name_for(key),
            self.temp_seq.fetch_add(1, Ordering::Relaxed),
            TEMP_SUFFIX
        ));

        let _guard = self.lock_writes()?;

        if let Err(e) = fs::write(&temp, &encoded) {
            let _ = fs::remove_file(&temp);
            return Err(ImageError::CacheIo(format!("写入临时文件失败：{}", e)));
        }
        if let Err(e) = fs::rename(&temp, &target) {
            let _ = fs::remove_file(&temp);
            return Err(ImageError::CacheIo(format!("重命名缓存文件失败：{}", e)));
        }

        log::debug!(
            "💾 磁盘缓存写入：{}（{} bytes，{}ms）",
            target.display(),
            encoded.len(),
            started.elapsed().as_millis()
        );

        self.trim_locked()
    }

    /// 在后台运行时上执行写入；失败只记录日志。
    pub fn put_async(
        self: &Arc<Self>,
        runtime: &Handle,
        key: String,
        raster: Arc<Raster>,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        runtime.spawn_blocking(move || {
            if let Err(err) = cache.put(&key, &raster) {
                log::warn!("⚠️ 磁盘缓存写入失败（已忽略）：{}", err);
            }
        })
    }

    /// 读取并解码；缺失或损坏都视为未命中。
    pub fn get(&self, key: &str) -> Option<Raster> {
        if key.is_empty() {
            return None;
        }

        let path = self.path_for(key);
        let (bytes, stamp) = match read_with_stamp(&path) {
            Ok(read) => read,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("⚠️ 读取磁盘缓存失败（按未命中处理）：{}：{}", path.display(), e);
                return None;
            }
        };

        match self.decoder.decode(&bytes) {
            Ok(raster) => Some(raster),
            Err(err) => {
                log::warn!(
                    "⚠️ 磁盘缓存文件损坏，删除：{}：{}",
                    path.display(),
                    err
                );
                self.remove_if_unchanged(&path, &stamp);
                None
            }
        }
    }

    /// 写锁内删除坏文件；期间被新写入替换过则保留。
    fn remove_if_unchanged(&self, path: &Path, stamp: &FileStamp) -> bool {
        let Ok(_guard) = self.lock_writes() else {
            return false;
        };
        match fs::metadata(path) {
            Ok(meta) if FileStamp::of(&meta) == *stamp => fs::remove_file(path).is_ok(),
            Ok(_) => {
                log::debug!("坏文件已被新写入替换，保留：{}", path.display());
                false
            }
            Err(_) => false,
        }
    }

    /// 在后台运行时上读取。
    pub fn get_async(self: &Arc<Self>, runtime: &Handle, key: String) -> JoinHandle<Option<Raster>> {
        let cache = Arc::clone(self);
        runtime.spawn_blocking(move || cache.get(&key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.path_for(key).is_file()
    }

    /// 删除单个条目；返回文件是否存在过。
    pub fn remove(&self, key: &str) -> Result<bool, ImageError> {
        let _guard = self.lock_writes()?;
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ImageError::CacheIo(format!("删除缓存文件失败：{}", e))),
        }
    }

    /// 删除目录下所有文件。
    pub fn clear(&self) -> Result<(), ImageError> {
        let _guard = self.lock_writes()?;
        let mut removed = 0usize;
        for file in self.list_files()? {
            match fs::remove_file(&file.path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(ImageError::CacheIo(format!(
                        "清空磁盘缓存失败：{}：{}",
                        file.path.display(),
                        e
                    )));
                }
            }
        }
        log::info!("🧹 磁盘缓存已清空：删除 {} 个文件", removed);
        Ok(())
    }

    /// 目录内文件总字节数。
    pub fn size(&self) -> u64 {
        self.list_files()
            .map(|files| files.iter().map(|f| f.len).sum())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.list_files().map(|files| files.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn list_files(&self) -> Result<Vec<CacheFile>, ImageError> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| ImageError::CacheIo(format!("无法列出缓存目录：{}", e)))?;

        let mut files = Vec::new();
        for entry in entries.flatten() {
            // 文件可能在遍历期间被其他线程删除
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            files.push(CacheFile {
                path: entry.path(),
                len: meta.len(),
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
        Ok(files)
    }

    /// 容量整理，调用方必须持有写锁。
    fn trim_locked(&self) -> Result<(), ImageError> {
        let mut files = self.list_files()?;
        let mut total: u64 = files.iter().map(|f| f.len).sum();
        if total <= self.max_bytes {
            return Ok(());
        }

        files.sort_by_key(|f| f.modified);

        let mut deleted = 0usize;
        for file in files {
            if total <= self.max_bytes {
                break;
            }
            match fs::remove_file(&file.path) {
                Ok(()) => {
                    total = total.saturating_sub(file.len);
                    deleted += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    total = total.saturating_sub(file.len);
                }
                Err(e) => {
                    log::warn!("⚠️ 容量整理删除失败：{}：{}", file.path.display(), e);
                }
            }
        }

        log::debug!(
            "🧹 磁盘缓存整理：删除 {} 个文件，剩余 {} bytes（上限 {}）",
            deleted,
            total,
            self.max_bytes
        );
        Ok(())
    }
}

struct CacheFile {
    path: PathBuf,
    len: u64,
    modified: SystemTime,
}
