//! # 请求协调器（ImageLoader）
//!
//! ## 设计思路
//!
//! 协调器编排整条加载链路，并保证三件事：
//!
//! 1. 同一指纹同一时刻最多一次拉取 / 解码 / 处理（single-flight）；
//! 2. 目标回调全部在 UI 上下文执行，`on_load_started` 总在终态回调之前；
//! 3. `cancel_all` 之后，已排队但尚未执行的回调全部失效。
//!
//! ## 实现思路
//!
//! ```text
//! load(request, target)
//!    ├─ url 为空 ──────────────► on_load_failed（同步）
//!    ├─ on_load_started（同步）
//!    ├─ 内存命中 ──────────────► on_resource_ready（同步）
//!    └─ 后台任务
//!         ├─ 磁盘命中 ──► 提升到内存 ──► on_resource_ready
//!         └─ 未命中 ──► 登记 in-flight 表
//!               ├─ 已有同指纹 ──► 追加为 waiter
//!               └─ 新建 ──► fetch → decode → resize → transforms
//!                           → 内存写入 → 磁盘异步写入 → 交付所有 waiter
//! ```
//!
//! - in-flight 表由协调器自己的互斥锁保护，锁从不跨越 I/O 或解码。
//! - 每个回调都携带提交时的“代数”（epoch），`cancel_all` 递增代数，
//!   UI 上下文执行回调前比对代数，过期的直接丢弃。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use crate::cache::{DiskCache, MemoryCache};
use crate::codec::Decoder;
use crate::config::{PicFlyConfig, ResizeFilter};
use crate::error::ImageError;
use crate::executor::{BackgroundPool, UiDispatcher};
use crate::fetcher::{FetchOptions, Fetcher, redact_url_for_log};
use crate::pipeline;
use crate::raster::{Drawable, Raster};
use crate::request::RequestDescriptor;
use crate::target::Target;

/// 协调器依赖的可注入能力。
pub struct LoaderComponents {
    pub memory: Arc<MemoryCache>,
    pub disk: Arc<DiskCache>,
    pub fetcher: Arc<dyn Fetcher>,
    pub decoder: Arc<dyn Decoder>,
    pub ui: Arc<dyn UiDispatcher>,
}

/// 等待同一指纹结果的一方；失败时交付它自己请求里的错误图。
struct Waiter {
    target: Option<Arc<dyn Target>>,
    error_drawable: Option<Drawable>,
    epoch: u64,
}

struct InFlight {
    flight_id: u64,
    waiters: Vec<Waiter>,
    abort: AbortHandle,
}

struct Shared {
    memory: Arc<MemoryCache>,
    disk: Arc<DiskCache>,
    fetcher: Arc<dyn Fetcher>,
    decoder: Arc<dyn Decoder>,
    ui: Arc<dyn UiDispatcher>,
    runtime: Handle,
    fetch_options: FetchOptions,
    resize_filter: ResizeFilter,
    inflight: Mutex<HashMap<String, InFlight>>,
    epoch: Arc<AtomicU64>,
    next_flight_id: AtomicU64,
}

/// 加载流水线协调器。
pub struct ImageLoader {
    shared: Arc<Shared>,
    pool: Arc<BackgroundPool>,
}

impl ImageLoader {
    pub fn new(components: LoaderComponents, pool: Arc<BackgroundPool>, config: &PicFlyConfig) -> Self {
        let shared = Arc::new(Shared {
            memory: components.memory,
            disk: components.disk,
            fetcher: components.fetcher,
            decoder: components.decoder,
            ui: components.ui,
            runtime: pool.handle(),
            fetch_options: FetchOptions::from_config(config),
            resize_filter: config.resize_filter,
            inflight: Mutex::new(HashMap::new()),
            epoch: Arc::new(AtomicU64::new(0)),
            next_flight_id: AtomicU64::new(1),
        });

        Self { shared, pool }
    }

    /// 加载并交付给目标。
    pub fn load(&self, request: RequestDescriptor, target: Arc<dyn Target>) {
        self.submit(request, Some(target));
    }

    /// 只预热两级缓存，不产生任何回调。
    pub fn preload(&self, request: RequestDescriptor) {
        self.submit(request, None);
    }

    fn submit(&self, request: RequestDescriptor, target: Option<Arc<dyn Target>>) {
        let shared = &self.shared;
        let epoch = shared.epoch.load(Ordering::SeqCst);

        if !request.has_url() {
            log::warn!("⚠️ 请求 URL 为空，直接交付失败");
            if let Some(target) = target {
                let error_drawable = request.error_drawable().cloned();
                shared.dispatch(epoch, move || target.on_load_failed(error_drawable));
            }
            return;
        }

        if let Some(target) = &target {
            let target = Arc::clone(target);
            let placeholder = request.placeholder().cloned();
            shared.dispatch(epoch, move || target.on_load_started(placeholder));
        }

        let key = request.fingerprint();

        if let Some(raster) = shared.memory.get(&key) {
            log::debug!("⚡ 内存命中：{}", redact_url_for_log(request.url()));
            if let Some(target) = target {
                shared.dispatch(epoch, move || target.on_resource_ready(raster));
            }
            return;
        }

        let task_shared = Arc::clone(shared);
        self.pool.handle().spawn(async move {
            task_shared.resolve(key, Arc::new(request), target, epoch).await;
        });
    }

    pub fn clear_memory(&self) {
        self.shared.memory.clear();
        log::info!("🧹 内存缓存已清空");
    }

    pub fn clear_disk(&self) -> Result<(), ImageError> {
        self.shared.disk.clear()
    }

    /// 取消所有进行中的请求：丢弃 waiter，不交付任何回调，不动缓存。
    pub fn cancel_all(&self) {
        let shared = &self.shared;
        shared.epoch.fetch_add(1, Ordering::SeqCst);

        let drained: Vec<InFlight> = match shared.lock_inflight() {
            Ok(mut inflight) => inflight.drain().map(|(_, flight)| flight).collect(),
            Err(err) => {
                log::warn!("⚠️ 取消请求时无法访问 in-flight 表：{}", err);
                Vec::new()
            }
        };

        let mut dropped_waiters = 0usize;
        for flight in &drained {
            flight.abort.abort();
            dropped_waiters += flight.waiters.len();
        }
        shared.fetcher.cancel_all();

        log::info!(
            "🛑 已取消 {} 个进行中的拉取，丢弃 {} 个等待方",
            drained.len(),
            dropped_waiters
        );
    }

    /// 当前进行中的拉取数。
    pub fn inflight_count(&self) -> usize {
        self.shared.lock_inflight().map(|m| m.len()).unwrap_or(0)
    }

    pub fn memory_cache(&self) -> &Arc<MemoryCache> {
        &self.shared.memory
    }

    pub fn disk_cache(&self) -> &Arc<DiskCache> {
        &self.shared.disk
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.shared.fetcher
    }
}

impl Shared {
    fn lock_inflight(&self) -> Result<MutexGuard<'_, HashMap<String, InFlight>>, ImageError> {
        self.inflight
            .lock()
            .map_err(|_| ImageError::ResourceLimit("in-flight 表锁已中毒".to_string()))
    }

    /// 在 UI 上下文执行回调；执行前校验代数。
    fn dispatch(&self, epoch: u64, callback: impl FnOnce() + Send + 'static) {
        let current = Arc::clone(&self.epoch);
        self.ui.run(Box::new(move || {
            if current.load(Ordering::SeqCst) == epoch {
                callback();
            }
        }));
    }

    fn is_stale(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) != epoch
    }

    async fn resolve(
        self: Arc<Self>,
        key: String,
        request: Arc<RequestDescriptor>,
        target: Option<Arc<dyn Target>>,
        epoch: u64,
    ) {
        let started = Instant::now();
        let disk = Arc::clone(&self.disk);
        let disk_key = key.clone();
        let disk_hit = match tokio::task::spawn_blocking(move || disk.get(&disk_key)).await {
            Ok(hit) => hit,
            Err(err) => {
                log::warn!("⚠️ 磁盘读取任务异常（按未命中处理）：{}", err);
                None
            }
        };

        if let Some(raster) = disk_hit {
            let raster = Arc::new(raster);
            self.memory.put(&key, Arc::clone(&raster));
            log::debug!(
                "💾 磁盘命中：{} disk={}ms",
                redact_url_for_log(request.url()),
                started.elapsed().as_millis()
            );
            if let Some(target) = target {
                self.dispatch(epoch, move || target.on_resource_ready(raster));
            }
            return;
        }

        if self.is_stale(epoch) {
            return;
        }

        let waiter = Waiter {
            target,
            error_drawable: request.error_drawable().cloned(),
            epoch,
        };
        self.join_or_start(key, request, waiter);
    }

    fn join_or_start(self: &Arc<Self>, key: String, request: Arc<RequestDescriptor>, waiter: Waiter) {
        let mut inflight = match self.lock_inflight() {
            Ok(guard) => guard,
            Err(err) => {
                self.deliver_failure(vec![waiter], &err);
                return;
            }
        };

        // 拉取可能在磁盘读取期间刚好完成
        if let Some(raster) = self.memory.get(&key) {
            drop(inflight);
            self.deliver_ready(vec![waiter], &raster);
            return;
        }

        if let Some(flight) = inflight.get_mut(&key) {
            flight.waiters.push(waiter);
            log::debug!(
                "🔗 合并到进行中的请求：{}（等待方 {} 个）",
                redact_url_for_log(request.url()),
                flight.waiters.len()
            );
            return;
        }

        let flight_id = self.next_flight_id.fetch_add(1, Ordering::Relaxed);
        let task = self.runtime.spawn(Arc::clone(self).run_flight(
            key.clone(),
            Arc::clone(&request),
            flight_id,
        ));
        inflight.insert(
            key,
            InFlight {
                flight_id,
                waiters: vec![waiter],
                abort: task.abort_handle(),
            },
        );
    }

    async fn run_flight(self: Arc<Self>, key: String, request: Arc<RequestDescriptor>, flight_id: u64) {
        match self.fetch_and_process(&request).await {
            Ok(raster) => {
                self.memory.put(&key, Arc::clone(&raster));
                self.disk.put_async(&self.runtime, key.clone(), Arc::clone(&raster));
                let waiters = self.take_waiters(&key, flight_id);
                self.deliver_ready(waiters, &raster);
            }
            Err(err) => {
                log::warn!(
                    "❌ 加载失败 [{}/{}]：{} - {}",
                    err.code(),
                    err.stage(),
                    err,
                    redact_url_for_log(request.url())
                );
                let waiters = self.take_waiters(&key, flight_id);
                self.deliver_failure(waiters, &err);
            }
        }
    }

    async fn fetch_and_process(&self, request: &Arc<RequestDescriptor>) -> Result<Arc<Raster>, ImageError> {
        let fetch_started = Instant::now();
        let response = self.fetcher.fetch(request.url(), &self.fetch_options).await?;
        let fetch_ms = fetch_started.elapsed().as_millis();

        if !response.is_success() {
            return Err(ImageError::HttpStatus(response.status));
        }
        if response.body.is_empty() {
            return Err(ImageError::Network("响应体为空".to_string()));
        }

        let decoder = Arc::clone(&self.decoder);
        let filter = self.resize_filter;
        let job_request = Arc::clone(request);
        let body = response.body;

        let (raster, decode_ms, process_ms) = tokio::task::spawn_blocking(move || {
            let decode_started = Instant::now();
            let original = decoder.decode(&body)?;
            drop(body);
            let decode_ms = decode_started.elapsed().as_millis();

            let process_started = Instant::now();
            let processed = pipeline::process(original, &job_request, filter)?;
            Ok::<_, ImageError>((processed, decode_ms, process_started.elapsed().as_millis()))
        })
        .await
        .map_err(|e| ImageError::Decode(format!("解码任务异常结束：{}", e)))??;

        log::info!(
            "✅ 加载完成 - {} 尺寸={}x{} fetch={}ms decode={}ms process={}ms",
            redact_url_for_log(request.url()),
            raster.width(),
            raster.height(),
            fetch_ms,
            decode_ms,
            process_ms
        );

        Ok(Arc::new(raster))
    }

    /// 取出并移除 in-flight 条目；条目已被取消或替换时返回空。
    fn take_waiters(&self, key: &str, flight_id: u64) -> Vec<Waiter> {
        let Ok(mut inflight) = self.lock_inflight() else {
            return Vec::new();
        };

        let is_own = inflight
            .get(key)
            .is_some_and(|flight| flight.flight_id == flight_id);
        if !is_own {
            return Vec::new();
        }

        inflight
            .remove(key)
            .map(|flight| flight.waiters)
            .unwrap_or_default()
    }

    fn deliver_ready(&self, waiters: Vec<Waiter>, raster: &Arc<Raster>) {
        for waiter in waiters {
            if let Some(target) = waiter.target {
                let raster = Arc::clone(raster);
                self.dispatch(waiter.epoch, move || target.on_resource_ready(raster));
            }
        }
    }

    fn deliver_failure(&self, waiters: Vec<Waiter>, err: &ImageError) {
        log::debug!("交付失败回调：{} 个等待方（{}）", waiters.len(), err.code());
        for waiter in waiters {
            if let Some(target) = waiter.target {
                let error_drawable = waiter.error_drawable;
                self.dispatch(waiter.epoch, move || target.on_load_failed(error_drawable));
            }
        }
    }
}
