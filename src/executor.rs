//! # 执行上下文
//!
//! ## 设计思路
//!
//! 加载链路只有两类线程：
//!
//! - **后台池**：固定 `max(2, CPU 核数)` 个 worker，承担网络、磁盘读写、解码与变换。
//! - **UI 上下文**：单线程派发器，所有目标回调与内存命中的交付都在这里执行。
//!
//! ## 实现思路
//!
//! - `BackgroundPool` 包装一个多线程 tokio 运行时，阻塞型工作走 `spawn_blocking`，
//!   阻塞线程上限与 worker 数一致。
//! - `UiDispatcher` 是注入点，宿主可接入自己的主线程消息循环；
//!   `UiThread` 是自带实现：一条具名线程按 FIFO 顺序执行投递的任务。

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use tokio::runtime::{Handle, Runtime};

use crate::error::ImageError;

/// 投递到 UI 上下文的任务。
pub type UiTask = Box<dyn FnOnce() + Send + 'static>;

/// UI 上下文派发器。
pub trait UiDispatcher: Send + Sync {
    /// 投递任务，调用方不等待。
    fn post(&self, task: UiTask);

    /// 当前线程是否就是 UI 上下文。
    fn is_ui_thread(&self) -> bool;

    /// 已在 UI 上下文时就地执行，否则投递。
    fn run(&self, task: UiTask) {
        if self.is_ui_thread() {
            task();
        } else {
            self.post(task);
        }
    }
}

/// 自带的单线程 UI 派发器。
pub struct UiThread {
    sender: Mutex<Option<mpsc::Sender<UiTask>>>,
    thread_id: ThreadId,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl UiThread {
    pub fn spawn(name: &str) -> Result<Self, ImageError> {
        let (sender, receiver) = mpsc::channel::<UiTask>();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Ok(task) = receiver.recv() {
                    if catch_unwind(AssertUnwindSafe(task)).is_err() {
                        log::error!("❌ UI 任务执行时发生 panic，已跳过");
                    }
                }
                log::debug!("UI 线程退出");
            })
            .map_err(|e| ImageError::ResourceLimit(format!("无法创建 UI 线程：{}", e)))?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            thread_id: join.thread().id(),
            join: Mutex::new(Some(join)),
        })
    }

    /// 等待此前投递的任务全部执行完毕；超时返回 false。
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        if self.is_ui_thread() {
            return true;
        }

        let (done_tx, done_rx) = mpsc::channel::<()>();
        self.post(Box::new(move || {
            let _ = done_tx.send(());
        }));
        done_rx.recv_timeout(timeout).is_ok()
    }

    /// 停止接收任务并等待线程退出。
    pub fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        if self.is_ui_thread() {
            return;
        }
        let join = match self.join.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(join) = join {
            let _ = join.join();
        }
    }
}

impl UiDispatcher for UiThread {
    fn post(&self, task: UiTask) {
        let sender = match self.sender.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        match sender {
            Some(sender) => {
                if sender.send(task).is_err() {
                    log::warn!("⚠️ UI 线程已退出，任务被丢弃");
                }
            }
            None => log::warn!("⚠️ UI 线程已关闭，任务被丢弃"),
        }
    }

    fn is_ui_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

impl Drop for UiThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// 后台工作池。
pub struct BackgroundPool {
    runtime: Option<Runtime>,
    handle: Handle,
    workers: usize,
}

impl BackgroundPool {
    pub fn new(workers: usize) -> Result<Self, ImageError> {
        let workers = workers.max(2);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(workers)
            .max_blocking_threads(workers)
            .thread_name("picfly-worker")
            .enable_all()
            .build()
            .map_err(|e| ImageError::ResourceLimit(format!("无法创建后台运行时：{}", e)))?;

        log::info!("🧵 后台工作池启动：{} 个 worker", workers);

        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
            workers,
        })
    }

    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl Drop for BackgroundPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
