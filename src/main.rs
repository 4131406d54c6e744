//! # PicFly 演示程序
//!
//! 用法：`picfly <url> [width height]`
//!
//! 通过完整链路加载一张图片，打印各生命周期回调以及加载后两级缓存的状态。

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::time::{Duration, Instant};

use picfly::{Drawable, PicFly, Raster, Target};

const LOAD_TIMEOUT: Duration = Duration::from_secs(60);
const DISK_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

enum Outcome {
    Ready(Arc<Raster>),
    Failed,
}

/// 把回调打印到终端，并把终态转发给主线程。
struct PrintingTarget {
    done: Sender<Outcome>,
}

impl Target for PrintingTarget {
    fn on_load_started(&self, placeholder: Option<Drawable>) {
        println!("⏳ 开始加载（占位图：{}）", describe(placeholder.as_ref()));
    }

    fn on_resource_ready(&self, raster: Arc<Raster>) {
        println!(
            "🖼️ 加载成功：{}x{} {:?}，{} 字节",
            raster.width(),
            raster.height(),
            raster.format(),
            raster.byte_cost()
        );
        let _ = self.done.send(Outcome::Ready(raster));
    }

    fn on_load_failed(&self, error_drawable: Option<Drawable>) {
        println!("❌ 加载失败（错误图：{}）", describe(error_drawable.as_ref()));
        let _ = self.done.send(Outcome::Failed);
    }

    fn on_cleared(&self) {
        println!("🧹 目标被清理");
    }
}

fn describe(drawable: Option<&Drawable>) -> String {
    match drawable {
        None => "无".to_string(),
        Some(Drawable::Resource(id)) => format!("资源 #{}", id),
        Some(Drawable::Raster(raster)) => format!("位图 {}x{}", raster.width(), raster.height()),
    }
}

fn parse_args() -> Result<(String, u32, u32), String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [url] => Ok((url.clone(), 0, 0)),
        [url, width, height] => {
            let width = width.parse().map_err(|_| format!("无效的宽度：{}", width))?;
            let height = height.parse().map_err(|_| format!("无效的高度：{}", height))?;
            Ok((url.clone(), width, height))
        }
        _ => Err("用法：picfly <url> [width height]".to_string()),
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (url, width, height) = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::from(2);
        }
    };

    let picfly = match PicFly::get() {
        Ok(picfly) => picfly,
        Err(err) => {
            eprintln!("初始化失败 [{}]：{}", err.code(), err);
            return ExitCode::FAILURE;
        }
    };

    let (done_tx, done_rx) = mpsc::channel();
    let started = Instant::now();
    picfly
        .load(url.clone())
        .placeholder(Drawable::Resource(1))
        .error(Drawable::Resource(2))
        .resize(width, height)
        .into(Arc::new(PrintingTarget { done: done_tx }));

    let outcome = match done_rx.recv_timeout(LOAD_TIMEOUT) {
        Ok(outcome) => outcome,
        Err(_) => {
            eprintln!("等待加载结果超时");
            picfly.cancel_all();
            return ExitCode::FAILURE;
        }
    };
    println!("⏱️ 总耗时 {}ms", started.elapsed().as_millis());

    if let Outcome::Ready(raster) = &outcome {
        println!("📐 最终尺寸：{}x{}", raster.width(), raster.height());
        let key = picfly.load(url).resize(width, height).build().fingerprint();
        let deadline = Instant::now() + DISK_FLUSH_TIMEOUT;
        while !picfly.disk_cache().contains(&key) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    let stats = picfly.memory_cache().stats();
    println!(
        "📊 内存缓存：{} 项，{}/{} 字节（命中 {}，未命中 {}，淘汰 {}）",
        picfly.memory_cache().len(),
        picfly.memory_cache().size(),
        picfly.memory_cache().max_size(),
        stats.hits,
        stats.misses,
        stats.evictions
    );
    println!(
        "📊 磁盘缓存：{} 个文件，{} 字节，目录 {}",
        picfly.disk_cache().len(),
        picfly.disk_cache().size(),
        picfly.disk_cache().directory().display()
    );

    match outcome {
        Outcome::Ready(_) => ExitCode::SUCCESS,
        Outcome::Failed => ExitCode::FAILURE,
    }
}
