#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};

use picfly::{
    Decoder, Drawable, Encoder, FetchOptions, FetchResponse, Fetcher, ImageCodec, ImageError,
    ImageView, PicFly, PicFlyConfig, Raster, Target, UiThread, ViewHolder,
};

pub const UI_THREAD_NAME: &str = "picfly-ui-test";
pub const WAIT: Duration = Duration::from_secs(10);

pub fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock drift")
        .as_nanos();
    std::env::temp_dir().join(format!("{prefix}_{}_{nanos}", std::process::id()))
}

pub fn png_bytes(width: u32, height: u32, pixel: [u8; 4]) -> Bytes {
    let image = RgbaImage::from_pixel(width, height, Rgba(pixel));
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode png failed");
    Bytes::from(out.into_inner())
}

/// 轮询直到条件成立或超时。
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[derive(Clone)]
pub struct MockResponse {
    pub status: u16,
    pub body: Bytes,
}

/// 可按 URL 配置响应、带延迟与调用计数的拉取器。
pub struct MockFetcher {
    responses: Mutex<HashMap<String, MockResponse>>,
    fallback: MockResponse,
    delay: Duration,
    calls: AtomicUsize,
    cancel_calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            fallback: MockResponse {
                status: 200,
                body: png_bytes(64, 64, [200, 40, 40, 255]),
            },
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_response(self, url: &str, status: u16, body: Bytes) -> Self {
        self.responses
            .lock()
            .expect("lock")
            .insert(url.to_string(), MockResponse { status, body });
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().expect("lock").clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str, _options: &FetchOptions) -> Result<FetchResponse, ImageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().expect("lock").push(url.to_string());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let response = self
            .responses
            .lock()
            .expect("lock")
            .get(url)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone());

        Ok(FetchResponse {
            status: response.status,
            body: response.body,
        })
    }

    fn cancel_all(&self) {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// 记录调用次数的默认解码器。
#[derive(Default)]
pub struct CountingDecoder {
    inner: ImageCodec,
    calls: AtomicUsize,
}

impl CountingDecoder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Decoder for CountingDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Raster, ImageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.decode(bytes)
    }
}

/// 每次写盘都失败的编码器。
#[derive(Default)]
pub struct FailingEncoder {
    calls: AtomicUsize,
}

impl FailingEncoder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Encoder for FailingEncoder {
    fn encode(&self, _raster: &Raster, _quality: u8) -> Result<Vec<u8>, ImageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ImageError::CacheIo("disk full".to_string()))
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    Started(Option<Drawable>),
    Ready(Arc<Raster>),
    Failed(Option<Drawable>),
    Cleared,
}

impl Event {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Ready(_) | Event::Failed(_))
    }
}

/// 记录全部回调及其执行线程。
#[derive(Default)]
pub struct RecordingTarget {
    events: Mutex<Vec<Event>>,
    threads: Mutex<Vec<Option<String>>>,
}

impl RecordingTarget {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, event: Event) {
        self.threads
            .lock()
            .expect("lock")
            .push(thread::current().name().map(str::to_string));
        self.events.lock().expect("lock").push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("lock").clone()
    }

    pub fn threads(&self) -> Vec<Option<String>> {
        self.threads.lock().expect("lock").clone()
    }

    /// 等待终态回调，返回到此为止的全部事件。
    pub fn wait_terminal(&self) -> Vec<Event> {
        let reached = wait_until(WAIT, || self.events().iter().any(Event::is_terminal));
        assert!(reached, "no terminal callback within {:?}", WAIT);
        self.events()
    }

    pub fn ready_raster(&self) -> Arc<Raster> {
        self.wait_terminal()
            .into_iter()
            .find_map(|event| match event {
                Event::Ready(raster) => Some(raster),
                _ => None,
            })
            .expect("expected on_resource_ready")
    }
}

impl Target for RecordingTarget {
    fn on_load_started(&self, placeholder: Option<Drawable>) {
        self.record(Event::Started(placeholder));
    }

    fn on_resource_ready(&self, raster: Arc<Raster>) {
        self.record(Event::Ready(raster));
    }

    fn on_load_failed(&self, error_drawable: Option<Drawable>) {
        self.record(Event::Failed(error_drawable));
    }

    fn on_cleared(&self) {
        self.record(Event::Cleared);
    }
}

pub struct FakeView {
    pub id: i32,
    pub drawables: Mutex<Vec<Option<Drawable>>>,
    pub threads: Mutex<Vec<Option<String>>>,
}

impl FakeView {
    pub fn new(id: i32) -> Arc<Self> {
        Arc::new(Self {
            id,
            drawables: Mutex::new(Vec::new()),
            threads: Mutex::new(Vec::new()),
        })
    }

    pub fn rasters(&self) -> Vec<Arc<Raster>> {
        self.drawables
            .lock()
            .expect("lock")
            .iter()
            .filter_map(|drawable| match drawable {
                Some(Drawable::Raster(raster)) => Some(Arc::clone(raster)),
                _ => None,
            })
            .collect()
    }
}

impl ImageView for FakeView {
    fn view_id(&self) -> i32 {
        self.id
    }

    fn set_drawable(&self, drawable: Option<Drawable>) {
        self.threads
            .lock()
            .expect("lock")
            .push(thread::current().name().map(str::to_string));
        self.drawables.lock().expect("lock").push(drawable);
    }
}

pub struct FakeHolder {
    pub id: i32,
    pub position: Mutex<Option<usize>>,
}

impl FakeHolder {
    pub fn new(id: i32, position: usize) -> Arc<Self> {
        Arc::new(Self {
            id,
            position: Mutex::new(Some(position)),
        })
    }
}

impl ViewHolder for FakeHolder {
    fn holder_id(&self) -> i32 {
        self.id
    }

    fn adapter_position(&self) -> Option<usize> {
        *self.position.lock().expect("lock")
    }
}

/// 注入了 mock 能力的 PicFly 实例。
pub struct Harness {
    pub picfly: Arc<PicFly>,
    pub fetcher: Arc<MockFetcher>,
    pub decoder: Arc<CountingDecoder>,
    pub ui: Arc<UiThread>,
    pub dir: PathBuf,
}

impl Harness {
    pub fn new(fetcher: MockFetcher) -> Self {
        Self::with_config(fetcher, PicFlyConfig::default())
    }

    pub fn with_config(fetcher: MockFetcher, config: PicFlyConfig) -> Self {
        Self::build(fetcher, config, None)
    }

    pub fn with_encoder(fetcher: MockFetcher, encoder: Arc<dyn Encoder>) -> Self {
        Self::build(fetcher, PicFlyConfig::default(), Some(encoder))
    }

    fn build(fetcher: MockFetcher, config: PicFlyConfig, encoder: Option<Arc<dyn Encoder>>) -> Self {
        let fetcher = Arc::new(fetcher);
        let decoder = Arc::new(CountingDecoder::default());
        let ui = Arc::new(UiThread::spawn(UI_THREAD_NAME).expect("spawn ui failed"));
        let dir = unique_temp_dir("picfly_it");

        let mut builder = PicFly::builder()
            .config(config)
            .fetcher(Arc::clone(&fetcher) as Arc<dyn Fetcher>)
            .decoder(Arc::clone(&decoder) as Arc<dyn Decoder>)
            .ui_dispatcher(Arc::clone(&ui) as Arc<dyn picfly::UiDispatcher>)
            .disk_cache_dir(&dir);
        if let Some(encoder) = encoder {
            builder = builder.encoder(encoder);
        }
        let picfly = builder.build().expect("build picfly failed");

        Self {
            picfly: Arc::new(picfly),
            fetcher,
            decoder,
            ui,
            dir,
        }
    }

    /// 等待 UI 上下文把已投递的回调执行完。
    pub fn flush_ui(&self) {
        assert!(self.ui.wait_idle(WAIT), "ui thread did not drain");
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}
