mod support;

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use picfly::{
    Drawable, Encoder, ImageError, PicFlyConfig, PreloadModelProvider, Raster, Target,
    Transformation, UiDispatcher, Viewport,
};

use support::{
    Event, FailingEncoder, FakeHolder, FakeView, Harness, MockFetcher, RecordingTarget,
    UI_THREAD_NAME, WAIT, png_bytes, wait_until,
};

const URL: &str = "http://host/x.png";

fn load_into(harness: &Harness, url: &str) -> Arc<RecordingTarget> {
    let target = RecordingTarget::new();
    harness
        .picfly
        .load(url)
        .into(Arc::clone(&target) as Arc<dyn Target>);
    target
}

fn assert_started_then_ready(events: &[Event]) {
    assert_eq!(events.len(), 2, "unexpected events: {:?}", events);
    assert!(matches!(events[0], Event::Started(_)));
    assert!(matches!(events[1], Event::Ready(_)));
}

#[test]
fn cold_load_populates_memory_and_disk() {
    let harness = Harness::new(MockFetcher::new());
    let target = load_into(&harness, URL);

    let events = target.wait_terminal();
    assert_started_then_ready(&events);

    let raster = target.ready_raster();
    assert_eq!(raster.dimensions(), (64, 64));
    let cached = harness.picfly.memory_cache().get(URL).expect("memory miss after load");
    assert!(Arc::ptr_eq(&cached, &raster));

    let disk = Arc::clone(harness.picfly.disk_cache());
    assert!(wait_until(WAIT, || disk.contains(URL)));
    assert!(disk.path_for(URL).ends_with(format!("{:x}", md5::compute(URL))));

    assert_eq!(harness.fetcher.calls(), 1);
    assert_eq!(harness.decoder.calls(), 1);
    assert!(
        target
            .threads()
            .iter()
            .all(|name| name.as_deref() == Some(UI_THREAD_NAME))
    );
}

#[test]
fn memory_hit_delivers_inline_on_ui_thread_without_fetching() {
    let harness = Harness::new(MockFetcher::new());
    let first = load_into(&harness, URL).ready_raster();

    let picfly = Arc::clone(&harness.picfly);
    let target = RecordingTarget::new();
    let inner = Arc::clone(&target);
    let (tx, rx) = mpsc::channel();
    harness.ui.post(Box::new(move || {
        picfly.load(URL).into(Arc::clone(&inner) as Arc<dyn Target>);
        // 内存命中在 load 返回前就已交付
        let _ = tx.send(inner.events());
    }));

    let events = rx.recv_timeout(WAIT).expect("ui task did not run");
    assert_started_then_ready(&events);
    match &events[1] {
        Event::Ready(raster) => assert!(Arc::ptr_eq(raster, &first)),
        other => panic!("expected ready, got {:?}", other),
    }
    assert_eq!(harness.fetcher.calls(), 1);
}

#[test]
fn concurrent_loads_share_one_fetch_and_decode() {
    let harness = Harness::new(MockFetcher::new().with_delay(Duration::from_millis(200)));

    let targets: Vec<_> = (0..4).map(|_| load_into(&harness, URL)).collect();
    let rasters: Vec<_> = targets.iter().map(|t| t.ready_raster()).collect();

    assert_eq!(harness.fetcher.calls(), 1);
    assert_eq!(harness.decoder.calls(), 1);
    for raster in &rasters[1..] {
        assert!(Arc::ptr_eq(raster, &rasters[0]));
    }
    for target in &targets {
        assert_started_then_ready(&target.events());
    }
    assert_eq!(harness.picfly.loader().inflight_count(), 0);
}

#[test]
fn transformation_order_yields_distinct_cache_entries() {
    let harness = Harness::new(MockFetcher::new());

    let blur_then_gray = harness.picfly.load(URL).blur_radius(10.0).grayscale().build();
    let gray_then_blur = harness.picfly.load(URL).grayscale().blur_radius(10.0).build();
    assert_ne!(blur_then_gray.fingerprint(), gray_then_blur.fingerprint());

    let a = RecordingTarget::new();
    harness
        .picfly
        .load(URL)
        .blur_radius(10.0)
        .grayscale()
        .into(Arc::clone(&a) as Arc<dyn Target>);
    a.ready_raster();

    let b = RecordingTarget::new();
    harness
        .picfly
        .load(URL)
        .grayscale()
        .blur_radius(10.0)
        .into(Arc::clone(&b) as Arc<dyn Target>);
    b.ready_raster();

    assert_eq!(harness.fetcher.calls(), 2);
    assert!(harness.picfly.memory_cache().contains(&blur_then_gray.fingerprint()));
    assert!(harness.picfly.memory_cache().contains(&gray_then_blur.fingerprint()));
}

#[test]
fn rebinding_holder_clears_previous_request() {
    let fetcher = MockFetcher::new()
        .with_delay(Duration::from_millis(300))
        .with_response("http://host/u1.png", 200, png_bytes(64, 64, [255, 0, 0, 255]))
        .with_response("http://host/u2.png", 200, png_bytes(32, 32, [0, 0, 255, 255]));
    let harness = Harness::new(fetcher);

    let view = FakeView::new(5);
    let holder = FakeHolder::new(3, 0);

    let first = harness
        .picfly
        .load("http://host/u1.png")
        .into_holder(&Arc::downgrade(&view), &Arc::downgrade(&holder))
        .expect("bind u1 failed");
    let second = harness
        .picfly
        .load("http://host/u2.png")
        .into_holder(&Arc::downgrade(&view), &Arc::downgrade(&holder))
        .expect("bind u2 failed");

    assert_eq!(first.key(), second.key());
    assert!(first.is_cleared());
    assert!(!second.is_cleared());

    assert!(wait_until(WAIT, || !view.rasters().is_empty()));
    // 等第一条请求也完成，确认它的交付被忽略
    assert!(wait_until(WAIT, || harness.fetcher.calls() == 2
        && harness.picfly.loader().inflight_count() == 0));
    harness.flush_ui();

    let rasters = view.rasters();
    assert_eq!(rasters.len(), 1);
    assert_eq!(rasters[0].dimensions(), (32, 32));
    assert!(harness.picfly.registry().is_empty());

    // 旧目标的控件复位同样在 UI 线程执行
    let threads = view.threads.lock().expect("lock").clone();
    assert!(!threads.is_empty());
    assert!(threads.iter().all(|name| name.as_deref() == Some(UI_THREAD_NAME)));
}

#[test]
fn failed_fetch_delivers_error_drawable_and_caches_nothing() {
    let harness = Harness::new(MockFetcher::new().with_response(URL, 500, Bytes::new()));

    let target = RecordingTarget::new();
    harness
        .picfly
        .load(URL)
        .placeholder(Drawable::Resource(1))
        .error(Drawable::Resource(7))
        .into(Arc::clone(&target) as Arc<dyn Target>);

    let events = target.wait_terminal();
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], Event::Started(Some(Drawable::Resource(1)))));
    assert!(matches!(events[1], Event::Failed(Some(Drawable::Resource(7)))));

    assert!(!harness.picfly.memory_cache().contains(URL));
    thread::sleep(Duration::from_millis(100));
    assert!(!harness.picfly.disk_cache().contains(URL));
    assert_eq!(harness.picfly.loader().inflight_count(), 0);
}

#[test]
fn undecodable_body_is_a_failure() {
    let harness =
        Harness::new(MockFetcher::new().with_response(URL, 200, Bytes::from_static(b"not an image")));

    let target = load_into(&harness, URL);
    let events = target.wait_terminal();

    assert!(matches!(events.last(), Some(Event::Failed(None))));
    assert!(!harness.picfly.memory_cache().contains(URL));
}

#[test]
fn empty_url_fails_without_fetching() {
    let harness = Harness::new(MockFetcher::new());

    let target = RecordingTarget::new();
    harness
        .picfly
        .load("")
        .error(Drawable::Resource(9))
        .into(Arc::clone(&target) as Arc<dyn Target>);

    let events = target.wait_terminal();
    assert!(matches!(events.as_slice(), [Event::Failed(Some(Drawable::Resource(9)))]));
    assert_eq!(harness.fetcher.calls(), 0);

    assert!(matches!(
        harness.picfly.load("  ").preload(),
        Err(ImageError::InvalidArgument(_))
    ));
}

#[test]
fn dead_view_is_rejected() {
    let harness = Harness::new(MockFetcher::new());
    let view = FakeView::new(1);
    let weak = Arc::downgrade(&view);
    drop(view);

    assert!(matches!(
        harness.picfly.load(URL).into_view(&weak),
        Err(ImageError::InvalidArgument(_))
    ));
    assert_eq!(harness.fetcher.calls(), 0);
}

#[test]
fn disk_hit_is_promoted_to_memory() {
    let harness = Harness::new(MockFetcher::new());
    load_into(&harness, URL).ready_raster();

    let disk = Arc::clone(harness.picfly.disk_cache());
    assert!(wait_until(WAIT, || disk.contains(URL)));
    harness.picfly.clear_memory_cache();

    let raster = load_into(&harness, URL).ready_raster();
    assert_eq!(raster.dimensions(), (64, 64));
    assert_eq!(harness.fetcher.calls(), 1);
    assert!(harness.picfly.memory_cache().contains(URL));
}

#[test]
fn preload_warms_memory_without_callbacks() {
    let harness = Harness::new(MockFetcher::new());

    let key = harness.picfly.load(URL).resize(32, 32).build().fingerprint();
    harness
        .picfly
        .load(URL)
        .resize(32, 32)
        .preload()
        .expect("preload failed");

    let memory = Arc::clone(harness.picfly.memory_cache());
    assert!(wait_until(WAIT, || memory.contains(&key)));
    assert_eq!(memory.get(&key).expect("preloaded").dimensions(), (32, 32));

    let target = RecordingTarget::new();
    harness
        .picfly
        .load(URL)
        .resize(32, 32)
        .into(Arc::clone(&target) as Arc<dyn Target>);
    target.ready_raster();
    assert_eq!(harness.fetcher.calls(), 1);
}

#[test]
fn cancel_all_suppresses_pending_deliveries() {
    let harness = Harness::new(MockFetcher::new().with_delay(Duration::from_millis(400)));

    let target = load_into(&harness, URL);
    let fetcher = Arc::clone(&harness.fetcher);
    assert!(wait_until(WAIT, || fetcher.calls() == 1));

    harness.picfly.cancel_all();
    assert_eq!(harness.picfly.loader().inflight_count(), 0);
    assert_eq!(harness.fetcher.cancel_calls(), 1);

    thread::sleep(Duration::from_millis(700));
    harness.flush_ui();

    let events = target.events();
    assert!(matches!(events.as_slice(), [Event::Started(None)]), "got {:?}", events);
    assert!(!harness.picfly.memory_cache().contains(URL));
}

#[test]
fn cache_can_be_cleared_through_facade() {
    let harness = Harness::new(MockFetcher::new());
    load_into(&harness, URL).ready_raster();
    let disk = Arc::clone(harness.picfly.disk_cache());
    assert!(wait_until(WAIT, || disk.contains(URL)));

    harness.picfly.clear_all_caches().expect("clear failed");

    assert!(harness.picfly.memory_cache().is_empty());
    assert!(disk.is_empty());
}

#[test]
fn coalesced_failures_keep_each_request_error_drawable() {
    let fetcher = MockFetcher::new()
        .with_delay(Duration::from_millis(300))
        .with_response(URL, 500, Bytes::new());
    let harness = Harness::new(fetcher);

    let a = RecordingTarget::new();
    let b = RecordingTarget::new();
    harness
        .picfly
        .load(URL)
        .error(Drawable::Resource(1))
        .into(Arc::clone(&a) as Arc<dyn Target>);
    harness
        .picfly
        .load(URL)
        .error(Drawable::Resource(2))
        .into(Arc::clone(&b) as Arc<dyn Target>);

    let a_events = a.wait_terminal();
    let b_events = b.wait_terminal();
    assert_eq!(harness.fetcher.calls(), 1);
    assert!(
        matches!(a_events.last(), Some(Event::Failed(Some(Drawable::Resource(1))))),
        "a got {:?}",
        a_events
    );
    assert!(
        matches!(b_events.last(), Some(Event::Failed(Some(Drawable::Resource(2))))),
        "b got {:?}",
        b_events
    );
}

#[test]
fn disk_write_failure_still_delivers_and_keeps_memory() {
    let encoder = Arc::new(FailingEncoder::default());
    let harness = Harness::with_encoder(MockFetcher::new(), Arc::clone(&encoder) as Arc<dyn Encoder>);

    let target = load_into(&harness, URL);
    assert_started_then_ready(&target.wait_terminal());
    assert!(harness.picfly.memory_cache().contains(URL));

    assert!(wait_until(WAIT, || encoder.calls() == 1));
    thread::sleep(Duration::from_millis(50));
    assert!(!harness.picfly.disk_cache().contains(URL));
    assert_eq!(harness.picfly.loader().inflight_count(), 0);
}

struct BrokenTransform;

impl Transformation for BrokenTransform {
    fn transform(&self, _raster: Raster) -> Result<Raster, ImageError> {
        Err(ImageError::Transform("broken".to_string()))
    }

    fn key(&self) -> String {
        "broken".to_string()
    }
}

#[test]
fn transform_failure_is_delivered_as_load_failure() {
    let harness = Harness::new(MockFetcher::new());

    let request = harness.picfly.load(URL).transform(Arc::new(BrokenTransform)).build();
    let target = RecordingTarget::new();
    harness
        .picfly
        .load(URL)
        .error(Drawable::Resource(4))
        .transform(Arc::new(BrokenTransform))
        .into(Arc::clone(&target) as Arc<dyn Target>);

    let events = target.wait_terminal();
    assert_eq!(events.len(), 2, "unexpected events: {:?}", events);
    assert!(matches!(events[1], Event::Failed(Some(Drawable::Resource(4)))));

    assert!(!harness.picfly.memory_cache().contains(&request.fingerprint()));
    thread::sleep(Duration::from_millis(100));
    assert!(!harness.picfly.disk_cache().contains(&request.fingerprint()));
    assert_eq!(harness.picfly.loader().inflight_count(), 0);
}

#[test]
fn view_dropped_mid_fetch_still_fills_caches() {
    let harness = Harness::new(MockFetcher::new().with_delay(Duration::from_millis(300)));

    let view = FakeView::new(1);
    let target = harness
        .picfly
        .load(URL)
        .into_view(&Arc::downgrade(&view))
        .expect("into_view failed");
    let fetcher = Arc::clone(&harness.fetcher);
    assert!(wait_until(WAIT, || fetcher.calls() == 1));
    drop(view);
    assert!(!target.is_alive());

    let memory = Arc::clone(harness.picfly.memory_cache());
    let disk = Arc::clone(harness.picfly.disk_cache());
    assert!(wait_until(WAIT, || memory.contains(URL)));
    assert!(wait_until(WAIT, || disk.contains(URL)));
    harness.flush_ui();

    assert_eq!(harness.picfly.loader().inflight_count(), 0);
    assert_eq!(harness.fetcher.calls(), 1);
}

struct ListViewport {
    first: usize,
    last: usize,
    count: usize,
}

impl Viewport for ListViewport {
    fn first_visible(&self) -> Option<usize> {
        Some(self.first)
    }

    fn last_visible(&self) -> Option<usize> {
        Some(self.last)
    }

    fn item_count(&self) -> usize {
        self.count
    }
}

struct GalleryProvider;

impl PreloadModelProvider for GalleryProvider {
    fn preload_urls(&self, position: usize) -> Vec<String> {
        vec![format!("http://host/item_{position}.png")]
    }

    fn preload_size(&self, _position: usize) -> (u32, u32) {
        (16, 16)
    }
}

#[test]
fn scroll_preloader_warms_items_ahead_of_viewport() {
    let harness = Harness::with_config(MockFetcher::new(), PicFlyConfig::default());
    let mut preloader = harness.picfly.preloader_for(GalleryProvider);
    assert_eq!(preloader.max_preload(), 3);

    let viewport = ListViewport {
        first: 0,
        last: 4,
        count: 20,
    };
    assert_eq!(preloader.on_scrolled(&viewport, 12), 4);
    // 可见区间没变时不再重复提交
    assert_eq!(preloader.on_scrolled(&viewport, 3), 0);

    let memory = Arc::clone(harness.picfly.memory_cache());
    assert!(wait_until(WAIT, || (5..=8).all(|i| memory
        .contains(&format!("http://host/item_{i}.png_16x16")))));

    let mut urls = harness.fetcher.urls();
    urls.sort();
    assert_eq!(
        urls,
        (5..=8)
            .map(|i| format!("http://host/item_{i}.png"))
            .collect::<Vec<_>>()
    );
}
