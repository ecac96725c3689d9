mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image_splitter::engine::{Capabilities, ExecutionPath};
use image_splitter::geometry::{plan_split, IndexRange};
use image_splitter::render::TileData;
use image_splitter::resource::ResourceRegistry;
use image_splitter::source::{load_source, SourceImage};
use image_splitter::worker::{RasterWorkerRenderer, WorkerRenderer};
use image_splitter::{OutputFormat, SplitConfiguration, SplitMode, SplitterError};

use common::{decode_rgba, engine, full_capabilities, gradient, png_upload, raster_engine, test_settings};

/// 前 N 次调用直接拒绝，之后正常渲染
struct RejectFirst {
    remaining: AtomicUsize,
    inner: RasterWorkerRenderer,
}

impl WorkerRenderer for RejectFirst {
    fn render(
        &self,
        image_bytes: &[u8],
        config: &SplitConfiguration,
        range: Option<IndexRange>,
    ) -> image_splitter::Result<Vec<TileData>> {
        let rejected = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(SplitterError::Decode("simulated failure".to_string()));
        }
        self.inner.render(image_bytes, config, range)
    }
}

/// 在 worker 内 panic
struct Exploding;

impl WorkerRenderer for Exploding {
    fn render(&self, _: &[u8], _: &SplitConfiguration, _: Option<IndexRange>) -> image_splitter::Result<Vec<TileData>> {
        panic!("worker exploded");
    }
}

/// 只在并行区间上 panic，整图请求正常渲染
struct PanicsOnRange {
    inner: RasterWorkerRenderer,
}

impl WorkerRenderer for PanicsOnRange {
    fn render(
        &self,
        image_bytes: &[u8],
        config: &SplitConfiguration,
        range: Option<IndexRange>,
    ) -> image_splitter::Result<Vec<TileData>> {
        if let Some(range) = range {
            panic!("pooled worker exploded on {:?}", range);
        }
        self.inner.render(image_bytes, config, range)
    }
}

fn source(width: u32, height: u32) -> (Arc<ResourceRegistry>, SourceImage) {
    let registry = ResourceRegistry::new();
    let source = load_source(png_upload(width, height), &test_settings(), &registry).unwrap();
    (registry, source)
}

fn assert_ordered(tiles: &[TileData], count: usize) {
    let indices: Vec<usize> = tiles.iter().map(|t| t.index).collect();
    assert_eq!(indices, (0..count).collect::<Vec<_>>());
}

fn pixels(tiles: &[TileData]) -> Vec<image::RgbaImage> {
    tiles.iter().map(|t| decode_rgba(&t.bytes)).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_path_returns_the_same_ordered_pixels() {
    let (_registry, source) = source(123, 97);
    let config = SplitConfiguration::new(SplitMode::Grid, 5, 4, OutputFormat::Png);

    let inline = raster_engine(Capabilities::inline_only());
    let single = raster_engine(full_capabilities(1));
    let inline_outcome = inline.split(&source, config).await.unwrap();
    let single_outcome = single.split(&source, config).await.unwrap();
    assert_eq!(inline_outcome.path, ExecutionPath::Inline);
    assert_eq!(single_outcome.path, ExecutionPath::SingleWorker);

    let expected = pixels(&inline_outcome.tiles);
    assert_ordered(&inline_outcome.tiles, 20);
    assert_eq!(pixels(&single_outcome.tiles), expected);

    for workers in 2..=4 {
        let pooled = raster_engine(full_capabilities(workers));
        let outcome = pooled.split(&source, config).await.unwrap();
        assert_eq!(outcome.path, ExecutionPath::Pool { workers });
        assert_ordered(&outcome.tiles, 20);
        assert_eq!(pixels(&outcome.tiles), expected, "pool of {}", workers);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tiles_are_exact_copies_of_their_regions() {
    let (_registry, source) = source(90, 60);
    let config = SplitConfiguration::new(SplitMode::Grid, 2, 3, OutputFormat::Bmp);
    let outcome = raster_engine(full_capabilities(2)).split(&source, config).await.unwrap();

    let original = gradient(90, 60);
    let plan = plan_split(90, 60, &config);
    for (tile, region) in outcome.tiles.iter().zip(plan.regions()) {
        let expected = image::imageops::crop_imm(&original, region.x, region.y, region.width, region.height).to_image();
        assert_eq!(decode_rgba(&tile.bytes), expected, "tile {}", tile.index);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_pool_is_retried_on_a_single_worker() {
    let (_registry, source) = source(64, 64);
    let config = SplitConfiguration::new(SplitMode::Grid, 4, 4, OutputFormat::Png);
    // 第一段并行区间失败，其余成功；重试的单 worker 请求正常
    let renderer = Arc::new(RejectFirst {
        remaining: AtomicUsize::new(1),
        inner: RasterWorkerRenderer::new(85),
    });
    let engine = engine(full_capabilities(4), renderer);

    let outcome = engine.split(&source, config).await.unwrap();
    assert_eq!(outcome.path, ExecutionPath::SingleWorker);
    assert!(!engine.is_downgraded());

    let reference = raster_engine(full_capabilities(1)).split(&source, config).await.unwrap();
    assert_eq!(pixels(&outcome.tiles), pixels(&reference.tiles));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pooled_worker_panic_is_retried_on_a_single_worker() {
    let (_registry, source) = source(64, 64);
    let config = SplitConfiguration::new(SplitMode::Grid, 4, 4, OutputFormat::Png);
    let engine = engine(
        full_capabilities(2),
        Arc::new(PanicsOnRange {
            inner: RasterWorkerRenderer::new(85),
        }),
    );
    assert_eq!(engine.select_path(16), ExecutionPath::Pool { workers: 2 });

    let outcome = engine.split(&source, config).await.unwrap();
    assert_eq!(outcome.path, ExecutionPath::SingleWorker);
    assert_ordered(&outcome.tiles, 16);
    // 并行 worker 的崩溃不触发会话降级
    assert!(!engine.is_downgraded());
    assert!(engine.coordinator().has_resident_worker());
    // 至少一个并行 worker 加上重试用的常驻 worker
    assert!(engine.coordinator().workers_spawned() >= 2);

    let reference = raster_engine(Capabilities::inline_only()).split(&source, config).await.unwrap();
    assert_eq!(pixels(&outcome.tiles), pixels(&reference.tiles));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn crashed_worker_downgrades_the_session_to_inline() {
    let (_registry, source) = source(48, 48);
    let config = SplitConfiguration::new(SplitMode::Horizontal, 3, 1, OutputFormat::Png);
    let engine = engine(full_capabilities(2), Arc::new(Exploding));

    let outcome = engine.split(&source, config).await.unwrap();
    assert_eq!(outcome.path, ExecutionPath::Inline);
    assert!(engine.is_downgraded());
    assert!(!engine.coordinator().has_resident_worker());

    let reference = raster_engine(Capabilities::inline_only()).split(&source, config).await.unwrap();
    assert_eq!(pixels(&outcome.tiles), pixels(&reference.tiles));

    // 降级是粘性的：再大的任务也不再尝试 worker
    let spawned = engine.coordinator().workers_spawned();
    let big = SplitConfiguration::new(SplitMode::Grid, 5, 5, OutputFormat::Png);
    assert_eq!(engine.split(&source, big).await.unwrap().path, ExecutionPath::Inline);
    assert_eq!(engine.coordinator().workers_spawned(), spawned);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disabled_workers_always_run_inline() {
    let (_registry, source) = source(40, 40);
    let settings = image_splitter::EngineSettings {
        workers_enabled: false,
        ..test_settings()
    };
    let engine = image_splitter::engine::SplitEngine::with_parts(
        settings,
        full_capabilities(8),
        Arc::new(RasterWorkerRenderer::new(85)),
    );
    let config = SplitConfiguration::new(SplitMode::Grid, 10, 10, OutputFormat::Jpg);
    let outcome = engine.split(&source, config).await.unwrap();
    assert_eq!(outcome.path, ExecutionPath::Inline);
    assert_ordered(&outcome.tiles, 100);
}
