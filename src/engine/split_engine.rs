use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::capabilities::Capabilities;
use super::strategy::{select_path, ExecutionPath};
use crate::config::{EngineSettings, SplitConfiguration};
use crate::error::{Result, SplitterError};
use crate::geometry::plan_split;
use crate::render::{TileData, TileRenderer};
use crate::source::SourceImage;
use crate::worker::{RasterWorkerRenderer, WorkerCoordinator, WorkerRenderer};

/// 一次分割的结果，按索引升序
#[derive(Debug)]
pub struct SplitOutcome {
    pub tiles: Vec<TileData>,
    /// 实际产出结果的路径
    pub path: ExecutionPath,
}

/// 分割引擎：选择执行路径并逐层回退
///
/// 并行池失败 -> 单 worker；单 worker 失败 -> 本会话永久降级为主线程。
/// 一个会话只应有一个引擎实例，降级标记和常驻 worker 都归它所有。
pub struct SplitEngine {
    settings: EngineSettings,
    capabilities: Capabilities,
    worker_downgraded: AtomicBool,
    coordinator: WorkerCoordinator,
}

impl SplitEngine {
    pub fn new(settings: EngineSettings) -> Self {
        let renderer = Arc::new(RasterWorkerRenderer::new(settings.encode_quality));
        Self::with_parts(settings, Capabilities::detect(), renderer)
    }

    pub fn with_parts(
        settings: EngineSettings,
        capabilities: Capabilities,
        renderer: Arc<dyn WorkerRenderer>,
    ) -> Self {
        Self {
            settings,
            capabilities,
            worker_downgraded: AtomicBool::new(false),
            coordinator: WorkerCoordinator::new(renderer),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn coordinator(&self) -> &WorkerCoordinator {
        &self.coordinator
    }

    pub fn workers_available(&self) -> bool {
        self.settings.workers_enabled && self.capabilities.supports_workers() && !self.is_downgraded()
    }

    /// worker 是否已因运行时错误被永久停用
    pub fn is_downgraded(&self) -> bool {
        self.worker_downgraded.load(Ordering::Acquire)
    }

    /// 清除降级标记，测试用
    pub fn reset_downgrade(&self) {
        self.worker_downgraded.store(false, Ordering::Release);
    }

    pub fn select_path(&self, tile_count: usize) -> ExecutionPath {
        select_path(
            self.workers_available(),
            self.capabilities.parallelism,
            tile_count,
            &self.settings,
        )
    }

    pub async fn split(&self, source: &SourceImage, config: SplitConfiguration) -> Result<SplitOutcome> {
        let plan = plan_split(source.width(), source.height(), &config);
        let path = self.select_path(plan.tile_count);
        let start_time = Instant::now();
        debug!(
            "[SplitEngine] Splitting {}x{} into {} tiles via {}",
            source.width(),
            source.height(),
            plan.tile_count,
            path
        );

        let outcome = match path {
            ExecutionPath::Pool { workers } => {
                match self
                    .coordinator
                    .split_with_pool(source.encoded_bytes(), config, plan.tile_count, workers)
                    .await
                {
                    Ok(tiles) => SplitOutcome { tiles, path },
                    Err(e) => {
                        warn!("[SplitEngine] Worker pool failed, retrying with single worker: {}", e);
                        self.split_with_single_worker(source, config).await?
                    }
                }
            }
            ExecutionPath::SingleWorker => self.split_with_single_worker(source, config).await?,
            ExecutionPath::Inline => self.split_inline(source, config).await?,
        };

        info!(
            "[SplitEngine] Split finished via {}: {} tiles, 耗时: {:?}",
            outcome.path,
            outcome.tiles.len(),
            start_time.elapsed()
        );
        Ok(outcome)
    }

    async fn split_with_single_worker(&self, source: &SourceImage, config: SplitConfiguration) -> Result<SplitOutcome> {
        match self.coordinator.split_with_worker(source.encoded_bytes(), config).await {
            Ok(tiles) => Ok(SplitOutcome {
                tiles,
                path: ExecutionPath::SingleWorker,
            }),
            Err(worker_error) => {
                self.downgrade(&worker_error.to_string());
                self.split_inline(source, config).await.map_err(|inline_error| {
                    SplitterError::SplitFailed(format!("worker: {}; inline: {}", worker_error, inline_error))
                })
            }
        }
    }

    /// 主线程路径：不经过 worker，但编码放到阻塞线程池，不占用 async 线程
    async fn split_inline(&self, source: &SourceImage, config: SplitConfiguration) -> Result<SplitOutcome> {
        debug!("[SplitEngine] Executing split on main thread");
        let renderer = TileRenderer::new(config.output_format, self.settings.encode_quality);
        let image = source.shared_image();
        let tiles = tokio::task::spawn_blocking(move || renderer.render_all(&image, &config))
            .await
            .map_err(|e| SplitterError::SplitFailed(format!("inline render aborted: {}", e)))??;
        Ok(SplitOutcome {
            tiles,
            path: ExecutionPath::Inline,
        })
    }

    fn downgrade(&self, reason: &str) {
        if !self.worker_downgraded.swap(true, Ordering::AcqRel) {
            warn!("[SplitEngine] Worker split failed, falling back to main thread for this session: {}", reason);
        }
        self.coordinator.dispose();
    }

    /// 会话结束：销毁 worker
    pub fn shutdown(&self) {
        self.coordinator.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutputFormat, SplitMode};
    use crate::geometry::IndexRange;
    use crate::resource::ResourceRegistry;
    use crate::source::{load_source, UploadedFile};
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    struct FailingRenderer;

    impl WorkerRenderer for FailingRenderer {
        fn render(&self, _: &[u8], _: &SplitConfiguration, _: Option<IndexRange>) -> Result<Vec<TileData>> {
            Err(SplitterError::Decode("unsupported in worker".to_string()))
        }
    }

    fn full_capabilities() -> Capabilities {
        Capabilities {
            worker_threads: true,
            offscreen_surface: true,
            worker_decode: true,
            parallelism: 4,
        }
    }

    fn source(registry: &Arc<ResourceRegistry>, width: u32, height: u32) -> SourceImage {
        let mut bytes = Vec::new();
        RgbaImage::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, 0, 255]))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        let file = UploadedFile::new("test.png", "image/png", bytes);
        load_source(file, &EngineSettings::default(), registry).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn small_split_runs_on_single_worker() {
        let registry = ResourceRegistry::new();
        let source = source(&registry, 60, 60);
        let engine = SplitEngine::with_parts(
            EngineSettings::default(),
            full_capabilities(),
            Arc::new(RasterWorkerRenderer::new(85)),
        );
        let config = SplitConfiguration::new(SplitMode::Grid, 3, 3, OutputFormat::Png);

        let outcome = engine.split(&source, config).await.unwrap();
        assert_eq!(outcome.path, ExecutionPath::SingleWorker);
        assert_eq!(outcome.tiles.len(), 9);
        assert!(engine.coordinator().has_resident_worker());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn large_split_uses_the_pool() {
        let registry = ResourceRegistry::new();
        let source = source(&registry, 50, 50);
        let engine = SplitEngine::with_parts(
            EngineSettings::default(),
            full_capabilities(),
            Arc::new(RasterWorkerRenderer::new(85)),
        );
        let config = SplitConfiguration::new(SplitMode::Grid, 5, 5, OutputFormat::Png);

        let outcome = engine.split(&source, config).await.unwrap();
        assert_eq!(outcome.path, ExecutionPath::Pool { workers: 4 });
        let indices: Vec<usize> = outcome.tiles.iter().map(|t| t.index).collect();
        assert_eq!(indices, (0..25).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn worker_failure_downgrades_for_the_session() {
        let registry = ResourceRegistry::new();
        let source = source(&registry, 40, 40);
        let engine = SplitEngine::with_parts(EngineSettings::default(), full_capabilities(), Arc::new(FailingRenderer));
        let config = SplitConfiguration::new(SplitMode::Vertical, 1, 4, OutputFormat::Png);

        let outcome = engine.split(&source, config).await.unwrap();
        assert_eq!(outcome.path, ExecutionPath::Inline);
        assert_eq!(outcome.tiles.len(), 4);
        assert!(engine.is_downgraded());
        assert!(!engine.coordinator().has_resident_worker());

        let spawned = engine.coordinator().workers_spawned();
        let outcome = engine.split(&source, config).await.unwrap();
        assert_eq!(outcome.path, ExecutionPath::Inline);
        assert_eq!(engine.coordinator().workers_spawned(), spawned);

        engine.reset_downgrade();
        assert_eq!(engine.select_path(4), ExecutionPath::SingleWorker);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn pool_failure_falls_through_to_inline() {
        let registry = ResourceRegistry::new();
        let source = source(&registry, 40, 40);
        let engine = SplitEngine::with_parts(EngineSettings::default(), full_capabilities(), Arc::new(FailingRenderer));
        let config = SplitConfiguration::new(SplitMode::Grid, 4, 4, OutputFormat::Bmp);

        let outcome = engine.split(&source, config).await.unwrap();
        assert_eq!(outcome.path, ExecutionPath::Inline);
        assert_eq!(outcome.tiles.len(), 16);
        assert!(engine.is_downgraded());
    }

    #[tokio::test]
    async fn inline_split_leaves_the_runtime_responsive() {
        let registry = ResourceRegistry::new();
        let source = source(&registry, 800, 800);
        let engine = SplitEngine::with_parts(
            EngineSettings::default(),
            Capabilities::inline_only(),
            Arc::new(RasterWorkerRenderer::new(85)),
        );
        let config = SplitConfiguration::new(SplitMode::Grid, 10, 10, OutputFormat::Png);

        // 单线程运行时：编码若在 async 线程上执行，心跳任务在分割结束前无法推进
        let ticks = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let heartbeat = {
            let ticks = Arc::clone(&ticks);
            tokio::spawn(async move {
                loop {
                    ticks.fetch_add(1, Ordering::Relaxed);
                    tokio::task::yield_now().await;
                }
            })
        };

        let outcome = engine.split(&source, config).await.unwrap();
        let ticks_during_split = ticks.load(Ordering::Relaxed);
        heartbeat.abort();

        assert_eq!(outcome.path, ExecutionPath::Inline);
        assert_eq!(outcome.tiles.len(), 100);
        assert!(ticks_during_split > 0);
    }

    #[tokio::test]
    async fn inline_only_environment_never_spawns() {
        let registry = ResourceRegistry::new();
        let source = source(&registry, 30, 30);
        let engine = SplitEngine::with_parts(
            EngineSettings::default(),
            Capabilities::inline_only(),
            Arc::new(RasterWorkerRenderer::new(85)),
        );
        let config = SplitConfiguration::new(SplitMode::Grid, 2, 2, OutputFormat::Jpg);

        let outcome = engine.split(&source, config).await.unwrap();
        assert_eq!(outcome.path, ExecutionPath::Inline);
        assert_eq!(engine.coordinator().workers_spawned(), 0);
        assert!(!engine.is_downgraded());
    }
}
