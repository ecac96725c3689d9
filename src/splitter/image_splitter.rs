use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::snapshot::{SessionSnapshot, SourceInfo, TileInfo};
use crate::config::{ConfigPatch, EngineSettings, OutputFormat, SplitConfiguration};
use crate::engine::{ExecutionPath, SplitEngine};
use crate::error::{Result, SplitterError};
use crate::output::{single_file, zip_archive, OutputFile};
use crate::resource::{BlobHandle, ResourceKind, ResourceRegistry};
use crate::source::{load_source, SourceImage, UploadedFile};

/// 一次分割请求的结局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitReport {
    Completed { tile_count: usize, path: ExecutionPath },
    /// 期间有新的上传或新的分割，结果已丢弃
    Superseded,
}

/// 会话持有的切片，句柄随切片集合一起释放
struct Tile {
    index: usize,
    width: u32,
    height: u32,
    handle: BlobHandle,
}

struct SessionState {
    source: Option<Arc<SourceImage>>,
    tiles: Vec<Tile>,
    tiles_format: Option<OutputFormat>,
    is_processing: bool,
    config: SplitConfiguration,
    has_ever_split: bool,
    /// 上一次手动分割或已排期自动重切所用的配置
    last_split_config: Option<SplitConfiguration>,
    /// 每次上传、分割、销毁都递增；结果只在代数未变时生效
    generation: u64,
}

struct Inner {
    engine: SplitEngine,
    registry: Arc<ResourceRegistry>,
    state: Mutex<SessionState>,
    pending_resplit: Mutex<Option<JoinHandle<()>>>,
}

/// 图片分割会话
///
/// 外壳通过它上传图片、修改配置、触发分割和下载。
/// 一个会话对应一个 [`SplitEngine`]，worker 和降级标记都不跨会话共享。
pub struct ImageSplitter {
    inner: Arc<Inner>,
}

impl ImageSplitter {
    pub fn new(settings: EngineSettings) -> Self {
        Self::with_engine(SplitEngine::new(settings))
    }

    pub fn with_engine(engine: SplitEngine) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                registry: ResourceRegistry::new(),
                state: Mutex::new(SessionState {
                    source: None,
                    tiles: Vec::new(),
                    tiles_format: None,
                    is_processing: false,
                    config: SplitConfiguration::default(),
                    has_ever_split: false,
                    last_split_config: None,
                    generation: 0,
                }),
                pending_resplit: Mutex::new(None),
            }),
        }
    }

    pub fn engine(&self) -> &SplitEngine {
        &self.inner.engine
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.inner.registry
    }

    /// 上传新图片。校验失败时会话状态保持不变
    pub fn upload_file(&self, file: UploadedFile) -> Result<SourceInfo> {
        let source = match load_source(file, self.inner.engine.settings(), &self.inner.registry) {
            Ok(source) => Arc::new(source),
            Err(e) => {
                warn!("[ImageSplitter] Upload rejected ({}): {}", e.code(), e);
                return Err(e);
            }
        };
        let info = source_info(&source);

        self.inner.cancel_pending_resplit();
        let (previous_source, previous_tiles) = {
            let mut state = self.inner.state();
            state.generation += 1;
            state.is_processing = false;
            state.has_ever_split = false;
            state.last_split_config = None;
            state.tiles_format = None;
            (
                state.source.replace(source),
                std::mem::take(&mut state.tiles),
            )
        };
        let released = previous_tiles.len() + usize::from(previous_source.is_some());
        drop(previous_tiles);
        drop(previous_source);
        debug!("[ImageSplitter] Replaced session image, released {} handles", released);

        Ok(info)
    }

    /// 应用部分配置；已手动分割过时，分割参数变化会在防抖后自动重切
    pub fn update_configuration(&self, patch: ConfigPatch) -> SplitConfiguration {
        let config = {
            let mut state = self.inner.state();
            let config = patch.apply_to(&state.config);
            state.config = config;

            let params_changed = state
                .last_split_config
                .map(|last| !last.same_split_params(&config))
                .unwrap_or(true);
            let should_resplit =
                state.has_ever_split && state.source.is_some() && !state.is_processing && params_changed;
            if !should_resplit {
                debug!(
                    "[ImageSplitter] Configuration updated without re-split (has_split={}, processing={}, changed={})",
                    state.has_ever_split, state.is_processing, params_changed
                );
                return config;
            }
            state.last_split_config = Some(config);
            config
        };

        self.schedule_resplit();
        config
    }

    fn schedule_resplit(&self) {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("[ImageSplitter] No async runtime, automatic re-split skipped");
                return;
            }
        };
        let delay = self.inner.engine.settings().resplit_debounce;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        let mut pending = self.inner.pending_resplit();
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        *pending = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            debug!("[ImageSplitter] Auto re-split after {:?}", delay);
            if let Err(e) = inner.split().await {
                error!("[ImageSplitter] Auto re-split failed ({}): {}", e.code(), e);
            }
        }));
    }

    /// 手动分割当前图片
    pub async fn request_split(&self) -> Result<SplitReport> {
        self.inner.split().await
    }

    /// 等待已排期的自动重切结束
    pub async fn wait_for_resplit(&self) {
        let pending = self.inner.pending_resplit().take();
        if let Some(handle) = pending {
            let _ = handle.await;
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.state();
        SessionSnapshot {
            source: state.source.as_deref().map(source_info),
            tiles: state
                .tiles
                .iter()
                .map(|tile| TileInfo {
                    index: tile.index,
                    width: tile.width,
                    height: tile.height,
                    byte_len: tile.handle.len(),
                    uri: tile.handle.uri(),
                })
                .collect(),
            tiles_format: state.tiles_format,
            is_processing: state.is_processing,
            config: state.config,
        }
    }

    pub fn configuration(&self) -> SplitConfiguration {
        self.inner.state().config
    }

    pub fn is_processing(&self) -> bool {
        self.inner.state().is_processing
    }

    /// 单个切片的编码字节
    pub fn tile_bytes(&self, index: usize) -> Result<Vec<u8>> {
        let state = self.inner.state();
        state
            .tiles
            .iter()
            .find(|tile| tile.index == index)
            .map(|tile| tile.handle.data().to_vec())
            .ok_or(SplitterError::TileNotFound(index))
    }

    /// 单个切片的下载产物
    pub fn export_single(&self, index: usize) -> Result<OutputFile> {
        let state = self.inner.state();
        let format = state.tiles_format.ok_or(SplitterError::TileNotFound(index))?;
        let tile = state
            .tiles
            .iter()
            .find(|tile| tile.index == index)
            .ok_or(SplitterError::TileNotFound(index))?;
        Ok(single_file(tile.index, tile.handle.data(), format))
    }

    /// 全部切片的 zip 产物
    pub fn export_all(&self) -> Result<OutputFile> {
        let state = self.inner.state();
        let format = state
            .tiles_format
            .ok_or_else(|| SplitterError::DownloadFailed("no tiles to download".to_string()))?;
        zip_archive(
            state.tiles.iter().map(|tile| (tile.index, tile.handle.data())),
            format,
            self.inner.engine.settings().zip_compression_level,
        )
    }

    pub fn download_single(&self, index: usize, dir: &Path) -> Result<PathBuf> {
        self.export_single(index)?.emit(dir)
    }

    pub fn download_all(&self, dir: &Path) -> Result<PathBuf> {
        let archive = self.export_all().map_err(|e| {
            error!("[ImageSplitter] Failed to build archive: {}", e);
            e
        })?;
        archive.emit(dir)
    }

    /// 结束会话：释放全部句柄，关闭 worker
    pub fn teardown(&self) {
        self.inner.cancel_pending_resplit();
        let (source, tiles) = {
            let mut state = self.inner.state();
            state.generation += 1;
            state.is_processing = false;
            state.has_ever_split = false;
            state.last_split_config = None;
            state.tiles_format = None;
            (state.source.take(), std::mem::take(&mut state.tiles))
        };
        if source.is_some() || !tiles.is_empty() {
            info!(
                "[ImageSplitter] Teardown, releasing image and {} tiles",
                tiles.len()
            );
        }
        drop(tiles);
        drop(source);
        self.inner.engine.shutdown();
    }
}

impl Drop for ImageSplitter {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending_resplit(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending_resplit.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel_pending_resplit(&self) {
        if let Some(handle) = self.pending_resplit().take() {
            handle.abort();
        }
    }

    async fn split(&self) -> Result<SplitReport> {
        let (source, config, generation) = {
            let mut state = self.state();
            let source = state.source.clone().ok_or(SplitterError::NoImage)?;
            state.generation += 1;
            state.is_processing = true;
            (source, state.config, state.generation)
        };

        let result = self.engine.split(&source, config).await;

        let mut state = self.state();
        if state.generation != generation {
            debug!("[ImageSplitter] Discarding stale split result (generation {})", generation);
            return Ok(SplitReport::Superseded);
        }
        state.is_processing = false;

        let outcome = result.map_err(|e| {
            error!("[ImageSplitter] Split failed: {}", e);
            e
        })?;
        let tiles: Vec<Tile> = outcome
            .tiles
            .into_iter()
            .map(|tile| Tile {
                index: tile.index,
                width: tile.width,
                height: tile.height,
                handle: self.registry.register(ResourceKind::Tile, tile.bytes.into()),
            })
            .collect();
        let tile_count = tiles.len();

        let previous = std::mem::replace(&mut state.tiles, tiles);
        state.tiles_format = Some(config.output_format);
        state.has_ever_split = true;
        state.last_split_config = Some(config);
        drop(state);

        debug!("[ImageSplitter] Released {} previous tiles", previous.len());
        drop(previous);
        info!("[ImageSplitter] Image split into {} tiles via {}", tile_count, outcome.path);

        Ok(SplitReport::Completed {
            tile_count,
            path: outcome.path,
        })
    }
}

fn source_info(source: &SourceImage) -> SourceInfo {
    SourceInfo {
        name: source.name().to_string(),
        width: source.width(),
        height: source.height(),
        byte_len: source.handle().len(),
        uri: source.handle().uri(),
    }
}
