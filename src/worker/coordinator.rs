use crossbeam_channel::{unbounded, Receiver};
use futures::future::try_join_all;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Instant;
use tokio::sync::oneshot;

use super::protocol::{new_request_id, RequestId, WorkerOutput, WorkerRequest, WorkerResponse};
use super::split_worker::{SplitWorker, WorkerRenderer};
use crate::config::SplitConfiguration;
use crate::error::{Result, SplitterError};
use crate::geometry::{partition, IndexRange};
use crate::render::TileData;

type PendingMap = HashMap<RequestId, oneshot::Sender<Result<WorkerOutput>>>;

/// 某个常驻 worker 上尚未响应的请求
#[derive(Default)]
struct PendingRequests {
    map: Mutex<PendingMap>,
}

impl PendingRequests {
    fn lock(&self) -> MutexGuard<'_, PendingMap> {
        self.map.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, request_id: RequestId, responder: oneshot::Sender<Result<WorkerOutput>>) {
        self.lock().insert(request_id, responder);
    }

    fn take(&self, request_id: &RequestId) -> Option<oneshot::Sender<Result<WorkerOutput>>> {
        self.lock().remove(request_id)
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn reject_all(&self, reason: impl Fn() -> SplitterError) {
        let drained: Vec<_> = self.lock().drain().collect();
        if !drained.is_empty() {
            warn!("[WorkerCoordinator] Rejecting {} pending requests", drained.len());
        }
        for (_, responder) in drained {
            let _ = responder.send(Err(reason()));
        }
    }
}

/// 常驻 worker；generation 用于识别过期的路由线程
struct ResidentWorker {
    generation: u64,
    worker: SplitWorker,
    pending: Arc<PendingRequests>,
}

type ResidentSlot = Arc<Mutex<Option<ResidentWorker>>>;

fn lock_slot(slot: &Mutex<Option<ResidentWorker>>) -> MutexGuard<'_, Option<ResidentWorker>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 只销毁属于该代的常驻 worker
fn dispose_generation(slot: &Mutex<Option<ResidentWorker>>, generation: u64) {
    let disposed = {
        let mut slot = lock_slot(slot);
        match slot.as_ref() {
            Some(resident) if resident.generation == generation => slot.take(),
            _ => None,
        }
    };
    if disposed.is_some() {
        info!("[WorkerCoordinator] Disposed worker generation {}", generation);
    }
}

/// worker 协调器
///
/// 单 worker 模式：常驻 worker 懒创建、跨请求复用，响应由路由线程按请求ID分发。
/// 并行模式：每个索引区间一个短命 worker，拿到结果即关闭。
pub struct WorkerCoordinator {
    renderer: Arc<dyn WorkerRenderer>,
    resident: ResidentSlot,
    next_generation: AtomicU64,
    spawned: Arc<AtomicUsize>,
}

impl WorkerCoordinator {
    pub fn new(renderer: Arc<dyn WorkerRenderer>) -> Self {
        Self {
            renderer,
            resident: Arc::new(Mutex::new(None)),
            next_generation: AtomicU64::new(1),
            spawned: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 累计创建的 worker 数（常驻 + 并行）
    pub fn workers_spawned(&self) -> usize {
        self.spawned.load(Ordering::Relaxed)
    }

    pub fn has_resident_worker(&self) -> bool {
        lock_slot(&self.resident).is_some()
    }

    pub fn pending_count(&self) -> usize {
        lock_slot(&self.resident)
            .as_ref()
            .map(|resident| resident.pending.len())
            .unwrap_or(0)
    }

    /// 由常驻 worker 处理整张图
    pub async fn split_with_worker(&self, image_bytes: Arc<[u8]>, config: SplitConfiguration) -> Result<Vec<TileData>> {
        let request_id = new_request_id();
        let (responder, response) = oneshot::channel();
        let start_time = Instant::now();
        {
            let mut slot = lock_slot(&self.resident);
            if slot.is_none() {
                *slot = Some(self.spawn_resident()?);
            } else {
                debug!("[WorkerCoordinator] Reusing existing worker instance");
            }
            let resident = slot.as_ref().ok_or(SplitterError::WorkerUnavailable)?;
            resident.pending.insert(request_id, responder);

            let posted = resident.worker.post(WorkerRequest::Split {
                request_id,
                image_bytes,
                config,
                range: None,
            });
            if let Err(e) = posted {
                resident.pending.take(&request_id);
                warn!("[WorkerCoordinator] Failed to post request {}: {}", request_id, e);
                return Err(e);
            }
        }
        debug!("[WorkerCoordinator] Worker split dispatched {} ({:?})", request_id, config);

        let output = response.await.map_err(|_| SplitterError::WorkerDisposed)??;
        if output.format != config.output_format {
            return Err(SplitterError::WorkerRejected(format!(
                "worker encoded {} instead of {}",
                output.format, config.output_format
            )));
        }
        let mut tiles = output.tiles;
        tiles.sort_by_key(|tile| tile.index);
        debug!(
            "[WorkerCoordinator] Worker split finished {}: {} tiles, 耗时: {:?}",
            request_id,
            tiles.len(),
            start_time.elapsed()
        );
        Ok(tiles)
    }

    /// 切成 worker_count 段，每段一个独立 worker；任一段失败整体失败
    pub async fn split_with_pool(
        &self,
        image_bytes: Arc<[u8]>,
        config: SplitConfiguration,
        tile_count: usize,
        worker_count: usize,
    ) -> Result<Vec<TileData>> {
        let ranges = partition(tile_count, worker_count);
        info!(
            "[WorkerCoordinator] Using parallel worker pool: {} workers for {} tiles",
            ranges.len(),
            tile_count
        );
        let start_time = Instant::now();

        let tasks = ranges.into_iter().enumerate().map(|(slot, range)| {
            let renderer = Arc::clone(&self.renderer);
            let image_bytes = Arc::clone(&image_bytes);
            let spawned = Arc::clone(&self.spawned);
            async move {
                tokio::task::spawn_blocking(move || {
                    run_pooled_range(slot, renderer, image_bytes, config, range, &spawned)
                })
                .await
                .map_err(|e| SplitterError::WorkerCrashed(e.to_string()))?
            }
        });

        let chunks = try_join_all(tasks).await?;
        let mut tiles: Vec<TileData> = chunks.into_iter().flat_map(|chunk| chunk.tiles).collect();
        // worker 完成顺序不定，按索引重排
        tiles.sort_by_key(|tile| tile.index);
        debug!(
            "[WorkerCoordinator] Pool finished: {} tiles, 耗时: {:?}",
            tiles.len(),
            start_time.elapsed()
        );
        Ok(tiles)
    }

    /// 销毁常驻 worker，拒绝它的所有挂起请求
    pub fn dispose(&self) {
        let disposed = lock_slot(&self.resident).take();
        if let Some(resident) = disposed {
            debug!("[WorkerCoordinator] Disposing worker instance (generation {})", resident.generation);
            resident.pending.reject_all(|| SplitterError::WorkerDisposed);
        }
    }

    fn spawn_resident(&self) -> Result<ResidentWorker> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (response_tx, response_rx) = unbounded();
        let worker = SplitWorker::spawn(
            format!("split-worker-{}", generation),
            Arc::clone(&self.renderer),
            response_tx,
        )?;
        self.spawned.fetch_add(1, Ordering::Relaxed);

        let pending = Arc::new(PendingRequests::default());
        let router_pending = Arc::clone(&pending);
        let slot = Arc::clone(&self.resident);
        thread::Builder::new()
            .name(format!("split-router-{}", generation))
            .spawn(move || route_responses(generation, response_rx, router_pending, slot))
            .map_err(|e| SplitterError::WorkerSpawn(e.to_string()))?;

        info!("[WorkerCoordinator] Worker initialised (generation {})", generation);
        Ok(ResidentWorker {
            generation,
            worker,
            pending,
        })
    }
}

impl Drop for WorkerCoordinator {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// 路由线程：按请求ID把响应交给等待者。
/// worker 退出后响应通道断开，线程结束前再清一次挂起请求，保证每个请求都有结果。
fn route_responses(
    generation: u64,
    response_rx: Receiver<WorkerResponse>,
    pending: Arc<PendingRequests>,
    slot: ResidentSlot,
) {
    while let Ok(response) = response_rx.recv() {
        match response {
            WorkerResponse::SplitResult {
                request_id,
                format,
                tiles,
            } => match pending.take(&request_id) {
                Some(responder) => {
                    debug!(
                        "[WorkerCoordinator] Worker split result received {} ({} tiles)",
                        request_id,
                        tiles.len()
                    );
                    let _ = responder.send(Ok(WorkerOutput { format, tiles }));
                }
                None => debug!("[WorkerCoordinator] Worker response without pending request {}", request_id),
            },
            WorkerResponse::SplitError { request_id, error } => match pending.take(&request_id) {
                Some(responder) => {
                    debug!("[WorkerCoordinator] Worker split error received {}: {}", request_id, error);
                    let _ = responder.send(Err(SplitterError::WorkerRejected(error)));
                }
                None => debug!("[WorkerCoordinator] Worker response without pending request {}", request_id),
            },
            WorkerResponse::Fault { request_id, error } => {
                warn!(
                    "[WorkerCoordinator] Worker runtime error (request {:?}): {}",
                    request_id, error
                );
                pending.reject_all(|| SplitterError::WorkerCrashed(error.clone()));
                dispose_generation(&slot, generation);
            }
        }
    }

    debug!("[WorkerCoordinator] Router {} finished, worker exited", generation);
    pending.reject_all(|| SplitterError::WorkerCrashed("worker exited".to_string()));
    dispose_generation(&slot, generation);
}

/// 在阻塞线程里驱动一个并行区间：创建 worker、投递、等待匹配的响应、关闭
fn run_pooled_range(
    slot: usize,
    renderer: Arc<dyn WorkerRenderer>,
    image_bytes: Arc<[u8]>,
    config: SplitConfiguration,
    range: IndexRange,
    spawned: &AtomicUsize,
) -> Result<WorkerOutput> {
    let (response_tx, response_rx) = unbounded();
    let mut worker = SplitWorker::spawn(format!("split-pool-{}", slot), renderer, response_tx)?;
    spawned.fetch_add(1, Ordering::Relaxed);

    let request_id = new_request_id();
    worker.post(WorkerRequest::Split {
        request_id,
        image_bytes,
        config,
        range: Some(range),
    })?;

    let result = loop {
        match response_rx.recv() {
            Ok(response) if response.request_id() != Some(request_id) => {
                debug!("[WorkerCoordinator] Ignoring unmatched pool response {:?}", response.request_id());
            }
            Ok(WorkerResponse::SplitResult { format, tiles, .. }) => break Ok(WorkerOutput { format, tiles }),
            Ok(WorkerResponse::SplitError { error, .. }) => break Err(SplitterError::WorkerRejected(error)),
            Ok(WorkerResponse::Fault { error, .. }) => {
                warn!("[WorkerCoordinator] Parallel worker error on {:?}: {}", range, error);
                break Err(SplitterError::WorkerCrashed(error));
            }
            Err(_) => break Err(SplitterError::WorkerCrashed(format!("{} exited without responding", worker.name()))),
        }
    };

    worker.terminate();
    result
}
