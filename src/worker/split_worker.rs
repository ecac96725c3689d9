use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use super::protocol::{WorkerRequest, WorkerResponse};
use crate::config::SplitConfiguration;
use crate::error::{Result, SplitterError};
use crate::geometry::{plan_split, IndexRange};
use crate::render::{TileData, TileRenderer};

/// worker 内的渲染接口
///
/// worker 只拿到原始编码字节，需要自行解码。实现必须可以跨线程共享。
pub trait WorkerRenderer: Send + Sync {
    fn render(
        &self,
        image_bytes: &[u8],
        config: &SplitConfiguration,
        range: Option<IndexRange>,
    ) -> Result<Vec<TileData>>;
}

/// 默认实现：image 解码 + TileRenderer
#[derive(Debug, Clone, Copy)]
pub struct RasterWorkerRenderer {
    quality: u8,
}

impl RasterWorkerRenderer {
    pub fn new(quality: u8) -> Self {
        Self { quality }
    }
}

impl WorkerRenderer for RasterWorkerRenderer {
    fn render(
        &self,
        image_bytes: &[u8],
        config: &SplitConfiguration,
        range: Option<IndexRange>,
    ) -> Result<Vec<TileData>> {
        let image = image::load_from_memory(image_bytes).map_err(|e| SplitterError::Decode(e.to_string()))?;
        let plan = plan_split(image.width(), image.height(), config);
        let indices = match range {
            Some(range) => range.clamp_to(plan.tile_count),
            None => 0..plan.tile_count,
        };
        TileRenderer::new(config.output_format, self.quality).render_range(&image, &plan, indices)
    }
}

/// 后台切分 worker - 独立线程，通过channel通信
pub struct SplitWorker {
    name: String,
    task_sender: Sender<WorkerRequest>,
    worker_thread: Option<JoinHandle<()>>,
}

impl SplitWorker {
    /// 启动 worker 线程，响应写入 response_tx
    pub fn spawn(
        name: impl Into<String>,
        renderer: Arc<dyn WorkerRenderer>,
        response_tx: Sender<WorkerResponse>,
    ) -> Result<Self> {
        let name = name.into();
        let (task_tx, task_rx) = unbounded::<WorkerRequest>();

        let thread_name = name.clone();
        let worker_thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                Self::worker_loop(&thread_name, renderer, task_rx, response_tx);
            })
            .map_err(|e| SplitterError::WorkerSpawn(e.to_string()))?;
        debug!("[SplitWorker] {} started", name);

        Ok(Self {
            name,
            task_sender: task_tx,
            worker_thread: Some(worker_thread),
        })
    }

    /// worker 线程主循环
    fn worker_loop(
        name: &str,
        renderer: Arc<dyn WorkerRenderer>,
        task_rx: Receiver<WorkerRequest>,
        response_tx: Sender<WorkerResponse>,
    ) {
        loop {
            let task = match task_rx.recv() {
                Ok(task) => task,
                Err(_) => {
                    debug!("[SplitWorker] {} task channel closed", name);
                    break;
                }
            };

            match task {
                WorkerRequest::Split {
                    request_id,
                    image_bytes,
                    config,
                    range,
                } => {
                    debug!(
                        "[SplitWorker] {} received request {} ({} bytes, range {:?})",
                        name,
                        request_id,
                        image_bytes.len(),
                        range
                    );
                    let start_time = Instant::now();
                    let outcome =
                        panic::catch_unwind(AssertUnwindSafe(|| renderer.render(&image_bytes, &config, range)));

                    let (response, fatal) = match outcome {
                        Ok(Ok(tiles)) => {
                            debug!(
                                "[SplitWorker] {} request {} done: {} tiles, 耗时: {:?}",
                                name,
                                request_id,
                                tiles.len(),
                                start_time.elapsed()
                            );
                            let response = WorkerResponse::SplitResult {
                                request_id,
                                format: config.output_format,
                                tiles,
                            };
                            (response, false)
                        }
                        Ok(Err(e)) => {
                            info!("[SplitWorker] {} request {} failed: {}", name, request_id, e);
                            let response = WorkerResponse::SplitError {
                                request_id,
                                error: e.to_string(),
                            };
                            (response, false)
                        }
                        Err(payload) => {
                            let message = panic_message(payload.as_ref());
                            error!("[SplitWorker] {} crashed on request {}: {}", name, request_id, message);
                            let response = WorkerResponse::Fault {
                                request_id: Some(request_id),
                                error: message,
                            };
                            (response, true)
                        }
                    };

                    if response_tx.send(response).is_err() {
                        info!("[SplitWorker] {} response channel closed", name);
                        break;
                    }
                    if fatal {
                        break;
                    }
                }
                WorkerRequest::Shutdown => {
                    debug!("[SplitWorker] Shutting down {}", name);
                    break;
                }
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 投递请求；worker 已退出时返回错误
    pub fn post(&self, request: WorkerRequest) -> Result<()> {
        self.task_sender
            .send(request)
            .map_err(|_| SplitterError::WorkerCrashed(format!("{} is no longer running", self.name)))
    }

    /// 关闭 worker
    pub fn terminate(&mut self) {
        let _ = self.task_sender.send(WorkerRequest::Shutdown);
    }
}

impl Drop for SplitWorker {
    fn drop(&mut self) {
        self.terminate();
        if let Some(handle) = self.worker_thread.take() {
            let _ = handle.join();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}
