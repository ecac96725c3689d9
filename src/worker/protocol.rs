use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{OutputFormat, SplitConfiguration};
use crate::geometry::IndexRange;
use crate::render::TileData;

/// 请求关联ID
pub type RequestId = Uuid;

pub fn new_request_id() -> RequestId {
    Uuid::new_v4()
}

/// 主线程 -> worker
pub enum WorkerRequest {
    /// 切分请求；range 为空时处理全部切片
    Split {
        request_id: RequestId,
        image_bytes: Arc<[u8]>,
        config: SplitConfiguration,
        range: Option<IndexRange>,
    },
    /// 关闭 worker
    Shutdown,
}

/// worker -> 主线程
#[derive(Debug)]
pub enum WorkerResponse {
    SplitResult {
        request_id: RequestId,
        format: OutputFormat,
        tiles: Vec<TileData>,
    },
    SplitError {
        request_id: RequestId,
        error: String,
    },
    /// 运行时崩溃，发送后 worker 退出
    Fault {
        request_id: Option<RequestId>,
        error: String,
    },
}

impl WorkerResponse {
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            WorkerResponse::SplitResult { request_id, .. } | WorkerResponse::SplitError { request_id, .. } => {
                Some(*request_id)
            }
            WorkerResponse::Fault { request_id, .. } => *request_id,
        }
    }
}

impl fmt::Debug for WorkerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerRequest::Split {
                request_id,
                image_bytes,
                config,
                range,
            } => f
                .debug_struct("Split")
                .field("request_id", request_id)
                .field("bytes", &image_bytes.len())
                .field("config", config)
                .field("range", range)
                .finish(),
            WorkerRequest::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// 一次 worker 调用的成功结果
#[derive(Debug, Clone)]
pub struct WorkerOutput {
    pub format: OutputFormat,
    pub tiles: Vec<TileData>,
}
