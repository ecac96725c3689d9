use std::fmt;

use crate::config::EngineSettings;

/// 执行路径
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPath {
    /// 当前线程直接渲染
    Inline,
    /// 常驻单 worker
    SingleWorker,
    /// 多 worker 并行
    Pool { workers: usize },
}

impl fmt::Display for ExecutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionPath::Inline => f.write_str("inline"),
            ExecutionPath::SingleWorker => f.write_str("single-worker"),
            ExecutionPath::Pool { workers } => write!(f, "pool({})", workers),
        }
    }
}

/// 选择执行路径
///
/// 小任务摊不平 worker 启动成本，只有切片数达到阈值且有多个执行单元时才并行。
pub fn select_path(
    workers_available: bool,
    parallelism: usize,
    tile_count: usize,
    settings: &EngineSettings,
) -> ExecutionPath {
    if !workers_available {
        return ExecutionPath::Inline;
    }
    let desired = settings.max_parallel_workers.min(parallelism).min(tile_count);
    if tile_count >= settings.pool_threshold && parallelism > 1 && desired > 1 {
        ExecutionPath::Pool { workers: desired }
    } else {
        ExecutionPath::SingleWorker
    }
}
