use log::{debug, warn};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use uuid::Uuid;

/// 资源种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    SourceImage,
    Tile,
}

struct LiveEntry {
    kind: ResourceKind,
    byte_len: usize,
    created: Instant,
}

/// 可显示二进制资源的登记表
///
/// 每个 [`BlobHandle`] 创建时登记，drop 时注销。登记表只记录元数据，
/// 数据本身由句柄持有，所以句柄被替换或随组件销毁时内存随之释放。
pub struct ResourceRegistry {
    entries: Mutex<HashMap<Uuid, LiveEntry>>,
    released: AtomicU64,
}

impl ResourceRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            released: AtomicU64::new(0),
        })
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Uuid, LiveEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 登记一块二进制数据，返回唯一句柄
    pub fn register(self: &Arc<Self>, kind: ResourceKind, data: Arc<[u8]>) -> BlobHandle {
        let id = Uuid::new_v4();
        self.entries().insert(
            id,
            LiveEntry {
                kind,
                byte_len: data.len(),
                created: Instant::now(),
            },
        );
        BlobHandle {
            id,
            kind,
            data,
            registry: Arc::clone(self),
        }
    }

    fn release(&self, id: &Uuid) {
        match self.entries().remove(id) {
            Some(entry) => {
                self.released.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "[ResourceRegistry] Released {:?} {} ({} bytes, held {:?})",
                    entry.kind,
                    id,
                    entry.byte_len,
                    entry.created.elapsed()
                );
            }
            None => warn!("[ResourceRegistry] Release of unknown handle {}", id),
        }
    }

    pub fn live_count(&self) -> usize {
        self.entries().len()
    }

    pub fn live_count_of(&self, kind: ResourceKind) -> usize {
        self.entries().values().filter(|e| e.kind == kind).count()
    }

    pub fn live_bytes(&self) -> usize {
        self.entries().values().map(|e| e.byte_len).sum()
    }

    /// 累计释放的句柄数
    pub fn released_count(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }

    pub fn is_live(&self, handle_id: &Uuid) -> bool {
        self.entries().contains_key(handle_id)
    }
}

/// 一个已登记资源的唯一持有者，drop 即释放
pub struct BlobHandle {
    id: Uuid,
    kind: ResourceKind,
    data: Arc<[u8]>,
    registry: Arc<ResourceRegistry>,
}

impl BlobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// 供界面显示的 blob 地址
    pub fn uri(&self) -> String {
        format!("blob:image-splitter/{}", self.id)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// 共享数据（传给 worker 时不拷贝）
    pub fn shared_data(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 显式释放
    pub fn release(self) {}
}

impl Drop for BlobHandle {
    fn drop(&mut self) {
        self.registry.release(&self.id);
    }
}

impl fmt::Debug for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("len", &self.data.len())
            .finish()
    }
}
