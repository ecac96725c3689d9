use crate::config::{OutputFormat, SplitConfiguration};

/// 当前源图的只读信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub byte_len: usize,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileInfo {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub byte_len: usize,
    /// 显示用地址，每次重切都会换新
    pub uri: String,
}

/// 会话状态快照，供外壳显示
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub source: Option<SourceInfo>,
    pub tiles: Vec<TileInfo>,
    /// 当前切片的编码格式，配置改动后在重切前可能与 config 不同
    pub tiles_format: Option<OutputFormat>,
    pub is_processing: bool,
    pub config: SplitConfiguration,
}

impl SessionSnapshot {
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }
}
