use crate::config::{SplitConfiguration, SplitMode};

/// 源图中一个切片的区域（像素坐标）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRegion {
    pub index: usize,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl TileRegion {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// 分割规划：切片数与统一的切片尺寸
///
/// 不能整除时尺寸向下取整（至少为 1），每个切片都按同一尺寸截取，
/// 右侧和底部可能留下不足一个切片的余量，这是既定行为。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitPlan {
    pub mode: SplitMode,
    pub cols: u32,
    pub tile_count: usize,
    pub tile_width: u32,
    pub tile_height: u32,
}

pub fn plan_split(width: u32, height: u32, config: &SplitConfiguration) -> SplitPlan {
    let rows = config.effective_rows();
    let cols = config.effective_cols();
    let (tile_width, tile_height) = match config.mode {
        SplitMode::Vertical => (width / cols, height),
        SplitMode::Horizontal => (width, height / rows),
        SplitMode::Grid => (width / cols, height / rows),
    };

    SplitPlan {
        mode: config.mode,
        cols,
        tile_count: config.tile_count(),
        tile_width: tile_width.max(1),
        tile_height: tile_height.max(1),
    }
}

impl SplitPlan {
    /// 切片索引到源区域的映射
    pub fn region(&self, index: usize) -> TileRegion {
        let cols = self.cols as usize;
        let (x, y) = match self.mode {
            SplitMode::Vertical => ((index % cols) as u32 * self.tile_width, 0),
            SplitMode::Horizontal => (0, index as u32 * self.tile_height),
            SplitMode::Grid => (
                (index % cols) as u32 * self.tile_width,
                (index / cols) as u32 * self.tile_height,
            ),
        };

        TileRegion {
            index,
            x,
            y,
            width: self.tile_width,
            height: self.tile_height,
        }
    }

    pub fn regions(&self) -> impl Iterator<Item = TileRegion> + '_ {
        (0..self.tile_count).map(move |index| self.region(index))
    }
}
