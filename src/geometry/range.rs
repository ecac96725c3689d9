use std::ops::Range;

/// 切片索引的半开区间 [start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexRange {
    pub start: usize,
    pub end: usize,
}

impl IndexRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 截断到 [0, tile_count)
    pub fn clamp_to(&self, tile_count: usize) -> Range<usize> {
        let end = self.end.min(tile_count);
        self.start.min(end)..end
    }
}

/// 把 [0, tile_count) 切成最多 workers 段连续区间，每段 ceil(tile_count / workers)，
/// 空段直接丢弃
pub fn partition(tile_count: usize, workers: usize) -> Vec<IndexRange> {
    if tile_count == 0 || workers == 0 {
        return Vec::new();
    }
    let per_worker = tile_count.div_ceil(workers);
    (0..workers)
        .map(|i| {
            let start = i * per_worker;
            IndexRange::new(start, (start + per_worker).min(tile_count))
        })
        .take_while(|range| !range.is_empty())
        .collect()
}
