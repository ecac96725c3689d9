use image::{imageops, DynamicImage, RgbaImage};
use log::debug;
use std::ops::Range;
use std::time::Instant;

use super::encoder::encode_surface;
use crate::config::{OutputFormat, SplitConfiguration};
use crate::error::{Result, SplitterError};
use crate::geometry::{plan_split, SplitPlan, TileRegion};

/// 一个切片的编码结果（可以跨线程传递）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileData {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

/// 切片渲染器：按区域 1:1 绘制到离屏画布，再编码
#[derive(Debug, Clone, Copy)]
pub struct TileRenderer {
    format: OutputFormat,
    quality: u8,
}

impl TileRenderer {
    pub fn new(format: OutputFormat, quality: u8) -> Self {
        Self { format, quality }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// 渲染单个切片；画布只在编码期间存在
    pub fn render_tile(&self, image: &DynamicImage, region: &TileRegion) -> Result<TileData> {
        let surface = draw_region(image, region)?;
        let bytes = encode_surface(&surface, self.format, self.quality).map_err(|e| SplitterError::Encode {
            index: region.index,
            format: self.format,
            reason: e.to_string(),
        })?;

        Ok(TileData {
            index: region.index,
            width: region.width,
            height: region.height,
            bytes,
        })
    }

    /// 按索引顺序渲染一个区间，任一切片失败即中止
    pub fn render_range(&self, image: &DynamicImage, plan: &SplitPlan, range: Range<usize>) -> Result<Vec<TileData>> {
        let start_time = Instant::now();
        let tiles = range
            .clone()
            .map(|index| self.render_tile(image, &plan.region(index)))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            "[TileRenderer] Rendered tiles {:?} as {}, 耗时: {:?}",
            range,
            self.format,
            start_time.elapsed()
        );
        Ok(tiles)
    }

    /// 主线程路径：整张图全部切片
    pub fn render_all(&self, image: &DynamicImage, config: &SplitConfiguration) -> Result<Vec<TileData>> {
        let plan = plan_split(image.width(), image.height(), config);
        self.render_range(image, &plan, 0..plan.tile_count)
    }
}

/// 分配与切片等大的透明画布，把源区域 1:1 拷贝进去；越界部分保持透明
fn draw_region(image: &DynamicImage, region: &TileRegion) -> Result<RgbaImage> {
    let surface_error = || SplitterError::SurfaceCreation {
        index: region.index,
        width: region.width,
        height: region.height,
    };
    let len = (region.width as usize)
        .checked_mul(region.height as usize)
        .and_then(|pixels| pixels.checked_mul(4))
        .ok_or_else(surface_error)?;
    let mut surface = RgbaImage::from_raw(region.width, region.height, vec![0; len]).ok_or_else(surface_error)?;

    let source = imageops::crop_imm(image, region.x, region.y, region.width, region.height).to_image();
    imageops::replace(&mut surface, &source, 0, 0);
    Ok(surface)
}
