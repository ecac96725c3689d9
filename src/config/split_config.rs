use std::fmt;
use std::str::FromStr;

/// 行列数的取值范围
pub const MIN_SPLITS: u32 = 1;
pub const MAX_SPLITS: u32 = 10;

/// 分割模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SplitMode {
    /// 竖向切条，只看列数
    Vertical,
    /// 横向切条，只看行数
    Horizontal,
    /// 网格，行 × 列
    Grid,
}

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Jpg,
    Png,
    Webp,
    Bmp,
}

impl OutputFormat {
    /// 文件扩展名，同时也是下载文件名的后缀
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
            OutputFormat::Bmp => "bmp",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
            OutputFormat::Bmp => "image/bmp",
        }
    }

    /// 有损格式才使用质量参数
    pub fn is_lossy(&self) -> bool {
        matches!(self, OutputFormat::Jpg | OutputFormat::Webp)
    }
}

impl fmt::Display for SplitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SplitMode::Vertical => "vertical",
            SplitMode::Horizontal => "horizontal",
            SplitMode::Grid => "grid",
        };
        f.write_str(name)
    }
}

impl FromStr for SplitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vertical" => Ok(SplitMode::Vertical),
            "horizontal" => Ok(SplitMode::Horizontal),
            "grid" => Ok(SplitMode::Grid),
            other => Err(format!("unknown split mode `{}` (vertical, horizontal, grid)", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(OutputFormat::Jpg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::Webp),
            "bmp" => Ok(OutputFormat::Bmp),
            other => Err(format!("unknown output format `{}` (jpg, png, webp, bmp)", other)),
        }
    }
}

/// 一次分割操作的配置，分割期间不可变
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitConfiguration {
    pub mode: SplitMode,
    pub rows: u32,
    pub cols: u32,
    /// 仅用于预览显示的间隙宽度，不影响切片像素
    pub grid_line_width: u32,
    pub output_format: OutputFormat,
}

impl SplitConfiguration {
    pub fn new(mode: SplitMode, rows: u32, cols: u32, output_format: OutputFormat) -> Self {
        Self {
            mode,
            rows: clamp_splits(rows),
            cols: clamp_splits(cols),
            grid_line_width: 2,
            output_format,
        }
    }

    /// 限制在 [1, 10] 内的行数；字段是公开的，直接赋值可能越界
    pub fn effective_rows(&self) -> u32 {
        clamp_splits(self.rows)
    }

    pub fn effective_cols(&self) -> u32 {
        clamp_splits(self.cols)
    }

    /// 切片数量：竖切看列，横切看行，网格为行×列
    pub fn tile_count(&self) -> usize {
        let rows = self.effective_rows() as usize;
        let cols = self.effective_cols() as usize;
        match self.mode {
            SplitMode::Vertical => cols,
            SplitMode::Horizontal => rows,
            SplitMode::Grid => rows * cols,
        }
    }

    /// 比较会影响切片结果的参数，忽略 grid_line_width
    pub fn same_split_params(&self, other: &SplitConfiguration) -> bool {
        self.mode == other.mode
            && self.rows == other.rows
            && self.cols == other.cols
            && self.output_format == other.output_format
    }
}

impl Default for SplitConfiguration {
    fn default() -> Self {
        Self {
            mode: SplitMode::Grid,
            rows: 3,
            cols: 3,
            grid_line_width: 2,
            output_format: OutputFormat::Jpg,
        }
    }
}

fn clamp_splits(value: u32) -> u32 {
    value.clamp(MIN_SPLITS, MAX_SPLITS)
}

/// 配置的部分更新
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigPatch {
    pub mode: Option<SplitMode>,
    pub rows: Option<u32>,
    pub cols: Option<u32>,
    pub grid_line_width: Option<u32>,
    pub output_format: Option<OutputFormat>,
}

impl ConfigPatch {
    pub fn mode(mut self, mode: SplitMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn rows(mut self, rows: u32) -> Self {
        self.rows = Some(rows);
        self
    }

    pub fn cols(mut self, cols: u32) -> Self {
        self.cols = Some(cols);
        self
    }

    pub fn grid_line_width(mut self, width: u32) -> Self {
        self.grid_line_width = Some(width);
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == ConfigPatch::default()
    }

    /// 在现有配置上应用补丁，行列数限制在 [1, 10]
    pub fn apply_to(&self, base: &SplitConfiguration) -> SplitConfiguration {
        SplitConfiguration {
            mode: self.mode.unwrap_or(base.mode),
            rows: self.rows.map(clamp_splits).unwrap_or(base.rows),
            cols: self.cols.map(clamp_splits).unwrap_or(base.cols),
            grid_line_width: self.grid_line_width.unwrap_or(base.grid_line_width),
            output_format: self.output_format.unwrap_or(base.output_format),
        }
    }
}
