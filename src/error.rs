use crate::config::OutputFormat;

/// 图片分割引擎的统一错误类型
///
/// 每个变体都有稳定的 [`SplitterError::code`]，界面层据此展示本地化提示，
/// 内部错误文本不保证面向用户。
#[derive(Debug, thiserror::Error)]
pub enum SplitterError {
    /// 上传文件不是图片 MIME 类型
    #[error("file type `{0}` is not an image")]
    InvalidFileType(String),

    /// 上传文件超过大小上限
    #[error("file is {size} bytes, limit is {max} bytes")]
    FileTooLarge { size: u64, max: u64 },

    /// 解码后的像素尺寸超过上限
    #[error("image is {width}x{height}, limit is {max}x{max}")]
    ImageTooLarge { width: u32, height: u32, max: u32 },

    /// 文件无法解码为图片
    #[error("failed to decode image: {0}")]
    InvalidFile(String),

    /// 尚未上传图片
    #[error("no image has been uploaded")]
    NoImage,

    #[error("tile {0} does not exist")]
    TileNotFound(usize),

    /// 离屏画布分配失败
    #[error("failed to create {width}x{height} surface for tile {index}")]
    SurfaceCreation { index: usize, width: u32, height: u32 },

    #[error("failed to encode tile {index} as {format}: {reason}")]
    Encode {
        index: usize,
        format: OutputFormat,
        reason: String,
    },

    /// worker 上下文内解码失败
    #[error("worker failed to decode source bytes: {0}")]
    Decode(String),

    #[error("background workers are unavailable")]
    WorkerUnavailable,

    #[error("failed to spawn worker: {0}")]
    WorkerSpawn(String),

    /// worker 正常拒绝了请求
    #[error("worker rejected request: {0}")]
    WorkerRejected(String),

    /// worker 运行时崩溃（panic 或通道断开）
    #[error("worker crashed: {0}")]
    WorkerCrashed(String),

    /// worker 已被销毁，挂起的请求全部拒绝
    #[error("worker disposed before responding")]
    WorkerDisposed,

    /// 所有执行路径都失败
    #[error("split failed: {0}")]
    SplitFailed(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),
}

impl SplitterError {
    /// 稳定的错误码，供界面层翻译
    pub fn code(&self) -> &'static str {
        match self {
            SplitterError::InvalidFileType(_) => "invalidFileType",
            SplitterError::FileTooLarge { .. } => "fileTooLarge",
            SplitterError::ImageTooLarge { .. } => "imageTooLarge",
            SplitterError::InvalidFile(_) => "invalidFile",
            SplitterError::NoImage => "noImage",
            SplitterError::TileNotFound(_) => "tileNotFound",
            SplitterError::DownloadFailed(_) => "downloadFailed",
            SplitterError::SurfaceCreation { .. }
            | SplitterError::Encode { .. }
            | SplitterError::Decode(_)
            | SplitterError::WorkerUnavailable
            | SplitterError::WorkerSpawn(_)
            | SplitterError::WorkerRejected(_)
            | SplitterError::WorkerCrashed(_)
            | SplitterError::WorkerDisposed
            | SplitterError::SplitFailed(_) => "splitFailed",
        }
    }

    /// 上传校验错误：不改变任何状态，用户换个文件即可恢复
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SplitterError::InvalidFileType(_)
                | SplitterError::FileTooLarge { .. }
                | SplitterError::ImageTooLarge { .. }
                | SplitterError::InvalidFile(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SplitterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_keep_their_names() {
        assert_eq!(SplitterError::InvalidFileType("text/plain".into()).code(), "invalidFileType");
        assert_eq!(SplitterError::FileTooLarge { size: 11, max: 10 }.code(), "fileTooLarge");
        assert_eq!(
            SplitterError::ImageTooLarge { width: 5000, height: 5000, max: 4096 }.code(),
            "imageTooLarge"
        );
        assert!(SplitterError::InvalidFile("eof".into()).is_validation());
    }

    #[test]
    fn transport_errors_surface_as_split_failures() {
        assert_eq!(SplitterError::WorkerCrashed("boom".into()).code(), "splitFailed");
        assert_eq!(SplitterError::WorkerDisposed.code(), "splitFailed");
        assert!(!SplitterError::WorkerDisposed.is_validation());
        assert_eq!(SplitterError::DownloadFailed("io".into()).code(), "downloadFailed");
    }
}
