use image::ImageFormat;
use std::fs;
use std::io;
use std::path::Path;

use crate::config::EngineSettings;
use crate::error::{Result, SplitterError};

const OCTET_STREAM: &str = "application/octet-stream";

/// 用户上传的文件：原始字节加声明的 MIME 类型
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// 从磁盘读取，MIME 类型按内容推断，推断不出再看扩展名
    pub fn from_path<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let mime_type = guess_mime_type(&bytes, &name).to_string();
        Ok(Self { name, mime_type, bytes })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

pub fn guess_mime_type(bytes: &[u8], name: &str) -> &'static str {
    if let Ok(format) = image::guess_format(bytes) {
        return format.to_mime_type();
    }
    Path::new(name)
        .extension()
        .and_then(ImageFormat::from_extension)
        .map(|format| format.to_mime_type())
        .unwrap_or(OCTET_STREAM)
}

/// 上传前的同步校验：类型、大小
pub fn validate_upload(file: &UploadedFile, settings: &EngineSettings) -> Result<()> {
    if !file.mime_type.starts_with("image/") {
        return Err(SplitterError::InvalidFileType(file.mime_type.clone()));
    }
    if file.size() > settings.max_file_size {
        return Err(SplitterError::FileTooLarge {
            size: file.size(),
            max: settings.max_file_size,
        });
    }
    Ok(())
}
