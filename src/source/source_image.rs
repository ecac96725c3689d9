use image::{DynamicImage, ImageReader};
use log::{debug, info};
use std::io::Cursor;
use std::sync::Arc;

use super::upload::{validate_upload, UploadedFile};
use crate::config::EngineSettings;
use crate::error::{Result, SplitterError};
use crate::resource::{BlobHandle, ResourceKind, ResourceRegistry};

/// 已上传并解码的源图
///
/// 持有解码后的像素（主线程路径使用）和原始编码字节的句柄
/// （传给 worker，也是界面显示用的资源）。
pub struct SourceImage {
    name: String,
    width: u32,
    height: u32,
    image: Arc<DynamicImage>,
    handle: BlobHandle,
}

impl SourceImage {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// 共享像素，供阻塞线程池上的主线程路径使用
    pub fn shared_image(&self) -> Arc<DynamicImage> {
        Arc::clone(&self.image)
    }

    /// 原始编码字节，worker 自行解码
    pub fn encoded_bytes(&self) -> Arc<[u8]> {
        self.handle.shared_data()
    }

    pub fn handle(&self) -> &BlobHandle {
        &self.handle
    }
}

/// 校验并解码上传文件；任何一步失败都不会登记资源
pub fn load_source(
    file: UploadedFile,
    settings: &EngineSettings,
    registry: &Arc<ResourceRegistry>,
) -> Result<SourceImage> {
    validate_upload(&file, settings)?;

    // 先只读头部拿尺寸，超限的图不做完整解码
    let (width, height) = ImageReader::new(Cursor::new(&file.bytes))
        .with_guessed_format()
        .map_err(|e| SplitterError::InvalidFile(e.to_string()))?
        .into_dimensions()
        .map_err(|e| SplitterError::InvalidFile(e.to_string()))?;
    check_dimensions(width, height, settings.max_dimension)?;

    let image = image::load_from_memory(&file.bytes).map_err(|e| SplitterError::InvalidFile(e.to_string()))?;
    check_dimensions(image.width(), image.height(), settings.max_dimension)?;
    debug!(
        "[SourceImage] Decoded {} as {}x{} ({:?})",
        file.name,
        image.width(),
        image.height(),
        image.color()
    );

    let UploadedFile { name, bytes, .. } = file;
    let size = bytes.len();
    let handle = registry.register(ResourceKind::SourceImage, bytes.into());
    info!(
        "[SourceImage] Image uploaded: {} {}x{} ({} bytes)",
        name,
        image.width(),
        image.height(),
        size
    );

    Ok(SourceImage {
        name,
        width: image.width(),
        height: image.height(),
        image: Arc::new(image),
        handle,
    })
}

fn check_dimensions(width: u32, height: u32, max: u32) -> Result<()> {
    if width > max || height > max {
        return Err(SplitterError::ImageTooLarge { width, height, max });
    }
    Ok(())
}
