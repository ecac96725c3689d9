use log::{debug, info};
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::OutputFormat;
use crate::error::{Result, SplitterError};

/// 批量下载的压缩包文件名
pub const ARCHIVE_NAME: &str = "split-images.zip";

/// 待写出的下载产物
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl OutputFile {
    /// 写入目录。先写临时文件再改名，失败时目录里不会留下半个文件
    pub fn emit(&self, dir: &Path) -> Result<PathBuf> {
        let failed = |e: std::io::Error| SplitterError::DownloadFailed(format!("{}: {}", self.file_name, e));

        fs::create_dir_all(dir).map_err(failed)?;
        let mut temp = NamedTempFile::new_in(dir).map_err(failed)?;
        temp.write_all(&self.bytes).map_err(failed)?;
        temp.flush().map_err(failed)?;

        let target = dir.join(&self.file_name);
        temp.persist(&target).map_err(|e| failed(e.error))?;
        info!("[OutputAssembler] Saved {} ({} bytes)", target.display(), self.bytes.len());
        Ok(target)
    }
}

/// 切片文件名，序号从 1 开始
pub fn tile_file_name(index: usize, format: OutputFormat) -> String {
    format!("split-image-{}.{}", index + 1, format.extension())
}

pub fn single_file(index: usize, bytes: &[u8], format: OutputFormat) -> OutputFile {
    OutputFile {
        file_name: tile_file_name(index, format),
        bytes: bytes.to_vec(),
    }
}

/// 把全部切片打进一个 zip，整个包在内存里完成后才返回
pub fn zip_archive<'a, I>(tiles: I, format: OutputFormat, compression_level: i64) -> Result<OutputFile>
where
    I: IntoIterator<Item = (usize, &'a [u8])>,
{
    let start_time = Instant::now();
    let failed = |e: &dyn std::fmt::Display| SplitterError::DownloadFailed(e.to_string());
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(compression_level));

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let mut count = 0usize;
    for (index, bytes) in tiles {
        writer
            .start_file(tile_file_name(index, format), options)
            .map_err(|e| failed(&e))?;
        writer.write_all(bytes).map_err(|e| failed(&e))?;
        count += 1;
    }
    if count == 0 {
        return Err(SplitterError::DownloadFailed("no tiles to archive".to_string()));
    }
    let bytes = writer.finish().map_err(|e| failed(&e))?.into_inner();

    debug!(
        "[OutputAssembler] Archived {} tiles into {} bytes, 耗时: {:?}",
        count,
        bytes.len(),
        start_time.elapsed()
    );
    Ok(OutputFile {
        file_name: ARCHIVE_NAME.to_string(),
        bytes,
    })
}
