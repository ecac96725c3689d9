use image::{ImageFormat, RgbaImage};
use log::debug;
use std::io;
use std::num::NonZeroUsize;
use std::thread;

/// 运行环境能力
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// 能否启动后台线程
    pub worker_threads: bool,
    /// 能否分配离屏画布
    pub offscreen_surface: bool,
    /// worker 内能否解码常见格式
    pub worker_decode: bool,
    /// 可用的执行单元数
    pub parallelism: usize,
}

impl Capabilities {
    /// 探测当前进程
    pub fn detect() -> Self {
        let worker_threads = thread::Builder::new()
            .name("capability-probe".to_string())
            .spawn(|| ())
            .and_then(|handle| handle.join().map_err(|_| io::Error::other("probe thread panicked")))
            .is_ok();
        let offscreen_surface = RgbaImage::from_raw(1, 1, vec![0; 4]).is_some();
        let worker_decode = ImageFormat::Png.reading_enabled() && ImageFormat::Jpeg.reading_enabled();
        let parallelism = thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(1);

        let capabilities = Self {
            worker_threads,
            offscreen_surface,
            worker_decode,
            parallelism,
        };
        debug!("[Capabilities] Worker capability check {:?}", capabilities);
        capabilities
    }

    /// 无 worker 的环境
    pub fn inline_only() -> Self {
        Self {
            worker_threads: false,
            offscreen_surface: true,
            worker_decode: false,
            parallelism: 1,
        }
    }

    /// 三项能力都具备才允许走 worker
    pub fn supports_workers(&self) -> bool {
        self.worker_threads && self.offscreen_surface && self.worker_decode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_finds_threads_and_codecs() {
        let capabilities = Capabilities::detect();
        assert!(capabilities.supports_workers());
        assert!(capabilities.parallelism >= 1);
    }

    #[test]
    fn any_missing_capability_disables_workers() {
        let full = Capabilities::detect();
        assert!(!Capabilities { offscreen_surface: false, ..full }.supports_workers());
        assert!(!Capabilities { worker_decode: false, ..full }.supports_workers());
        assert!(!Capabilities::inline_only().supports_workers());
    }
}
