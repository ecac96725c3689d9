use log::{debug, warn};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// 上传文件大小上限 10 MiB
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
/// 像素尺寸上限
pub const MAX_DIMENSION: u32 = 4096;

/// 引擎运行参数
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// 为 false 时始终走主线程路径
    pub workers_enabled: bool,
    pub max_parallel_workers: usize,
    /// 切片数达到该值才考虑并行池
    pub pool_threshold: usize,
    /// 有损编码质量（jpg / webp），85 对应 0.85
    pub encode_quality: u8,
    pub zip_compression_level: i64,
    /// 配置变化后自动重切的防抖延迟
    pub resplit_debounce: Duration,
    pub max_file_size: u64,
    pub max_dimension: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            workers_enabled: true,
            max_parallel_workers: 4,
            pool_threshold: 16,
            encode_quality: 85,
            zip_compression_level: 6,
            resplit_debounce: Duration::from_millis(100),
            max_file_size: MAX_FILE_SIZE,
            max_dimension: MAX_DIMENSION,
        }
    }
}

impl EngineSettings {
    /// 从环境变量读取，存在 .env 时先加载
    pub fn from_env() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("[EngineSettings] Loaded {:?}", path);
        }
        let mut settings = Self::default();
        if let Some(enabled) = read_var::<bool>("IMAGE_SPLITTER_WORKERS") {
            settings.workers_enabled = enabled;
        }
        if let Some(max) = read_var::<usize>("IMAGE_SPLITTER_MAX_WORKERS") {
            settings.max_parallel_workers = max.max(1);
        }
        if let Some(threshold) = read_var::<usize>("IMAGE_SPLITTER_POOL_THRESHOLD") {
            settings.pool_threshold = threshold;
        }
        if let Some(quality) = read_var::<u8>("IMAGE_SPLITTER_QUALITY") {
            settings.encode_quality = quality.clamp(1, 100);
        }
        if let Some(level) = read_var::<i64>("IMAGE_SPLITTER_ZIP_LEVEL") {
            settings.zip_compression_level = level.clamp(0, 9);
        }
        if let Some(ms) = read_var::<u64>("IMAGE_SPLITTER_DEBOUNCE_MS") {
            settings.resplit_debounce = Duration::from_millis(ms);
        }
        settings
    }
}

fn read_var<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("[EngineSettings] Ignoring malformed {}={:?}", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let settings = EngineSettings::default();
        assert_eq!(settings.max_file_size, 10 * 1024 * 1024);
        assert_eq!(settings.max_dimension, 4096);
        assert_eq!(settings.pool_threshold, 16);
        assert_eq!(settings.max_parallel_workers, 4);
        assert_eq!(settings.resplit_debounce, Duration::from_millis(100));
    }

    #[test]
    fn malformed_variable_is_ignored() {
        env::set_var("IMAGE_SPLITTER_TEST_ONLY_NUMBER", "not-a-number");
        assert_eq!(read_var::<usize>("IMAGE_SPLITTER_TEST_ONLY_NUMBER"), None);
        env::set_var("IMAGE_SPLITTER_TEST_ONLY_NUMBER", " 7 ");
        assert_eq!(read_var::<usize>("IMAGE_SPLITTER_TEST_ONLY_NUMBER"), Some(7));
        env::remove_var("IMAGE_SPLITTER_TEST_ONLY_NUMBER");
    }
}
