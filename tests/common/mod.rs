#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use image_splitter::engine::{Capabilities, SplitEngine};
use image_splitter::source::UploadedFile;
use image_splitter::worker::{RasterWorkerRenderer, WorkerRenderer};
use image_splitter::{EngineSettings, ImageSplitter};

/// 每个像素都能反推出坐标的测试图
pub fn gradient(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, ((x / 256) * 16 + y / 256) as u8, 255])
    })
}

pub fn encode(image: &RgbaImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(image.clone())
        .write_to(&mut Cursor::new(&mut bytes), format)
        .unwrap();
    bytes
}

pub fn png_upload(width: u32, height: u32) -> UploadedFile {
    UploadedFile::new("gradient.png", "image/png", encode(&gradient(width, height), ImageFormat::Png))
}

pub fn full_capabilities(parallelism: usize) -> Capabilities {
    Capabilities {
        worker_threads: true,
        offscreen_surface: true,
        worker_decode: true,
        parallelism,
    }
}

pub fn test_settings() -> EngineSettings {
    EngineSettings {
        resplit_debounce: Duration::from_millis(20),
        ..EngineSettings::default()
    }
}

pub fn engine(capabilities: Capabilities, renderer: Arc<dyn WorkerRenderer>) -> SplitEngine {
    SplitEngine::with_parts(test_settings(), capabilities, renderer)
}

pub fn raster_engine(capabilities: Capabilities) -> SplitEngine {
    engine(capabilities, Arc::new(RasterWorkerRenderer::new(85)))
}

pub fn splitter(capabilities: Capabilities) -> ImageSplitter {
    ImageSplitter::with_engine(raster_engine(capabilities))
}

pub fn decode_rgba(bytes: &[u8]) -> RgbaImage {
    image::load_from_memory(bytes).unwrap().to_rgba8()
}
