use image::buffer::ConvertBuffer;
use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ImageResult, RgbImage, RgbaImage};

use crate::config::OutputFormat;

/// 把画布编码为目标格式
///
/// - jpg：固定质量，透明通道丢弃
/// - webp：同一固定质量的有损编码（libwebp），保留透明通道
/// - png / bmp：默认无损
pub fn encode_surface(surface: &RgbaImage, format: OutputFormat, quality: u8) -> ImageResult<Vec<u8>> {
    let mut bytes = Vec::new();
    match format {
        OutputFormat::Jpg => {
            let rgb: RgbImage = surface.convert();
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100)))?;
        }
        OutputFormat::Png => surface.write_with_encoder(PngEncoder::new(&mut bytes))?,
        OutputFormat::Webp => {
            let encoder = webp::Encoder::from_rgba(surface.as_raw(), surface.width(), surface.height());
            bytes.extend_from_slice(&encoder.encode(f32::from(quality.clamp(1, 100))));
        }
        OutputFormat::Bmp => surface.write_with_encoder(BmpEncoder::new(&mut bytes))?,
    }
    Ok(bytes)
}
