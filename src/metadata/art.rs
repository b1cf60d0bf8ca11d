//! Embedded cover-art preparation for list rows.

use std::io::Cursor;

use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageFormat};
use log::debug;
use zune_core::{colorspace::ColorSpace, options::DecoderOptions};
use zune_jpeg::JpegDecoder;

fn looks_like_jpeg(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0xff && bytes[1] == 0xd8
}

fn decode_jpeg_non_strict(bytes: &[u8]) -> Option<DynamicImage> {
    if !looks_like_jpeg(bytes) {
        return None;
    }

    let options = DecoderOptions::new_cmd()
        .set_strict_mode(false)
        .jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(bytes, options);
    let pixels = decoder.decode().ok()?;
    let (width, height) = decoder.dimensions()?;
    let image = image::RgbaImage::from_raw(width as u32, height as u32, pixels)?;
    Some(DynamicImage::ImageRgba8(image))
}

/// Decodes with the `image` crate, retrying JPEGs that fail strict decoding.
pub(crate) fn decode_image_from_memory_with_fallback(bytes: &[u8]) -> Option<DynamicImage> {
    image::load_from_memory(bytes)
        .ok()
        .or_else(|| decode_jpeg_non_strict(bytes))
}

pub(crate) fn fit_to_max_edge(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (1, 1);
    }
    let clamped = max_edge.max(1);
    if width.max(height) <= clamped {
        return (width, height);
    }
    if width >= height {
        let scaled_height =
            ((u64::from(height) * u64::from(clamped)) + (u64::from(width) / 2)) / u64::from(width);
        (clamped, scaled_height.max(1) as u32)
    } else {
        let scaled_width =
            ((u64::from(width) * u64::from(clamped)) + (u64::from(height) / 2)) / u64::from(height);
        (scaled_width.max(1) as u32, clamped)
    }
}

/// Shrinks embedded artwork to a list thumbnail before it is cached.
///
/// Art already within `max_edge_px` is kept byte-for-byte. Larger art is
/// re-encoded as PNG. Bytes that do not decode as an image yield `None`.
pub fn prepare_list_art(bytes: &[u8], max_edge_px: u32) -> Option<Vec<u8>> {
    let Some(decoded) = decode_image_from_memory_with_fallback(bytes) else {
        debug!("Discarding undecodable album art bytes={}", bytes.len());
        return None;
    };
    let (source_width, source_height) = decoded.dimensions();
    let (target_width, target_height) = fit_to_max_edge(source_width, source_height, max_edge_px);
    if target_width == source_width && target_height == source_height {
        return Some(bytes.to_vec());
    }

    let resized = decoded.resize(target_width, target_height, FilterType::Lanczos3);
    let mut cursor = Cursor::new(Vec::new());
    match resized.write_to(&mut cursor, ImageFormat::Png) {
        Ok(()) => Some(cursor.into_inner()),
        Err(err) => {
            debug!("Failed to encode list album art: {}", err);
            None
        }
    }
}
