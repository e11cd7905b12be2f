//! Raster decode/encode.
//!
//! Loads an image file (raster via the `image` crate, vector via `resvg`)
//! into a decoded source and re-encodes it to a target format at a given
//! quality, scale and color mode. Pure per-call: no state survives a
//! conversion.

use crate::error::ConvertError;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use resvg::{tiny_skia, usvg};
use std::io::Cursor;

/// Minimum working resolution when rasterizing a vector source at scale 1.
/// Scaled proportionally with the resize factor so that `resize` still
/// shrinks the output.
pub const VECTOR_MIN_DIMENSION: f32 = 2400.0;

/// Extensions the raster encoder can write.
pub const WRITABLE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "webp", "bmp", "gif"];

pub fn is_writable_raster(ext: &str) -> bool {
    WRITABLE_EXTENSIONS.contains(&ext)
}

/// Extensions the decoder accepts without an external bridge.
pub fn is_decodable(ext: &str) -> bool {
    matches!(
        ext,
        "jpg" | "jpeg" | "png" | "webp" | "bmp" | "gif" | "svg"
    )
}

pub fn is_heic(ext: &str) -> bool {
    matches!(ext, "heic" | "heif")
}

/// Two extensions name the same raster format (jpg/jpeg aliasing).
pub fn same_format(a: &str, b: &str) -> bool {
    let jpeg = |e: &str| e == "jpg" || e == "jpeg";
    a == b || (jpeg(a) && jpeg(b))
}

/// Target extension for the `image-compressor` tool.
///
/// HEIC/HEIF and BMP re-encode as JPEG, GIF as PNG (animation is not
/// preserved, so PNG keeps transparency at least). Web-writable formats
/// compress in place; anything else falls back to JPEG.
pub fn compressor_target_ext(input_ext: &str) -> &'static str {
    match input_ext {
        "heic" | "heif" | "bmp" => "jpg",
        "gif" => "png",
        "jpg" => "jpg",
        "jpeg" => "jpeg",
        "png" => "png",
        "webp" => "webp",
        _ => "jpg",
    }
}

pub fn mime_for_ext(ext: &str) -> &'static str {
    match ext {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Formats without alpha support need a background fill so transparent
/// source pixels do not render as black.
pub fn background_for(ext: &str) -> Option<[u8; 3]> {
    match ext {
        "jpg" | "jpeg" | "bmp" => Some([255, 255, 255]),
        _ => None,
    }
}

/// A decoded source: either a raster bitmap or a parsed vector tree.
pub enum Decoded {
    Raster(DynamicImage),
    Vector(usvg::Tree),
}

impl Decoded {
    /// Decode source bytes according to the declared extension.
    pub fn load(bytes: &[u8], ext: &str) -> Result<Decoded, ConvertError> {
        if ext == "svg" {
            let opt = usvg::Options::default();
            let tree = usvg::Tree::from_data(bytes, &opt)
                .map_err(|e| ConvertError::decode("svg", e))?;
            Ok(Decoded::Vector(tree))
        } else {
            let img = image::load_from_memory(bytes)
                .map_err(|e| ConvertError::decode(ext, e))?;
            Ok(Decoded::Raster(img))
        }
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, Decoded::Vector(_))
    }

    /// Natural pixel dimensions of the source.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Decoded::Raster(img) => (img.width(), img.height()),
            Decoded::Vector(tree) => {
                let size = tree.size();
                (
                    size.width().round().max(1.0) as u32,
                    size.height().round().max(1.0) as u32,
                )
            }
        }
    }

    /// Render the source to an RGBA surface of exactly `out_w` x `out_h`.
    ///
    /// Vector sources render directly at the target size; raster sources
    /// resample with Lanczos3.
    pub fn to_rgba(&self, out_w: u32, out_h: u32) -> Result<RgbaImage, ConvertError> {
        match self {
            Decoded::Raster(img) => {
                let scaled = if (img.width(), img.height()) == (out_w, out_h) {
                    img.clone()
                } else {
                    img.resize_exact(out_w, out_h, FilterType::Lanczos3)
                };
                Ok(scaled.to_rgba8())
            }
            Decoded::Vector(tree) => {
                let size = tree.size();
                let mut pixmap = tiny_skia::Pixmap::new(out_w, out_h).ok_or_else(|| {
                    ConvertError::decode("svg", format!("cannot allocate {out_w}x{out_h} surface"))
                })?;
                let transform = tiny_skia::Transform::from_scale(
                    out_w as f32 / size.width(),
                    out_h as f32 / size.height(),
                );
                resvg::render(tree, transform, &mut pixmap.as_mut());
                RgbaImage::from_raw(out_w, out_h, pixmap.take())
                    .ok_or_else(|| ConvertError::decode("svg", "rendered surface size mismatch"))
            }
        }
    }
}

/// Output pixel dimensions for a source at the given scale factor, applying
/// the minimum-resolution floor for vector sources.
pub fn output_dimensions(src_w: u32, src_h: u32, scale: f32, is_vector: bool) -> (u32, u32) {
    let mut w = (src_w as f32 * scale).round().max(1.0);
    let mut h = (src_h as f32 * scale).round().max(1.0);
    if is_vector {
        let floor = VECTOR_MIN_DIMENSION * scale;
        let largest = w.max(h);
        if largest < floor && largest > 0.0 {
            let factor = floor / largest;
            w = (w * factor).round();
            h = (h * factor).round();
        }
    }
    (w as u32, h as u32)
}

/// Re-encode a decoded source to `ext` at the given quality/scale/color mode.
pub fn encode(
    decoded: &Decoded,
    ext: &str,
    quality: f32,
    scale: f32,
    grayscale: bool,
    background: Option<[u8; 3]>,
) -> Result<Vec<u8>, ConvertError> {
    let (src_w, src_h) = decoded.dimensions();
    let (out_w, out_h) = output_dimensions(src_w, src_h, scale, decoded.is_vector());
    let mut surface = decoded.to_rgba(out_w, out_h)?;

    if let Some(bg) = background {
        flatten_onto(&mut surface, bg);
    }
    if grayscale {
        desaturate(&mut surface);
    }

    encode_surface(&surface, ext, quality)
}

/// Encode an RGBA surface to the target format. The quality factor is
/// ignored by lossless encoders (PNG, BMP, and WebP under the `image`
/// crate's lossless encoder) but harmless to pass.
pub fn encode_surface(surface: &RgbaImage, ext: &str, quality: f32) -> Result<Vec<u8>, ConvertError> {
    match ext {
        "jpg" | "jpeg" => encode_jpeg(surface, quality),
        "png" | "webp" | "bmp" | "gif" => {
            let format = match ext {
                "png" => ImageFormat::Png,
                "webp" => ImageFormat::WebP,
                "bmp" => ImageFormat::Bmp,
                _ => ImageFormat::Gif,
            };
            let mut out = Cursor::new(Vec::new());
            DynamicImage::ImageRgba8(surface.clone())
                .write_to(&mut out, format)
                .map_err(|e| ConvertError::decode(ext, e))?;
            Ok(out.into_inner())
        }
        other => Err(ConvertError::unsupported("raster surface", other)),
    }
}

fn encode_jpeg(surface: &RgbaImage, quality: f32) -> Result<Vec<u8>, ConvertError> {
    let (width, height) = surface.dimensions();
    if width > u16::MAX as u32 || height > u16::MAX as u32 {
        return Err(ConvertError::decode(
            "jpeg",
            format!("{width}x{height} exceeds encodable dimensions"),
        ));
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for px in surface.pixels() {
        rgb.push(px.0[0]);
        rgb.push(px.0[1]);
        rgb.push(px.0[2]);
    }

    let q = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
    let mut jpeg_bytes = Vec::new();
    let mut encoder = jpeg_encoder::Encoder::new(&mut jpeg_bytes, q);
    encoder.set_sampling_factor(jpeg_encoder::SamplingFactor::R_4_2_0);
    encoder
        .encode(&rgb, width as u16, height as u16, jpeg_encoder::ColorType::Rgb)
        .map_err(|e| ConvertError::decode("jpeg", e))?;
    Ok(jpeg_bytes)
}

/// Alpha-blend every pixel over an opaque background color.
fn flatten_onto(surface: &mut RgbaImage, bg: [u8; 3]) {
    for px in surface.pixels_mut() {
        let a = px.0[3] as u32;
        if a == 255 {
            continue;
        }
        let blend = |c: u8, b: u8| ((c as u32 * a + b as u32 * (255 - a)) / 255) as u8;
        *px = Rgba([
            blend(px.0[0], bg[0]),
            blend(px.0[1], bg[1]),
            blend(px.0[2], bg[2]),
            255,
        ]);
    }
}

/// Full desaturation with the same luminance weights as a CSS
/// `grayscale(100%)` filter. Alpha is preserved.
fn desaturate(surface: &mut RgbaImage) {
    for px in surface.pixels_mut() {
        let l = (0.2126 * px.0[0] as f32 + 0.7152 * px.0[1] as f32 + 0.0722 * px.0[2] as f32)
            .round()
            .clamp(0.0, 255.0) as u8;
        *px = Rgba([l, l, l, px.0[3]]);
    }
}
