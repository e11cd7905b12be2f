//! End-to-end conversion tests through the public dispatcher.

use image::{DynamicImage, Rgba, RgbaImage};
use lopdf::{Document, Object};
use std::io::Cursor;
use webconvert::settings::PageSize;
use webconvert::{
    BackgroundRemover, Content, ConvertError, Converter, HeicBridge, OptimizerSettings,
    SourceFile, TOOL_BG_REMOVER, TOOL_COMPRESSOR, TOOL_OPTIMIZER,
};

fn gradient(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| {
        Rgba([
            (x * 255 / w.max(1)) as u8,
            (y * 255 / h.max(1)) as u8,
            128,
            255,
        ])
    })
}

fn encode_as(img: &RgbaImage, format: image::ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img.clone())
        .write_to(&mut out, format)
        .unwrap();
    out.into_inner()
}

fn png_file(name: &str, w: u32, h: u32) -> SourceFile {
    SourceFile::new(name, encode_as(&gradient(w, h), image::ImageFormat::Png))
}

#[test]
fn png_to_webp_produces_riff_container() {
    let file = png_file("img.png", 32, 24);
    let result = Converter::new()
        .convert(&file, "png-webp", &OptimizerSettings::default())
        .unwrap();
    assert_eq!(result.extension, "webp");
    let bytes = result.content.into_bytes();
    assert_eq!(&bytes[0..4], b"RIFF");
    assert_eq!(&bytes[8..12], b"WEBP");
}

#[test]
fn resize_factor_shrinks_output_dimensions() {
    let file = png_file("img.png", 100, 60);
    let mut settings = OptimizerSettings::default();
    settings.raster.resize = 0.5;
    let result = Converter::new().convert(&file, "png-png", &settings).unwrap();
    let back = image::load_from_memory(&result.content.into_bytes()).unwrap();
    assert_eq!((back.width(), back.height()), (50, 30));
}

#[test]
fn compressor_never_enlarges_same_format_input() {
    // A tiny flat PNG is already near-minimal; the adaptive search must
    // fall back to the original bytes rather than grow the file.
    let file = png_file("small.png", 4, 4);
    let in_len = file.bytes.len();
    let result = Converter::new()
        .convert(&file, TOOL_COMPRESSOR, &OptimizerSettings::default())
        .unwrap();
    assert_eq!(result.extension, "png");
    assert!(result.content.len() <= in_len);
}

#[test]
fn compressor_remaps_bmp_to_jpeg() {
    let bytes = encode_as(&gradient(16, 16), image::ImageFormat::Bmp);
    let file = SourceFile::new("pic.bmp", bytes);
    let result = Converter::new()
        .convert(&file, TOOL_COMPRESSOR, &OptimizerSettings::default())
        .unwrap();
    assert_eq!(result.extension, "jpg");
    let bytes = result.content.into_bytes();
    // JPEG SOI marker.
    assert_eq!(&bytes[0..2], [0xFF, 0xD8]);
}

#[test]
fn compressor_remaps_gif_to_png() {
    let bytes = encode_as(&gradient(16, 16), image::ImageFormat::Gif);
    let file = SourceFile::new("anim.gif", bytes);
    let result = Converter::new()
        .convert(&file, TOOL_COMPRESSOR, &OptimizerSettings::default())
        .unwrap();
    assert_eq!(result.extension, "png");
    assert_eq!(&result.content.into_bytes()[0..4], [0x89, b'P', b'N', b'G']);
}

#[test]
fn image_to_pdf_uses_a4_media_box() {
    let file = png_file("photo.png", 400, 300);
    let result = Converter::new()
        .convert(&file, "png-pdf", &OptimizerSettings::default())
        .unwrap();
    assert_eq!(result.extension, "pdf");

    let doc = Document::load_mem(&result.content.into_bytes()).unwrap();
    let pages = doc.get_pages();
    assert_eq!(pages.len(), 1);
    let (_, &page_id) = pages.iter().next().unwrap();
    let page = doc.get_dictionary(page_id).unwrap();
    let Ok(Object::Array(mb)) = page.get(b"MediaBox") else {
        panic!("page has no MediaBox");
    };
    let as_f32 = |o: &Object| match o {
        Object::Integer(n) => *n as f32,
        Object::Real(n) => *n,
        _ => panic!("non-numeric MediaBox entry"),
    };
    let w = as_f32(&mb[2]);
    let h = as_f32(&mb[3]);
    // A4 portrait in points.
    assert!((w - 595.28).abs() < 0.5, "width {w}");
    assert!((h - 841.89).abs() < 0.5, "height {h}");
}

#[test]
fn image_to_pdf_original_page_size_matches_pixels() {
    let file = png_file("photo.png", 800, 600);
    let mut settings = OptimizerSettings::default();
    settings.pdf.page_size = PageSize::Original;
    let result = Converter::new().convert(&file, "png-pdf", &settings).unwrap();

    let doc = Document::load_mem(&result.content.into_bytes()).unwrap();
    let (_, &page_id) = doc.get_pages().iter().next().unwrap();
    let page = doc.get_dictionary(page_id).unwrap();
    let Ok(Object::Array(mb)) = page.get(b"MediaBox") else {
        panic!("page has no MediaBox");
    };
    let as_f32 = |o: &Object| match o {
        Object::Integer(n) => *n as f32,
        Object::Real(n) => *n,
        _ => 0.0,
    };
    // 800 px at 0.75 pt/px.
    assert!((as_f32(&mb[2]) - 600.0).abs() < 0.01);
    assert!((as_f32(&mb[3]) - 450.0).abs() < 0.01);
}

#[test]
fn pdf_round_trips_back_to_png() {
    // Compose a PDF from an image, then rasterize it back out.
    let converter = Converter::new();
    let file = png_file("photo.png", 200, 200);
    let pdf = converter
        .convert(&file, "png-pdf", &OptimizerSettings::default())
        .unwrap();

    let pdf_file = SourceFile::new("photo.pdf", pdf.content.into_bytes());
    let result = converter
        .convert(&pdf_file, "pdf-png", &OptimizerSettings::default())
        .unwrap();
    assert_eq!(result.extension, "png");

    let back = image::load_from_memory(&result.content.into_bytes()).unwrap();
    // Surface is the A4 page at 2x: about 1191x1684.
    assert!((back.width() as i64 - 1191).abs() <= 2, "width {}", back.width());
    assert!((back.height() as i64 - 1684).abs() <= 2, "height {}", back.height());
}

#[test]
fn svg_rasterizes_with_minimum_resolution_floor() {
    let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="50">
        <rect width="100" height="50" fill="#3050c0"/>
    </svg>"##;
    let file = SourceFile::new("icon.svg", svg.as_bytes().to_vec());
    let mut settings = OptimizerSettings::default();
    // The 2400px floor scales with the resize factor, so 0.1 keeps the
    // test surface small.
    settings.raster.resize = 0.1;
    let result = Converter::new().convert(&file, "svg-png", &settings).unwrap();

    let back = image::load_from_memory(&result.content.into_bytes()).unwrap();
    assert_eq!((back.width(), back.height()), (240, 120));
}

#[test]
fn raster_to_svg_embeds_base64_image() {
    let file = png_file("photo.png", 20, 10);
    let result = Converter::new()
        .convert(&file, "png-svg", &OptimizerSettings::default())
        .unwrap();
    assert_eq!(result.extension, "svg");
    let Content::Text(svg) = result.content else {
        panic!("expected text output");
    };
    assert!(svg.contains("width=\"20\""));
    assert!(svg.contains("height=\"10\""));
    assert!(svg.contains("data:image/png;base64,"));
}

#[test]
fn optimizer_emits_text_and_strips_comments() {
    let svg = "<?xml version=\"1.0\"?>\n<svg xmlns=\"http://www.w3.org/2000/svg\">\
               <!-- draft --><rect width=\"1\" height=\"1\"/></svg>";
    let file = SourceFile::new("icon.svg", svg.as_bytes().to_vec());
    let mut settings = OptimizerSettings::default();
    settings.remove_comments = true;
    let result = Converter::new()
        .convert(&file, TOOL_OPTIMIZER, &settings)
        .unwrap();
    assert_eq!(result.extension, "svg");
    let Content::Text(out) = result.content else {
        panic!("expected text output");
    };
    assert!(!out.contains("draft"));
    assert!(!out.contains("<?xml"));
    assert!(out.contains("<rect"));
}

struct FixedRemover(Vec<u8>);

impl BackgroundRemover for FixedRemover {
    fn remove_background(&self, _file: &SourceFile) -> Result<Vec<u8>, String> {
        Ok(self.0.clone())
    }
}

struct FailingRemover;

impl BackgroundRemover for FailingRemover {
    fn remove_background(&self, _file: &SourceFile) -> Result<Vec<u8>, String> {
        Err("model not loaded".to_string())
    }
}

#[test]
fn bg_remover_routes_through_injected_routine() {
    let cutout = encode_as(&gradient(8, 8), image::ImageFormat::Png);
    let converter = Converter::new().with_background_remover(Box::new(FixedRemover(cutout.clone())));
    let file = png_file("portrait.png", 8, 8);
    let result = converter
        .convert(&file, TOOL_BG_REMOVER, &OptimizerSettings::default())
        .unwrap();
    assert_eq!(result.extension, "png");
    assert_eq!(result.content.into_bytes(), cutout);
}

#[test]
fn bg_remover_failure_is_wrapped_with_context() {
    let converter = Converter::new().with_background_remover(Box::new(FailingRemover));
    let file = png_file("portrait.png", 8, 8);
    let err = converter
        .convert(&file, TOOL_BG_REMOVER, &OptimizerSettings::default())
        .unwrap_err();
    match err {
        ConvertError::External { routine, reason } => {
            assert!(routine.contains("background"));
            assert!(reason.contains("model not loaded"));
        }
        other => panic!("expected External, got {other}"),
    }
}

struct JpegBridge;

impl HeicBridge for JpegBridge {
    fn decode(&self, _bytes: &[u8], target_mime: &str, _quality: f32) -> Result<Vec<u8>, String> {
        assert_eq!(target_mime, "image/jpeg");
        Ok(encode_as(&gradient(8, 8), image::ImageFormat::Jpeg))
    }
}

#[test]
fn heic_input_decodes_through_bridge() {
    let converter = Converter::new().with_heic_bridge(Box::new(JpegBridge));
    let file = SourceFile::new("photo.heic", vec![0u8; 64]);
    let result = converter
        .convert(&file, "heic-png", &OptimizerSettings::default())
        .unwrap();
    assert_eq!(result.extension, "png");
    let back = image::load_from_memory(&result.content.into_bytes()).unwrap();
    assert_eq!((back.width(), back.height()), (8, 8));
}

#[test]
fn heic_without_bridge_is_external_error() {
    let file = SourceFile::new("photo.heic", vec![0u8; 64]);
    let err = Converter::new()
        .convert(&file, "heic-png", &OptimizerSettings::default())
        .unwrap_err();
    assert!(matches!(err, ConvertError::External { .. }));
}

#[test]
fn unsupported_pair_names_both_formats() {
    let file = SourceFile::new("track.wav", vec![0u8; 16]);
    let err = Converter::new()
        .convert(&file, "wav-flac", &OptimizerSettings::default())
        .unwrap_err();
    match err {
        ConvertError::Unsupported { input, output } => {
            assert_eq!(input, "wav");
            assert_eq!(output, "flac");
        }
        other => panic!("expected Unsupported, got {other}"),
    }
}

#[test]
fn composed_pdf_survives_disk_round_trip() {
    let file = png_file("photo.png", 64, 64);
    let result = Converter::new()
        .convert(&file, "png-pdf", &OptimizerSettings::default())
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.pdf");
    std::fs::write(&path, result.content.into_bytes()).unwrap();

    let doc = Document::load(&path).unwrap();
    assert_eq!(doc.get_pages().len(), 1);
}
