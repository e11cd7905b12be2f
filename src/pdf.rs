//! PDF composition and rasterization.
//!
//! Composition places one decoded image onto a single page of configurable
//! size/orientation/margin/alignment. Rasterization decodes the first page
//! of a PDF back into a raster surface by replaying its content stream and
//! compositing the image XObjects it places.

use crate::error::ConvertError;
use crate::raster::Decoded;
use crate::settings::{Alignment, Orientation, PageSize, PdfOptions};
use flate2::read::ZlibDecoder;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, RgbImage, Rgba, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::{HashMap, HashSet};
use std::io::Read;

/// Pixel-to-millimeter conversion at the CSS reference density (96 px/in).
pub const PX_TO_MM: f32 = 25.4 / 96.0;
/// Millimeters to PDF points (72 pt/in).
pub const MM_TO_PT: f32 = 72.0 / 25.4;
/// Pixels to PDF points at 96 px/in.
pub const PX_TO_PT: f32 = 72.0 / 96.0;
/// Upscaling applied when rasterizing a page, for output quality.
pub const RASTER_SCALE: f32 = 2.0;

/// Page dimensions in millimeters, portrait.
fn page_size_mm(size: PageSize) -> (f32, f32) {
    match size {
        PageSize::A4 => (210.0, 297.0),
        PageSize::Letter => (215.9, 279.4),
        // Resolved by the caller; `Original` pages use pixel units.
        PageSize::Original => (0.0, 0.0),
    }
}

/// Placement of the image on the page, all in PDF points with a bottom-left
/// origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    pub page_w: f32,
    pub page_h: f32,
    pub draw_w: f32,
    pub draw_h: f32,
    pub x: f32,
    pub y: f32,
}

/// Compute the page geometry for an image of `img_w` x `img_h` pixels.
pub fn layout_page(img_w: u32, img_h: u32, opts: &PdfOptions) -> PageLayout {
    if opts.page_size == PageSize::Original {
        // Page exactly equals the image, pixel units, no margin.
        let w = img_w as f32 * PX_TO_PT;
        let h = img_h as f32 * PX_TO_PT;
        return PageLayout {
            page_w: w,
            page_h: h,
            draw_w: w,
            draw_h: h,
            x: 0.0,
            y: 0.0,
        };
    }

    let (mut pw_mm, mut ph_mm) = page_size_mm(opts.page_size);
    if opts.orientation == Orientation::Landscape {
        std::mem::swap(&mut pw_mm, &mut ph_mm);
    }
    let margin_mm = opts.margin.millimeters();

    let img_w_mm = img_w as f32 * PX_TO_MM;
    let img_h_mm = img_h as f32 * PX_TO_MM;
    let avail_w = pw_mm - 2.0 * margin_mm;
    let avail_h = ph_mm - 2.0 * margin_mm;

    let fit = (avail_w / img_w_mm).min(avail_h / img_h_mm);
    // Scale down to fit always; scale up only when fit_to_page asks for it.
    let scale = if opts.fit_to_page { fit } else { fit.min(1.0) };

    let draw_w_mm = img_w_mm * scale;
    let draw_h_mm = img_h_mm * scale;

    let (x_mm, y_top_mm) = match opts.alignment {
        Alignment::Center => (
            margin_mm + (avail_w - draw_w_mm) / 2.0,
            margin_mm + (avail_h - draw_h_mm) / 2.0,
        ),
        Alignment::TopLeft => (margin_mm, margin_mm),
    };

    PageLayout {
        page_w: pw_mm * MM_TO_PT,
        page_h: ph_mm * MM_TO_PT,
        draw_w: draw_w_mm * MM_TO_PT,
        draw_h: draw_h_mm * MM_TO_PT,
        x: x_mm * MM_TO_PT,
        // PDF origin is bottom-left; y_top is measured from the top edge.
        y: (ph_mm - y_top_mm - draw_h_mm) * MM_TO_PT,
    }
}

/// Compose a single-page PDF containing the decoded image.
pub fn compose(decoded: &Decoded, opts: &PdfOptions, quality: f32) -> Result<Vec<u8>, ConvertError> {
    let (img_w, img_h) = decoded.dimensions();
    let surface = decoded.to_rgba(img_w, img_h)?;
    let layout = layout_page(img_w, img_h, opts);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let (image_stream, smask_stream) = encode_image_xobject(&surface, quality)?;
    let mut image_stream = image_stream;
    if let Some(smask) = smask_stream {
        let smask_id = doc.add_object(Object::Stream(smask));
        image_stream.dict.set("SMask", Object::Reference(smask_id));
    }
    let image_id = doc.add_object(Object::Stream(image_stream));

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    layout.draw_w.into(),
                    0f32.into(),
                    0f32.into(),
                    layout.draw_h.into(),
                    layout.x.into(),
                    layout.y.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_bytes = content
        .encode()
        .map_err(|e| ConvertError::Pdf(e.to_string()))?;
    let content_id = doc.add_object(Object::Stream(Stream::new(
        dictionary! {},
        content_bytes,
    )));

    let resources = dictionary! {
        "XObject" => dictionary! { "Im0" => Object::Reference(image_id) },
    };
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => Object::Reference(pages_id),
        "MediaBox" => vec![0f32.into(), 0f32.into(), layout.page_w.into(), layout.page_h.into()],
        "Contents" => Object::Reference(content_id),
        "Resources" => resources,
    });

    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![Object::Reference(page_id)],
        "Count" => 1,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| ConvertError::Pdf(e.to_string()))?;
    Ok(out)
}

/// Encode a surface as an image XObject. Opaque surfaces become a DCTDecode
/// JPEG stream; surfaces with meaningful alpha become a FlateDecode RGB
/// stream plus a JPEG SMask carrying the alpha channel.
fn encode_image_xobject(
    surface: &RgbaImage,
    quality: f32,
) -> Result<(Stream, Option<Stream>), ConvertError> {
    let (width, height) = surface.dimensions();
    if width > u16::MAX as u32 || height > u16::MAX as u32 {
        return Err(ConvertError::Pdf(format!(
            "{width}x{height} exceeds encodable dimensions"
        )));
    }
    let q = (quality * 100.0).round().clamp(1.0, 100.0) as u8;

    if !has_alpha(surface) {
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        for px in surface.pixels() {
            rgb.extend_from_slice(&px.0[..3]);
        }
        let mut jpeg_bytes = Vec::new();
        let mut encoder = jpeg_encoder::Encoder::new(&mut jpeg_bytes, q);
        encoder.set_sampling_factor(jpeg_encoder::SamplingFactor::R_4_2_0);
        encoder
            .encode(&rgb, width as u16, height as u16, jpeg_encoder::ColorType::Rgb)
            .map_err(|e| ConvertError::Pdf(e.to_string()))?;

        let dict = image_xobject_dict(width, height, "DeviceRGB", "DCTDecode", jpeg_bytes.len());
        return Ok((Stream::new(dict, jpeg_bytes), None));
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    for px in surface.pixels() {
        rgb.extend_from_slice(&px.0[..3]);
        alpha.push(px.0[3]);
    }

    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::best());
    std::io::Write::write_all(&mut encoder, &rgb)
        .map_err(|e| ConvertError::Pdf(e.to_string()))?;
    let compressed = encoder
        .finish()
        .map_err(|e| ConvertError::Pdf(e.to_string()))?;
    let dict = image_xobject_dict(width, height, "DeviceRGB", "FlateDecode", compressed.len());
    let main = Stream::new(dict, compressed);

    let mut smask_bytes = Vec::new();
    let smask_encoder = jpeg_encoder::Encoder::new(&mut smask_bytes, q);
    smask_encoder
        .encode(&alpha, width as u16, height as u16, jpeg_encoder::ColorType::Luma)
        .map_err(|e| ConvertError::Pdf(e.to_string()))?;
    let smask_dict =
        image_xobject_dict(width, height, "DeviceGray", "DCTDecode", smask_bytes.len());

    Ok((main, Some(Stream::new(smask_dict, smask_bytes))))
}

fn image_xobject_dict(
    width: u32,
    height: u32,
    color_space: &str,
    filter: &str,
    length: usize,
) -> Dictionary {
    dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => Object::Name(color_space.as_bytes().to_vec()),
        "BitsPerComponent" => 8,
        "Filter" => Object::Name(filter.as_bytes().to_vec()),
        "Length" => length as i64,
    }
}

/// Check whether a surface has meaningful alpha, sampling for large images.
fn has_alpha(surface: &RgbaImage) -> bool {
    let sample_rate = std::cmp::max(1, surface.pixels().len() / 10000);
    surface.pixels().step_by(sample_rate).any(|p| p.0[3] < 255)
}

// --- rasterization ---------------------------------------------------------

/// 2D transformation matrix [a b c d e f].
#[derive(Debug, Clone, Copy)]
struct Matrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Matrix {
    fn identity() -> Self {
        Matrix {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: 0.0,
            f: 0.0,
        }
    }

    /// Concatenate: self * other.
    fn concat(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    fn scale_x(&self) -> f32 {
        (self.a * self.a + self.b * self.b).sqrt()
    }

    fn scale_y(&self) -> f32 {
        (self.c * self.c + self.d * self.d).sqrt()
    }

    /// Bounding rect of the transformed unit square as (x, y, w, h) in page
    /// space. Exact for axis-aligned placements, a bounding approximation
    /// for rotated ones.
    fn unit_rect(&self) -> (f32, f32, f32, f32) {
        if self.b.abs() < 0.0001 && self.c.abs() < 0.0001 {
            let x0 = self.e;
            let x1 = self.e + self.a;
            let y0 = self.f;
            let y1 = self.f + self.d;
            (x0.min(x1), y0.min(y1), (x1 - x0).abs(), (y1 - y0).abs())
        } else {
            (self.e, self.f, self.scale_x(), self.scale_y())
        }
    }
}

/// Rasterize the first page of a PDF to an RGBA surface at [`RASTER_SCALE`].
pub fn rasterize_first_page(bytes: &[u8]) -> Result<RgbaImage, ConvertError> {
    let doc = Document::load_mem(bytes).map_err(|e| ConvertError::decode("pdf", e))?;
    if doc.is_encrypted() {
        return Err(ConvertError::decode("pdf", "document is encrypted"));
    }

    let pages = doc.get_pages();
    let (_, &page_id) = pages
        .iter()
        .next()
        .ok_or_else(|| ConvertError::decode("pdf", "document has no pages"))?;

    let (page_w, page_h) = page_media_box(&doc, page_id);
    let surf_w = (page_w * RASTER_SCALE).round().max(1.0) as u32;
    let surf_h = (page_h * RASTER_SCALE).round().max(1.0) as u32;
    let mut surface = RgbaImage::from_pixel(surf_w, surf_h, Rgba([255, 255, 255, 255]));

    let content = doc
        .get_page_content(page_id)
        .map_err(|e| ConvertError::decode("pdf", e))?;
    let resources = page_resources(&doc, page_id);
    let mut seen_forms = HashSet::new();
    render_content(
        &doc,
        &content,
        &resources,
        Matrix::identity(),
        &mut surface,
        page_h,
        &mut seen_forms,
    );

    Ok(surface)
}

/// Replay one content stream, compositing image XObjects onto the surface
/// and recursing into Form XObjects.
fn render_content(
    doc: &Document,
    content: &[u8],
    resources: &Dictionary,
    initial: Matrix,
    surface: &mut RgbaImage,
    page_h: f32,
    seen_forms: &mut HashSet<ObjectId>,
) {
    let Ok(content) = Content::decode(content) else {
        return;
    };
    let xobjects = xobject_map(doc, resources);
    let mut stack: Vec<Matrix> = vec![initial];

    for op in &content.operations {
        match op.operator.as_str() {
            "q" => {
                if let Some(top) = stack.last().copied() {
                    stack.push(top);
                }
            }
            "Q" => {
                if stack.len() > 1 {
                    stack.pop();
                }
            }
            "cm" => {
                if op.operands.len() >= 6 {
                    let nums: Vec<f32> = op.operands.iter().map(object_to_f32).collect();
                    let m = Matrix {
                        a: nums[0],
                        b: nums[1],
                        c: nums[2],
                        d: nums[3],
                        e: nums[4],
                        f: nums[5],
                    };
                    if let Some(top) = stack.last_mut() {
                        *top = m.concat(top);
                    }
                }
            }
            "Do" => {
                let Some(Object::Name(name)) = op.operands.first() else {
                    continue;
                };
                let name = String::from_utf8_lossy(name).into_owned();
                let Some(&obj_id) = xobjects.get(&name) else {
                    continue;
                };
                let Ok(Object::Stream(stream)) = doc.get_object(obj_id) else {
                    continue;
                };
                let ctm = stack.last().copied().unwrap_or_else(Matrix::identity);

                match dict_name(&stream.dict, b"Subtype").as_deref() {
                    Some("Image") => {
                        if let Ok(img) = decode_xobject_image(doc, stream) {
                            composite_image(surface, &img, &ctm, page_h);
                        }
                    }
                    Some("Form") => {
                        if seen_forms.insert(obj_id) {
                            let form_matrix = matrix_from_dict(&stream.dict);
                            let combined = form_matrix.concat(&ctm);
                            let form_resources = match stream.dict.get(b"Resources") {
                                Ok(res) => resolve_dict(doc, res),
                                Err(_) => Dictionary::new(),
                            };
                            let data = decompress_stream(stream);
                            render_content(
                                doc,
                                &data,
                                &form_resources,
                                combined,
                                surface,
                                page_h,
                                seen_forms,
                            );
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }
}

/// Draw a decoded image into the surface at the CTM's unit-square rect,
/// flipping from PDF's bottom-left origin to the surface's top-left.
fn composite_image(surface: &mut RgbaImage, img: &DynamicImage, ctm: &Matrix, page_h: f32) {
    let (x, y, w, h) = ctm.unit_rect();
    if w <= 0.0 || h <= 0.0 {
        return;
    }
    let dst_w = (w * RASTER_SCALE).round().max(1.0) as u32;
    let dst_h = (h * RASTER_SCALE).round().max(1.0) as u32;
    let dst_x = (x * RASTER_SCALE).round() as i64;
    let dst_y = ((page_h - y - h) * RASTER_SCALE).round() as i64;

    let scaled = img
        .resize_exact(dst_w, dst_h, FilterType::Lanczos3)
        .to_rgba8();
    image::imageops::overlay(surface, &scaled, dst_x, dst_y);
}

/// MediaBox width/height in points, walking up to the page tree when the
/// page inherits it. Defaults to US Letter at 72 dpi.
fn page_media_box(doc: &Document, page_id: ObjectId) -> (f32, f32) {
    let mut current = page_id;
    for _ in 0..8 {
        let Ok(Object::Dictionary(dict)) = doc.get_object(current) else {
            break;
        };
        if let Ok(mb) = dict.get(b"MediaBox") {
            let mb = match mb {
                Object::Reference(id) => doc.get_object(*id).ok(),
                other => Some(other),
            };
            if let Some(Object::Array(arr)) = mb {
                if arr.len() >= 4 {
                    let nums: Vec<f32> = arr.iter().map(object_to_f32).collect();
                    let w = (nums[2] - nums[0]).abs();
                    let h = (nums[3] - nums[1]).abs();
                    if w > 0.0 && h > 0.0 {
                        return (w, h);
                    }
                }
            }
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(parent)) => current = *parent,
            _ => break,
        }
    }
    (612.0, 792.0)
}

/// Page resources, checking the parent tree for inherited resources.
fn page_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut current = page_id;
    for _ in 0..8 {
        let Ok(Object::Dictionary(dict)) = doc.get_object(current) else {
            break;
        };
        if let Ok(res) = dict.get(b"Resources") {
            return resolve_dict(doc, res);
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(parent)) => current = *parent,
            _ => break,
        }
    }
    Dictionary::new()
}

fn resolve_dict(doc: &Document, obj: &Object) -> Dictionary {
    match obj {
        Object::Dictionary(d) => d.clone(),
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Dictionary(d)) => d.clone(),
            _ => Dictionary::new(),
        },
        _ => Dictionary::new(),
    }
}

fn xobject_map(doc: &Document, resources: &Dictionary) -> HashMap<String, ObjectId> {
    let mut result = HashMap::new();
    if let Ok(xobjects) = resources.get(b"XObject") {
        let xobj_dict = resolve_dict(doc, xobjects);
        for (name, value) in xobj_dict.iter() {
            if let Object::Reference(obj_id) = value {
                result.insert(String::from_utf8_lossy(name).into_owned(), *obj_id);
            }
        }
    }
    result
}

fn dict_name(dict: &Dictionary, key: &[u8]) -> Option<String> {
    match dict.get(key) {
        Ok(Object::Name(n)) => Some(String::from_utf8_lossy(n).into_owned()),
        _ => None,
    }
}

fn dict_u32(dict: &Dictionary, key: &[u8]) -> u32 {
    match dict.get(key) {
        Ok(Object::Integer(n)) => *n as u32,
        _ => 0,
    }
}

fn object_to_f32(obj: &Object) -> f32 {
    match obj {
        Object::Integer(n) => *n as f32,
        Object::Real(n) => *n,
        _ => 0.0,
    }
}

fn matrix_from_dict(dict: &Dictionary) -> Matrix {
    if let Ok(Object::Array(arr)) = dict.get(b"Matrix") {
        if arr.len() >= 6 {
            let nums: Vec<f32> = arr.iter().map(object_to_f32).collect();
            return Matrix {
                a: nums[0],
                b: nums[1],
                c: nums[2],
                d: nums[3],
                e: nums[4],
                f: nums[5],
            };
        }
    }
    Matrix::identity()
}

fn stream_filters(stream: &Stream) -> Vec<String> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(n)) => vec![String::from_utf8_lossy(n).into_owned()],
        Ok(Object::Array(arr)) => arr
            .iter()
            .filter_map(|f| match f {
                Object::Name(n) => Some(String::from_utf8_lossy(n).into_owned()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Decompress a stream's content; unknown filters return the bytes as-is.
fn decompress_stream(stream: &Stream) -> Vec<u8> {
    let mut data = stream.content.clone();
    for filter in stream_filters(stream) {
        if filter == "FlateDecode" {
            let mut decoder = ZlibDecoder::new(&data[..]);
            let mut decoded = Vec::new();
            if decoder.read_to_end(&mut decoded).is_ok() {
                data = decoded;
            } else {
                return stream.content.clone();
            }
        } else {
            return data;
        }
    }
    data
}

/// Decode an image XObject stream into a bitmap, applying its SMask alpha
/// when present.
fn decode_xobject_image(doc: &Document, stream: &Stream) -> Result<DynamicImage, ConvertError> {
    let width = dict_u32(&stream.dict, b"Width");
    let height = dict_u32(&stream.dict, b"Height");
    if width == 0 || height == 0 {
        return Err(ConvertError::decode("pdf image", "invalid dimensions"));
    }

    let filters = stream_filters(stream);
    let img = match filters.first().map(String::as_str) {
        Some("DCTDecode") => image::load_from_memory_with_format(
            &stream.content,
            image::ImageFormat::Jpeg,
        )
        .map_err(|e| ConvertError::decode("pdf image", e))?,
        Some("JPXDecode") => image::load_from_memory(&stream.content)
            .map_err(|e| ConvertError::decode("pdf image", e))?,
        Some("FlateDecode") | None => {
            let data = decompress_stream(stream);
            raw_pixels_to_image(&data, width, height, &stream.dict, doc)?
        }
        Some(other) => {
            return Err(ConvertError::decode(
                "pdf image",
                format!("unsupported filter {other}"),
            ));
        }
    };

    // Apply SMask alpha when the image carries one.
    if let Ok(Object::Reference(smask_id)) = stream.dict.get(b"SMask") {
        if let Ok(Object::Stream(smask)) = doc.get_object(*smask_id) {
            if let Some(alpha) = decode_smask(smask, width, height) {
                let rgb = img.to_rgb8();
                let mut rgba = Vec::with_capacity((width * height * 4) as usize);
                for (px, a) in rgb.pixels().zip(alpha.iter()) {
                    rgba.extend_from_slice(&[px[0], px[1], px[2], *a]);
                }
                if let Some(rgba_img) = RgbaImage::from_raw(width, height, rgba) {
                    return Ok(DynamicImage::ImageRgba8(rgba_img));
                }
            }
        }
    }
    Ok(img)
}

fn decode_smask(stream: &Stream, width: u32, height: u32) -> Option<Vec<u8>> {
    let filters = stream_filters(stream);
    let data = match filters.first().map(String::as_str) {
        Some("DCTDecode") => image::load_from_memory_with_format(
            &stream.content,
            image::ImageFormat::Jpeg,
        )
        .ok()?
        .to_luma8()
        .into_raw(),
        Some("FlateDecode") | None => decompress_stream(stream),
        _ => return None,
    };
    let expected = (width * height) as usize;
    (data.len() >= expected).then(|| data[..expected].to_vec())
}

/// Interpret raw pixel data according to the stream's color space.
fn raw_pixels_to_image(
    data: &[u8],
    width: u32,
    height: u32,
    dict: &Dictionary,
    doc: &Document,
) -> Result<DynamicImage, ConvertError> {
    let color_space = color_space_name(dict, doc).unwrap_or_else(|| "DeviceRGB".to_string());
    let pixels = (width * height) as usize;

    match color_space.as_str() {
        "DeviceRGB" | "RGB" | "ICCBased" if data.len() >= pixels * 3 => {
            RgbImage::from_raw(width, height, data[..pixels * 3].to_vec())
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| ConvertError::decode("pdf image", "bad RGB payload"))
        }
        "DeviceGray" | "Gray" | "ICCBased" if data.len() >= pixels => {
            GrayImage::from_raw(width, height, data[..pixels].to_vec())
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| ConvertError::decode("pdf image", "bad grayscale payload"))
        }
        "DeviceCMYK" | "CMYK" if data.len() >= pixels * 4 => {
            let mut rgb = Vec::with_capacity(pixels * 3);
            for chunk in data[..pixels * 4].chunks(4) {
                let c = chunk[0] as f32 / 255.0;
                let m = chunk[1] as f32 / 255.0;
                let y = chunk[2] as f32 / 255.0;
                let k = chunk[3] as f32 / 255.0;
                rgb.push(((1.0 - c) * (1.0 - k) * 255.0) as u8);
                rgb.push(((1.0 - m) * (1.0 - k) * 255.0) as u8);
                rgb.push(((1.0 - y) * (1.0 - k) * 255.0) as u8);
            }
            RgbImage::from_raw(width, height, rgb)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| ConvertError::decode("pdf image", "bad CMYK payload"))
        }
        other => Err(ConvertError::decode(
            "pdf image",
            format!("unsupported color space {other} ({} bytes)", data.len()),
        )),
    }
}

fn color_space_name(dict: &Dictionary, doc: &Document) -> Option<String> {
    fn resolve(obj: &Object, doc: &Document) -> Option<String> {
        match obj {
            Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
            Object::Array(arr) => arr.first().and_then(|o| resolve(o, doc)),
            Object::Reference(id) => doc.get_object(*id).ok().and_then(|o| resolve(o, doc)),
            _ => None,
        }
    }
    dict.get(b"ColorSpace").ok().and_then(|cs| resolve(cs, doc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Margin;

    fn opts() -> PdfOptions {
        PdfOptions::default()
    }

    #[test]
    fn a4_portrait_fit_keeps_image_inside_content_area() {
        // 4000x3000 px on A4 portrait with small margins.
        let layout = layout_page(4000, 3000, &opts());
        let content_w = (210.0 - 2.0 * 10.0) * MM_TO_PT;
        assert!(layout.draw_w <= content_w + 0.01);
        assert!(layout.draw_w > 0.0);
        // Image is wider than tall, so width is the binding constraint.
        assert!((layout.draw_w - content_w).abs() < 0.01);
    }

    #[test]
    fn landscape_swaps_page_dimensions() {
        let mut o = opts();
        o.orientation = Orientation::Landscape;
        let layout = layout_page(100, 100, &o);
        assert!((layout.page_w - 297.0 * MM_TO_PT).abs() < 0.01);
        assert!((layout.page_h - 210.0 * MM_TO_PT).abs() < 0.01);
    }

    #[test]
    fn small_image_is_not_upscaled_without_fit() {
        let mut o = opts();
        o.fit_to_page = false;
        // 100x100 px is about 26.5mm, well inside A4.
        let layout = layout_page(100, 100, &o);
        let natural = 100.0 * PX_TO_MM * MM_TO_PT;
        assert!((layout.draw_w - natural).abs() < 0.01);
    }

    #[test]
    fn fit_to_page_upscales_small_images() {
        let layout = layout_page(100, 100, &opts());
        let natural = 100.0 * PX_TO_MM * MM_TO_PT;
        assert!(layout.draw_w > natural);
    }

    #[test]
    fn top_left_alignment_anchors_at_margin() {
        let mut o = opts();
        o.alignment = Alignment::TopLeft;
        o.fit_to_page = false;
        let layout = layout_page(100, 100, &o);
        let margin_pt = Margin::Small.millimeters() * MM_TO_PT;
        assert!((layout.x - margin_pt).abs() < 0.01);
        // Top-left in page space is high y in PDF space.
        assert!(
            (layout.y - (layout.page_h - margin_pt - layout.draw_h)).abs() < 0.01
        );
    }

    #[test]
    fn original_page_size_matches_image() {
        let mut o = opts();
        o.page_size = PageSize::Original;
        let layout = layout_page(800, 600, &o);
        assert!((layout.page_w - 800.0 * PX_TO_PT).abs() < 0.01);
        assert!((layout.page_h - 600.0 * PX_TO_PT).abs() < 0.01);
        assert_eq!(layout.x, 0.0);
        assert_eq!(layout.y, 0.0);
        assert_eq!(layout.draw_w, layout.page_w);
    }

    #[test]
    fn centered_layout_is_symmetric() {
        let layout = layout_page(1000, 1000, &opts());
        let left = layout.x;
        let right = layout.page_w - layout.x - layout.draw_w;
        assert!((left - right).abs() < 0.01);
    }

    #[test]
    fn matrix_concat_and_unit_rect() {
        let scale = Matrix {
            a: 100.0,
            b: 0.0,
            c: 0.0,
            d: 50.0,
            e: 10.0,
            f: 20.0,
        };
        let (x, y, w, h) = scale.unit_rect();
        assert_eq!((x, y, w, h), (10.0, 20.0, 100.0, 50.0));

        let id = Matrix::identity();
        let combined = scale.concat(&id);
        assert_eq!(combined.unit_rect(), scale.unit_rect());
    }

    #[test]
    fn flipped_unit_rect_normalizes() {
        // Negative d places the rect below f; the rect is normalized.
        let m = Matrix {
            a: 100.0,
            b: 0.0,
            c: 0.0,
            d: -50.0,
            e: 0.0,
            f: 50.0,
        };
        let (x, y, w, h) = m.unit_rect();
        assert_eq!((x, y, w, h), (0.0, 0.0, 100.0, 50.0));
    }

    #[test]
    fn oversized_surface_is_rejected_before_encoding() {
        // Wider than the JPEG encoder's u16 dimension limit.
        let surface = RgbaImage::from_pixel(70_000, 1, Rgba([0, 0, 0, 255]));
        let err = encode_image_xobject(&surface, 0.8).unwrap_err();
        assert!(matches!(err, ConvertError::Pdf(_)));
    }

    #[test]
    fn rejects_pdfs_without_pages() {
        let err = rasterize_first_page(b"not a pdf").unwrap_err();
        assert!(matches!(err, ConvertError::Decode { .. }));
    }
}
