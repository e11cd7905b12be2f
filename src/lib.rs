//! Client-side file conversion core.
//!
//! Routes a file through one of several processing strategies based on the
//! tool identifier and the input/output extension pair: adaptive same-format
//! compression, raster re-encoding, SVG text optimization, image-to-PDF
//! composition, and PDF-to-image rasterization. Shared between CLI and WASM
//! targets.
//!
//! The core is a pure request/response transform: it keeps no state between
//! calls, never mutates its inputs, and either returns a complete
//! [`ConversionResult`] or an error.

#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub mod error;
pub mod pdf;
pub mod raster;
pub mod search;
pub mod settings;
pub mod svgo;

pub use error::ConvertError;
pub use settings::OptimizerSettings;

use base64::Engine;
use raster::Decoded;

/// Tool identifier for adaptive same-format compression.
pub const TOOL_COMPRESSOR: &str = "image-compressor";
/// Tool identifier for neural background removal.
pub const TOOL_BG_REMOVER: &str = "bg-remover";
/// Tool identifier for SVG text optimization.
pub const TOOL_OPTIMIZER: &str = "optimizer";

/// An input file: opaque bytes plus the name its format is derived from.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Declared input format: the filename extension, lower-cased.
    pub fn extension(&self) -> String {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default()
    }
}

/// Conversion output payload.
#[derive(Debug, Clone)]
pub enum Content {
    Bytes(Vec<u8>),
    Text(String),
}

impl Content {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Content::Bytes(b) => b,
            Content::Text(t) => t.into_bytes(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Content::Bytes(b) => b.len(),
            Content::Text(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of one conversion: the output payload and its extension.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub content: Content,
    pub extension: String,
}

/// Opaque neural background-removal routine. Produces PNG bytes with alpha.
pub trait BackgroundRemover {
    fn remove_background(&self, file: &SourceFile) -> Result<Vec<u8>, String>;
}

/// Opaque HEIC/HEIF decode bridge.
pub trait HeicBridge {
    fn decode(&self, bytes: &[u8], target_mime: &str, quality: f32) -> Result<Vec<u8>, String>;
}

/// The conversion dispatcher.
///
/// External routines (background removal, HEIC decoding) are injected so
/// they can be mocked; conversions that need an absent routine fail with
/// [`ConvertError::External`].
#[derive(Default)]
pub struct Converter {
    bg_remover: Option<Box<dyn BackgroundRemover>>,
    heic_bridge: Option<Box<dyn HeicBridge>>,
}

impl Converter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_background_remover(mut self, remover: Box<dyn BackgroundRemover>) -> Self {
        self.bg_remover = Some(remover);
        self
    }

    pub fn with_heic_bridge(mut self, bridge: Box<dyn HeicBridge>) -> Self {
        self.heic_bridge = Some(bridge);
        self
    }

    /// Whether a tool/input pair has an implemented strategy, without
    /// touching the file bytes.
    pub fn supported(&self, tool_id: &str, input_ext: &str) -> bool {
        let input_ext = input_ext.to_ascii_lowercase();
        match tool_id {
            TOOL_BG_REMOVER => self.bg_remover.is_some(),
            TOOL_COMPRESSOR => {
                if raster::is_heic(&input_ext) {
                    self.heic_bridge.is_some()
                } else {
                    raster::is_decodable(&input_ext)
                }
            }
            TOOL_OPTIMIZER => input_ext == "svg" || input_ext.is_empty(),
            _ => {
                let Some((_, output_ext)) = tool_id.rsplit_once('-') else {
                    return false;
                };
                if raster::is_heic(&input_ext) {
                    return self.heic_bridge.is_some();
                }
                match output_ext {
                    "pdf" | "svg" => raster::is_decodable(&input_ext),
                    ext if raster::is_writable_raster(ext) => {
                        raster::is_decodable(&input_ext) || input_ext == "pdf"
                    }
                    _ => false,
                }
            }
        }
    }

    /// Convert a file with the given tool and settings snapshot.
    ///
    /// Routing is ordered, first match wins: the three special tools, then
    /// HEIC inputs (via the bridge), PDF output, PDF input, SVG output,
    /// raster output. Anything else is unsupported.
    pub fn convert(
        &self,
        file: &SourceFile,
        tool_id: &str,
        settings: &OptimizerSettings,
    ) -> Result<ConversionResult, ConvertError> {
        validate(settings)?;

        match tool_id {
            TOOL_BG_REMOVER => return self.remove_background(file),
            TOOL_COMPRESSOR => return self.compress(file, settings),
            TOOL_OPTIMIZER => {
                let text = String::from_utf8_lossy(&file.bytes);
                return Ok(ConversionResult {
                    content: Content::Text(svgo::optimize(&text, settings)),
                    extension: "svg".to_string(),
                });
            }
            _ => {}
        }

        let input_ext = file.extension();
        let Some((_, output_ext)) = tool_id.rsplit_once('-') else {
            return Err(ConvertError::unsupported(input_ext, tool_id));
        };
        let output_ext = output_ext.to_ascii_lowercase();

        // HEIC inputs go through the bridge first; the decoded JPEG then
        // follows the normal routes.
        if raster::is_heic(&input_ext) {
            let decoded = self.decode_heic(file, settings.raster.quality)?;
            let bridged = SourceFile::new(replace_ext(&file.name, "jpg"), decoded);
            return self.convert_decodable(&bridged, &output_ext, settings);
        }

        self.convert_decodable(file, &output_ext, settings)
    }

    fn convert_decodable(
        &self,
        file: &SourceFile,
        output_ext: &str,
        settings: &OptimizerSettings,
    ) -> Result<ConversionResult, ConvertError> {
        let input_ext = file.extension();

        // svg -> svg is a text transform, not a re-encode.
        if input_ext == "svg" && output_ext == "svg" {
            let text = String::from_utf8_lossy(&file.bytes);
            return Ok(ConversionResult {
                content: Content::Text(svgo::optimize(&text, settings)),
                extension: "svg".to_string(),
            });
        }

        if output_ext == "pdf" && raster::is_decodable(&input_ext) {
            let decoded = Decoded::load(&file.bytes, &input_ext)?;
            let bytes = pdf::compose(&decoded, &settings.pdf, settings.raster.quality)?;
            return Ok(ConversionResult {
                content: Content::Bytes(bytes),
                extension: "pdf".to_string(),
            });
        }

        if input_ext == "pdf" && matches!(output_ext, "jpg" | "jpeg" | "png" | "webp") {
            let surface = pdf::rasterize_first_page(&file.bytes)?;
            let decoded = Decoded::Raster(image::DynamicImage::ImageRgba8(surface));
            let bytes = raster::encode(
                &decoded,
                output_ext,
                settings.raster.quality,
                settings.raster.resize,
                settings.raster.grayscale,
                raster::background_for(output_ext),
            )?;
            return Ok(ConversionResult {
                content: Content::Bytes(bytes),
                extension: output_ext.to_string(),
            });
        }

        if output_ext == "svg" && raster::is_decodable(&input_ext) {
            return embed_as_svg(file, &input_ext);
        }

        if raster::is_writable_raster(output_ext) && raster::is_decodable(&input_ext) {
            let decoded = Decoded::load(&file.bytes, &input_ext)?;
            let bytes = raster::encode(
                &decoded,
                output_ext,
                settings.raster.quality,
                settings.raster.resize,
                settings.raster.grayscale,
                raster::background_for(output_ext),
            )?;
            return Ok(ConversionResult {
                content: Content::Bytes(bytes),
                extension: output_ext.to_string(),
            });
        }

        // The source project substituted a passthrough here that relabeled
        // the original bytes. That produces a file whose content does not
        // match its extension, so it is a hard error instead.
        Err(ConvertError::unsupported(input_ext, output_ext))
    }

    fn remove_background(&self, file: &SourceFile) -> Result<ConversionResult, ConvertError> {
        let remover = self
            .bg_remover
            .as_ref()
            .ok_or_else(|| ConvertError::external("background removal", "no routine configured"))?;
        let bytes = remover
            .remove_background(file)
            .map_err(|e| ConvertError::external("background removal", e))?;
        Ok(ConversionResult {
            content: Content::Bytes(bytes),
            extension: "png".to_string(),
        })
    }

    fn decode_heic(&self, file: &SourceFile, quality: f32) -> Result<Vec<u8>, ConvertError> {
        let bridge = self
            .heic_bridge
            .as_ref()
            .ok_or_else(|| ConvertError::external("HEIC bridge", "no decoder configured"))?;
        bridge
            .decode(&file.bytes, "image/jpeg", quality)
            .map_err(|e| ConvertError::external("HEIC bridge", e))
    }

    /// Same-format compression with the adaptive search and the
    /// never-larger guarantee.
    fn compress(
        &self,
        file: &SourceFile,
        settings: &OptimizerSettings,
    ) -> Result<ConversionResult, ConvertError> {
        let input_ext = file.extension();
        let target_ext = raster::compressor_target_ext(&input_ext);

        // HEIC decodes through the bridge first; heic -> jpg is a format
        // swap so the search accepts a single pass.
        let working;
        let (bytes, ext): (&[u8], &str) = if raster::is_heic(&input_ext) {
            working = self.decode_heic(file, settings.raster.quality)?;
            (&working, "jpg")
        } else {
            (&file.bytes, input_ext.as_str())
        };

        let decoded = Decoded::load(bytes, ext)?;
        let same_format = raster::same_format(&input_ext, target_ext);
        let background = raster::background_for(target_ext);
        let grayscale = settings.raster.grayscale;

        let outcome = search::compress_adaptive(
            &file.bytes,
            same_format,
            settings.raster.quality,
            settings.raster.resize,
            |quality, scale| {
                raster::encode(&decoded, target_ext, quality, scale, grayscale, background)
            },
        )?;

        Ok(ConversionResult {
            content: Content::Bytes(outcome.bytes),
            extension: target_ext.to_string(),
        })
    }
}

/// Wrap a raster image as a base64 `<image>` inside an SVG sized to its
/// pixel dimensions (embed-as-image vectorization fallback).
fn embed_as_svg(file: &SourceFile, input_ext: &str) -> Result<ConversionResult, ConvertError> {
    let decoded = Decoded::load(&file.bytes, input_ext)?;
    let (w, h) = decoded.dimensions();
    let mime = raster::mime_for_ext(input_ext);
    let data = base64::engine::general_purpose::STANDARD.encode(&file.bytes);
    let svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" \
         viewBox=\"0 0 {w} {h}\"><image width=\"{w}\" height=\"{h}\" \
         href=\"data:{mime};base64,{data}\"/></svg>"
    );
    Ok(ConversionResult {
        content: Content::Text(svg),
        extension: "svg".to_string(),
    })
}

fn replace_ext(name: &str, ext: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, _)) => format!("{stem}.{ext}"),
        None => format!("{name}.{ext}"),
    }
}

fn validate(settings: &OptimizerSettings) -> Result<(), ConvertError> {
    let q = settings.raster.quality;
    if !(0.1..=1.0).contains(&q) {
        return Err(ConvertError::InvalidSettings(format!(
            "quality {q} outside [0.1, 1.0]"
        )));
    }
    let r = settings.raster.resize;
    if !(r > 0.0 && r <= 1.0) {
        return Err(ConvertError::InvalidSettings(format!(
            "resize {r} outside (0.0, 1.0]"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_lowercased() {
        let f = SourceFile::new("Photo.JPG", vec![]);
        assert_eq!(f.extension(), "jpg");
        let f = SourceFile::new("noext", vec![]);
        assert_eq!(f.extension(), "");
    }

    #[test]
    fn replace_ext_swaps_suffix() {
        assert_eq!(replace_ext("a/b/photo.heic", "jpg"), "a/b/photo.jpg");
        assert_eq!(replace_ext("photo", "jpg"), "photo.jpg");
    }

    #[test]
    fn rejects_out_of_range_settings() {
        let file = SourceFile::new("x.png", vec![]);
        let mut s = OptimizerSettings::default();
        s.raster.quality = 1.5;
        let err = Converter::new().convert(&file, "png-webp", &s).unwrap_err();
        assert!(matches!(err, ConvertError::InvalidSettings(_)));

        let mut s = OptimizerSettings::default();
        s.raster.resize = 0.0;
        let err = Converter::new().convert(&file, "png-webp", &s).unwrap_err();
        assert!(matches!(err, ConvertError::InvalidSettings(_)));
    }

    #[test]
    fn bg_remover_without_routine_is_external_error() {
        let file = SourceFile::new("x.png", vec![1, 2, 3]);
        let err = Converter::new()
            .convert(&file, TOOL_BG_REMOVER, &OptimizerSettings::default())
            .unwrap_err();
        assert!(matches!(err, ConvertError::External { .. }));
    }

    #[test]
    fn unknown_pair_is_unsupported() {
        let file = SourceFile::new("clip.mp4", vec![0; 16]);
        let err = Converter::new()
            .convert(&file, "mp4-mp3", &OptimizerSettings::default())
            .unwrap_err();
        match err {
            ConvertError::Unsupported { input, output } => {
                assert_eq!(input, "mp4");
                assert_eq!(output, "mp3");
            }
            other => panic!("expected Unsupported, got {other}"),
        }
    }

    struct StubBridge;

    impl HeicBridge for StubBridge {
        fn decode(&self, _: &[u8], _: &str, _: f32) -> Result<Vec<u8>, String> {
            Err("unused".to_string())
        }
    }

    #[test]
    fn supported_reflects_injected_routines() {
        let c = Converter::new();
        assert!(!c.supported(TOOL_BG_REMOVER, "png"));
        assert!(c.supported(TOOL_COMPRESSOR, "png"));
        assert!(c.supported("png-webp", "png"));
        assert!(c.supported("png-pdf", "png"));
        assert!(c.supported("pdf-png", "pdf"));
        assert!(!c.supported("mp4-mp3", "mp4"));
        // HEIC needs the bridge, for the compressor too.
        assert!(!c.supported("heic-jpg", "heic"));
        assert!(!c.supported(TOOL_COMPRESSOR, "heic"));

        let c = Converter::new().with_heic_bridge(Box::new(StubBridge));
        assert!(c.supported("heic-jpg", "heic"));
        assert!(c.supported(TOOL_COMPRESSOR, "heic"));
    }
}
