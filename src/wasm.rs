//! WebAssembly bindings for the conversion core

use crate::{Content, Converter, OptimizerSettings, SourceFile};
use wasm_bindgen::prelude::*;

/// Initialize panic hook for better error messages in browser console
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Convert a file with the given tool identifier
///
/// # Arguments
/// * `bytes` - The input file as a byte array
/// * `name` - The file name (its extension selects the input format)
/// * `tool_id` - Tool identifier (e.g. "image-compressor", "png-pdf")
/// * `settings_json` - Optional settings snapshot as JSON; defaults apply
///   to any field left out
///
/// # Returns
/// A `ConvertResultJs` with the output payload, or throws an error
#[wasm_bindgen]
pub fn convert(
    bytes: &[u8],
    name: &str,
    tool_id: &str,
    settings_json: Option<String>,
) -> Result<ConvertResultJs, JsError> {
    let settings = parse_settings(settings_json.as_deref())?;
    let file = SourceFile::new(name, bytes.to_vec());

    let result = Converter::new()
        .convert(&file, tool_id, &settings)
        .map_err(|e| JsError::new(&e.to_string()))?;

    let (bytes, is_text) = match result.content {
        Content::Bytes(b) => (b, false),
        Content::Text(t) => (t.into_bytes(), true),
    };

    Ok(ConvertResultJs {
        bytes,
        extension: result.extension,
        is_text,
    })
}

/// Optimize SVG markup without going through the dispatcher
///
/// # Arguments
/// * `svg` - The SVG document as text
/// * `settings_json` - Optional settings snapshot as JSON
///
/// # Returns
/// The optimized SVG text, or throws an error
#[wasm_bindgen]
pub fn optimize_svg(svg: &str, settings_json: Option<String>) -> Result<String, JsError> {
    let settings = parse_settings(settings_json.as_deref())?;
    Ok(crate::svgo::optimize(svg, &settings))
}

/// Whether a tool/input pair has an implemented strategy
#[wasm_bindgen]
pub fn supported(tool_id: &str, input_ext: &str) -> bool {
    Converter::new().supported(tool_id, input_ext)
}

fn parse_settings(json: Option<&str>) -> Result<OptimizerSettings, JsError> {
    match json {
        Some(s) if !s.trim().is_empty() => serde_json::from_str(s)
            .map_err(|e| JsError::new(&format!("invalid settings JSON: {e}"))),
        _ => Ok(OptimizerSettings::default()),
    }
}

/// Result of one conversion
#[wasm_bindgen]
pub struct ConvertResultJs {
    bytes: Vec<u8>,
    extension: String,
    is_text: bool,
}

#[wasm_bindgen]
impl ConvertResultJs {
    /// Get the output payload bytes (UTF-8 when `is_text`)
    #[wasm_bindgen(getter)]
    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    /// Get the output file extension
    #[wasm_bindgen(getter)]
    pub fn extension(&self) -> String {
        self.extension.clone()
    }

    /// Whether the payload is text (SVG output) rather than binary
    #[wasm_bindgen(getter)]
    pub fn is_text(&self) -> bool {
        self.is_text
    }
}
