//! Conversion settings.
//!
//! An immutable snapshot of the desired output characteristics, produced by
//! the caller (UI, CLI, or JS) and passed by reference into a single
//! conversion call. The core never mutates or retains these values.

use serde::{Deserialize, Serialize};

/// Aggressiveness of the SVG whitespace/structure stripping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizeLevel {
    Low,
    #[default]
    Medium,
    High,
}

/// Page size for image-to-PDF composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSize {
    #[default]
    A4,
    Letter,
    /// Page exactly matches the image's pixel dimensions.
    Original,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Margin {
    None,
    #[default]
    Small,
    Large,
}

impl Margin {
    /// Margin width in millimeters. Ignored (zero) when the page uses
    /// pixel units, i.e. `PageSize::Original`.
    pub fn millimeters(self) -> f32 {
        match self {
            Margin::None => 0.0,
            Margin::Small => 10.0,
            Margin::Large => 25.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Alignment {
    #[default]
    Center,
    TopLeft,
}

/// Page layout options for image-to-PDF composition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfOptions {
    pub page_size: PageSize,
    pub orientation: Orientation,
    pub margin: Margin,
    pub alignment: Alignment,
    /// Scale the image up to fill the content area. When false the image is
    /// only scaled down (to fit), never enlarged beyond its natural size.
    pub fit_to_page: bool,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            page_size: PageSize::A4,
            orientation: Orientation::Portrait,
            margin: Margin::Small,
            alignment: Alignment::Center,
            fit_to_page: true,
        }
    }
}

/// Raster re-encode options.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterOptions {
    /// Encoder quality factor in [0.1, 1.0]. Ignored by lossless formats.
    pub quality: f32,
    /// Uniform scale factor in (0.0, 1.0] applied to both dimensions.
    pub resize: f32,
    /// Apply a full desaturation during composite.
    pub grayscale: bool,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            quality: 0.8,
            resize: 1.0,
            grayscale: false,
        }
    }
}

/// Full settings snapshot for one conversion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    /// SVG optimization aggressiveness.
    pub level: OptimizeLevel,
    /// Decimal places retained when rounding numeric tokens in SVG markup.
    /// Zero rounds to integers, so the default keeps some fraction.
    pub precision: u32,
    pub remove_comments: bool,
    pub remove_metadata: bool,
    pub merge_paths: bool,
    pub pdf: PdfOptions,
    pub raster: RasterOptions,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            level: OptimizeLevel::default(),
            precision: 3,
            remove_comments: false,
            remove_metadata: false,
            merge_paths: false,
            pdf: PdfOptions::default(),
            raster: RasterOptions::default(),
        }
    }
}
