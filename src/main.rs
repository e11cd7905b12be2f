//! File Converter CLI
//!
//! Command-line interface for the conversion core. The tool identifier is
//! normally derived from the input and output file extensions; pass --tool
//! to pick one of the special strategies explicitly.

use clap::Parser;
use std::path::{Path, PathBuf};
use webconvert::settings::{Alignment, Margin, OptimizeLevel, Orientation, PageSize};
use webconvert::{Content, Converter, OptimizerSettings, SourceFile};

/// Convert, compress, and optimize image and PDF files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input file path
    #[arg(short, long)]
    input: PathBuf,

    /// Output file path (its extension selects the target format)
    #[arg(short, long)]
    output: PathBuf,

    /// Tool identifier (e.g. image-compressor, optimizer, png-pdf);
    /// derived from the file extensions when omitted
    #[arg(short, long)]
    tool: Option<String>,

    /// Encoder quality factor (0.1-1.0, lossy formats only)
    #[arg(short, long, default_value = "0.8")]
    quality: f32,

    /// Uniform downscale factor applied to both dimensions (0.0-1.0]
    #[arg(short, long, default_value = "1.0")]
    resize: f32,

    /// Desaturate raster output
    #[arg(short, long)]
    grayscale: bool,

    /// SVG optimization level (low, medium, high)
    #[arg(long, default_value = "medium")]
    level: OptimizeLevelArg,

    /// Decimal places kept when rounding SVG numeric tokens (0 rounds to
    /// integers)
    #[arg(long, default_value = "3")]
    precision: u32,

    /// Strip XML comments from SVG output
    #[arg(long)]
    remove_comments: bool,

    /// Strip metadata and editor namespaces from SVG output
    #[arg(long)]
    remove_metadata: bool,

    /// Merge adjacent compatible <path> elements
    #[arg(long)]
    merge_paths: bool,

    /// PDF page size (a4, letter, original)
    #[arg(long, default_value = "a4")]
    page_size: PageSizeArg,

    /// PDF page orientation (portrait, landscape)
    #[arg(long, default_value = "portrait")]
    orientation: OrientationArg,

    /// PDF page margin (none, small, large)
    #[arg(long, default_value = "small")]
    margin: MarginArg,

    /// PDF image alignment (center, top-left)
    #[arg(long, default_value = "center")]
    alignment: AlignmentArg,

    /// Scale the image up to fill the PDF content area
    #[arg(long, default_value = "true")]
    fit_to_page: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum OptimizeLevelArg {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum PageSizeArg {
    A4,
    Letter,
    Original,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum OrientationArg {
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum MarginArg {
    None,
    Small,
    Large,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum AlignmentArg {
    Center,
    TopLeft,
}

fn build_settings(args: &Args) -> OptimizerSettings {
    let mut settings = OptimizerSettings::default();
    settings.level = match args.level {
        OptimizeLevelArg::Low => OptimizeLevel::Low,
        OptimizeLevelArg::Medium => OptimizeLevel::Medium,
        OptimizeLevelArg::High => OptimizeLevel::High,
    };
    settings.precision = args.precision;
    settings.remove_comments = args.remove_comments;
    settings.remove_metadata = args.remove_metadata;
    settings.merge_paths = args.merge_paths;
    settings.pdf.page_size = match args.page_size {
        PageSizeArg::A4 => PageSize::A4,
        PageSizeArg::Letter => PageSize::Letter,
        PageSizeArg::Original => PageSize::Original,
    };
    settings.pdf.orientation = match args.orientation {
        OrientationArg::Portrait => Orientation::Portrait,
        OrientationArg::Landscape => Orientation::Landscape,
    };
    settings.pdf.margin = match args.margin {
        MarginArg::None => Margin::None,
        MarginArg::Small => Margin::Small,
        MarginArg::Large => Margin::Large,
    };
    settings.pdf.alignment = match args.alignment {
        AlignmentArg::Center => Alignment::Center,
        AlignmentArg::TopLeft => Alignment::TopLeft,
    };
    settings.pdf.fit_to_page = args.fit_to_page;
    settings.raster.quality = args.quality;
    settings.raster.resize = args.resize;
    settings.raster.grayscale = args.grayscale;
    settings
}

/// Derive the tool identifier from the input and output extensions.
fn derive_tool(input: &Path, output: &Path) -> String {
    let ext = |p: &Path| {
        p.extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default()
    };
    format!("{}-{}", ext(input), ext(output))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let bytes = std::fs::read(&args.input)?;
    let name = args
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file = SourceFile::new(name, bytes);

    let tool = args
        .tool
        .clone()
        .unwrap_or_else(|| derive_tool(&args.input, &args.output));
    let settings = build_settings(&args);

    println!("File Converter");
    println!("==============");

    if args.verbose {
        println!(
            "\nConverting {:?} with tool {} ({} bytes in)",
            args.input,
            tool,
            file.bytes.len()
        );
    }

    let result = Converter::new().convert(&file, &tool, &settings)?;

    let in_len = file.bytes.len();
    let out_len = result.content.len();
    match result.content {
        Content::Bytes(bytes) => std::fs::write(&args.output, bytes)?,
        Content::Text(text) => std::fs::write(&args.output, text)?,
    }

    println!(
        "\nDone! {} -> {} bytes ({:.1}%), format: {}",
        in_len,
        out_len,
        out_len as f64 / in_len.max(1) as f64 * 100.0,
        result.extension
    );
    println!("Output saved to: {:?}", args.output);

    Ok(())
}
