mod archive;
mod ffmpeg;
mod raster;
mod pdf;
mod pdfium;
mod text;

pub use archive::ARCHIVE_EXTENSION;
pub(crate) use ffmpeg::work_file_name;
pub use ffmpeg::FfmpegTranscoder;
pub use raster::RasterEngine;
pub use pdf::PdfEngine;
pub use pdfium::PdfiumRasterizer;
pub use text::TextEngine;

use crate::error::Result;
use crate::format::Format;
use image::DynamicImage;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

/// Raw output of a delegate
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionResult {
    pub payload: Bytes,
    pub mime_type: String,
}

impl ConversionResult {
    pub fn new(payload: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// Outcome of routing a request
#[derive(Debug, Clone, PartialEq)]
pub enum Conversion {
    /// The requested format is the source format; nothing to produce
    NoOpNeeded,
    SingleFile(ConversionResult),
    /// Several outputs bundled into one container
    Archive(ConversionResult),
}

/// The library-backed operations the router can invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delegate {
    ImageToPdf,
    ImageToImage,
    PdfToText,
    PdfToImage,
    TextToImage,
    Transcode,
}

impl fmt::Display for Delegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Delegate::ImageToPdf => "Image to PDF",
            Delegate::ImageToImage => "Image to image",
            Delegate::PdfToText => "PDF to text",
            Delegate::PdfToImage => "PDF to image",
            Delegate::TextToImage => "Text to image",
            Delegate::Transcode => "Transcoding",
        };
        f.write_str(name)
    }
}

#[async_trait]
pub trait ImageDelegate: Send + Sync {
    /// Place an image on a single PDF page
    async fn image_to_pdf(&self, image: &[u8], mime_type: &str) -> Result<ConversionResult>;

    /// Decode and re-encode an image in the target raster format
    async fn image_to_image(&self, image: &[u8], target: Format) -> Result<ConversionResult>;
}

#[async_trait]
pub trait PdfDelegate: Send + Sync {
    /// Extract the text of every page, each under a page-number header
    async fn pdf_to_text(&self, pdf: &[u8]) -> Result<ConversionResult>;

    /// Rasterize every page; more than one page comes back as an archive
    async fn pdf_to_image(&self, pdf: &[u8], target: Format) -> Result<Conversion>;
}

#[async_trait]
pub trait TextDelegate: Send + Sync {
    async fn text_to_pdf(&self, text: &str) -> Result<ConversionResult>;

    async fn text_to_image(&self, text: &str, target: Format) -> Result<ConversionResult>;
}

/// Audio/video transcoding engine
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Run the engine with `args` against `source` stored as `file_name`,
    /// returning the bytes the engine wrote to `output_name`.
    async fn transcode(
        &self,
        source: &[u8],
        file_name: &str,
        args: &[String],
        output_name: &str,
    ) -> Result<Vec<u8>>;
}

/// Renders PDF pages to bitmaps
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    /// Render every page, in order, at `scale` times its nominal size
    async fn render_pages(&self, pdf: &[u8], scale: f32) -> Result<Vec<DynamicImage>>;
}
