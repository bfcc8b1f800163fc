use super::{ConversionResult, Delegate, ImageDelegate};
use crate::error::{AppError, Result};
use crate::format::{canonical_mime, Format};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Pt, RawImage, RawImageData,
    RawImageFormat, XObjectTransform,
};
use std::io::Cursor;
use tracing::{debug, info};

/// Image subtypes that can be placed on a PDF page
const PDF_EMBEDDABLE: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/webp",
    "image/bmp",
    "image/gif",
    "image/x-icon",
    "image/tiff",
];

const JPEG_QUALITY: u8 = 95;
const ICO_MAX_SIDE: u32 = 256;
const POINTS_PER_INCH: f32 = 72.0;
const MM_PER_INCH: f32 = 25.4;

/// Image conversions backed by the `image` crate, with `printpdf` for PDF output.
pub struct RasterEngine;

impl RasterEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RasterEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a decoded image in a raster output format.
pub(crate) fn encode_image(
    image: &DynamicImage,
    target: Format,
) -> std::result::Result<Vec<u8>, String> {
    let format = target
        .image_format()
        .ok_or_else(|| format!("{} is not an image format", target))?;

    let mut buffer = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
            image
                .to_rgb8()
                .write_with_encoder(encoder)
                .map_err(|e| format!("JPEG encoding failed: {}", e))?;
        }
        ImageFormat::Ico => {
            let icon = if image.width() > ICO_MAX_SIDE || image.height() > ICO_MAX_SIDE {
                image.thumbnail(ICO_MAX_SIDE, ICO_MAX_SIDE)
            } else {
                image.clone()
            };
            DynamicImage::ImageRgba8(icon.to_rgba8())
                .write_to(&mut Cursor::new(&mut buffer), format)
                .map_err(|e| format!("ICO encoding failed: {}", e))?;
        }
        _ => {
            DynamicImage::ImageRgba8(image.to_rgba8())
                .write_to(&mut Cursor::new(&mut buffer), format)
                .map_err(|e| format!("{} encoding failed: {}", target, e))?;
        }
    }
    Ok(buffer)
}

fn image_pdf(image: &DynamicImage) -> Vec<u8> {
    let width = image.width() as usize;
    let height = image.height() as usize;

    let raw = RawImage {
        pixels: RawImageData::U8(image.to_rgb8().into_raw()),
        width,
        height,
        data_format: RawImageFormat::RGB8,
        tag: Vec::new(),
    };

    let mut doc = PdfDocument::new("Converted image");
    let xobject_id = doc.add_image(&raw);

    // One pixel per point: the page is exactly the image's size
    let page_w = Mm(width as f32 * MM_PER_INCH / POINTS_PER_INCH);
    let page_h = Mm(height as f32 * MM_PER_INCH / POINTS_PER_INCH);

    let ops = vec![Op::UseXobject {
        id: xobject_id,
        transform: XObjectTransform {
            translate_x: Some(Pt(0.0)),
            translate_y: Some(Pt(0.0)),
            scale_x: Some(1.0),
            scale_y: Some(1.0),
            dpi: Some(POINTS_PER_INCH),
            rotate: None,
        },
    }];

    doc.with_pages(vec![PdfPage::new(page_w, page_h, ops)]);

    let mut warnings: Vec<PdfWarnMsg> = Vec::new();
    doc.save(&PdfSaveOptions::default(), &mut warnings)
}

#[async_trait]
impl ImageDelegate for RasterEngine {
    async fn image_to_pdf(&self, data: &[u8], mime_type: &str) -> Result<ConversionResult> {
        let mime = canonical_mime(mime_type);
        if !PDF_EMBEDDABLE.contains(&mime.as_str()) {
            return Err(AppError::delegate(
                Delegate::ImageToPdf,
                format!("Unsupported image format: {}", mime_type),
            ));
        }

        info!("Placing {} image on a PDF page", mime);
        let bytes = data.to_vec();
        let pdf = tokio::task::spawn_blocking(move || {
            let decoded = image::load_from_memory(&bytes).map_err(|e| e.to_string())?;
            debug!(width = decoded.width(), height = decoded.height(), "Image decoded");
            Ok::<_, String>(image_pdf(&decoded))
        })
        .await
        .map_err(|e| AppError::Internal(format!("Image task panicked: {}", e)))?
        .map_err(|e| AppError::delegate(Delegate::ImageToPdf, e))?;

        Ok(ConversionResult::new(pdf, Format::Pdf.mime_type()))
    }

    async fn image_to_image(&self, data: &[u8], target: Format) -> Result<ConversionResult> {
        info!("Re-encoding image as {}", target);
        let bytes = data.to_vec();
        let encoded = tokio::task::spawn_blocking(move || {
            let decoded = image::load_from_memory(&bytes)
                .map_err(|e| format!("failed to decode image: {}", e))?;
            encode_image(&decoded, target)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Image task panicked: {}", e)))?
        .map_err(|e| AppError::delegate(Delegate::ImageToImage, e))?;

        Ok(ConversionResult::new(encoded, target.mime_type()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn sample_png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([200, 40, 40, 255]));
        let mut buffer = Vec::new();
        DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[tokio::test]
    async fn test_png_to_jpeg_keeps_dimensions() {
        let engine = RasterEngine::new();
        let result = engine
            .image_to_image(&sample_png(30, 20), Format::Jpg)
            .await
            .unwrap();

        assert_eq!(result.mime_type, "image/jpeg");
        let decoded = image::load_from_memory(&result.payload).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (30, 20));
    }

    #[tokio::test]
    async fn test_large_image_to_ico_is_downscaled() {
        let engine = RasterEngine::new();
        let result = engine
            .image_to_image(&sample_png(512, 300), Format::Ico)
            .await
            .unwrap();

        let decoded = image::load_from_memory_with_format(&result.payload, ImageFormat::Ico).unwrap();
        assert!(decoded.width() <= ICO_MAX_SIDE && decoded.height() <= ICO_MAX_SIDE);
    }

    #[tokio::test]
    async fn test_bmp_input_converts() {
        let mut bmp = Vec::new();
        DynamicImage::ImageRgb8(image::RgbImage::new(8, 8))
            .write_to(&mut Cursor::new(&mut bmp), ImageFormat::Bmp)
            .unwrap();

        let engine = RasterEngine::new();
        let png = engine.image_to_image(&bmp, Format::Png).await.unwrap();
        assert_eq!(png.mime_type, "image/png");

        let pdf = engine.image_to_pdf(&bmp, "image/bmp").await.unwrap();
        assert!(pdf.payload.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_image_to_pdf_has_one_page() {
        let engine = RasterEngine::new();
        let result = engine
            .image_to_pdf(&sample_png(40, 40), "image/png")
            .await
            .unwrap();

        assert_eq!(result.mime_type, "application/pdf");
        let doc = lopdf::Document::load_mem(&result.payload).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_subtype_fails() {
        let engine = RasterEngine::new();
        let err = engine
            .image_to_pdf(&sample_png(4, 4), "image/svg+xml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::DelegateFailure { delegate: Delegate::ImageToPdf, .. }
        ));
    }

    #[tokio::test]
    async fn test_bad_image_data_fails() {
        let engine = RasterEngine::new();
        let err = engine
            .image_to_image(b"definitely not an image", Format::Png)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::DelegateFailure { delegate: Delegate::ImageToImage, .. }
        ));
    }
}
