use super::archive::{bundle_entries, ARCHIVE_MIME_TYPE};
use super::raster::encode_image;
use super::{Conversion, ConversionResult, Delegate, PageRasterizer, PdfDelegate};
use crate::error::{AppError, Result};
use crate::format::Format;
use async_trait::async_trait;
use lopdf::Document;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Pages are rendered at twice their nominal size
pub const RENDER_SCALE: f32 = 2.0;

/// Pixel size of a page measured in points, rendered at `scale`.
pub(crate) fn page_pixel_size(width_pt: f32, height_pt: f32, scale: f32) -> (u32, u32) {
    let width = (width_pt * scale).round().max(1.0) as u32;
    let height = (height_pt * scale).round().max(1.0) as u32;
    (width, height)
}

/// PDF text extraction (lopdf) and page rasterization.
pub struct PdfEngine {
    rasterizer: Arc<dyn PageRasterizer>,
}

impl PdfEngine {
    pub fn new(rasterizer: Arc<dyn PageRasterizer>) -> Self {
        Self { rasterizer }
    }
}

#[async_trait]
impl PdfDelegate for PdfEngine {
    async fn pdf_to_text(&self, pdf: &[u8]) -> Result<ConversionResult> {
        let document = Document::load_mem(pdf)
            .map_err(|e| AppError::delegate(Delegate::PdfToText, format!("malformed PDF: {}", e)))?;

        let pages = document.get_pages();
        info!("Extracting text from {} pages", pages.len());

        let mut full_text = String::new();
        for (position, page_number) in pages.keys().enumerate() {
            let page_text = match document.extract_text(&[*page_number]) {
                Ok(text) => text,
                Err(e) => {
                    warn!("No text extracted from page {}: {}", page_number, e);
                    String::new()
                }
            };
            full_text.push_str(&format!(
                "--- Page {} ---\n{}\n\n",
                position + 1,
                page_text.trim_end()
            ));
        }

        Ok(ConversionResult::new(full_text, Format::Txt.mime_type()))
    }

    async fn pdf_to_image(&self, pdf: &[u8], target: Format) -> Result<Conversion> {
        let pages = self.rasterizer.render_pages(pdf, RENDER_SCALE).await?;
        if pages.is_empty() {
            return Err(AppError::delegate(
                Delegate::PdfToImage,
                "document has no pages",
            ));
        }

        let page_count = pages.len();
        let encoded = tokio::task::spawn_blocking(move || {
            pages
                .iter()
                .map(|page| encode_image(page, target))
                .collect::<std::result::Result<Vec<_>, _>>()
        })
        .await
        .map_err(|e| AppError::Internal(format!("Encode task panicked: {}", e)))?
        .map_err(|e| AppError::delegate(Delegate::PdfToImage, e))?;

        if page_count == 1 {
            let single = encoded.into_iter().next().unwrap_or_default();
            return Ok(Conversion::SingleFile(ConversionResult::new(
                single,
                target.mime_type(),
            )));
        }

        let entries: Vec<(String, Vec<u8>)> = encoded
            .into_iter()
            .enumerate()
            .map(|(index, data)| (format!("page_{}.{}", index + 1, target.extension()), data))
            .collect();

        let archive = bundle_entries(&entries).map_err(|e| {
            AppError::delegate(Delegate::PdfToImage, format!("failed to archive pages: {}", e))
        })?;
        debug!(pages = page_count, bytes = archive.len(), "Pages archived");

        Ok(Conversion::Archive(ConversionResult::new(
            archive,
            ARCHIVE_MIME_TYPE,
        )))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};
    use std::io::Cursor;

    /// Produces blank pages of a fixed point size
    pub(crate) struct FakeRasterizer {
        pub pages: usize,
    }

    #[async_trait]
    impl PageRasterizer for FakeRasterizer {
        async fn render_pages(&self, _pdf: &[u8], scale: f32) -> Result<Vec<DynamicImage>> {
            let (w, h) = page_pixel_size(20.0, 30.0, scale);
            Ok((0..self.pages)
                .map(|_| DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([255, 255, 255]))))
                .collect())
        }
    }

    /// A small PDF with one page per entry of `texts`
    pub(crate) fn sample_pdf(texts: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for text in texts {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    fn engine(pages: usize) -> PdfEngine {
        PdfEngine::new(Arc::new(FakeRasterizer { pages }))
    }

    #[test]
    fn test_page_geometry_is_deterministic() {
        let first = page_pixel_size(612.0, 792.0, RENDER_SCALE);
        let second = page_pixel_size(612.0, 792.0, RENDER_SCALE);
        assert_eq!(first, second);
        assert_eq!(first, (1224, 1584));
    }

    #[tokio::test]
    async fn test_three_pages_fan_out_to_archive() {
        let conversion = engine(3).pdf_to_image(b"%PDF", Format::Png).await.unwrap();

        let archive = match conversion {
            Conversion::Archive(result) => result,
            other => panic!("expected archive, got {:?}", other),
        };
        assert_eq!(archive.mime_type, "application/zip");

        let mut zip = zip::ZipArchive::new(Cursor::new(archive.payload.to_vec())).unwrap();
        let mut names: Vec<String> = zip.file_names().map(String::from).collect();
        names.sort();
        assert_eq!(names, vec!["page_1.png", "page_2.png", "page_3.png"]);

        let page = zip.by_name("page_2.png").unwrap();
        assert!(page.size() > 0);
    }

    #[tokio::test]
    async fn test_single_page_is_a_single_image() {
        let conversion = engine(1).pdf_to_image(b"%PDF", Format::Jpg).await.unwrap();

        match conversion {
            Conversion::SingleFile(result) => {
                assert_eq!(result.mime_type, "image/jpeg");
                let decoded = image::load_from_memory(&result.payload).unwrap();
                assert_eq!((decoded.width(), decoded.height()), (40, 60));
            }
            other => panic!("expected single file, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_zero_pages_fail() {
        let err = engine(0).pdf_to_image(b"%PDF", Format::Png).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::DelegateFailure { delegate: Delegate::PdfToImage, .. }
        ));
    }

    #[tokio::test]
    async fn test_text_has_a_header_per_page() {
        let pdf = sample_pdf(&["first", "second"]);
        let result = engine(0).pdf_to_text(&pdf).await.unwrap();

        assert_eq!(result.mime_type, "text/plain");
        let text = String::from_utf8(result.payload.to_vec()).unwrap();
        let first = text.find("--- Page 1 ---\n").unwrap();
        let second = text.find("--- Page 2 ---\n").unwrap();
        assert!(first < second);
        assert!(text.ends_with("\n\n"));
    }

    #[tokio::test]
    async fn test_malformed_pdf_fails() {
        let err = engine(0).pdf_to_text(b"not a pdf").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::DelegateFailure { delegate: Delegate::PdfToText, .. }
        ));
    }
}
