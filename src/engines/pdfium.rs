//! PDF rasterisation via pdfium.
//!
//! pdfium keeps thread-local state and blocks for the whole render, so each
//! call binds the library and renders inside `spawn_blocking`.

use super::pdf::page_pixel_size;
use super::{Delegate, PageRasterizer};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct PdfiumRasterizer {
    /// Explicit pdfium library file; the system library is used otherwise
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self { library_path }
    }

    /// Whether the pdfium library can be bound right now
    pub fn is_available(&self) -> bool {
        match bind(self.library_path.as_deref()) {
            Ok(_) => true,
            Err(e) => {
                warn!("pdfium unavailable: {}", e);
                false
            }
        }
    }
}

fn bind(library_path: Option<&Path>) -> std::result::Result<Pdfium, String> {
    let bindings = match library_path {
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| format!("failed to bind pdfium: {:?}", e))?;

    Ok(Pdfium::new(bindings))
}

fn render_blocking(
    library_path: Option<&Path>,
    pdf: &[u8],
    scale: f32,
) -> std::result::Result<Vec<DynamicImage>, String> {
    let pdfium = bind(library_path)?;
    let document = pdfium
        .load_pdf_from_byte_slice(pdf, None)
        .map_err(|e| format!("malformed PDF: {:?}", e))?;

    let pages = document.pages();
    info!("Rendering {} pages at {}x", pages.len(), scale);

    let mut images = Vec::with_capacity(pages.len() as usize);
    for (index, page) in pages.iter().enumerate() {
        let (width, height) = page_pixel_size(page.width().value, page.height().value, scale);
        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| format!("failed to render page {}: {:?}", index + 1, e))?;

        let image = bitmap.as_image();
        debug!(page = index + 1, width, height, "Page rendered");
        images.push(image);
    }

    Ok(images)
}

#[async_trait]
impl PageRasterizer for PdfiumRasterizer {
    async fn render_pages(&self, pdf: &[u8], scale: f32) -> Result<Vec<DynamicImage>> {
        let library_path = self.library_path.clone();
        let bytes = pdf.to_vec();

        tokio::task::spawn_blocking(move || render_blocking(library_path.as_deref(), &bytes, scale))
            .await
            .map_err(|e| AppError::Internal(format!("Render task panicked: {}", e)))?
            .map_err(|e| AppError::delegate(Delegate::PdfToImage, e))
    }
}
