use super::raster::encode_image;
use super::{ConversionResult, Delegate, TextDelegate};
use crate::error::{AppError, Result};
use crate::format::Format;
use async_trait::async_trait;
use font8x8::{UnicodeFonts, BASIC_FONTS, LATIN_FONTS};
use image::{DynamicImage, Rgb, RgbImage};
use printpdf::{
    BuiltinFont, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Point, Pt, TextItem,
};
use tracing::{debug, info};

// A4 in points
const PAGE_WIDTH_PT: f32 = 595.28;
const PAGE_HEIGHT_PT: f32 = 841.89;
const MARGIN_PT: f32 = 50.0;
const FONT_SIZE_PT: f32 = 12.0;
const LINE_STEP_PT: f32 = FONT_SIZE_PT + 4.0;
// Average Helvetica glyph is about half the font size wide
const AVG_CHAR_WIDTH_PT: f32 = FONT_SIZE_PT * 0.5;
const MM_PER_PT: f32 = 25.4 / 72.0;

const GLYPH_SIZE: u32 = 8;
const GLYPH_SCALE: u32 = 2;
const CELL_SIZE: u32 = GLYPH_SIZE * GLYPH_SCALE;
const LINE_HEIGHT_PX: u32 = 20;
const PADDING_PX: u32 = 20;
const TAB_WIDTH: usize = 4;
// Text images wrap at this many glyphs per line
const IMAGE_COLUMNS: usize = 100;

/// Plain text rendered to PDF (printpdf) or to a raster image (font8x8).
pub struct TextEngine;

impl TextEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn source_lines(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split('\n')
        .map(|line| line.trim_end_matches('\r').replace('\t', &" ".repeat(TAB_WIDTH)))
}

/// Split a line into alternating runs of whitespace and non-whitespace,
/// flagging the whitespace runs.
fn segments(line: &str) -> Vec<(bool, String)> {
    let mut runs: Vec<(bool, String)> = Vec::new();
    for c in line.chars() {
        let space = c.is_whitespace();
        match runs.last_mut() {
            Some((kind, run)) if *kind == space => run.push(c),
            _ => runs.push((space, c.to_string())),
        }
    }
    runs
}

/// Word-wrap one line so no piece exceeds `max_chars` characters.
///
/// Indentation and the spacing between words on the same output line are
/// kept; only the whitespace at a break is dropped. Words longer than a line
/// are split.
fn wrap_line(line: &str, max_chars: usize) -> Vec<String> {
    if line.chars().count() <= max_chars {
        return vec![line.to_string()];
    }

    let mut wrapped = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    let mut gap = String::new();

    for (space, run) in segments(line) {
        if space {
            gap = run;
            continue;
        }
        let gap_len = gap.chars().count();
        let word_len = run.chars().count();
        let starting = wrapped.is_empty() && current.is_empty();

        if !starting && current_len + gap_len + word_len <= max_chars {
            current.push_str(&gap);
            current.push_str(&run);
            current_len += gap_len + word_len;
        } else {
            if !current.is_empty() {
                wrapped.push(std::mem::take(&mut current));
                current_len = 0;
            }
            // Leading indentation survives when it leaves room for text
            if starting && gap_len < max_chars {
                current.push_str(&gap);
                current_len = gap_len;
            }
            for c in run.chars() {
                if current_len == max_chars {
                    wrapped.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                current.push(c);
                current_len += 1;
            }
        }
        gap.clear();
    }

    if !current.is_empty() || wrapped.is_empty() {
        wrapped.push(current);
    }
    wrapped
}

fn lines_per_page() -> usize {
    ((PAGE_HEIGHT_PT - 2.0 * MARGIN_PT) / LINE_STEP_PT).floor() as usize + 1
}

fn chars_per_line() -> usize {
    ((PAGE_WIDTH_PT - 2.0 * MARGIN_PT) / AVG_CHAR_WIDTH_PT).floor() as usize
}

/// Wrap the text and split it into pages of lines. Always at least one page.
pub(crate) fn layout_pages(text: &str) -> Vec<Vec<String>> {
    let max_chars = chars_per_line();
    let wrapped: Vec<String> = source_lines(text)
        .flat_map(|line| wrap_line(&line, max_chars))
        .collect();

    let pages: Vec<Vec<String>> = wrapped
        .chunks(lines_per_page())
        .map(|chunk| chunk.to_vec())
        .collect();

    if pages.is_empty() {
        vec![Vec::new()]
    } else {
        pages
    }
}

fn text_pdf(text: &str) -> Vec<u8> {
    let pages = layout_pages(text);
    let page_w = Mm(PAGE_WIDTH_PT * MM_PER_PT);
    let page_h = Mm(PAGE_HEIGHT_PT * MM_PER_PT);

    let mut doc = PdfDocument::new("Converted text");
    let pdf_pages: Vec<PdfPage> = pages
        .iter()
        .map(|lines| {
            let mut ops = Vec::new();
            for (index, line) in lines.iter().enumerate() {
                if line.is_empty() {
                    continue;
                }
                let y = PAGE_HEIGHT_PT - MARGIN_PT - index as f32 * LINE_STEP_PT;
                ops.push(Op::StartTextSection);
                ops.push(Op::SetTextCursor {
                    pos: Point {
                        x: Pt(MARGIN_PT),
                        y: Pt(y),
                    },
                });
                ops.push(Op::SetFontSizeBuiltinFont {
                    size: Pt(FONT_SIZE_PT),
                    font: BuiltinFont::Helvetica,
                });
                ops.push(Op::WriteTextBuiltinFont {
                    items: vec![TextItem::Text(line.clone())],
                    font: BuiltinFont::Helvetica,
                });
                ops.push(Op::EndTextSection);
            }
            PdfPage::new(page_w, page_h, ops)
        })
        .collect();

    debug!(pages = pdf_pages.len(), "Text layout complete");
    doc.with_pages(pdf_pages);

    let mut warnings: Vec<PdfWarnMsg> = Vec::new();
    doc.save(&PdfSaveOptions::default(), &mut warnings)
}

fn glyph(c: char) -> [u8; 8] {
    BASIC_FONTS
        .get(c)
        .or_else(|| LATIN_FONTS.get(c))
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}

/// Canvas size for `rows` lines of at most `columns` glyphs, padded on all
/// sides. `None` when it does not fit in `u32`.
pub(crate) fn canvas_size(columns: usize, rows: usize) -> Option<(u32, u32)> {
    let width = u32::try_from(columns)
        .ok()?
        .checked_mul(CELL_SIZE)?
        .checked_add(2 * PADDING_PX)?;
    let height = u32::try_from(rows)
        .ok()?
        .checked_mul(LINE_HEIGHT_PX)?
        .checked_add(2 * PADDING_PX)?;
    Some((width, height))
}

/// Largest side the encoder for `target` accepts. PNG has no hard limit and
/// shares the JPEG one so the canvas stays bounded.
fn max_canvas_side(target: Format) -> u32 {
    match target {
        Format::Webp => 16_383,
        _ => 65_535,
    }
}

fn render_text(text: &str, target: Format) -> std::result::Result<RgbImage, String> {
    let lines: Vec<String> = source_lines(text)
        .flat_map(|line| wrap_line(&line, IMAGE_COLUMNS))
        .collect();
    let widest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);

    let (width, height) = canvas_size(widest, lines.len())
        .ok_or_else(|| format!("{} lines of text are too many to render", lines.len()))?;
    let limit = max_canvas_side(target);
    if width > limit || height > limit {
        return Err(format!(
            "{} lines need a {}x{} px canvas, {} allows at most {} px per side",
            lines.len(),
            width,
            height,
            target.label(),
            limit
        ));
    }
    debug!(width, height, lines = lines.len(), "Text canvas");
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));

    for (row, line) in lines.iter().enumerate() {
        let top = PADDING_PX + row as u32 * LINE_HEIGHT_PX;
        for (column, c) in line.chars().enumerate() {
            let left = PADDING_PX + column as u32 * CELL_SIZE;
            for (gy, bits) in glyph(c).iter().enumerate() {
                for gx in 0..GLYPH_SIZE {
                    if *bits & (1u8 << gx) == 0 {
                        continue;
                    }
                    for dy in 0..GLYPH_SCALE {
                        for dx in 0..GLYPH_SCALE {
                            let x = left + gx * GLYPH_SCALE + dx;
                            let y = top + gy as u32 * GLYPH_SCALE + dy;
                            canvas.put_pixel(x, y, Rgb([0, 0, 0]));
                        }
                    }
                }
            }
        }
    }

    Ok(canvas)
}

#[async_trait]
impl TextDelegate for TextEngine {
    async fn text_to_pdf(&self, text: &str) -> Result<ConversionResult> {
        info!("Laying out {} bytes of text as PDF", text.len());
        let owned = text.to_string();
        let pdf = tokio::task::spawn_blocking(move || text_pdf(&owned))
            .await
            .map_err(|e| AppError::Internal(format!("Layout task panicked: {}", e)))?;

        Ok(ConversionResult::new(pdf, Format::Pdf.mime_type()))
    }

    async fn text_to_image(&self, text: &str, target: Format) -> Result<ConversionResult> {
        info!("Rendering {} bytes of text as {}", text.len(), target);
        let owned = text.to_string();
        let encoded = tokio::task::spawn_blocking(move || {
            let canvas = render_text(&owned, target)?;
            encode_image(&DynamicImage::ImageRgb8(canvas), target)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Render task panicked: {}", e)))?
        .map_err(|e| AppError::delegate(Delegate::TextToImage, e))?;

        Ok(ConversionResult::new(encoded, target.mime_type()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_lines(count: usize) -> String {
        (1..=count)
            .map(|n| format!("line {}", n))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_layout_keeps_every_line() {
        let text = numbered_lines(120);
        let pages = layout_pages(&text);

        assert_eq!(pages.len(), 3);
        let flattened: Vec<String> = pages.into_iter().flatten().collect();
        assert_eq!(flattened.len(), 120);
        assert_eq!(flattened.first().unwrap(), "line 1");
        assert_eq!(flattened.last().unwrap(), "line 120");
    }

    #[test]
    fn test_empty_text_is_one_page() {
        assert_eq!(layout_pages("").len(), 1);
    }

    #[test]
    fn test_long_lines_wrap_without_losing_words() {
        let long = "word ".repeat(60);
        let wrapped = wrap_line(long.trim_end(), 30);

        assert!(wrapped.len() > 1);
        assert!(wrapped.iter().all(|l| l.chars().count() <= 30));
        let words: usize = wrapped.iter().map(|l| l.split_whitespace().count()).sum();
        assert_eq!(words, 60);
    }

    #[test]
    fn test_oversized_word_is_broken() {
        let wrapped = wrap_line(&"x".repeat(25), 10);
        assert_eq!(wrapped, vec!["x".repeat(10), "x".repeat(10), "x".repeat(5)]);
    }

    #[test]
    fn test_wrapping_keeps_indentation_and_spacing() {
        let wrapped = wrap_line("    alpha  beta gamma delta", 16);
        assert_eq!(wrapped, vec!["    alpha  beta", "gamma delta"]);
    }

    #[test]
    fn test_wide_indentation_is_dropped_not_looped() {
        let line = format!("{}word", " ".repeat(12));
        assert_eq!(wrap_line(&line, 10), vec!["word"]);
    }

    #[test]
    fn test_canvas_size_rejects_overflow() {
        assert_eq!(canvas_size(2, 3), Some((2 * CELL_SIZE + 40, 3 * LINE_HEIGHT_PX + 40)));
        assert_eq!(canvas_size(usize::MAX, 1), None);
        assert_eq!(canvas_size(1, u32::MAX as usize), None);
    }

    #[tokio::test]
    async fn test_long_text_spans_several_pdf_pages() {
        let engine = TextEngine::new();
        let result = engine.text_to_pdf(&numbered_lines(100)).await.unwrap();

        assert_eq!(result.mime_type, "application/pdf");
        let doc = lopdf::Document::load_mem(&result.payload).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[tokio::test]
    async fn test_short_text_is_one_pdf_page() {
        let engine = TextEngine::new();
        let result = engine.text_to_pdf("hello\nworld").await.unwrap();
        let doc = lopdf::Document::load_mem(&result.payload).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[tokio::test]
    async fn test_text_image_fits_all_lines() {
        let engine = TextEngine::new();
        let result = engine.text_to_image("ab\r\nabcd", Format::Png).await.unwrap();

        assert_eq!(result.mime_type, "image/png");
        let decoded = image::load_from_memory(&result.payload).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (4 * CELL_SIZE + 40, 2 * LINE_HEIGHT_PX + 40));

        // Padding stays white, glyphs put some ink on the canvas
        assert_eq!(decoded.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert!(decoded.pixels().any(|p| p == &Rgb([0, 0, 0])));
    }

    #[tokio::test]
    async fn test_text_pdf_accepts_any_input() {
        let engine = TextEngine::new();
        let long = "-".repeat(5000);
        for text in ["", "\t\r\n   \n\n", long.as_str()] {
            let result = engine.text_to_pdf(text).await.unwrap();
            assert!(result.payload.starts_with(b"%PDF"));
        }
    }

    #[tokio::test]
    async fn test_long_lines_wrap_in_text_images() {
        let engine = TextEngine::new();
        let result = engine
            .text_to_image(&"x".repeat(250), Format::Png)
            .await
            .unwrap();

        let decoded = image::load_from_memory(&result.payload).unwrap();
        assert_eq!(
            (decoded.width(), decoded.height()),
            (IMAGE_COLUMNS as u32 * CELL_SIZE + 40, 3 * LINE_HEIGHT_PX + 40)
        );
    }

    #[tokio::test]
    async fn test_tall_text_image_fails_before_encoding() {
        let engine = TextEngine::new();
        let err = engine
            .text_to_image(&numbered_lines(4000), Format::Jpg)
            .await
            .unwrap_err();

        match err {
            AppError::DelegateFailure { delegate, message } => {
                assert_eq!(delegate, Delegate::TextToImage);
                assert!(message.contains("JPG allows at most 65535 px"), "{}", message);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_webp_text_image_has_a_lower_limit() {
        let engine = TextEngine::new();
        let err = engine
            .text_to_image(&numbered_lines(900), Format::Webp)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::DelegateFailure { delegate: Delegate::TextToImage, .. }
        ));
    }
}
