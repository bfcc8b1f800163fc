use crate::config::Settings;
use crate::engines::{
    work_file_name, Conversion, ConversionResult, ImageDelegate, PdfDelegate, PdfEngine,
    PdfiumRasterizer, RasterEngine, TextDelegate, TextEngine, Transcoder,
};
use crate::error::{AppError, Result};
use crate::format::{canonical_mime, Format, FormatKind, InputFamily};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// A single conversion job, immutable once built
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub source: Vec<u8>,
    pub source_mime_type: String,
    pub file_name: String,
    pub output_token: String,
}

impl ConversionRequest {
    pub fn new(
        source: Vec<u8>,
        source_mime_type: impl Into<String>,
        file_name: impl Into<String>,
        output_token: impl Into<String>,
    ) -> Self {
        Self {
            source,
            source_mime_type: source_mime_type.into(),
            file_name: file_name.into(),
            output_token: output_token.into(),
        }
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.source).into_owned()
    }
}

/// Which delegate handles a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    NoOp,
    ImageToPdf,
    ImageToImage(Format),
    PdfToText,
    PdfToImage(Format),
    TextToPdf,
    TextToImage(Format),
    Transcode(Format),
}

/// Raster formats the text renderer produces
const TEXT_RASTER_FORMATS: &[Format] = &[Format::Png, Format::Jpg, Format::Jpeg, Format::Webp];

/// The decision table: input family × output format.
fn route_for(family: InputFamily, format: Format) -> Option<Route> {
    use FormatKind::*;
    use InputFamily as In;

    let route = match (family, format.kind()) {
        (In::Image, Document) => Route::ImageToPdf,
        (In::Image, Raster) => Route::ImageToImage(format),
        (In::Pdf, Document) | (In::Text, Text) => Route::NoOp,
        (In::Pdf, Text) => Route::PdfToText,
        (In::Pdf, Raster) => Route::PdfToImage(format),
        (In::Text, Document) => Route::TextToPdf,
        (In::Text, Raster) if TEXT_RASTER_FORMATS.contains(&format) => Route::TextToImage(format),
        (In::Audio, Audio) => Route::Transcode(format),
        (In::Video, Audio | Video) => Route::Transcode(format),
        (In::Video, Raster) if format == Format::Gif => Route::Transcode(format),
        _ => return None,
    };
    Some(route)
}

/// Canonical MIME type of the source. Without a usable declared type the
/// file extension stands in, so `clip.mkv` sent as octet-stream is still mkv.
fn source_mime(request: &ConversionRequest) -> String {
    let declared = canonical_mime(&request.source_mime_type);
    if !declared.is_empty() && declared != mime::APPLICATION_OCTET_STREAM.as_ref() {
        return declared;
    }

    Path::new(&request.file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| ext.parse::<Format>().ok())
        .map(|format| format.mime_type().to_string())
        .unwrap_or(declared)
}

/// ffmpeg invocation for one transcode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeJob {
    pub input_name: String,
    pub output_name: String,
    pub args: Vec<String>,
}

impl TranscodeJob {
    pub fn new(file_name: &str, family: InputFamily, format: Format) -> Self {
        let output_name = format!("output.{}", format.extension());
        let mut input_name = work_file_name(file_name, "input");
        if input_name == output_name {
            input_name = format!("source_{}", input_name);
        }

        let mut args: Vec<String> = ["-hide_banner", "-y", "-i"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push(input_name.clone());

        let extra: &[&str] = match format {
            Format::Gif => &["-vf", "fps=10,scale=480:-1:flags=lanczos", "-loop", "0"],
            Format::Mp3 => &["-c:a", "libmp3lame"],
            Format::Aac | Format::M4a => &["-c:a", "aac"],
            _ => &[],
        };
        if family == InputFamily::Video && format.kind() == FormatKind::Audio {
            args.push("-vn".to_string());
        }
        args.extend(extra.iter().map(|s| s.to_string()));
        args.push(output_name.clone());

        Self {
            input_name,
            output_name,
            args,
        }
    }
}

/// Routes a request to exactly one delegate
pub struct ConversionRouter {
    images: Arc<dyn ImageDelegate>,
    pdfs: Arc<dyn PdfDelegate>,
    texts: Arc<dyn TextDelegate>,
}

impl ConversionRouter {
    /// Router over the library-backed engines
    pub fn new(settings: &Settings) -> Self {
        let rasterizer = Arc::new(PdfiumRasterizer::new(settings.pdfium_library_path.clone()));
        Self::with_delegates(
            Arc::new(RasterEngine::new()),
            Arc::new(PdfEngine::new(rasterizer)),
            Arc::new(TextEngine::new()),
        )
    }

    pub fn with_delegates(
        images: Arc<dyn ImageDelegate>,
        pdfs: Arc<dyn PdfDelegate>,
        texts: Arc<dyn TextDelegate>,
    ) -> Self {
        Self {
            images,
            pdfs,
            texts,
        }
    }

    /// Decide the route without running anything
    pub fn plan(request: &ConversionRequest) -> Result<Route> {
        let unsupported = || AppError::UnsupportedConversion(request.source_mime_type.clone());

        let format: Format = request.output_token.parse().map_err(|_| unsupported())?;

        if source_mime(request) == format.mime_type() {
            return Ok(Route::NoOp);
        }

        let family = InputFamily::classify(&request.source_mime_type, &request.file_name)
            .ok_or_else(unsupported)?;

        route_for(family, format).ok_or_else(unsupported)
    }

    /// Run the conversion. The transcoder is only needed for media routes.
    pub async fn route(
        &self,
        request: &ConversionRequest,
        transcoder: Option<&dyn Transcoder>,
    ) -> Result<Conversion> {
        let route = Self::plan(request)?;
        info!("Routing {} → {} via {:?}", request.source_mime_type, request.output_token, route);

        let single = |result: ConversionResult| -> Result<Conversion> {
            Ok(Conversion::SingleFile(result))
        };

        match route {
            Route::NoOp => {
                debug!("Source already in requested format");
                Ok(Conversion::NoOpNeeded)
            }
            Route::ImageToPdf => single(
                self.images
                    .image_to_pdf(&request.source, &request.source_mime_type)
                    .await?,
            ),
            Route::ImageToImage(format) => {
                single(self.images.image_to_image(&request.source, format).await?)
            }
            Route::PdfToText => single(self.pdfs.pdf_to_text(&request.source).await?),
            Route::PdfToImage(format) => self.pdfs.pdf_to_image(&request.source, format).await,
            Route::TextToPdf => single(self.texts.text_to_pdf(&request.text()).await?),
            Route::TextToImage(format) => {
                single(self.texts.text_to_image(&request.text(), format).await?)
            }
            Route::Transcode(format) => {
                let transcoder = transcoder.ok_or_else(|| {
                    AppError::EngineUnavailable("transcoding engine not loaded".to_string())
                })?;

                let family = InputFamily::classify(&request.source_mime_type, &request.file_name)
                    .unwrap_or(InputFamily::Video);
                let job = TranscodeJob::new(&request.file_name, family, format);

                let data = transcoder
                    .transcode(&request.source, &job.input_name, &job.args, &job.output_name)
                    .await?;
                single(ConversionResult::new(data, format.mime_type()))
            }
        }
    }
}
