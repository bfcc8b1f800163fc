use std::fmt;
use std::str::FromStr;

/// Output formats a caller can request, one per lowercase token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Png,
    Jpg,
    Jpeg,
    Webp,
    Ico,
    Bmp,
    Gif,
    Pdf,
    Txt,
    Mp3,
    Wav,
    Flac,
    Ogg,
    Aac,
    M4a,
    Mp4,
    Avi,
    Mov,
    Mkv,
    Webm,
}

/// Broad kind of a format, used by the router's decision table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    Raster,
    Document,
    Text,
    Audio,
    Video,
}

/// Family of an input file, derived from its MIME type or file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFamily {
    Image,
    Pdf,
    Text,
    Audio,
    Video,
}

impl Format {
    pub const ALL: &'static [Format] = &[
        Format::Png,
        Format::Jpg,
        Format::Jpeg,
        Format::Webp,
        Format::Ico,
        Format::Bmp,
        Format::Gif,
        Format::Pdf,
        Format::Txt,
        Format::Mp3,
        Format::Wav,
        Format::Flac,
        Format::Ogg,
        Format::Aac,
        Format::M4a,
        Format::Mp4,
        Format::Avi,
        Format::Mov,
        Format::Mkv,
        Format::Webm,
    ];

    /// Lowercase token, also used as the file extension
    pub fn extension(self) -> &'static str {
        match self {
            Format::Png => "png",
            Format::Jpg => "jpg",
            Format::Jpeg => "jpeg",
            Format::Webp => "webp",
            Format::Ico => "ico",
            Format::Bmp => "bmp",
            Format::Gif => "gif",
            Format::Pdf => "pdf",
            Format::Txt => "txt",
            Format::Mp3 => "mp3",
            Format::Wav => "wav",
            Format::Flac => "flac",
            Format::Ogg => "ogg",
            Format::Aac => "aac",
            Format::M4a => "m4a",
            Format::Mp4 => "mp4",
            Format::Avi => "avi",
            Format::Mov => "mov",
            Format::Mkv => "mkv",
            Format::Webm => "webm",
        }
    }

    /// Uppercase label shown in format pickers
    pub fn label(self) -> String {
        self.extension().to_ascii_uppercase()
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Format::Png => "image/png",
            Format::Jpg | Format::Jpeg => "image/jpeg",
            Format::Webp => "image/webp",
            Format::Ico => "image/x-icon",
            Format::Bmp => "image/bmp",
            Format::Gif => "image/gif",
            Format::Pdf => "application/pdf",
            Format::Txt => "text/plain",
            Format::Mp3 => "audio/mpeg",
            Format::Wav => "audio/wav",
            Format::Flac => "audio/flac",
            Format::Ogg => "audio/ogg",
            Format::Aac => "audio/aac",
            Format::M4a => "audio/mp4",
            Format::Mp4 => "video/mp4",
            Format::Avi => "video/x-msvideo",
            Format::Mov => "video/quicktime",
            Format::Mkv => "video/x-matroska",
            Format::Webm => "video/webm",
        }
    }

    pub fn kind(self) -> FormatKind {
        match self {
            Format::Png
            | Format::Jpg
            | Format::Jpeg
            | Format::Webp
            | Format::Ico
            | Format::Bmp
            | Format::Gif => FormatKind::Raster,
            Format::Pdf => FormatKind::Document,
            Format::Txt => FormatKind::Text,
            Format::Mp3
            | Format::Wav
            | Format::Flac
            | Format::Ogg
            | Format::Aac
            | Format::M4a => FormatKind::Audio,
            Format::Mp4 | Format::Avi | Format::Mov | Format::Mkv | Format::Webm => {
                FormatKind::Video
            }
        }
    }

    /// Encoder used when this format is produced by the `image` crate
    pub fn image_format(self) -> Option<image::ImageFormat> {
        match self {
            Format::Png => Some(image::ImageFormat::Png),
            Format::Jpg | Format::Jpeg => Some(image::ImageFormat::Jpeg),
            Format::Webp => Some(image::ImageFormat::WebP),
            Format::Ico => Some(image::ImageFormat::Ico),
            Format::Bmp => Some(image::ImageFormat::Bmp),
            Format::Gif => Some(image::ImageFormat::Gif),
            _ => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let token = token.trim().to_ascii_lowercase();
        Format::ALL
            .iter()
            .copied()
            .find(|f| f.extension() == token)
            .ok_or_else(|| format!("unknown format token: {}", token))
    }
}

/// Lowercase a MIME type, drop its parameters and fold known aliases
/// onto the type the format table uses.
pub fn canonical_mime(mime_type: &str) -> String {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    let folded = match essence.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg",
        "image/vnd.microsoft.icon" | "image/ico" => "image/x-icon",
        "image/x-ms-bmp" => "image/bmp",
        "audio/x-wav" | "audio/wave" | "audio/vnd.wave" => "audio/wav",
        "audio/x-flac" => "audio/flac",
        "audio/x-m4a" => "audio/mp4",
        "audio/mp3" => "audio/mpeg",
        _ => return essence,
    };
    folded.to_string()
}

fn has_suffix(file_name: &str, suffix: &str) -> bool {
    file_name.to_ascii_lowercase().ends_with(suffix)
}

impl InputFamily {
    /// Classify by MIME type first, then by a few well-known file suffixes
    /// that browsers and clients often report without a MIME type.
    pub fn classify(mime_type: &str, file_name: &str) -> Option<InputFamily> {
        let mime = canonical_mime(mime_type);

        if mime.starts_with("image/") {
            return Some(InputFamily::Image);
        }
        if mime == "application/pdf" {
            return Some(InputFamily::Pdf);
        }
        if mime == "text/plain" {
            return Some(InputFamily::Text);
        }
        if mime.starts_with("audio/") {
            return Some(InputFamily::Audio);
        }
        if mime.starts_with("video/") {
            return Some(InputFamily::Video);
        }

        if has_suffix(file_name, ".flac") {
            Some(InputFamily::Audio)
        } else if has_suffix(file_name, ".mkv") || has_suffix(file_name, ".avi") {
            Some(InputFamily::Video)
        } else if has_suffix(file_name, ".txt") {
            Some(InputFamily::Text)
        } else if has_suffix(file_name, ".pdf") {
            Some(InputFamily::Pdf)
        } else {
            None
        }
    }

    /// Whether conversions of this family need the transcoding engine
    pub fn is_media(self) -> bool {
        matches!(self, InputFamily::Audio | InputFamily::Video)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_parse_case_insensitively() {
        assert_eq!("PNG".parse::<Format>().unwrap(), Format::Png);
        assert_eq!(" Mp3 ".parse::<Format>().unwrap(), Format::Mp3);
        assert_eq!("jpeg".parse::<Format>().unwrap(), Format::Jpeg);
        assert!("docx".parse::<Format>().is_err());
    }

    #[test]
    fn test_every_format_round_trips_through_its_extension() {
        for format in Format::ALL {
            assert_eq!(format.extension().parse::<Format>().unwrap(), *format);
            assert_eq!(format.label(), format.extension().to_uppercase());
        }
    }

    #[test]
    fn test_canonical_mime_folds_aliases() {
        assert_eq!(canonical_mime("image/JPG"), "image/jpeg");
        assert_eq!(canonical_mime("audio/x-wav"), "audio/wav");
        assert_eq!(canonical_mime("text/plain; charset=utf-8"), "text/plain");
        assert_eq!(canonical_mime("video/mp4"), "video/mp4");
    }

    #[test]
    fn test_classify_by_mime_then_suffix() {
        assert_eq!(InputFamily::classify("image/bmp", "a.bmp"), Some(InputFamily::Image));
        assert_eq!(InputFamily::classify("application/pdf", "a"), Some(InputFamily::Pdf));
        assert_eq!(InputFamily::classify("", "song.FLAC"), Some(InputFamily::Audio));
        assert_eq!(
            InputFamily::classify("application/octet-stream", "clip.mkv"),
            Some(InputFamily::Video)
        );
        assert_eq!(InputFamily::classify("", "notes.txt"), Some(InputFamily::Text));
        assert_eq!(InputFamily::classify("application/zip", "bundle.zip"), None);
    }

    #[test]
    fn test_media_families() {
        assert!(InputFamily::Audio.is_media());
        assert!(InputFamily::Video.is_media());
        assert!(!InputFamily::Pdf.is_media());
    }
}
