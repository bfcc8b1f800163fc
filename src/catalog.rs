use crate::format::{canonical_mime, Format};
use Format::*;

/// Configured output formats per input MIME type, in picker order.
const ENTRIES: &[(&str, &[Format])] = &[
    // Images
    ("image/png", &[Jpg, Webp, Pdf, Ico]),
    ("image/jpeg", &[Png, Webp, Pdf, Ico]),
    ("image/webp", &[Png, Jpg, Pdf, Ico]),
    ("image/bmp", &[Png, Jpg, Webp, Pdf]),
    ("application/pdf", &[Png, Jpg, Webp, Txt]),
    // Text
    ("text/plain", &[Pdf, Png, Jpg]),
    // Audio
    ("audio/mpeg", &[Wav, Flac, Ogg, Aac, M4a]),
    ("audio/wav", &[Mp3, Flac, Ogg, Aac, M4a]),
    ("audio/x-wav", &[Mp3, Flac, Ogg, Aac, M4a]),
    ("audio/flac", &[Mp3, Wav, Ogg, Aac, M4a]),
    ("audio/x-flac", &[Mp3, Wav, Ogg, Aac, M4a]),
    ("audio/ogg", &[Mp3, Wav, Flac, Aac]),
    ("audio/x-m4a", &[Mp3, Wav, Flac, Ogg]),
    ("audio/mp4", &[Mp3, Wav, Flac, Ogg]),
    // Video
    ("video/mp4", &[Mp3, Gif, Avi, Mov, Mkv, Webm, Flac, Wav]),
    ("video/quicktime", &[Mp4, Mp3, Gif, Avi, Mkv, Webm]),
    ("video/webm", &[Mp4, Mp3, Gif, Avi, Mkv, Mov]),
    ("video/x-msvideo", &[Mp4, Mp3, Gif, Webm, Mov, Mkv]),
    ("video/x-matroska", &[Mp4, Mp3, Gif, Avi, Mov, Webm]),
];

const IMAGE_FALLBACK: &[Format] = &[Png, Jpg, Pdf];
const VIDEO_FALLBACK: &[Format] = &[Mp4, Mp3, Gif, Avi];
const AUDIO_FALLBACK: &[Format] = &[Mp3, Wav, Flac];
const FLAC_FALLBACK: &[Format] = &[Mp3, Wav, Ogg, Aac];
const MKV_FALLBACK: &[Format] = &[Mp4, Avi, Mp3];
const TXT_FALLBACK: &[Format] = &[Pdf, Png, Jpg];

fn configured(mime_type: &str) -> Option<&'static [Format]> {
    ENTRIES
        .iter()
        .find(|(mime, _)| *mime == mime_type)
        .map(|(_, formats)| *formats)
}

/// Static table of legal output formats.
pub struct FormatCatalog;

impl FormatCatalog {
    /// Output formats for a file. An empty slice means nothing can be offered.
    pub fn lookup(mime_type: &str, file_name: &str) -> &'static [Format] {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        if let Some(formats) = configured(&essence) {
            return formats;
        }

        // Aliases like image/jpg land on their canonical entry
        let canonical = canonical_mime(&essence);
        if let Some(formats) = configured(&canonical) {
            return formats;
        }

        let name = file_name.to_ascii_lowercase();
        if canonical.starts_with("image/") {
            IMAGE_FALLBACK
        } else if canonical.starts_with("video/") {
            VIDEO_FALLBACK
        } else if canonical.starts_with("audio/") {
            AUDIO_FALLBACK
        } else if name.ends_with(".flac") {
            FLAC_FALLBACK
        } else if name.ends_with(".mkv") {
            MKV_FALLBACK
        } else if name.ends_with(".txt") {
            TXT_FALLBACK
        } else {
            &[]
        }
    }

    /// Every configured MIME type with its formats
    pub fn entries() -> impl Iterator<Item = (&'static str, &'static [Format])> {
        ENTRIES.iter().copied()
    }

    /// Uppercase labels for a lookup result
    pub fn labels(formats: &[Format]) -> Vec<String> {
        formats.iter().map(|f| f.label()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert_eq!(
            FormatCatalog::lookup("application/pdf", "report.pdf"),
            &[Png, Jpg, Webp, Txt]
        );
        assert_eq!(FormatCatalog::lookup("IMAGE/BMP", "x.bmp"), &[Png, Jpg, Webp, Pdf]);
    }

    #[test]
    fn test_alias_uses_canonical_entry() {
        assert_eq!(FormatCatalog::lookup("image/jpg", "a.jpg"), &[Png, Webp, Pdf, Ico]);
    }

    #[test]
    fn test_prefix_fallback() {
        assert_eq!(FormatCatalog::lookup("image/gif", "a.gif"), IMAGE_FALLBACK);
        assert_eq!(FormatCatalog::lookup("video/ogg", "a.ogv"), VIDEO_FALLBACK);
        assert_eq!(FormatCatalog::lookup("audio/opus", "a.opus"), AUDIO_FALLBACK);
    }

    #[test]
    fn test_suffix_fallback() {
        assert_eq!(FormatCatalog::lookup("", "track.flac"), FLAC_FALLBACK);
        assert_eq!(
            FormatCatalog::lookup("application/octet-stream", "movie.mkv"),
            MKV_FALLBACK
        );
        assert_eq!(FormatCatalog::lookup("", "notes.TXT"), TXT_FALLBACK);
    }

    #[test]
    fn test_no_match_is_empty() {
        assert!(FormatCatalog::lookup("application/zip", "a.zip").is_empty());
        assert!(FormatCatalog::lookup("", "").is_empty());
    }

    #[test]
    fn test_labels_are_uppercase_in_order() {
        let labels = FormatCatalog::labels(FormatCatalog::lookup("text/plain", "a.txt"));
        assert_eq!(labels, vec!["PDF", "PNG", "JPG"]);
    }
}
