use crate::engines::{Conversion, ConversionResult, ARCHIVE_EXTENSION};

/// A converted file ready to be handed to the user
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadUnit {
    pub data: ConversionResult,
    pub file_name: String,
}

/// Swap the extension of `file_name` for `extension`.
///
/// Names without an extension (including dot-files such as `.bashrc`) keep
/// their full name and get the new extension appended.
pub fn replace_extension(file_name: &str, extension: &str) -> String {
    let stem = match file_name.rfind('.') {
        Some(index) if index > 0 => &file_name[..index],
        _ => file_name,
    };
    format!("{}.{}", stem, extension)
}

/// Name a conversion outcome for download. A no-op produces nothing.
pub fn package(
    conversion: Conversion,
    original_file_name: &str,
    requested_token: &str,
) -> Option<DownloadUnit> {
    let (data, extension) = match conversion {
        Conversion::NoOpNeeded => return None,
        Conversion::SingleFile(result) => (result, requested_token.trim().to_ascii_lowercase()),
        Conversion::Archive(result) => (result, ARCHIVE_EXTENSION.to_string()),
    };

    Some(DownloadUnit {
        file_name: replace_extension(original_file_name, &extension),
        data,
    })
}
