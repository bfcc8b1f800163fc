use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const ARCHIVE_MIME_TYPE: &str = "application/zip";
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Bundle named entries into an in-memory ZIP archive, preserving order.
pub(crate) fn bundle_entries(entries: &[(String, Vec<u8>)]) -> zip::result::ZipResult<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, data) in entries {
        zip.start_file(name.as_str(), options)?;
        zip.write_all(data)?;
    }

    zip.finish()?;
    Ok(buffer)
}
