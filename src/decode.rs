//! Response decoding: raw upstream bytes to a base64 PNG payload.
//!
//! NovelAI may answer with a bare PNG or with a ZIP archive containing one.
//! Classification is by magic-number sniffing on the leading bytes. Pure
//! transform over the byte sequence; no network I/O.

use crate::error::Error;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use std::io::{Cursor, Read};
use zip::ZipArchive;

/// ZIP local-file-header signature prefix.
const ZIP_MAGIC: [u8; 2] = [0x50, 0x4B];

/// PNG signature prefix.
const PNG_MAGIC: [u8; 2] = [0x89, 0x50];

/// Decode an upstream response body into base64-encoded PNG text.
///
/// A ZIP body is opened and the first entry whose name ends in `.png` is
/// extracted; a PNG body is used unchanged. The base64 output is stripped of
/// any CR/LF characters, guarding against encoders that wrap their output.
pub fn decode_image(bytes: &[u8]) -> Result<String, Error> {
    let png = if bytes.starts_with(&ZIP_MAGIC) {
        extract_png_from_archive(bytes)?
    } else if bytes.starts_with(&PNG_MAGIC) {
        bytes.to_vec()
    } else {
        let magic: String = bytes.iter().take(4).map(|b| format!("{b:02x}")).collect();
        return Err(Error::UnrecognizedImageFormat { magic });
    };

    let mut encoded = BASE64.encode(&png);
    encoded.retain(|c| c != '\r' && c != '\n');
    Ok(encoded)
}

/// Scan archive entries in listing order and return the bytes of the first
/// `.png`-suffixed entry.
fn extract_png_from_archive(bytes: &[u8]) -> Result<Vec<u8>, Error> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| Error::Archive(e.to_string()))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| Error::Archive(e.to_string()))?;
        if entry.name().ends_with(".png") {
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut data)
                .map_err(|e| Error::Archive(e.to_string()))?;
            return Ok(data);
        }
    }

    Err(Error::NoImageInArchive)
}
