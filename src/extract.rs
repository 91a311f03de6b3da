//! File-backed collaborators: PDF text and document info, EXIF metadata and
//! OCR through the `tesseract` command line tool.

use crate::config::OcrConfig;
use crate::lookup::{DocumentReader, ImageMetadataReader, LookupError, LookupFuture, OcrEngine};
use crate::metadata::{ImageMetadata, PdfInfo};
use lopdf::{Dictionary, Object};
use std::io::BufRead;
use std::path::Path;
use std::process::Stdio;

/// Runs a blocking parser on the blocking pool. A panicking parser is
/// reported as an unavailable lookup.
async fn blocking<T>(path: &Path, work: fn(&Path) -> Result<T, LookupError>) -> Result<T, LookupError>
where
    T: Send + 'static,
{
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || work(&path))
        .await
        .map_err(|e| LookupError::Unavailable(format!("extractor task failed: {e}")))?
}

#[derive(Debug, Default)]
pub struct PdfDocumentReader;

impl PdfDocumentReader {
    pub fn new() -> Self {
        Self
    }
}

fn read_pdf_text(path: &Path) -> Result<String, LookupError> {
    pdf_extract::extract_text(path).map_err(|e| LookupError::Malformed(e.to_string()))
}

fn read_pdf_info(path: &Path) -> Result<Option<PdfInfo>, LookupError> {
    let doc = lopdf::Document::load(path).map_err(|e| LookupError::Malformed(e.to_string()))?;

    let info = match doc.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => doc.get_object(*id).and_then(|o| o.as_dict()).ok(),
        Ok(Object::Dictionary(dict)) => Some(dict),
        _ => None,
    };
    let Some(info) = info else {
        return Ok(None);
    };

    Ok(Some(PdfInfo {
        creation_date: info_string(info, b"CreationDate"),
        mod_date: info_string(info, b"ModDate"),
        producer: info_string(info, b"Producer"),
        creator: info_string(info, b"Creator"),
    }))
}

fn info_string(dict: &Dictionary, key: &[u8]) -> Option<String> {
    let value = match dict.get(key).ok()? {
        Object::String(bytes, _) => decode_pdf_text(bytes),
        Object::Name(name) => String::from_utf8_lossy(name).into_owned(),
        _ => return None,
    };
    let value = value.trim().to_string();
    (!value.is_empty()).then_some(value)
}

/// Decodes a PDF text string: UTF-16BE with a byte order mark, otherwise
/// single-byte PDFDocEncoding (read as Latin-1).
pub fn decode_pdf_text(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}

impl DocumentReader for PdfDocumentReader {
    fn text<'a>(&'a self, path: &'a Path) -> LookupFuture<'a, String> {
        Box::pin(blocking(path, read_pdf_text))
    }

    fn info<'a>(&'a self, path: &'a Path) -> LookupFuture<'a, Option<PdfInfo>> {
        Box::pin(blocking(path, read_pdf_info))
    }
}

#[derive(Debug, Default)]
pub struct ExifImageReader;

impl ExifImageReader {
    pub fn new() -> Self {
        Self
    }
}

// ProcessingSoftware and HostComputer, looked up by number.
const PROCESSING_SOFTWARE: exif::Tag = exif::Tag(exif::Context::Tiff, 0x000b);
const HOST_COMPUTER: exif::Tag = exif::Tag(exif::Context::Tiff, 0x013c);

/// GIF and BMP have no EXIF container at all.
fn may_carry_exif(header: &[u8]) -> bool {
    !(header.starts_with(b"GIF87a") || header.starts_with(b"GIF89a") || header.starts_with(b"BM"))
}

fn read_exif(path: &Path) -> Result<Option<ImageMetadata>, LookupError> {
    let file = std::fs::File::open(path).map_err(|e| LookupError::Unavailable(e.to_string()))?;
    let mut reader = std::io::BufReader::new(file);

    let header = reader
        .fill_buf()
        .map_err(|e| LookupError::Unavailable(e.to_string()))?;
    if !may_carry_exif(header) {
        return Ok(None);
    }

    let exif = match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => exif,
        Err(exif::Error::NotFound(_)) => return Ok(None),
        Err(exif::Error::InvalidFormat(msg)) if msg == "Unknown image format" => {
            return Ok(None)
        }
        Err(e) => return Err(LookupError::Malformed(e.to_string())),
    };

    Ok(Some(ImageMetadata {
        date_time_original: exif_text(&exif, exif::Tag::DateTimeOriginal),
        date_time: exif_text(&exif, exif::Tag::DateTime),
        software: exif_text(&exif, exif::Tag::Software),
        processing_software: exif_text(&exif, PROCESSING_SOFTWARE)
            .or_else(|| exif_text(&exif, HOST_COMPUTER)),
    }))
}

fn exif_text(exif: &exif::Exif, tag: exif::Tag) -> Option<String> {
    let field = exif.get_field(tag, exif::In::PRIMARY)?;
    let value = match &field.value {
        exif::Value::Ascii(parts) => parts
            .iter()
            .map(|part| String::from_utf8_lossy(part).trim_matches('\0').trim().to_string())
            .find(|s| !s.is_empty())?,
        _ => field.display_value().to_string(),
    };
    (!value.is_empty()).then_some(value)
}

impl ImageMetadataReader for ExifImageReader {
    fn read<'a>(&'a self, path: &'a Path) -> LookupFuture<'a, Option<ImageMetadata>> {
        Box::pin(blocking(path, read_exif))
    }
}

/// OCR through an external `tesseract` binary. The child process is killed
/// if the lookup is dropped, e.g. when its deadline expires.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    command: String,
    language: String,
}

impl TesseractOcr {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            command: config.command.clone(),
            language: config.language.clone(),
        }
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize<'a>(&'a self, path: &'a Path) -> LookupFuture<'a, String> {
        Box::pin(async move {
            let output = tokio::process::Command::new(&self.command)
                .arg(path)
                .arg("stdout")
                .arg("-l")
                .arg(&self.language)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| LookupError::Unavailable(format!("{}: {e}", self.command)))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(LookupError::Unavailable(format!(
                    "{} exited with {}: {}",
                    self.command,
                    output.status,
                    stderr.trim()
                )));
            }

            let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
            log::debug!("OCR extracted {} characters from {}", text.len(), path.display());
            Ok(text)
        })
    }
}
