use crate::error::AnalyzeError;
use crate::flag::SubjectType;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// What an uploaded artifact turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Pdf,
    Image,
    PlainText,
    Unknown,
}

impl ContentKind {
    pub fn subject_type(&self) -> SubjectType {
        match self {
            ContentKind::Pdf => SubjectType::Document,
            ContentKind::Image => SubjectType::Image,
            ContentKind::PlainText => SubjectType::Text,
            ContentKind::Unknown => SubjectType::Unknown,
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            ContentKind::Pdf => ".pdf",
            ContentKind::PlainText => ".txt",
            ContentKind::Image | ContentKind::Unknown => "",
        }
    }
}

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "tif", "tiff", "heic",
];
const TEXT_EXTENSIONS: &[&str] = &["txt", "text", "eml", "csv", "log", "md", "html", "htm"];

fn is_image_magic(bytes: &[u8]) -> bool {
    bytes.starts_with(b"\x89PNG\r\n\x1a\n")
        || bytes.starts_with(&[0xFF, 0xD8, 0xFF])
        || bytes.starts_with(b"GIF87a")
        || bytes.starts_with(b"GIF89a")
        || (bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP")
        || bytes.starts_with(b"II*\0")
        || bytes.starts_with(b"MM\0*")
        || bytes.starts_with(b"BM")
}

/// Decides the content kind from the declared content type, then the file
/// extension, then the leading bytes.
pub fn sniff(file_name: Option<&str>, content_type: Option<&str>, bytes: &[u8]) -> ContentKind {
    let declared = content_type
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_lowercase())
        .unwrap_or_default();
    match declared.as_str() {
        "application/pdf" => return ContentKind::Pdf,
        ct if ct.starts_with("image/") => return ContentKind::Image,
        ct if ct.starts_with("text/") => return ContentKind::PlainText,
        _ => {}
    }

    let extension = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());
    if let Some(ext) = extension.as_deref() {
        if ext == "pdf" {
            return ContentKind::Pdf;
        }
        if IMAGE_EXTENSIONS.contains(&ext) {
            return ContentKind::Image;
        }
        if TEXT_EXTENSIONS.contains(&ext) {
            return ContentKind::PlainText;
        }
    }

    if bytes.starts_with(b"%PDF") {
        ContentKind::Pdf
    } else if is_image_magic(bytes) {
        ContentKind::Image
    } else if !bytes.contains(&0) && std::str::from_utf8(bytes).is_ok() {
        ContentKind::PlainText
    } else {
        ContentKind::Unknown
    }
}

/// An uploaded artifact stored in a request-scoped temporary file.
///
/// The file is removed when the value is dropped.
#[derive(Debug)]
pub struct Upload {
    file: NamedTempFile,
    kind: ContentKind,
    file_name: Option<String>,
}

impl Upload {
    pub fn from_bytes(
        file_name: Option<&str>,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<Self, AnalyzeError> {
        let kind = sniff(file_name, content_type, bytes);

        let mut file = tempfile::Builder::new()
            .prefix("phishlens-")
            .suffix(kind.suffix())
            .tempfile()?;
        file.write_all(bytes)?;
        file.flush()?;

        log::debug!(
            "Stored upload {:?} ({} bytes, {:?}) at {}",
            file_name,
            bytes.len(),
            kind,
            file.path().display()
        );

        Ok(Self {
            file,
            kind,
            file_name: file_name.map(str::to_string),
        })
    }

    /// Copies a local file into a temporary upload, as the offline CLI does.
    pub fn from_path(path: &Path) -> Result<Self, AnalyzeError> {
        let bytes = std::fs::read(path)?;
        let name = path.file_name().and_then(|n| n.to_str());
        Self::from_bytes(name, None, &bytes)
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }
}
