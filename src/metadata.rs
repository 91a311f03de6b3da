use crate::flag::{EvidenceFlag, Rule};
use regex::Regex;

/// Document information dictionary entries of a PDF.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdfInfo {
    pub creation_date: Option<String>,
    pub mod_date: Option<String>,
    pub producer: Option<String>,
    pub creator: Option<String>,
}

/// EXIF fields of an image that the evaluator looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageMetadata {
    pub date_time_original: Option<String>,
    pub date_time: Option<String>,
    pub software: Option<String>,
    /// Producer-like fields (processing software, host computer).
    pub processing_software: Option<String>,
}

pub const PDF_MODIFIED: Rule = Rule::new(
    "pdf_modified",
    1,
    "The modification date differs from the creation date, so the file was saved again after it was first produced.",
);

pub const PDF_TOOL: Rule = Rule::new(
    "pdf_tool",
    1,
    "Official documents are usually generated by issuing systems, not by converters, online editors or phone scanners.",
);

pub const NO_EXIF: Rule = Rule::new(
    "no_exif",
    1,
    "Camera photos normally carry EXIF metadata; screenshots and edited exports often do not.",
);

pub const NO_CAPTURE_DATE: Rule = Rule::new(
    "no_capture_date",
    1,
    "The metadata has no capture or creation date, which is typical of re-exported images.",
);

pub const EDITED_IMAGE: Rule = Rule::new(
    "edited_image",
    2,
    "The image was last written by editing or conversion software.",
);

const PDF_TOOL_PATTERN: &str = r"(?i)(ilovepdf|smallpdf|sejda|pdfescape|pdf24|online2pdf|pdfcandy|soda\s?pdf|camscanner|adobe\s+scan|genius\s+scan|microsoft.{0,10}print\s+to\s+pdf|wkhtmltopdf|canva|convert|online|scanner)";

const IMAGE_EDITOR_PATTERN: &str =
    r"(?i)(photoshop|gimp|lightroom|snapseed|picsart|canva|paint\.net|pixlr|affinity|facetune|photopea)";

const IMAGE_CONVERTER_PATTERN: &str = r"(?i)(imagemagick|graphicsmagick|ezgif|convert|online)";

/// Turns extracted document and image metadata into flags.
#[derive(Debug)]
pub struct MetadataEvaluator {
    pdf_tool: Regex,
    image_editor: Regex,
    image_converter: Regex,
}

impl MetadataEvaluator {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            pdf_tool: Regex::new(PDF_TOOL_PATTERN)?,
            image_editor: Regex::new(IMAGE_EDITOR_PATTERN)?,
            image_converter: Regex::new(IMAGE_CONVERTER_PATTERN)?,
        })
    }

    pub fn evaluate_pdf(&self, info: &PdfInfo) -> Vec<EvidenceFlag> {
        let mut flags = Vec::new();

        if let (Some(created), Some(modified)) = (
            non_empty(info.creation_date.as_deref()),
            non_empty(info.mod_date.as_deref()),
        ) {
            if created != modified {
                flags.push(PDF_MODIFIED.fire(format!(
                    "Possible post-creation edit (created {created}, modified {modified})"
                )));
            }
        }

        let tool = [info.producer.as_deref(), info.creator.as_deref()]
            .into_iter()
            .flatten()
            .find(|value| self.pdf_tool.is_match(value));
        if let Some(tool) = tool {
            flags.push(PDF_TOOL.fire(format!(
                "Produced with a converter or scanner tool: {}",
                tool.trim()
            )));
        }

        flags
    }

    /// `None` means the extractor found no metadata block at all.
    pub fn evaluate_image(&self, metadata: Option<&ImageMetadata>) -> Vec<EvidenceFlag> {
        let Some(metadata) = metadata else {
            return vec![NO_EXIF.fire("No camera metadata found in the image")];
        };

        let mut flags = Vec::new();

        if non_empty(metadata.date_time_original.as_deref()).is_none()
            && non_empty(metadata.date_time.as_deref()).is_none()
        {
            flags.push(NO_CAPTURE_DATE.fire("Image metadata has no capture or creation date"));
        }

        let editor = non_empty(metadata.software.as_deref())
            .filter(|software| self.image_editor.is_match(software));
        let converter = non_empty(metadata.processing_software.as_deref())
            .filter(|producer| self.image_converter.is_match(producer));
        if let Some(tool) = editor.or(converter) {
            flags.push(EDITED_IMAGE.fire(format!("Image was processed with {tool}")));
        }

        flags
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
