//! Per-request orchestration for the three entry kinds: uploaded files,
//! directly submitted URLs and raw email text.
//!
//! Each pipeline extracts text and metadata, runs the applicable rules,
//! threads an [`Evidence`] value through the stages and scores the result.
//! Lookup failures never end an assessment; they only mean less evidence.

use crate::config::Config;
use crate::dns::SystemDnsProbe;
use crate::email::{check_return_path, parse_sender_headers};
use crate::enrichment::{DomainEnricher, MAX_EMAIL_LINKS, YOUNG_DOMAIN};
use crate::error::AnalyzeError;
use crate::extract::{ExifImageReader, PdfDocumentReader, TesseractOcr};
use crate::fetch::HttpPageFetcher;
use crate::flag::{Evidence, EvidenceFlag, SubjectType};
use crate::hints::{hints_for, Hints};
use crate::lookup::{
    absorb, bounded, Deadlines, DnsProbe, DocumentReader, ImageMetadataReader, OcrEngine,
    PageFetcher, RegistrationLookup,
};
use crate::metadata::MetadataEvaluator;
use crate::patterns::{email_found, url_found, PatternMatcher};
use crate::scoring::{aggregate, RiskLabel};
use crate::upload::{ContentKind, Upload};
use crate::whois::WhoisClient;
use anyhow::Context;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use url::Url;

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    #[serde(rename = "type")]
    pub subject_type: SubjectType,
    #[serde(rename = "extractedText")]
    pub extracted_text: String,
    pub flags: Vec<EvidenceFlag>,
    pub score: u32,
    pub label: RiskLabel,
    pub hint_en: &'static str,
    pub hint_hi: &'static str,
}

impl Assessment {
    fn finish(subject_type: SubjectType, extracted_text: String, evidence: Evidence) -> Self {
        let flags = evidence.into_flags();
        let totals = aggregate(&flags);
        let Hints { en, hi } = hints_for(totals.label);

        log::info!(
            "Assessed {}: {} flags, score {}, {}",
            subject_type,
            flags.len(),
            totals.score,
            totals.label
        );

        Self {
            subject_type,
            extracted_text,
            flags,
            score: totals.score,
            label: totals.label,
            hint_en: en,
            hint_hi: hi,
        }
    }

    pub fn has_flag(&self, key: &str) -> bool {
        self.flags.iter().any(|f| f.key() == key)
    }
}

/// External collaborators used by the pipelines.
#[derive(Clone)]
pub struct Collaborators {
    pub dns: Arc<dyn DnsProbe>,
    pub registry: Arc<dyn RegistrationLookup>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub ocr: Arc<dyn OcrEngine>,
    pub documents: Arc<dyn DocumentReader>,
    pub images: Arc<dyn ImageMetadataReader>,
}

/// Read-only analysis engine shared by all requests.
pub struct Analyzer {
    matcher: PatternMatcher,
    metadata: MetadataEvaluator,
    enricher: DomainEnricher,
    ocr: Arc<dyn OcrEngine>,
    documents: Arc<dyn DocumentReader>,
    images: Arc<dyn ImageMetadataReader>,
    deadlines: Deadlines,
}

impl Analyzer {
    pub fn new(collaborators: Collaborators, deadlines: Deadlines) -> anyhow::Result<Self> {
        let Collaborators {
            dns,
            registry,
            fetcher,
            ocr,
            documents,
            images,
        } = collaborators;

        Ok(Self {
            matcher: PatternMatcher::new().context("compiling text rules")?,
            metadata: MetadataEvaluator::new().context("compiling metadata rules")?,
            enricher: DomainEnricher::new(dns, registry, fetcher, deadlines)
                .context("compiling page markers")?,
            ocr,
            documents,
            images,
            deadlines,
        })
    }

    /// Analyzer backed by the system resolver, WHOIS, HTTP, tesseract and
    /// the PDF/EXIF parsers.
    pub fn live(config: &Config) -> anyhow::Result<Self> {
        let deadlines = Deadlines::from(&config.timeouts);

        let collaborators = Collaborators {
            dns: Arc::new(SystemDnsProbe::new(deadlines.dns)),
            registry: Arc::new(
                WhoisClient::new(&config.whois, deadlines.registration)
                    .context("building WHOIS client")?,
            ),
            fetcher: Arc::new(
                HttpPageFetcher::new(&config.fetch, deadlines.fetch)
                    .context("building HTTP client")?,
            ),
            ocr: Arc::new(TesseractOcr::new(&config.ocr)),
            documents: Arc::new(PdfDocumentReader::new()),
            images: Arc::new(ExifImageReader::new()),
        };

        Self::new(collaborators, deadlines)
    }

    /// Fails only when the stored artifact itself cannot be read.
    pub async fn analyze_upload(&self, upload: &Upload) -> Result<Assessment, AnalyzeError> {
        let subject = upload.kind().subject_type();
        let path = upload.path();
        let name = upload.file_name().unwrap_or("upload");

        if let Err(e) = tokio::fs::metadata(path).await {
            log::warn!("Stored upload {name} is not readable: {e}");
            return Err(AnalyzeError::Acquisition(e));
        }

        let (text, evidence) = match upload.kind() {
            ContentKind::Pdf => self.document_stage(path, name).await,
            ContentKind::Image => self.image_stage(path, name).await,
            ContentKind::PlainText => self.plain_text_stage(path, name).await?,
            ContentKind::Unknown => self.ocr_stage(path, name).await,
        };

        let evidence = self.enrich_text(evidence, &text).await;
        Ok(Assessment::finish(subject, text, evidence))
    }

    async fn document_stage(&self, path: &Path, name: &str) -> (String, Evidence) {
        let (text, info) = tokio::join!(
            bounded(self.deadlines.metadata, self.documents.text(path)),
            bounded(self.deadlines.metadata, self.documents.info(path)),
        );
        let text = absorb("PDF text extraction", name, text).unwrap_or_default();
        let info = absorb("PDF info extraction", name, info).flatten();

        let evidence = Evidence::new()
            .extend(self.matcher.match_text(&text, SubjectType::Document))
            .extend(
                info.map(|info| self.metadata.evaluate_pdf(&info))
                    .unwrap_or_default(),
            );
        (text, evidence)
    }

    async fn image_stage(&self, path: &Path, name: &str) -> (String, Evidence) {
        let (text, metadata) = tokio::join!(
            bounded(self.deadlines.ocr, self.ocr.recognize(path)),
            bounded(self.deadlines.metadata, self.images.read(path)),
        );
        let text = absorb("OCR", name, text).unwrap_or_default();

        // An unreadable metadata block is no evidence; an absent one is.
        let metadata_flags = absorb("EXIF extraction", name, metadata)
            .map(|metadata| self.metadata.evaluate_image(metadata.as_ref()))
            .unwrap_or_default();

        let evidence = Evidence::new()
            .extend(self.matcher.match_text(&text, SubjectType::Image))
            .extend(metadata_flags);
        (text, evidence)
    }

    async fn ocr_stage(&self, path: &Path, name: &str) -> (String, Evidence) {
        let text = bounded(self.deadlines.ocr, self.ocr.recognize(path)).await;
        let text = absorb("OCR", name, text).unwrap_or_default();

        let evidence = Evidence::new().extend(self.matcher.match_text(&text, SubjectType::Unknown));
        (text, evidence)
    }

    async fn plain_text_stage(
        &self,
        path: &Path,
        name: &str,
    ) -> Result<(String, Evidence), AnalyzeError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            log::warn!("Could not read stored upload {name}: {e}");
            AnalyzeError::Acquisition(e)
        })?;
        let text = String::from_utf8_lossy(&bytes).into_owned();

        let evidence = Evidence::new().extend(self.matcher.match_text(&text, SubjectType::Text));
        Ok((text, evidence))
    }

    /// Email and first-link checks over text recovered from an upload.
    async fn enrich_text(&self, evidence: Evidence, text: &str) -> Evidence {
        let email = self.matcher.first_email(text);
        let url = self.matcher.first_url(text);

        let (domain_flag, age_flag) = tokio::join!(
            async {
                match &email {
                    Some(email) => self.enricher.check_email_domain(email).await,
                    None => None,
                }
            },
            async {
                match &url {
                    Some(url) => self.enricher.check_url_age(url, &YOUNG_DOMAIN).await,
                    None => None,
                }
            },
        );

        evidence
            .with(email.as_deref().map(email_found))
            .with(domain_flag)
            .with(url.as_deref().map(url_found))
            .with(age_flag)
    }

    pub async fn analyze_url(&self, url: &Url) -> Assessment {
        let evidence = Evidence::new().extend(self.enricher.check_url(url).await);
        Assessment::finish(SubjectType::Url, String::new(), evidence)
    }

    pub async fn analyze_email(&self, raw: &str) -> Assessment {
        let headers = parse_sender_headers(raw);
        let email = self.matcher.first_email(raw);
        let links: Vec<String> = self
            .matcher
            .urls(raw)
            .into_iter()
            .take(MAX_EMAIL_LINKS)
            .collect();

        let (domain_flag, link_flags) = tokio::join!(
            async {
                match &email {
                    Some(email) => self.enricher.check_email_domain(email).await,
                    None => None,
                }
            },
            self.enricher.check_link_ages(&links),
        );

        let evidence = Evidence::new()
            .extend(self.matcher.match_text(raw, SubjectType::Email))
            .with(check_return_path(&headers))
            .with(email.as_deref().map(email_found))
            .with(domain_flag)
            .extend(link_flags);

        Assessment::finish(SubjectType::Email, raw.to_string(), evidence)
    }
}

/// Parses a submitted URL, assuming `http://` when no scheme is given.
pub fn normalize_url(input: &str) -> Result<Url, AnalyzeError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AnalyzeError::InvalidInput("url must not be empty".to_string()));
    }

    let candidate = if input.contains("://") {
        input.to_string()
    } else {
        format!("http://{input}")
    };

    let url = Url::parse(&candidate)
        .map_err(|e| AnalyzeError::InvalidInput(format!("unparsable url '{input}': {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(AnalyzeError::InvalidInput(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(AnalyzeError::InvalidInput(format!("url '{input}' has no host"))),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::enrichment::tests::{
        fast_deadlines, FakeDns, FakeFetcher, FakePage, FakeRegistry,
    };
    use crate::lookup::{LookupError, LookupFuture};
    use crate::metadata::{ImageMetadata, PdfInfo};
    use std::time::Duration;

    pub struct FakeOcr {
        pub text: Result<String, LookupError>,
    }

    impl OcrEngine for FakeOcr {
        fn recognize<'a>(&'a self, _path: &'a Path) -> LookupFuture<'a, String> {
            Box::pin(async move { self.text.clone() })
        }
    }

    pub struct FakeDocuments {
        pub text: Result<String, LookupError>,
        pub info: Result<Option<PdfInfo>, LookupError>,
    }

    impl DocumentReader for FakeDocuments {
        fn text<'a>(&'a self, _path: &'a Path) -> LookupFuture<'a, String> {
            Box::pin(async move { self.text.clone() })
        }

        fn info<'a>(&'a self, _path: &'a Path) -> LookupFuture<'a, Option<PdfInfo>> {
            Box::pin(async move { self.info.clone() })
        }
    }

    pub enum FakeExif {
        Found(ImageMetadata),
        Missing,
        Broken,
    }

    impl ImageMetadataReader for FakeExif {
        fn read<'a>(&'a self, _path: &'a Path) -> LookupFuture<'a, Option<ImageMetadata>> {
            Box::pin(async move {
                match self {
                    FakeExif::Found(metadata) => Ok(Some(metadata.clone())),
                    FakeExif::Missing => Ok(None),
                    FakeExif::Broken => Err(LookupError::Malformed("truncated IFD".to_string())),
                }
            })
        }
    }

    pub struct Fakes {
        pub dns: FakeDns,
        pub registry: FakeRegistry,
        pub fetcher: FakeFetcher,
        pub ocr: FakeOcr,
        pub documents: FakeDocuments,
        pub images: FakeExif,
    }

    impl Default for Fakes {
        fn default() -> Self {
            Self {
                dns: FakeDns::default(),
                registry: FakeRegistry::default(),
                fetcher: FakeFetcher::body("<html><body>Welcome</body></html>"),
                ocr: FakeOcr {
                    text: Ok(String::new()),
                },
                documents: FakeDocuments {
                    text: Ok(String::new()),
                    info: Ok(None),
                },
                images: FakeExif::Missing,
            }
        }
    }

    impl Fakes {
        pub fn analyzer(self) -> Analyzer {
            Analyzer::new(
                Collaborators {
                    dns: Arc::new(self.dns),
                    registry: Arc::new(self.registry),
                    fetcher: Arc::new(self.fetcher),
                    ocr: Arc::new(self.ocr),
                    documents: Arc::new(self.documents),
                    images: Arc::new(self.images),
                },
                fast_deadlines(),
            )
            .unwrap()
        }
    }

    fn keys(assessment: &Assessment) -> Vec<&str> {
        assessment.flags.iter().map(|f| f.key()).collect()
    }

    #[tokio::test]
    async fn test_document_pipeline_merges_in_fixed_order() {
        let analyzer = Fakes {
            documents: FakeDocuments {
                text: Ok("SAMPLE degree certificate. Contact registrar@uni-verify.example \
                          or visit https://uni-verify.example/check"
                    .to_string()),
                info: Ok(Some(PdfInfo {
                    creation_date: Some("D:20240101120000".to_string()),
                    mod_date: Some("D:20240301090000".to_string()),
                    producer: Some("iLovePDF".to_string()),
                    creator: None,
                })),
            },
            dns: FakeDns {
                unresolvable: vec!["uni-verify.example".to_string()],
                ..Default::default()
            },
            registry: FakeRegistry::with_ages(&[("uni-verify.example", 4)]),
            ..Default::default()
        }
        .analyzer();

        let upload = Upload::from_bytes(Some("degree.pdf"), None, b"%PDF-1.4").unwrap();
        let assessment = analyzer.analyze_upload(&upload).await.unwrap();

        assert_eq!(assessment.subject_type, SubjectType::Document);
        assert_eq!(
            keys(&assessment),
            vec![
                "suspicious_text",
                "pdf_modified",
                "pdf_tool",
                "email_found",
                "email_domain_unresolvable",
                "url_found",
                "young_domain",
            ]
        );
        assert_eq!(assessment.score, 3 + 1 + 1 + 0 + 2 + 0 + 2);
        assert_eq!(assessment.label, RiskLabel::High);
        assert!(assessment.extracted_text.contains("SAMPLE"));
    }

    #[tokio::test]
    async fn test_document_extraction_failure_is_absorbed() {
        let analyzer = Fakes {
            documents: FakeDocuments {
                text: Err(LookupError::Malformed("bad xref".to_string())),
                info: Err(LookupError::Timeout),
            },
            ..Default::default()
        }
        .analyzer();

        let upload = Upload::from_bytes(Some("broken.pdf"), None, b"%PDF-").unwrap();
        let assessment = analyzer.analyze_upload(&upload).await.unwrap();

        assert_eq!(assessment.extracted_text, "");
        assert!(assessment.flags.is_empty());
        assert_eq!(assessment.score, 0);
        assert_eq!(assessment.label, RiskLabel::Low);
    }

    #[tokio::test]
    async fn test_image_pipeline() {
        let analyzer = Fakes {
            ocr: FakeOcr {
                text: Ok("Share the OTP to claim your refund".to_string()),
            },
            images: FakeExif::Found(ImageMetadata {
                software: Some("Adobe Photoshop 25.0".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
        .analyzer();

        let upload = Upload::from_bytes(Some("receipt.png"), Some("image/png"), b"\x89PNG").unwrap();
        let assessment = analyzer.analyze_upload(&upload).await.unwrap();

        assert_eq!(assessment.subject_type, SubjectType::Image);
        assert_eq!(
            keys(&assessment),
            vec!["sensitive_request", "no_capture_date", "edited_image"]
        );
        assert_eq!(assessment.score, 6);
        assert_eq!(assessment.label, RiskLabel::High);
    }

    #[tokio::test]
    async fn test_image_without_metadata_vs_unreadable_metadata() {
        let missing = Fakes::default().analyzer();
        let upload = Upload::from_bytes(Some("a.jpg"), None, &[0xFF, 0xD8, 0xFF]).unwrap();
        assert_eq!(keys(&missing.analyze_upload(&upload).await.unwrap()), vec!["no_exif"]);

        let broken = Fakes {
            images: FakeExif::Broken,
            ..Default::default()
        }
        .analyzer();
        assert!(broken.analyze_upload(&upload).await.unwrap().flags.is_empty());
    }

    #[tokio::test]
    async fn test_gif_upload_without_exif_container() {
        let mut analyzer = Fakes::default().analyzer();
        analyzer.images = Arc::new(ExifImageReader::new());

        let upload = Upload::from_bytes(
            Some("banner.gif"),
            Some("image/gif"),
            b"GIF89a\x01\x00\x01\x00\x80\x00\x00;",
        )
        .unwrap();
        let assessment = analyzer.analyze_upload(&upload).await.unwrap();

        assert_eq!(assessment.subject_type, SubjectType::Image);
        assert_eq!(keys(&assessment), vec!["no_exif"]);
        assert_eq!(assessment.score, 1);
    }

    #[tokio::test]
    async fn test_unreadable_stored_upload_is_an_acquisition_error() {
        let analyzer = Fakes::default().analyzer();

        for (name, bytes) in [
            ("notice.txt", &b"verify your account"[..]),
            ("scan.pdf", &b"%PDF-1.4"[..]),
        ] {
            let upload = Upload::from_bytes(Some(name), None, bytes).unwrap();
            std::fs::remove_file(upload.path()).unwrap();

            let outcome = analyzer.analyze_upload(&upload).await;
            assert!(
                matches!(outcome, Err(AnalyzeError::Acquisition(_))),
                "{name}: {outcome:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_unknown_content_falls_back_to_ocr() {
        let analyzer = Fakes {
            ocr: FakeOcr {
                text: Ok("DEMO voucher".to_string()),
            },
            ..Default::default()
        }
        .analyzer();

        let upload = Upload::from_bytes(None, None, &[0x00, 0x01, 0xFE, 0xFF]).unwrap();
        let assessment = analyzer.analyze_upload(&upload).await.unwrap();
        assert_eq!(assessment.subject_type, SubjectType::Unknown);
        assert_eq!(keys(&assessment), vec!["suspicious_image_text"]);
    }

    #[tokio::test]
    async fn test_plain_text_pipeline() {
        let analyzer = Fakes::default().analyzer();
        let upload = Upload::from_bytes(
            Some("message.txt"),
            None,
            b"Urgent: your account will be blocked. Pay now via UPI.",
        )
        .unwrap();

        let assessment = analyzer.analyze_upload(&upload).await.unwrap();
        assert_eq!(assessment.subject_type, SubjectType::Text);
        assert_eq!(keys(&assessment), vec!["phishy_text", "sensitive_request"]);
        assert_eq!(assessment.score, 6);
    }

    #[tokio::test]
    async fn test_url_fetch_timeout_still_succeeds() {
        let analyzer = Fakes {
            fetcher: FakeFetcher {
                page: FakePage::Hang,
            },
            ..Default::default()
        }
        .analyzer();

        let url = normalize_url("slow.example/login").unwrap();
        let assessment = analyzer.analyze_url(&url).await;

        assert_eq!(assessment.subject_type, SubjectType::Url);
        assert_eq!(keys(&assessment), vec!["content_unavailable"]);
        assert_eq!(assessment.flags[0].weight(), 2);
        assert_eq!(assessment.label, RiskLabel::Low);
    }

    #[tokio::test]
    async fn test_email_pipeline() {
        let raw = "From: Support <a@good.com>\r\n\
                   Return-Path: <x@evil.com>\r\n\
                   Subject: Action required\r\n\
                   \r\n\
                   Your account will be suspended. Click here:\r\n\
                   https://one.example/a https://two.example/b https://one.example/a \
                   https://three.example/c https://four.example/d\r\n";

        let analyzer = Fakes {
            registry: FakeRegistry::with_ages(&[
                ("one.example", 3),
                ("two.example", 2000),
                ("three.example", 12),
                ("four.example", 1),
            ]),
            ..Default::default()
        }
        .analyzer();

        let assessment = analyzer.analyze_email(raw).await;
        assert_eq!(
            keys(&assessment),
            vec![
                "phishy_text",
                "return_path_mismatch",
                "email_found",
                "young_link_1",
                "young_link_3",
            ]
        );
        assert_eq!(assessment.score, 3 + 2 + 0 + 2 + 2);
        assert_eq!(assessment.label, RiskLabel::High);
        assert!(!assessment.has_flag("sensitive_request"));
    }

    #[tokio::test]
    async fn test_email_without_headers_or_links() {
        let analyzer = Fakes::default().analyzer();
        let assessment = analyzer.analyze_email("hello there, lunch tomorrow?").await;
        assert!(assessment.flags.is_empty());
        assert_eq!(assessment.label, RiskLabel::Low);
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("example.com/path").unwrap().as_str(),
            "http://example.com/path"
        );
        assert_eq!(
            normalize_url(" https://Example.com ").unwrap().host_str(),
            Some("example.com")
        );
        assert!(matches!(
            normalize_url(""),
            Err(AnalyzeError::InvalidInput(_))
        ));
        assert!(matches!(
            normalize_url("ftp://files.example"),
            Err(AnalyzeError::InvalidInput(_))
        ));
        assert!(matches!(
            normalize_url("http://"),
            Err(AnalyzeError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_assessment_json_shape() {
        let evidence = Evidence::new().with(email_found("a@b.com"));
        let assessment = Assessment::finish(SubjectType::Text, "a@b.com".to_string(), evidence);
        let json = serde_json::to_value(&assessment).unwrap();

        assert_eq!(json["type"], "text");
        assert_eq!(json["extractedText"], "a@b.com");
        assert_eq!(json["score"], 0);
        assert_eq!(json["label"], "Low Risk");
        assert_eq!(json["flags"][0]["key"], "email_found");
        assert!(json["hint_en"].is_string());
        assert!(json["hint_hi"].is_string());
    }

    #[tokio::test]
    async fn test_slow_ocr_is_bounded() {
        struct SlowOcr;
        impl OcrEngine for SlowOcr {
            fn recognize<'a>(&'a self, _path: &'a Path) -> LookupFuture<'a, String> {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok("fake".to_string())
                })
            }
        }

        let mut analyzer = Fakes::default().analyzer();
        analyzer.ocr = Arc::new(SlowOcr);

        let upload = Upload::from_bytes(None, None, &[0x00, 0xFF]).unwrap();
        let assessment = analyzer.analyze_upload(&upload).await.unwrap();
        assert!(assessment.flags.is_empty());
    }
}
