use crate::models::Settings;
use crate::services::audit::{AuditSink, AuditStatus};
use crate::services::relocate::{Relocation, relocate};
use anyhow::{Result, anyhow};
use base64::Engine as _;
use base64::alphabet;
use base64::engine::{GeneralPurpose, GeneralPurposeConfig};
use camino::{Utf8Path, Utf8PathBuf};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::fs;
use std::io;
use thiserror::Error;

/// Local element name carrying the embedded document.
pub const EMBEDDED_ELEMENT: &[u8] = b"EmbeddedDocumentBinaryObject";

/// Standard alphabet with padding; non-zero trailing bits are tolerated.
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Reasons a single document could not be converted.
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("XML parse error: {0}")]
    Parse(String),

    #[error("No embedded document found")]
    MissingPayload,

    #[error("Embedded document contains no data")]
    EmptyPayload,

    #[error("Failed to decode Base64 data: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Failed to create output directory {path}: {source}")]
    OutputDirectory {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write PDF {path}: {source}")]
    WritePdf {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result of processing one XML document.
#[derive(Debug)]
pub enum ConversionOutcome {
    Converted {
        pdf_path: Utf8PathBuf,
        relocation: Relocation,
    },
    Failed {
        error: ConversionError,
        /// `None` when no failed directory is configured.
        relocation: Option<Relocation>,
    },
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Converted { .. })
    }

    /// Output PDF path on success, error message on failure.
    pub fn detail(&self) -> String {
        match self {
            ConversionOutcome::Converted { pdf_path, .. } => pdf_path.to_string(),
            ConversionOutcome::Failed { error, .. } => error.to_string(),
        }
    }

    pub fn pdf_path(&self) -> Option<&Utf8Path> {
        match self {
            ConversionOutcome::Converted { pdf_path, .. } => Some(pdf_path),
            ConversionOutcome::Failed { .. } => None,
        }
    }
}

/// Locate the first embedded document element and return its text.
///
/// Elements are matched on their local name only, so any namespace prefix
/// (or none) is accepted. The whole document is read so that malformed XML
/// after the element is still reported as a parse error, including content
/// outside the single document element.
pub fn extract_embedded_payload(xml: &[u8]) -> Result<String, ConversionError> {
    let mut reader = Reader::from_reader(xml);

    let mut depth = 0usize;
    let mut seen_root = false;
    let mut root_closed = false;
    let mut payload: Option<String> = None;
    let mut capturing = false;

    loop {
        let event = reader.read_event().map_err(|e| {
            ConversionError::Parse(format!("{e} at position {}", reader.error_position()))
        })?;

        match event {
            Event::Start(ref e) => {
                if root_closed {
                    return Err(junk_after_root());
                }
                capturing = false;
                if payload.is_none() && e.local_name().as_ref() == EMBEDDED_ELEMENT {
                    payload = Some(String::new());
                    capturing = true;
                }
                depth += 1;
                seen_root = true;
            }
            Event::Empty(ref e) => {
                if root_closed {
                    return Err(junk_after_root());
                }
                capturing = false;
                if payload.is_none() && e.local_name().as_ref() == EMBEDDED_ELEMENT {
                    payload = Some(String::new());
                }
                seen_root = true;
                root_closed = depth == 0;
            }
            Event::End(_) => {
                capturing = false;
                depth = depth.saturating_sub(1);
                root_closed = depth == 0;
            }
            Event::Text(ref e) if depth == 0 => {
                if e.iter().any(|b| !b.is_ascii_whitespace()) {
                    return Err(if seen_root {
                        junk_after_root()
                    } else {
                        ConversionError::Parse("text before document element".to_string())
                    });
                }
            }
            Event::CData(_) if depth == 0 => {
                return Err(if seen_root {
                    junk_after_root()
                } else {
                    ConversionError::Parse("text before document element".to_string())
                });
            }
            Event::Text(ref e) if capturing => {
                let text = e
                    .unescape()
                    .map_err(|err| ConversionError::Parse(err.to_string()))?;
                if let Some(buffer) = payload.as_mut() {
                    buffer.push_str(&text);
                }
            }
            Event::CData(ref e) if capturing => {
                if let Some(buffer) = payload.as_mut() {
                    buffer.push_str(&String::from_utf8_lossy(e));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err(ConversionError::Parse("no element found".to_string()));
    }
    if depth != 0 {
        return Err(ConversionError::Parse(
            "unclosed element at end of document".to_string(),
        ));
    }

    let payload = payload.ok_or(ConversionError::MissingPayload)?;
    if payload.trim().is_empty() {
        return Err(ConversionError::EmptyPayload);
    }

    Ok(payload)
}

fn junk_after_root() -> ConversionError {
    ConversionError::Parse("junk after document element".to_string())
}

/// Decode Base64 text, ignoring the line breaks and indentation that wrap it
/// inside XML.
pub fn decode_payload(text: &str) -> Result<Vec<u8>, ConversionError> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Err(ConversionError::EmptyPayload);
    }

    Ok(BASE64.decode(compact.as_bytes())?)
}

/// PDF file name for an XML document: same stem, `.pdf` extension.
pub fn pdf_file_name(xml_path: &Utf8Path) -> String {
    let stem = xml_path
        .file_stem()
        .or_else(|| xml_path.file_name())
        .unwrap_or("document");
    format!("{stem}.pdf")
}

/// Converts PEPPOL/UBL XML documents into standalone PDF files.
///
/// Processes one document at a time:
/// 1. Parse the XML and find the first `EmbeddedDocumentBinaryObject`
/// 2. Base64-decode its text
/// 3. Write `<stem>.pdf` into the output directory (or next to the source)
/// 4. Record the outcome and move the source to the output or failed directory
///
/// Exactly one outcome is produced per document; relocation and audit
/// problems are logged but never change it.
pub struct ConversionService<A> {
    settings: Settings,
    audit: A,
}

impl<A: AuditSink> ConversionService<A> {
    pub fn new(settings: Settings, audit: A) -> Self {
        Self { settings, audit }
    }

    pub fn audit(&self) -> &A {
        &self.audit
    }

    pub fn audit_mut(&mut self) -> &mut A {
        &mut self.audit
    }

    /// Process one XML document.
    ///
    /// Conversion failures are returned as [`ConversionOutcome::Failed`]. An
    /// `Err` means the path itself is unusable (no file name).
    pub fn process_file(&mut self, xml_path: &Utf8Path) -> Result<ConversionOutcome> {
        let file_name = xml_path
            .file_name()
            .ok_or_else(|| anyhow!("Path has no file name: {}", xml_path))?
            .to_string();

        tracing::info!("Processing {}", file_name);

        match self.convert(xml_path) {
            Ok((pdf_path, output_dir)) => {
                tracing::info!("Wrote {}", pdf_path);
                self.audit.log_outcome(&file_name, AuditStatus::Success, "");
                let relocation = relocate(xml_path, &output_dir);

                Ok(ConversionOutcome::Converted {
                    pdf_path,
                    relocation,
                })
            }
            Err(error) => {
                tracing::error!("Error processing {}: {}", file_name, error);
                self.audit
                    .log_outcome(&file_name, AuditStatus::Error, &error.to_string());
                let relocation = self.move_to_failed_dir(xml_path);

                Ok(ConversionOutcome::Failed { error, relocation })
            }
        }
    }

    fn convert(&self, xml_path: &Utf8Path) -> Result<(Utf8PathBuf, Utf8PathBuf), ConversionError> {
        let xml = fs::read(xml_path).map_err(|source| ConversionError::Read {
            path: xml_path.to_path_buf(),
            source,
        })?;

        let payload = extract_embedded_payload(&xml)?;
        let pdf_bytes = decode_payload(&payload)?;

        let output_dir = self.output_dir_for(xml_path);
        fs::create_dir_all(&output_dir).map_err(|source| ConversionError::OutputDirectory {
            path: output_dir.clone(),
            source,
        })?;

        let pdf_path = output_dir.join(pdf_file_name(xml_path));
        fs::write(&pdf_path, &pdf_bytes).map_err(|source| ConversionError::WritePdf {
            path: pdf_path.clone(),
            source,
        })?;

        Ok((pdf_path, output_dir))
    }

    /// Configured output directory, or the directory holding the source.
    fn output_dir_for(&self, xml_path: &Utf8Path) -> Utf8PathBuf {
        if let Some(dir) = self.settings.output_directory() {
            return dir.to_path_buf();
        }

        match xml_path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
            _ => Utf8PathBuf::from("."),
        }
    }

    fn move_to_failed_dir(&self, xml_path: &Utf8Path) -> Option<Relocation> {
        let Some(failed_dir) = self.settings.failed_directory() else {
            tracing::warn!("Failed directory not configured; leaving {} in place", xml_path);
            return None;
        };

        if !xml_path.exists() {
            tracing::warn!("Original file no longer exists at: {}", xml_path);
            return Some(Relocation::SourceMissing);
        }

        if let Err(source) = fs::create_dir_all(failed_dir) {
            tracing::error!("Failed to create failed directory {}: {}", failed_dir, source);
            return Some(Relocation::DirectoryUnavailable {
                directory: failed_dir.to_path_buf(),
                source,
            });
        }

        Some(relocate(xml_path, failed_dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::audit::MockAuditSink;
    use tempfile::TempDir;

    const PDF_B64: &str = "JVBERg=="; // "%PDF"

    fn invoice_with(payload: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Invoice xmlns="urn:oasis:names:specification:ubl:schema:xsd:Invoice-2"
         xmlns:cac="urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2"
         xmlns:cbc="urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2">
  <cbc:ID>INV-1</cbc:ID>
  <cac:AdditionalDocumentReference>
    <cac:Attachment>
      <cbc:EmbeddedDocumentBinaryObject mimeCode="application/pdf" filename="inv.pdf">{payload}</cbc:EmbeddedDocumentBinaryObject>
    </cac:Attachment>
  </cac:AdditionalDocumentReference>
</Invoice>"#
        )
    }

    #[test]
    fn test_extract_prefixed_element() {
        let payload = extract_embedded_payload(invoice_with(PDF_B64).as_bytes()).unwrap();
        assert_eq!(payload, PDF_B64);
    }

    #[test]
    fn test_extract_unprefixed_element() {
        let xml = "<Invoice><EmbeddedDocumentBinaryObject>QUJD</EmbeddedDocumentBinaryObject></Invoice>";
        assert_eq!(extract_embedded_payload(xml.as_bytes()).unwrap(), "QUJD");
    }

    #[test]
    fn test_extract_first_match_wins() {
        let xml = "<r><a:EmbeddedDocumentBinaryObject xmlns:a=\"x\">Zmlyc3Q=</a:EmbeddedDocumentBinaryObject>\
                   <EmbeddedDocumentBinaryObject>c2Vjb25k</EmbeddedDocumentBinaryObject></r>";
        assert_eq!(extract_embedded_payload(xml.as_bytes()).unwrap(), "Zmlyc3Q=");
    }

    #[test]
    fn test_extract_cdata_payload() {
        let xml = "<r><EmbeddedDocumentBinaryObject><![CDATA[JVBERg==]]></EmbeddedDocumentBinaryObject></r>";
        assert_eq!(extract_embedded_payload(xml.as_bytes()).unwrap(), "JVBERg==");
    }

    #[test]
    fn test_extract_missing_element() {
        let xml = "<Invoice><ID>1</ID></Invoice>";
        assert!(matches!(
            extract_embedded_payload(xml.as_bytes()),
            Err(ConversionError::MissingPayload)
        ));
    }

    #[test]
    fn test_extract_empty_element() {
        for xml in [
            "<r><EmbeddedDocumentBinaryObject/></r>",
            "<r><EmbeddedDocumentBinaryObject></EmbeddedDocumentBinaryObject></r>",
            "<r><EmbeddedDocumentBinaryObject>  \n </EmbeddedDocumentBinaryObject></r>",
        ] {
            assert!(matches!(
                extract_embedded_payload(xml.as_bytes()),
                Err(ConversionError::EmptyPayload)
            ));
        }
    }

    #[test]
    fn test_extract_malformed_documents() {
        for xml in [
            "",
            "not xml at all",
            "<Invoice><EmbeddedDocumentBinaryObject>QUJD</EmbeddedDocumentBinaryObject>",
            "<Invoice><a></b></Invoice>",
            "<r><EmbeddedDocumentBinaryObject>JVBERg==</EmbeddedDocumentBinaryObject></r><second/>",
            "<r><EmbeddedDocumentBinaryObject>JVBERg==</EmbeddedDocumentBinaryObject></r>trailing junk",
            "garbage<r><EmbeddedDocumentBinaryObject>JVBERg==</EmbeddedDocumentBinaryObject></r>",
            "<r/><r/>",
        ] {
            assert!(
                matches!(
                    extract_embedded_payload(xml.as_bytes()),
                    Err(ConversionError::Parse(_))
                ),
                "expected parse error for {xml:?}"
            );
        }
    }

    #[test]
    fn test_extract_allows_prolog_and_trailing_misc() {
        let xml = "<?xml version=\"1.0\"?>\n<!-- header -->\n<r><EmbeddedDocumentBinaryObject>QUJD</EmbeddedDocumentBinaryObject></r>\n<!-- footer -->\n";
        assert_eq!(extract_embedded_payload(xml.as_bytes()).unwrap(), "QUJD");
    }

    #[test]
    fn test_decode_ignores_wrapping_whitespace() {
        let bytes = decode_payload("\n    JVBE\n    Rg==\n  ").unwrap();
        assert_eq!(bytes, b"%PDF");
    }

    #[test]
    fn test_decode_rejects_invalid_base64() {
        let err = decode_payload("not*base64").unwrap_err();
        assert!(matches!(err, ConversionError::Decode(_)));
        assert!(err.to_string().starts_with("Failed to decode Base64 data"));
    }

    #[test]
    fn test_decode_tolerates_trailing_bits() {
        // "QR==" carries non-zero bits after the single decoded byte.
        assert_eq!(decode_payload("QR==").unwrap(), b"A");
        assert!(decode_payload("QQ").is_err());
    }

    #[test]
    fn test_unusable_failed_dir_is_reported() {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        let source = root.join("bad.xml");
        fs::write(&source, "<Invoice/>").unwrap();
        let blocker = root.join("blocker");
        fs::write(&blocker, "x").unwrap();

        let mut audit = MockAuditSink::new();
        audit.expect_log_outcome().times(1).return_const(());
        let settings = Settings {
            failed_directory: blocker.join("failed").to_string(),
            ..Settings::default()
        };
        let mut service = ConversionService::new(settings, audit);

        let outcome = service.process_file(&source).unwrap();

        let ConversionOutcome::Failed { relocation, .. } = outcome else {
            panic!("expected a failure");
        };
        assert!(matches!(
            relocation,
            Some(Relocation::DirectoryUnavailable { ref directory, .. })
                if *directory == blocker.join("failed")
        ));
        assert!(source.exists());
    }

    #[test]
    fn test_pdf_file_name() {
        assert_eq!(pdf_file_name(Utf8Path::new("/in/invoice1.xml")), "invoice1.pdf");
        assert_eq!(pdf_file_name(Utf8Path::new("a.b.xml")), "a.b.pdf");
    }

    #[test]
    fn test_missing_payload_logs_exactly_one_error() {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        let source = root.join("bad.xml");
        fs::write(&source, "<Invoice><ID>1</ID></Invoice>").unwrap();

        let mut audit = MockAuditSink::new();
        audit
            .expect_log_outcome()
            .withf(|name, status, detail| {
                name == "bad.xml"
                    && *status == AuditStatus::Error
                    && detail == "No embedded document found"
            })
            .times(1)
            .return_const(());

        let mut service = ConversionService::new(Settings::default(), audit);
        let outcome = service.process_file(&source).unwrap();

        assert!(!outcome.is_success());
        assert_eq!(outcome.detail(), "No embedded document found");
        assert!(source.exists(), "source stays put without a failed directory");
    }

    #[test]
    fn test_success_writes_next_to_source_without_output_dir() {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        let source = root.join("invoice1.xml");
        fs::write(&source, invoice_with(PDF_B64)).unwrap();

        let mut audit = MockAuditSink::new();
        audit
            .expect_log_outcome()
            .withf(|name, status, _| name == "invoice1.xml" && *status == AuditStatus::Success)
            .times(1)
            .return_const(());

        let mut service = ConversionService::new(Settings::default(), audit);
        let outcome = service.process_file(&source).unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.pdf_path(), Some(root.join("invoice1.pdf").as_path()));
        assert_eq!(fs::read(root.join("invoice1.pdf")).unwrap(), b"%PDF");
        assert!(source.exists());
    }

    #[test]
    fn test_path_without_file_name_is_unexpected() {
        let mut service = ConversionService::new(Settings::default(), MockAuditSink::new());
        assert!(service.process_file(Utf8Path::new("/")).is_err());
    }
}
