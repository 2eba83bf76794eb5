//! MIME-dispatched text extraction.

use lopdf::Document;

use super::error::ProcessError;
use crate::vectordb::ContentType;

/// One extracted run of text; PDF extraction yields one segment per page.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Extracted text.
    pub text: String,
    /// Originating page for PDF sources.
    pub page_index: Option<u32>,
}

/// Extracts text segments from a PDF, page by page.
///
/// Pages that yield no text are skipped; if every page is empty the document
/// is reported as an empty corpus.
pub fn extract_pdf(bytes: &[u8], filename: &str) -> Result<Vec<Segment>, ProcessError> {
    let document = Document::load_mem(bytes).map_err(|e| ProcessError::ExtractionFailed {
        message: format!("pdf parse: {e}"),
    })?;

    let mut segments = Vec::new();
    for (page_number, _object_id) in document.get_pages() {
        match document.extract_text(&[page_number]) {
            Ok(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    segments.push(Segment {
                        text: trimmed.to_string(),
                        // Qdrant and callers use zero-based page indices.
                        page_index: Some(page_number.saturating_sub(1)),
                    });
                }
            }
            Err(e) => {
                tracing::debug!(page = page_number, "skipping unextractable page: {e}");
            }
        }
    }

    if segments.is_empty() {
        return Err(ProcessError::EmptyCorpus {
            filename: filename.to_string(),
        });
    }

    Ok(segments)
}

/// Decodes a plain-text payload. Invalid UTF-8 is an extraction failure,
/// not silently lossy.
pub fn extract_text(bytes: Vec<u8>, filename: &str) -> Result<Vec<Segment>, ProcessError> {
    let text = String::from_utf8(bytes).map_err(|e| ProcessError::ExtractionFailed {
        message: format!("invalid UTF-8: {e}"),
    })?;

    if text.trim().is_empty() {
        return Err(ProcessError::EmptyCorpus {
            filename: filename.to_string(),
        });
    }

    Ok(vec![Segment {
        text,
        page_index: None,
    }])
}

/// Wraps a transcript produced by the gateway into a single segment.
pub fn transcript_segment(transcript: String, filename: &str) -> Result<Vec<Segment>, ProcessError> {
    if transcript.trim().is_empty() {
        return Err(ProcessError::EmptyCorpus {
            filename: filename.to_string(),
        });
    }

    Ok(vec![Segment {
        text: transcript,
        page_index: None,
    }])
}

/// Parses the declared type, rejecting anything unhandled.
pub fn parse_declared_type(declared: &str) -> Result<ContentType, ProcessError> {
    ContentType::parse(declared).ok_or_else(|| ProcessError::UnsupportedType {
        declared: declared.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_text_extracts_one_segment() {
        let segments = extract_text(b"hello course".to_vec(), "notes.txt").unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "hello course");
        assert_eq!(segments[0].page_index, None);
    }

    #[test]
    fn invalid_utf8_is_an_extraction_failure() {
        let err = extract_text(vec![0xff, 0xfe, 0x01], "bad.txt").unwrap_err();
        assert!(matches!(err, ProcessError::ExtractionFailed { .. }));
    }

    #[test]
    fn whitespace_only_text_is_empty_corpus() {
        let err = extract_text(b"  \n\t ".to_vec(), "blank.txt").unwrap_err();
        assert!(matches!(err, ProcessError::EmptyCorpus { .. }));
    }

    #[test]
    fn garbage_bytes_are_not_a_pdf() {
        let err = extract_pdf(b"definitely not a pdf", "fake.pdf").unwrap_err();
        assert!(matches!(err, ProcessError::ExtractionFailed { .. }));
    }

    #[test]
    fn empty_transcript_is_empty_corpus() {
        let err = transcript_segment("   ".to_string(), "talk.mp3").unwrap_err();
        assert!(matches!(err, ProcessError::EmptyCorpus { .. }));
    }

    #[test]
    fn declared_type_parsing() {
        assert!(matches!(parse_declared_type("pdf"), Ok(ContentType::Pdf)));
        assert!(matches!(parse_declared_type("VIDEO"), Ok(ContentType::Video)));
        assert!(matches!(
            parse_declared_type("spreadsheet"),
            Err(ProcessError::UnsupportedType { .. })
        ));
    }
}
