//! Document type classification.
//!
//! Looks at the first record's object key and tags the event with the
//! document type its extension implies.

use std::path::Path;

use tracing::{error, info};

use crate::error::{ServiceError, ServiceResult, format_error_chain};
use crate::event::{DocumentType, EventType, StorageEvent};

/// Classify a storage notification, returning it decorated with
/// `documentType` and `eventType`.
///
/// Removals are never rejected; an unsupported removal carries no
/// `documentType`.
pub fn classify(event: StorageEvent) -> ServiceResult<StorageEvent> {
    classify_inner(event).inspect_err(|e| {
        error!(error = %format_error_chain(e), "Document classification failed");
        metrics::counter!("docflow_stage_failures_total", "stage" => "classify").increment(1);
    })
}

fn classify_inner(mut event: StorageEvent) -> ServiceResult<StorageEvent> {
    let record = event.first_record()?;
    let object_key = record.decoded_key()?;
    let event_type = record.event_type();

    let document_type = match document_type_for(&object_key) {
        Some(doc_type) => Some(doc_type),
        None if event_type == EventType::Removed => None,
        None => return Err(ServiceError::UnsupportedDocumentType { object_key }),
    };

    info!(
        object_key = %object_key,
        event_type = ?event_type,
        document_type = document_type.map(|d| d.as_str()).unwrap_or("none"),
        "Classified document"
    );
    if let Some(doc_type) = document_type {
        metrics::counter!("docflow_documents_classified_total", "document_type" => doc_type.as_str())
            .increment(1);
    }

    event.document_type = document_type;
    event.event_type = Some(event_type);
    Ok(event)
}

/// Map a key's extension onto a supported document type.
pub fn document_type_for(object_key: &str) -> Option<DocumentType> {
    let ext = Path::new(object_key)
        .extension()
        .and_then(|ext| ext.to_str())?
        .to_ascii_lowercase();

    match ext.as_str() {
        "pdf" => Some(DocumentType::Pdf),
        "txt" => Some(DocumentType::Text),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event_for(key: &str, event_name: &str) -> StorageEvent {
        StorageEvent::single("bucket", key, event_name)
    }

    #[test]
    fn test_document_type_for() {
        assert_eq!(document_type_for("a/b/c/file.pdf"), Some(DocumentType::Pdf));
        assert_eq!(document_type_for("a/b/c/FILE.PDF"), Some(DocumentType::Pdf));
        assert_eq!(document_type_for("a/b/c/notes.txt"), Some(DocumentType::Text));

        assert_eq!(document_type_for("a/b/c/file.docx"), None);
        assert_eq!(document_type_for("a/b/c/file.pdf.zip"), None);
        assert_eq!(document_type_for("a/b/c/pdf"), None);
        assert_eq!(document_type_for("a/b/c/.pdf"), None);
    }

    #[test]
    fn test_classify_sets_document_type() {
        let classified = classify(event_for("t/u/x/report.pdf", "ObjectCreated:Put")).unwrap();
        assert_eq!(classified.document_type, Some(DocumentType::Pdf));
        assert_eq!(classified.event_type, Some(EventType::Created));

        let classified = classify(event_for("t/u/x/notes.txt", "ObjectCreated:Put")).unwrap();
        assert_eq!(classified.document_type, Some(DocumentType::Text));
    }

    #[test]
    fn test_classify_is_deterministic() {
        let a = classify(event_for("t/u/x/report.pdf", "ObjectCreated:Put")).unwrap();
        let b = classify(event_for("t/u/x/report.pdf", "ObjectCreated:Put")).unwrap();
        assert_eq!(
            serde_json::to_value(&a).unwrap(),
            serde_json::to_value(&b).unwrap()
        );
    }

    #[test]
    fn test_classify_decodes_key_before_checking_extension() {
        let event: StorageEvent = serde_json::from_value(json!({
            "Records": [{
                "eventName": "ObjectCreated:Put",
                "s3": {"bucket": {"name": "b"}, "object": {"key": "t/u/x/my%2Efile%2Epdf"}}
            }]
        }))
        .unwrap();
        let classified = classify(event).unwrap();
        assert_eq!(classified.document_type, Some(DocumentType::Pdf));
    }

    #[test]
    fn test_unsupported_extension_is_error() {
        let err = classify(event_for("t/u/x/slides.pptx", "ObjectCreated:Put")).unwrap_err();
        match err {
            ServiceError::UnsupportedDocumentType { object_key } => {
                assert_eq!(object_key, "t/u/x/slides.pptx")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_no_records_is_error() {
        let event: StorageEvent = serde_json::from_value(json!({"foo": "bar"})).unwrap();
        assert!(matches!(classify(event), Err(ServiceError::NoRecords)));
    }

    #[test]
    fn test_removal_is_recorded() {
        let classified = classify(event_for("t/u/x/report.pdf", "ObjectRemoved:Delete")).unwrap();
        assert_eq!(classified.event_type, Some(EventType::Removed));
        assert_eq!(classified.document_type, Some(DocumentType::Pdf));

        let classified = classify(event_for("t/u/x/old.docx", "ObjectRemoved:Delete")).unwrap();
        assert_eq!(classified.event_type, Some(EventType::Removed));
        assert_eq!(classified.document_type, None);
    }

    #[test]
    fn test_other_fields_pass_through() {
        let event: StorageEvent = serde_json::from_value(json!({
            "Records": [{
                "eventName": "ObjectCreated:Put",
                "awsRegion": "eu-west-1",
                "s3": {"bucket": {"name": "b"}, "object": {"key": "t/u/x/a.txt"}}
            }],
            "correlation": 7
        }))
        .unwrap();
        let value = serde_json::to_value(classify(event).unwrap()).unwrap();
        assert_eq!(value["correlation"], 7);
        assert_eq!(value["Records"][0]["awsRegion"], "eu-west-1");
        assert_eq!(value["documentType"], "text");
        assert_eq!(value["eventType"], "created");
    }
}
