//! Storage notifications and the ingestion event passed between stages.
//!
//! [`StorageEvent`] is the wire shape the storage service emits
//! (`{"Records": [{"eventName": ..., "s3": {...}}]}`). Stages decorate it
//! in place and every field they do not know about is carried through
//! untouched. [`IngestionEvent`] is the flattened, typed view of its first
//! record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ServiceError, ServiceResult};

/// Storage-change notification envelope
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageEvent {
    #[serde(rename = "Records", default, skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<StorageRecord>>,

    /// Set by the classifier
    #[serde(rename = "documentType", default, skip_serializing_if = "Option::is_none")]
    pub document_type: Option<DocumentType>,

    /// Set by the classifier
    #[serde(rename = "eventType", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<EventType>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageRecord {
    #[serde(rename = "eventName", default)]
    pub event_name: String,

    pub s3: S3Entity,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3Object,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Bucket {
    pub name: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Object {
    /// URL-encoded (`+` for spaces)
    pub key: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StorageEvent {
    /// Build a single-record notification, as the storage service would.
    pub fn object_created(bucket: &str, object_key: &str) -> Self {
        Self::single(bucket, object_key, "ObjectCreated:Put")
    }

    pub fn single(bucket: &str, object_key: &str, event_name: &str) -> Self {
        StorageEvent {
            records: Some(vec![StorageRecord {
                event_name: event_name.to_string(),
                s3: S3Entity {
                    bucket: S3Bucket {
                        name: bucket.to_string(),
                        extra: Map::new(),
                    },
                    object: S3Object {
                        key: encode_object_key(object_key),
                        extra: Map::new(),
                    },
                    extra: Map::new(),
                },
                extra: Map::new(),
            }]),
            ..Default::default()
        }
    }

    /// The first record, or `NoRecords` when the batch is absent or empty.
    pub fn first_record(&self) -> ServiceResult<&StorageRecord> {
        self.records
            .as_deref()
            .and_then(|records| records.first())
            .ok_or(ServiceError::NoRecords)
    }

    pub fn has_records(&self) -> bool {
        self.records.as_ref().is_some_and(|r| !r.is_empty())
    }
}

impl StorageRecord {
    /// The object key with URL encoding removed.
    pub fn decoded_key(&self) -> ServiceResult<String> {
        decode_object_key(&self.s3.object.key)
    }

    pub fn event_type(&self) -> EventType {
        EventType::from_event_name(&self.event_name)
    }
}

/// Decode a notification key the way the storage service encodes it:
/// `+` is a space, everything else is percent-encoded.
pub fn decode_object_key(raw: &str) -> ServiceResult<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|k| k.into_owned())
        .map_err(|e| ServiceError::InvalidEvent {
            message: format!("object key {raw:?} is not valid UTF-8 once decoded: {e}"),
        })
}

/// Inverse of [`decode_object_key`], keeping `/` readable.
pub fn encode_object_key(key: &str) -> String {
    key.split('/')
        .map(|segment| {
            segment
                .split(' ')
                .map(|part| urlencoding::encode(part).into_owned())
                .collect::<Vec<_>>()
                .join("+")
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Kind of storage change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Created,
    Removed,
    Other,
}

impl EventType {
    pub fn from_event_name(name: &str) -> Self {
        if name.starts_with("ObjectCreated") {
            EventType::Created
        } else if name.starts_with("ObjectRemoved") {
            EventType::Removed
        } else {
            EventType::Other
        }
    }
}

/// Document type derived from the object key's extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Pdf,
    Text,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Pdf => "pdf",
            DocumentType::Text => "text",
        }
    }

    /// Only PDFs carry pages to rasterise.
    pub fn has_images(&self) -> bool {
        matches!(self, DocumentType::Pdf)
    }
}

/// Typed view of one ingestion run's progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionEvent {
    pub bucket: String,
    pub object_key: String,
    pub event_name: String,
    pub event_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<DocumentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_status: Option<String>,
}

impl IngestionEvent {
    /// Flatten the first record of a notification, decoding its key.
    pub fn from_storage_event(event: &StorageEvent) -> ServiceResult<Self> {
        let record = event.first_record()?;
        if record.s3.bucket.name.is_empty() {
            return Err(ServiceError::InvalidEvent {
                message: "record has an empty bucket name".to_string(),
            });
        }

        Ok(Self {
            bucket: record.s3.bucket.name.clone(),
            object_key: record.decoded_key()?,
            event_name: record.event_name.clone(),
            event_type: record.event_type(),
            document_type: event.document_type,
            job_id: None,
            job_status: None,
        })
    }

    pub fn is_removal(&self) -> bool {
        self.event_type == EventType::Removed
    }
}

/// Response envelope every stage handler answers with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerResponse<T> {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: T,
}

impl<T> HandlerResponse<T> {
    pub fn ok(body: T) -> Self {
        Self {
            status_code: 200,
            body,
        }
    }

    pub fn internal_error(body: T) -> Self {
        Self {
            status_code: 500,
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "Records": [{
                "eventVersion": "2.1",
                "eventName": "ObjectCreated:Put",
                "s3": {
                    "bucket": {"name": "docs-bucket", "arn": "arn:aws:s3:::docs-bucket"},
                    "object": {"key": "public/alice/index1/reports/Q3+report%282%29.pdf", "size": 1024}
                }
            }],
            "traceId": "abc"
        })
    }

    #[test]
    fn test_unknown_fields_survive_roundtrip() {
        let event: StorageEvent = serde_json::from_value(sample()).unwrap();
        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn test_ingestion_event_decodes_key() {
        let event: StorageEvent = serde_json::from_value(sample()).unwrap();
        let ingestion = IngestionEvent::from_storage_event(&event).unwrap();

        assert_eq!(ingestion.bucket, "docs-bucket");
        assert_eq!(ingestion.object_key, "public/alice/index1/reports/Q3 report(2).pdf");
        assert_eq!(ingestion.event_type, EventType::Created);
        assert_eq!(ingestion.document_type, None);
        assert_eq!(ingestion.job_id, None);
    }

    #[test]
    fn test_missing_or_empty_records() {
        let empty: StorageEvent = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(empty.first_record(), Err(ServiceError::NoRecords)));

        let empty_list: StorageEvent = serde_json::from_value(json!({"Records": []})).unwrap();
        assert!(!empty_list.has_records());
        assert!(matches!(
            IngestionEvent::from_storage_event(&empty_list),
            Err(ServiceError::NoRecords)
        ));
    }

    #[test]
    fn test_event_type_from_name() {
        assert_eq!(EventType::from_event_name("ObjectCreated:Put"), EventType::Created);
        assert_eq!(
            EventType::from_event_name("ObjectCreated:CompleteMultipartUpload"),
            EventType::Created
        );
        assert_eq!(EventType::from_event_name("ObjectRemoved:Delete"), EventType::Removed);
        assert_eq!(EventType::from_event_name("s3:TestEvent"), EventType::Other);
    }

    #[test]
    fn test_encode_decode_key() {
        let key = "public/bob smith/My File (1).pdf";
        let encoded = encode_object_key(key);
        assert_eq!(encoded, "public/bob+smith/My+File+%281%29.pdf");
        assert_eq!(decode_object_key(&encoded).unwrap(), key);
    }

    #[test]
    fn test_handler_response_shape() {
        let value = serde_json::to_value(HandlerResponse::ok("Invoked orchestrator")).unwrap();
        assert_eq!(value, json!({"statusCode": 200, "body": "Invoked orchestrator"}));
    }
}
