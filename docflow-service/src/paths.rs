//! Object key layout.
//!
//! The segment count decides whether an index name is present:
//!
//! ```text
//! tenant/collection/sub/file.pdf          4 segments, no index name
//! tenant/collection/index/sub/file.pdf    5 segments, index name at position 2
//! ```
//!
//! Both OCR output and page images are written next to the source under the
//! same prefix (everything before the index-name or trailing segments), so
//! every derived path goes through [`ObjectKeyPath`].

use crate::error::{ServiceError, ServiceResult};

/// Number of segments in a key that carries an index-name segment
const INDEXED_SEGMENT_COUNT: usize = 5;

/// Number of segments in a key without an index-name segment
const PLAIN_SEGMENT_COUNT: usize = 4;

/// Shortest key a derived path can be computed for
const MIN_SEGMENT_COUNT: usize = 3;

const OUTPUT_SEGMENT: &str = "output";
const IMAGES_SEGMENT: &str = "images";

/// A storage key split on `/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectKeyPath {
    segments: Vec<String>,
}

impl ObjectKeyPath {
    pub fn parse(object_key: &str) -> ServiceResult<Self> {
        let segments: Vec<String> = object_key.split('/').map(str::to_string).collect();
        if segments.len() < MIN_SEGMENT_COUNT || segments.iter().any(String::is_empty) {
            return Err(ServiceError::InvalidObjectKey {
                object_key: object_key.to_string(),
            });
        }
        Ok(Self { segments })
    }

    /// Parse a key that must follow one of the two layouts exactly.
    pub fn parse_strict(object_key: &str) -> ServiceResult<Self> {
        let path = Self::parse(object_key)?;
        if !(PLAIN_SEGMENT_COUNT..=INDEXED_SEGMENT_COUNT).contains(&path.segments.len()) {
            return Err(ServiceError::InvalidObjectKey {
                object_key: object_key.to_string(),
            });
        }
        Ok(path)
    }

    pub fn has_index_name(&self) -> bool {
        self.segments.len() == INDEXED_SEGMENT_COUNT
    }

    pub fn index_name(&self) -> Option<&str> {
        self.has_index_name()
            .then(|| self.segments[self.prefix_len()].as_str())
    }

    pub fn file_name(&self) -> &str {
        // parse() guarantees at least MIN_SEGMENT_COUNT segments
        &self.segments[self.segments.len() - 1]
    }

    /// Segments dropped from the end to reach the shared prefix.
    fn trailing_len(&self) -> usize {
        if self.has_index_name() { 3 } else { 2 }
    }

    fn prefix_len(&self) -> usize {
        self.segments.len() - self.trailing_len()
    }

    /// Leading segments shared by the source and all derived outputs.
    pub fn prefix(&self) -> String {
        self.segments[..self.prefix_len()].join("/")
    }

    /// Where the OCR engine writes its results.
    pub fn ocr_output_prefix(&self) -> String {
        format!("{}/{}", self.prefix(), OUTPUT_SEGMENT)
    }

    /// Folder page images are uploaded under.
    pub fn images_prefix(&self) -> String {
        match self.index_name() {
            Some(index) => format!(
                "{}/{}/{}/{}",
                self.prefix(),
                IMAGES_SEGMENT,
                index,
                self.file_name()
            ),
            None => format!("{}/{}/{}", self.prefix(), IMAGES_SEGMENT, self.file_name()),
        }
    }

    /// Storage key of one rendered page (1-based).
    pub fn page_image_key(&self, page_number: u32) -> String {
        format!("{}/page_{}.jpeg", self.images_prefix(), page_number)
    }
}
