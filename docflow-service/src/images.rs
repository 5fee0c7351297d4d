//! Page image extraction.
//!
//! Downloads a stored PDF to scratch space, renders each page to JPEG and
//! uploads the pages next to the source under an `images` folder (see
//! [`ObjectKeyPath::images_prefix`]).

mod render;

pub use render::{PageRenderer, PdfiumRenderer, RenderOptions};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use crate::error::{ScratchResourceError, ServiceResult, format_error_chain};
use crate::event::{IngestionEvent, StorageEvent};
use crate::paths::ObjectKeyPath;
use crate::storage::ObjectStore;

/// 1-based page number to uploaded image key. Serializes as
/// `{"1": "...", "2": "..."}`.
pub type PageImageMap = BTreeMap<u32, String>;

const PDF_SCRATCH_DIR: &str = "pdf";
const IMAGES_SCRATCH_DIR: &str = "images";

pub struct ImageExtractor {
    store: Arc<dyn ObjectStore>,
    renderer: Arc<dyn PageRenderer>,
    scratch_dir: PathBuf,
}

impl ImageExtractor {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        renderer: Arc<dyn PageRenderer>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            renderer,
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Extract page images for the object a classified event refers to.
    ///
    /// Returns `None` for removals, which have nothing left to render.
    pub async fn extract_for_event(
        &self,
        event: &StorageEvent,
    ) -> ServiceResult<Option<PageImageMap>> {
        let ingestion = IngestionEvent::from_storage_event(event)?;
        if ingestion.is_removal() {
            info!(object_key = %ingestion.object_key, "Skipping image extraction for removed object");
            return Ok(None);
        }
        self.extract(&ingestion.bucket, &ingestion.object_key)
            .await
            .map(Some)
    }

    /// Render and upload every page. Any failure discards the whole result.
    pub async fn extract(&self, bucket: &str, object_key: &str) -> ServiceResult<PageImageMap> {
        self.extract_inner(bucket, object_key)
            .await
            .inspect_err(|e| {
                error!(
                    bucket,
                    object_key,
                    error = %format_error_chain(e),
                    "Image extraction failed"
                );
                metrics::counter!("docflow_stage_failures_total", "stage" => "extract_images")
                    .increment(1);
            })
    }

    async fn extract_inner(&self, bucket: &str, object_key: &str) -> ServiceResult<PageImageMap> {
        let path = ObjectKeyPath::parse(object_key)?;
        let pdf_dir = self.scratch_dir.join(PDF_SCRATCH_DIR);
        let images_dir = self.scratch_dir.join(IMAGES_SCRATCH_DIR);
        ensure_dir(&pdf_dir).await?;
        ensure_dir(&images_dir).await?;

        info!(
            bucket,
            object_key,
            images_prefix = %path.images_prefix(),
            "Extracting page images"
        );

        // Removed on drop, whatever happens below
        let pdf_file = scratch_file(&pdf_dir, ".pdf")?;
        self.store
            .download_file(bucket, object_key, pdf_file.path())
            .await?;

        let page_count = self.renderer.page_count(pdf_file.path()).await?;
        let mut pages = PageImageMap::new();

        for page_number in 1..=page_count {
            let key = path.page_image_key(page_number);
            let page_file = scratch_file(&images_dir, ".jpeg")?;

            let uploaded = self
                .render_and_upload(pdf_file.path(), page_number, page_file.path(), bucket, &key)
                .await;

            if let Err(e) = page_file.close() {
                warn!(page = page_number, error = %e, "Failed to remove scratch page image");
            }
            uploaded?;

            debug!(page = page_number, key = %key, "Uploaded page image");
            metrics::counter!("docflow_pages_extracted_total").increment(1);
            pages.insert(page_number, key);
        }

        info!(bucket, object_key, pages = pages.len(), "Page images extracted");
        Ok(pages)
    }

    async fn render_and_upload(
        &self,
        pdf: &Path,
        page_number: u32,
        scratch: &Path,
        bucket: &str,
        key: &str,
    ) -> ServiceResult<()> {
        self.renderer
            .render_page(pdf, page_number - 1, scratch)
            .await?;
        self.store.upload_file(bucket, key, scratch).await
    }
}

async fn ensure_dir(dir: &Path) -> ServiceResult<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ScratchResourceError::CreateDir {
            path: dir.display().to_string(),
            source: e,
        })?;
    Ok(())
}

/// A uniquely named file owned by this invocation alone.
fn scratch_file(dir: &Path, suffix: &str) -> ServiceResult<NamedTempFile> {
    let file = tempfile::Builder::new()
        .prefix("docflow-")
        .suffix(suffix)
        .tempfile_in(dir)
        .map_err(ScratchResourceError::Io)?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::testing::{FakeObjectStore, FakeRenderer};
    use tempfile::TempDir;

    const KEY: &str = "tenant1/docs/index1/reports/file.pdf";

    fn extractor(
        store: Arc<FakeObjectStore>,
        renderer: Arc<FakeRenderer>,
        scratch: &TempDir,
    ) -> ImageExtractor {
        ImageExtractor::new(store, renderer, scratch.path())
    }

    fn scratch_entries(scratch: &TempDir, sub: &str) -> usize {
        std::fs::read_dir(scratch.path().join(sub))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_pages_are_numbered_without_gaps() {
        let scratch = TempDir::new().unwrap();
        let store = Arc::new(FakeObjectStore::with_object("docs", KEY, b"%PDF-1.7"));
        let renderer = Arc::new(FakeRenderer::new(4));

        let pages = extractor(store.clone(), renderer, &scratch)
            .extract("docs", KEY)
            .await
            .unwrap();

        assert_eq!(pages.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(
            pages[&2],
            "tenant1/docs/images/index1/file.pdf/page_2.jpeg"
        );

        let value = serde_json::to_value(&pages).unwrap();
        assert_eq!(
            value["1"],
            "tenant1/docs/images/index1/file.pdf/page_1.jpeg"
        );

        for key in pages.values() {
            assert!(store.contains("docs", key), "missing upload {key}");
        }
    }

    #[tokio::test]
    async fn test_scratch_space_is_left_empty() {
        let scratch = TempDir::new().unwrap();
        let store = Arc::new(FakeObjectStore::with_object("docs", KEY, b"%PDF-1.7"));
        let renderer = Arc::new(FakeRenderer::new(3));

        extractor(store, renderer, &scratch)
            .extract("docs", KEY)
            .await
            .unwrap();

        assert_eq!(scratch_entries(&scratch, "pdf"), 0);
        assert_eq!(scratch_entries(&scratch, "images"), 0);
    }

    #[tokio::test]
    async fn test_upload_failure_aborts_and_cleans_up() {
        let scratch = TempDir::new().unwrap();
        let store = Arc::new(
            FakeObjectStore::with_object("docs", KEY, b"%PDF-1.7").fail_uploads_after(1),
        );
        let renderer = Arc::new(FakeRenderer::new(3));

        let err = extractor(store.clone(), renderer.clone(), &scratch)
            .extract("docs", KEY)
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "storage_error");
        assert_eq!(renderer.render_calls(), 2);
        assert_eq!(scratch_entries(&scratch, "pdf"), 0);
        assert_eq!(scratch_entries(&scratch, "images"), 0);
    }

    #[tokio::test]
    async fn test_render_failure_aborts() {
        let scratch = TempDir::new().unwrap();
        let store = Arc::new(FakeObjectStore::with_object("docs", KEY, b"%PDF-1.7"));
        let renderer = Arc::new(FakeRenderer::new(3).fail_on_page(2));

        let err = extractor(store.clone(), renderer, &scratch)
            .extract("docs", KEY)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Scratch(_)));
        assert_eq!(store.upload_calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_source_is_storage_error() {
        let scratch = TempDir::new().unwrap();
        let store = Arc::new(FakeObjectStore::default());
        let renderer = Arc::new(FakeRenderer::new(1));

        let err = extractor(store, renderer.clone(), &scratch)
            .extract("docs", KEY)
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "storage_error");
        assert_eq!(renderer.render_calls(), 0);
    }

    #[tokio::test]
    async fn test_removed_event_is_skipped() {
        let scratch = TempDir::new().unwrap();
        let store = Arc::new(FakeObjectStore::with_object("docs", KEY, b"%PDF-1.7"));
        let renderer = Arc::new(FakeRenderer::new(2));
        let event = StorageEvent::single("docs", KEY, "ObjectRemoved:Delete");

        let result = extractor(store.clone(), renderer.clone(), &scratch)
            .extract_for_event(&event)
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(store.download_calls(), 0);
        assert_eq!(renderer.render_calls(), 0);
    }
}
