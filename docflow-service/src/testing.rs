//! In-memory collaborators for unit tests.
//!
//! Every fake counts its calls so tests can assert that a stage was never
//! reached, not just that nothing failed.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde_json::{Value, json};

use crate::error::{ExternalServiceError, ScratchResourceError, ServiceError, ServiceResult};
use crate::images::PageRenderer;
use crate::ocr::{AnalysisRequest, AnalysisStatus, OcrService};
use crate::storage::{ObjectStore, storage_error};
use crate::workflow::{
    ExecutionHandle, ExecutionSummary, StartExecution, WorkflowEngine,
};

// ==================== Object store ====================

#[derive(Default)]
pub struct FakeObjectStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    download_calls: AtomicUsize,
    upload_calls: AtomicUsize,
    fail_uploads_after: Option<usize>,
}

impl FakeObjectStore {
    pub fn with_object(bucket: &str, key: &str, body: &[u8]) -> Self {
        let store = Self::default();
        store.insert(bucket, key, body.to_vec());
        store
    }

    /// Let the first `n` uploads succeed and fail every one after.
    pub fn fail_uploads_after(mut self, n: usize) -> Self {
        self.fail_uploads_after = Some(n);
        self
    }

    fn insert(&self, bucket: &str, key: &str, body: Vec<u8>) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), body);
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .lock()
            .unwrap()
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn download_file(&self, bucket: &str, key: &str, dest: &Path) -> ServiceResult<()> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let body = self
            .objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| {
                storage_error(
                    "download",
                    bucket,
                    key,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no such key"),
                )
            })?;
        std::fs::write(dest, body).map_err(|e| storage_error("download", bucket, key, e))
    }

    async fn upload_file(&self, bucket: &str, key: &str, src: &Path) -> ServiceResult<()> {
        let prior = self.upload_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_uploads_after.is_some_and(|n| prior >= n) {
            return Err(storage_error(
                "upload",
                bucket,
                key,
                std::io::Error::other("upload rejected"),
            ));
        }
        let body = std::fs::read(src).map_err(|e| storage_error("upload", bucket, key, e))?;
        self.insert(bucket, key, body);
        Ok(())
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> ServiceResult<()> {
        self.insert(bucket, key, body.to_vec());
        Ok(())
    }
}

// ==================== OCR ====================

/// Serves scripted status payloads in order, repeating the last one.
#[derive(Default)]
pub struct FakeOcr {
    payloads: Mutex<VecDeque<Value>>,
    requests: Mutex<Vec<AnalysisRequest>>,
    start_calls: AtomicUsize,
    status_calls: AtomicUsize,
    fail_start: bool,
    fail_status: bool,
}

impl FakeOcr {
    pub fn with_statuses<'a>(statuses: impl IntoIterator<Item = &'a str>) -> Self {
        Self::with_payloads(
            statuses
                .into_iter()
                .map(|status| json!({"JobStatus": status}))
                .collect(),
        )
    }

    pub fn with_payloads(payloads: Vec<Value>) -> Self {
        Self {
            payloads: Mutex::new(payloads.into()),
            ..Default::default()
        }
    }

    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Default::default()
        }
    }

    pub fn failing_status() -> Self {
        Self {
            fail_status: true,
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

fn ocr_failure(operation: &'static str) -> ServiceError {
    ServiceError::External(ExternalServiceError::Ocr {
        operation,
        source: Box::new(std::io::Error::other("throttled")),
    })
}

#[async_trait]
impl OcrService for FakeOcr {
    async fn start_document_analysis(&self, request: &AnalysisRequest) -> ServiceResult<String> {
        let n = self.start_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request.clone());
        if self.fail_start {
            return Err(ocr_failure("start_document_analysis"));
        }
        Ok(format!("job-{n}"))
    }

    async fn get_document_analysis(&self, _job_id: &str) -> ServiceResult<AnalysisStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_status {
            return Err(ocr_failure("get_document_analysis"));
        }

        let mut payloads = self.payloads.lock().unwrap();
        let payload = if payloads.len() > 1 {
            payloads.pop_front()
        } else {
            payloads.front().cloned()
        };
        let payload = payload.unwrap_or_else(|| json!({"JobStatus": "SUCCEEDED"}));
        Ok(serde_json::from_value(payload).unwrap())
    }
}

// ==================== Renderer ====================

pub struct FakeRenderer {
    pages: u32,
    fail_on_page: Option<u32>,
    render_calls: AtomicUsize,
}

impl FakeRenderer {
    pub fn new(pages: u32) -> Self {
        Self {
            pages,
            fail_on_page: None,
            render_calls: AtomicUsize::new(0),
        }
    }

    /// Fail rendering the given 1-based page.
    pub fn fail_on_page(mut self, page: u32) -> Self {
        self.fail_on_page = Some(page);
        self
    }

    pub fn render_calls(&self) -> usize {
        self.render_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageRenderer for FakeRenderer {
    async fn page_count(&self, pdf: &Path) -> ServiceResult<u32> {
        assert!(pdf.exists(), "renderer called before download");
        Ok(self.pages)
    }

    async fn render_page(&self, _pdf: &Path, page_index: u32, dest: &Path) -> ServiceResult<()> {
        self.render_calls.fetch_add(1, Ordering::SeqCst);
        let page = page_index + 1;
        if self.fail_on_page == Some(page) {
            return Err(ScratchResourceError::Render {
                page,
                message: "corrupt page".to_string(),
            }
            .into());
        }

        image::RgbImage::from_pixel(4, 4, image::Rgb([255, 255, 255]))
            .save_with_format(dest, image::ImageFormat::Jpeg)
            .map_err(|e| ScratchResourceError::Encode { page, source: e })?;
        Ok(())
    }
}

// ==================== Workflow engine ====================

#[derive(Default)]
pub struct FakeWorkflowEngine {
    started: Mutex<Vec<StartExecution>>,
    executions: Vec<ExecutionSummary>,
    fail: bool,
}

impl FakeWorkflowEngine {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn with_executions(executions: Vec<ExecutionSummary>) -> Self {
        Self {
            executions,
            ..Default::default()
        }
    }

    pub fn started(&self) -> Vec<StartExecution> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkflowEngine for FakeWorkflowEngine {
    async fn start_execution(&self, request: &StartExecution) -> ServiceResult<ExecutionHandle> {
        if self.fail {
            return Err(ServiceError::External(ExternalServiceError::Workflow {
                operation: "start_execution",
                source: Box::new(std::io::Error::other("access denied")),
            }));
        }
        self.started.lock().unwrap().push(request.clone());
        Ok(ExecutionHandle {
            execution_arn: format!("{}:{}", request.state_machine_arn, request.name),
            start_date: Utc::now(),
        })
    }

    async fn list_executions(
        &self,
        _state_machine_arn: &str,
    ) -> ServiceResult<Vec<ExecutionSummary>> {
        Ok(self.executions.clone())
    }
}
