use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::classifier;
use crate::config::{ServiceConfig, StorageBackend, WorkflowEngineKind};
use crate::error::{ServiceError, ServiceResult};
use crate::event::{HandlerResponse, IngestionEvent, StorageEvent};
use crate::images::{ImageExtractor, PageImageMap, PageRenderer, PdfiumRenderer, RenderOptions};
use crate::ocr::{
    self, AnalysisStatus, LaunchedJob, OcrJobLauncher, OcrJobWaiter, OcrResults, OcrService,
    TextractClient,
};
use crate::status;
use crate::storage::{FsObjectStore, HttpObjectStore, ObjectStore};
use crate::trigger::OrchestrationTrigger;
use crate::upload::{DocumentUploader, UploadOutcome};
use crate::workflow::{
    ExecutionSummary, IngestionWorkflow, LocalWorkflowEngine, RunReport, StepFunctionsClient,
    WorkflowEngine,
};

/// One execution and, when it ran in-process and has finished, its report
#[derive(Debug, Serialize)]
pub struct ExecutionDetail {
    pub execution: ExecutionSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<RunReport>,
}

/// Every stage, wired to its collaborators
pub struct PipelineService {
    launcher: Arc<OcrJobLauncher>,
    waiter: Arc<OcrJobWaiter>,
    extractor: Arc<ImageExtractor>,
    engine: Arc<dyn WorkflowEngine>,
    trigger: Arc<OrchestrationTrigger>,
    uploader: DocumentUploader,
    state_machine_arn: String,
    local_engine: Option<Arc<LocalWorkflowEngine>>,
    shutdown: CancellationToken,
}

impl PipelineService {
    /// Build the service with the clients the configuration selects.
    pub fn new(config: ServiceConfig) -> ServiceResult<Self> {
        info!("Initializing docflow pipeline service");

        let store: Arc<dyn ObjectStore> = match config.storage.backend {
            StorageBackend::Fs => {
                info!(root = %config.storage.root_dir.display(), "Using filesystem object store");
                Arc::new(FsObjectStore::new(config.storage.root_dir.clone()))
            }
            StorageBackend::Http => {
                let endpoint = config.storage.endpoint.as_deref().ok_or_else(|| {
                    ServiceError::Config {
                        message: "storage.endpoint is required for the http backend".to_string(),
                    }
                })?;
                info!(endpoint, "Using HTTP object store");
                Arc::new(HttpObjectStore::new(
                    endpoint,
                    config.storage.request_timeout_secs,
                )?)
            }
        };

        let ocr: Arc<dyn OcrService> = Arc::new(TextractClient::new(&config.ocr, &config.aws)?);

        if let Err(e) = PdfiumRenderer::check_available() {
            warn!(error = %e, "PDF renderer unavailable; image extraction will fail");
        }
        let renderer: Arc<dyn PageRenderer> = Arc::new(PdfiumRenderer::new(RenderOptions {
            dpi: config.extraction.dpi,
            jpeg_quality: config.extraction.jpeg_quality,
        }));

        let remote_engine: Option<Arc<dyn WorkflowEngine>> = match config.workflow.engine {
            WorkflowEngineKind::Local => None,
            WorkflowEngineKind::StepFunctions => {
                let endpoint = config.workflow.endpoint.as_deref().ok_or_else(|| {
                    ServiceError::Config {
                        message: "workflow.endpoint is required for step_functions".to_string(),
                    }
                })?;
                info!(endpoint, "Using remote workflow engine");
                Some(Arc::new(StepFunctionsClient::new(
                    endpoint,
                    config.workflow.request_timeout_secs,
                    &config.aws,
                )?))
            }
        };

        Ok(Self::assemble(config, store, ocr, renderer, remote_engine))
    }

    /// Wire stages around the given collaborators. Without a remote engine
    /// the in-process one runs the state machine.
    pub fn assemble(
        config: ServiceConfig,
        store: Arc<dyn ObjectStore>,
        ocr: Arc<dyn OcrService>,
        renderer: Arc<dyn PageRenderer>,
        remote_engine: Option<Arc<dyn WorkflowEngine>>,
    ) -> Self {
        let state_machine_arn = config.workflow.state_machine_arn();

        let launcher = Arc::new(OcrJobLauncher::new(
            ocr.clone(),
            config.ocr.feature_types.clone(),
        ));
        let waiter = Arc::new(OcrJobWaiter::new(
            ocr,
            config.ocr.poll_interval(),
            config.ocr.max_polls,
        ));
        let extractor = Arc::new(ImageExtractor::new(
            store.clone(),
            renderer,
            config.extraction.scratch_dir.clone(),
        ));

        let (engine, local_engine): (Arc<dyn WorkflowEngine>, _) = match remote_engine {
            Some(engine) => (engine, None),
            None => {
                let workflow = Arc::new(IngestionWorkflow::new(
                    launcher.clone(),
                    waiter.clone(),
                    extractor.clone(),
                    config.workflow.step_timeout(),
                ));
                let local = Arc::new(LocalWorkflowEngine::new(
                    state_machine_arn.clone(),
                    workflow,
                    config.workflow.retained_executions,
                ));
                (local.clone() as Arc<dyn WorkflowEngine>, Some(local))
            }
        };

        let trigger = Arc::new(OrchestrationTrigger::new(
            engine.clone(),
            state_machine_arn.clone(),
        ));
        let uploader = DocumentUploader::new(store, trigger.clone(), &config.upload);

        Self {
            launcher,
            waiter,
            extractor,
            engine,
            trigger,
            uploader,
            state_machine_arn,
            local_engine,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn local_engine(&self) -> Option<&Arc<LocalWorkflowEngine>> {
        self.local_engine.as_ref()
    }

    pub fn classify(&self, event: StorageEvent) -> ServiceResult<StorageEvent> {
        classifier::classify(event)
    }

    /// Start an OCR job for the event's object; removals start nothing.
    pub async fn launch_ocr(
        &self,
        event: &StorageEvent,
    ) -> ServiceResult<HandlerResponse<Option<LaunchedJob>>> {
        let ingestion = IngestionEvent::from_storage_event(event)?;
        if ingestion.is_removal() {
            return Ok(HandlerResponse::ok(None));
        }
        let job = self
            .launcher
            .launch(&ingestion.bucket, &ingestion.object_key)
            .await?;
        Ok(HandlerResponse::ok(Some(job)))
    }

    pub async fn wait_ocr(&self, job_id: &str) -> ServiceResult<HandlerResponse<AnalysisStatus>> {
        let cancel = self.shutdown.child_token();
        let status = self.waiter.wait(job_id, &cancel).await?;
        Ok(HandlerResponse::ok(status))
    }

    pub async fn analyze(&self, event: &StorageEvent) -> ServiceResult<HandlerResponse<OcrResults>> {
        let cancel = self.shutdown.child_token();
        let results = ocr::analyze(&self.launcher, &self.waiter, event, &cancel).await?;
        Ok(HandlerResponse::ok(results))
    }

    /// Removals answer with an empty page map.
    pub async fn extract_images(
        &self,
        event: &StorageEvent,
    ) -> ServiceResult<HandlerResponse<PageImageMap>> {
        let pages = self.extractor.extract_for_event(event).await?;
        Ok(HandlerResponse::ok(pages.unwrap_or_default()))
    }

    pub async fn trigger(&self, raw: &Value) -> HandlerResponse<String> {
        self.trigger.handle(raw).await
    }

    pub async fn latest_run(&self, user: Option<&str>) -> ServiceResult<Option<ExecutionSummary>> {
        status::latest_run(self.engine.as_ref(), &self.state_machine_arn, user).await
    }

    pub async fn upload_document(
        &self,
        file_name: &str,
        user: Option<&str>,
        body: Bytes,
    ) -> ServiceResult<UploadOutcome> {
        self.uploader.upload(file_name, user, body).await
    }

    pub async fn describe_execution(&self, name: &str) -> ServiceResult<ExecutionDetail> {
        if let Some(local) = &self.local_engine {
            let execution = local
                .summary(name)
                .ok_or_else(|| ServiceError::ExecutionNotFound {
                    name: name.to_string(),
                })?;
            let report = local.report(name).map(|report| (*report).clone());
            return Ok(ExecutionDetail { execution, report });
        }

        let execution = self
            .engine
            .list_executions(&self.state_machine_arn)
            .await?
            .into_iter()
            .find(|execution| execution.name == name)
            .ok_or_else(|| ServiceError::ExecutionNotFound {
                name: name.to_string(),
            })?;
        Ok(ExecutionDetail {
            execution,
            report: None,
        })
    }

    /// Abort a running in-process execution. Remote runs are stopped
    /// through their own engine.
    pub fn stop_execution(&self, name: &str) -> ServiceResult<bool> {
        match &self.local_engine {
            Some(local) if local.summary(name).is_some() => Ok(local.stop_execution(name)),
            _ => Err(ServiceError::ExecutionNotFound {
                name: name.to_string(),
            }),
        }
    }

    /// Stop in-flight waits and local executions.
    pub fn shutdown(&self) {
        info!("Shutting down pipeline service");
        self.shutdown.cancel();
        if let Some(local) = &self.local_engine {
            local.shutdown();
        }
    }
}
