//! Textract-compatible document analysis client (AWS JSON 1.1).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AnalysisRequest, AnalysisStatus, OcrService};
use crate::aws::{AwsJsonClient, JsonProtocol, RequestSigner};
use crate::config::{AwsConfig, OcrConfig};
use crate::error::{ExternalServiceError, ServiceError, ServiceResult};

const START_TARGET: &str = "Textract.StartDocumentAnalysis";
const GET_TARGET: &str = "Textract.GetDocumentAnalysis";

const SIGNING_NAME: &str = "textract";

pub struct TextractClient {
    client: AwsJsonClient,
}

impl TextractClient {
    pub fn new(config: &OcrConfig, aws: &AwsConfig) -> ServiceResult<Self> {
        let client = AwsJsonClient::new(
            &config.endpoint,
            config.request_timeout_secs,
            JsonProtocol::V1_1,
            RequestSigner::from_config(aws, SIGNING_NAME),
        )?;

        Ok(Self { client })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StartDocumentAnalysisInput<'a> {
    document_location: DocumentLocation<'a>,
    feature_types: &'a [String],
    output_config: OutputConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DocumentLocation<'a> {
    s3_object: S3ObjectRef<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct S3ObjectRef<'a> {
    bucket: &'a str,
    name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct OutputConfig<'a> {
    s3_bucket: &'a str,
    s3_prefix: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StartDocumentAnalysisOutput {
    job_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetDocumentAnalysisInput<'a> {
    job_id: &'a str,
}

impl<'a> StartDocumentAnalysisInput<'a> {
    fn from_request(request: &'a AnalysisRequest) -> Self {
        Self {
            document_location: DocumentLocation {
                s3_object: S3ObjectRef {
                    bucket: &request.bucket,
                    name: &request.object_key,
                },
            },
            feature_types: &request.feature_types,
            output_config: OutputConfig {
                s3_bucket: &request.output_bucket,
                s3_prefix: &request.output_prefix,
            },
        }
    }
}

fn ocr_error(operation: &'static str, source: ExternalServiceError) -> ServiceError {
    ServiceError::External(ExternalServiceError::Ocr {
        operation,
        source: Box::new(source),
    })
}

#[async_trait]
impl OcrService for TextractClient {
    async fn start_document_analysis(&self, request: &AnalysisRequest) -> ServiceResult<String> {
        let input = StartDocumentAnalysisInput::from_request(request);
        let output: StartDocumentAnalysisOutput = self
            .client
            .call(START_TARGET, &input)
            .await
        .map_err(|e| ocr_error("start_document_analysis", e))?;

        Ok(output.job_id)
    }

    async fn get_document_analysis(&self, job_id: &str) -> ServiceResult<AnalysisStatus> {
        let status: AnalysisStatus = self
            .client
            .call(GET_TARGET, &GetDocumentAnalysisInput { job_id })
            .await
        .map_err(|e| ocr_error("get_document_analysis", e))?;

        if status.job_status_str().is_none() {
            return Err(ocr_error(
                "get_document_analysis",
                ExternalServiceError::InvalidResponse {
                    url: self.client.endpoint().to_string(),
                    source: "response has no JobStatus".into(),
                },
            ));
        }

        Ok(status)
    }
}
