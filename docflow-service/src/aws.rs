//! AWS JSON-protocol transport shared by the OCR and workflow clients.
//!
//! Requests are SigV4-signed when credentials are configured and sent
//! unsigned otherwise, for local emulators or a signing proxy.

use std::time::{Duration, SystemTime};

use aws_credential_types::Credentials;
use aws_sigv4::http_request::{SignableBody, SignableRequest, SigningParams, SigningSettings, sign};
use aws_sigv4::sign::v4;
use axum::http::{self, header};
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::config::AwsConfig;
use crate::error::ExternalServiceError;

/// Protocol flavour, which only changes the content type
#[derive(Debug, Clone, Copy)]
pub enum JsonProtocol {
    V1_0,
    V1_1,
}

impl JsonProtocol {
    fn content_type(self) -> &'static str {
        match self {
            JsonProtocol::V1_0 => "application/x-amz-json-1.0",
            JsonProtocol::V1_1 => "application/x-amz-json-1.1",
        }
    }
}

/// SigV4 signing for one service in one region
#[derive(Debug, Clone)]
pub struct RequestSigner {
    credentials: Credentials,
    region: String,
    service: &'static str,
}

impl RequestSigner {
    /// `None` unless both the access key id and the secret are set.
    pub fn from_config(config: &AwsConfig, service: &'static str) -> Option<Self> {
        let access_key_id = config.access_key_id.as_deref()?;
        let secret_access_key = config.secret_access_key.as_deref()?;
        let credentials = Credentials::new(
            access_key_id,
            secret_access_key,
            config.session_token.clone(),
            None,
            "docflow-config",
        );

        Some(Self {
            credentials,
            region: config.region(),
            service,
        })
    }

    /// Add the SigV4 headers for `request` as of `time`.
    fn sign(
        &self,
        request: &mut http::Request<Vec<u8>>,
        time: SystemTime,
    ) -> Result<(), String> {
        let identity = self.credentials.clone().into();
        let params: SigningParams = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name(self.service)
            .time(time)
            .settings(SigningSettings::default())
            .build()
            .map_err(|e| e.to_string())?
            .into();

        let uri = request.uri().to_string();
        let headers: Vec<(&str, &str)> = request
            .headers()
            .iter()
            .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?)))
            .collect();
        let signable = SignableRequest::new(
            request.method().as_str(),
            uri,
            headers.into_iter(),
            SignableBody::Bytes(request.body().as_slice()),
        )
        .map_err(|e| e.to_string())?;

        let (instructions, _signature) = sign(signable, &params)
            .map_err(|e| e.to_string())?
            .into_parts();
        instructions.apply_to_request_http1x(request);
        Ok(())
    }
}

/// One AWS JSON endpoint
pub struct AwsJsonClient {
    client: Client,
    endpoint: String,
    protocol: JsonProtocol,
    signer: Option<RequestSigner>,
}

impl AwsJsonClient {
    pub fn new(
        endpoint: &str,
        timeout_secs: u64,
        protocol: JsonProtocol,
        signer: Option<RequestSigner>,
    ) -> Result<Self, ExternalServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ExternalServiceError::Connection {
                url: endpoint.to_string(),
                source: e,
            })?;

        if signer.is_none() {
            debug!(endpoint, "No AWS credentials configured, requests are unsigned");
        }

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            protocol,
            signer,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_request(
        &self,
        target: &str,
        body: Vec<u8>,
        time: SystemTime,
    ) -> Result<http::Request<Vec<u8>>, ExternalServiceError> {
        let invalid = |message: String| ExternalServiceError::InvalidRequest {
            url: self.endpoint.clone(),
            message,
        };

        let mut request = http::Request::post(self.endpoint.as_str())
            .header(header::CONTENT_TYPE, self.protocol.content_type())
            .header("x-amz-target", target)
            .body(body)
            .map_err(|e| invalid(e.to_string()))?;

        if let Some(signer) = &self.signer {
            signer.sign(&mut request, time).map_err(invalid)?;
        }
        Ok(request)
    }

    /// POST one action and decode its JSON reply.
    pub async fn call<Req, Resp>(
        &self,
        target: &str,
        request: &Req,
    ) -> Result<Resp, ExternalServiceError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let endpoint = self.endpoint.as_str();
        debug!(endpoint, target, "Calling AWS JSON action");

        let body = serde_json::to_vec(request).map_err(|e| ExternalServiceError::InvalidRequest {
            url: endpoint.to_string(),
            message: e.to_string(),
        })?;
        let request = self.build_request(target, body, SystemTime::now())?;
        let request = reqwest::Request::try_from(request).map_err(|e| {
            ExternalServiceError::Connection {
                url: endpoint.to_string(),
                source: e,
            }
        })?;

        let response = self.client.execute(request).await.map_err(|e| {
            ExternalServiceError::Connection {
                url: endpoint.to_string(),
                source: e,
            }
        })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ExternalServiceError::Connection {
                url: endpoint.to_string(),
                source: e,
            })?;

        if !status.is_success() {
            return Err(ExternalServiceError::Status {
                url: endpoint.to_string(),
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        serde_json::from_slice(&body).map_err(|e| ExternalServiceError::InvalidResponse {
            url: endpoint.to_string(),
            source: Box::new(e),
        })
    }
}

/// Error body returned by AWS JSON services
#[derive(Debug, Deserialize)]
struct AwsErrorBody {
    #[serde(rename = "__type", default)]
    error_type: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

/// `"<type>: <message>"` from an AWS error body, or the raw text.
fn error_message(body: &[u8]) -> String {
    match serde_json::from_slice::<AwsErrorBody>(body) {
        Ok(AwsErrorBody {
            error_type: Some(error_type),
            message,
        }) => {
            // Types may be namespaced: "com.amazonaws.states#ExecutionAlreadyExists"
            let short = error_type.rsplit('#').next().unwrap_or(&error_type);
            match message {
                Some(message) => format!("{short}: {message}"),
                None => short.to_string(),
            }
        }
        _ => String::from_utf8_lossy(body).into_owned(),
    }
}

/// Whether a failed call was rejected with the given AWS error type.
pub fn is_error_type(err: &ExternalServiceError, error_type: &str) -> bool {
    match err {
        ExternalServiceError::Status { message, .. } => message
            .split(':')
            .next()
            .is_some_and(|prefix| prefix == error_type),
        _ => false,
    }
}
