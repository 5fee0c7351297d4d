//! Configuration loading from files and environment variables.

use config::{Config, Environment, File};

use crate::error::{ServiceError, ServiceResult};

use super::ServiceConfig;

/// Older deployments set the orchestrator ARN through this variable
const LEGACY_ARN_VAR: &str = "DOCUMENT_ORCHESTRATOR_ARN";

/// Load configuration from `config.*` and `DOCFLOW__*` env vars
pub fn load_config() -> ServiceResult<ServiceConfig> {
    let builder = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::with_prefix("DOCFLOW")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("ocr.feature_types"),
        );

    let mut config: ServiceConfig = build(builder)?;
    apply_legacy_arn(&mut config, std::env::var(LEGACY_ARN_VAR).ok());
    apply_aws_env(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

/// Fill unset `aws` values from the standard `AWS_*` variables.
fn apply_aws_env(config: &mut ServiceConfig, lookup: impl Fn(&str) -> Option<String>) {
    let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    let aws = &mut config.aws;

    if aws.access_key_id.is_none() && aws.secret_access_key.is_none() {
        aws.access_key_id = lookup("AWS_ACCESS_KEY_ID");
        aws.secret_access_key = lookup("AWS_SECRET_ACCESS_KEY");
        if aws.session_token.is_none() {
            aws.session_token = lookup("AWS_SESSION_TOKEN");
        }
    }
    if aws.region.is_none() {
        aws.region = lookup("AWS_REGION").or_else(|| lookup("AWS_DEFAULT_REGION"));
    }
}

/// Use `legacy_arn` when no ARN is configured. Blank values are ignored.
fn apply_legacy_arn(config: &mut ServiceConfig, legacy_arn: Option<String>) {
    if config.workflow.state_machine_arn.is_none() {
        config.workflow.state_machine_arn = legacy_arn.filter(|v| !v.trim().is_empty());
    }
}

fn build(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> ServiceResult<ServiceConfig> {
    builder
        .build()
        .map_err(|e| ServiceError::Config {
            message: format!("Failed to build config: {}", e),
        })?
        .try_deserialize()
        .map_err(|e| ServiceError::Config {
            message: format!("Failed to deserialize config: {}", e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StorageBackend, WorkflowEngineKind};
    use config::FileFormat;

    #[test]
    fn test_empty_sources_yield_defaults() {
        let config = build(Config::builder()).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.backend, StorageBackend::Fs);
        assert_eq!(config.ocr.poll_interval_secs, 30);
        assert_eq!(config.ocr.max_polls, None);
        assert_eq!(config.ocr.feature_types, vec!["TABLES".to_string()]);
        assert_eq!(config.workflow.engine, WorkflowEngineKind::Local);
        assert!(config.upload.notify);
        assert_eq!(config.upload.base_path, "tenants/public/default");
        assert_eq!(config.workflow.retained_executions, 1000);
    }

    #[test]
    fn test_legacy_arn_fills_missing_arn() {
        let mut config = build(Config::builder()).unwrap();
        apply_legacy_arn(&mut config, Some("arn:aws:states:us-east-1:1:stateMachine:old".into()));
        assert_eq!(
            config.workflow.state_machine_arn(),
            "arn:aws:states:us-east-1:1:stateMachine:old"
        );
    }

    #[test]
    fn test_legacy_arn_unset_or_blank() {
        let mut config = build(Config::builder()).unwrap();
        apply_legacy_arn(&mut config, None);
        assert_eq!(config.workflow.state_machine_arn, None);

        apply_legacy_arn(&mut config, Some("   ".into()));
        assert_eq!(config.workflow.state_machine_arn, None);
        assert_eq!(
            config.workflow.state_machine_arn(),
            "arn:local:states:document-orchestrator"
        );
    }

    #[test]
    fn test_configured_arn_beats_legacy() {
        let toml = r#"
            [workflow]
            state_machine_arn = "arn:aws:states:eu-west-1:1:stateMachine:new"
        "#;
        let mut config =
            build(Config::builder().add_source(File::from_str(toml, FileFormat::Toml))).unwrap();
        apply_legacy_arn(&mut config, Some("arn:aws:states:us-east-1:1:stateMachine:old".into()));
        assert_eq!(
            config.workflow.state_machine_arn(),
            "arn:aws:states:eu-west-1:1:stateMachine:new"
        );
    }

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: Vec<(String, String)> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| {
            vars.iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        }
    }

    #[test]
    fn test_aws_env_fills_credentials() {
        let mut config = build(Config::builder()).unwrap();
        assert_eq!(config.aws.region(), "us-east-1");

        apply_aws_env(
            &mut config,
            env(&[
                ("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE"),
                ("AWS_SECRET_ACCESS_KEY", "secret"),
                ("AWS_SESSION_TOKEN", "token"),
                ("AWS_DEFAULT_REGION", "eu-west-1"),
            ]),
        );

        assert_eq!(config.aws.access_key_id.as_deref(), Some("AKIDEXAMPLE"));
        assert_eq!(config.aws.secret_access_key.as_deref(), Some("secret"));
        assert_eq!(config.aws.session_token.as_deref(), Some("token"));
        assert_eq!(config.aws.region(), "eu-west-1");
    }

    #[test]
    fn test_configured_aws_keys_beat_env() {
        let toml = r#"
            [aws]
            region = "ap-southeast-2"
            access_key_id = "AKIDFILE"
            secret_access_key = "file-secret"
        "#;
        let mut config =
            build(Config::builder().add_source(File::from_str(toml, FileFormat::Toml))).unwrap();

        apply_aws_env(
            &mut config,
            env(&[
                ("AWS_ACCESS_KEY_ID", "AKIDENV"),
                ("AWS_SECRET_ACCESS_KEY", "env-secret"),
                ("AWS_SESSION_TOKEN", "env-token"),
                ("AWS_REGION", "us-west-2"),
            ]),
        );

        assert_eq!(config.aws.access_key_id.as_deref(), Some("AKIDFILE"));
        assert_eq!(config.aws.secret_access_key.as_deref(), Some("file-secret"));
        assert_eq!(config.aws.session_token, None);
        assert_eq!(config.aws.region(), "ap-southeast-2");
    }

    #[test]
    fn test_blank_aws_env_leaves_requests_unsigned() {
        let mut config = build(Config::builder()).unwrap();
        apply_aws_env(&mut config, env(&[("AWS_ACCESS_KEY_ID", " "), ("AWS_REGION", "")]));

        assert_eq!(config.aws.access_key_id, None);
        assert_eq!(config.aws.region, None);
    }

    #[test]
    fn test_file_values_override_defaults() {
        let toml = r#"
            [ocr]
            poll_interval_secs = 1
            max_polls = 5

            [workflow]
            engine = "step_functions"
            state_machine_arn = "arn:aws:states:eu-west-1:1:stateMachine:docs"

            [storage]
            backend = "http"
            endpoint = "http://localhost:9000"
        "#;
        let config = build(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
            .unwrap();

        assert_eq!(config.ocr.poll_interval_secs, 1);
        assert_eq!(config.ocr.max_polls, Some(5));
        assert_eq!(config.workflow.engine, WorkflowEngineKind::StepFunctions);
        assert_eq!(
            config.workflow.state_machine_arn(),
            "arn:aws:states:eu-west-1:1:stateMachine:docs"
        );
        assert_eq!(config.storage.backend, StorageBackend::Http);
        assert_eq!(config.storage.endpoint.as_deref(), Some("http://localhost:9000"));
    }

    #[test]
    fn test_unknown_engine_is_config_error() {
        let toml = r#"
            [workflow]
            engine = "airflow"
        "#;
        let err = build(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Config { .. }));
    }
}
