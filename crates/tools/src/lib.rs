//! Command implementations behind the `analysis` binary.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use analysis::config::{AnalysisConfig, AnalysisType, TemporalResolution};
use analysis::indicator::{Indicator, variable_options};
use analysis::validation::{RequestKind, ValidationError};
use jobs::client::{AnalysisJobClient, JobError};
use jobs::protocol::AnalysisRequest;
use serde_json::Value;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Job(#[from] JobError),
    #[error("analysis settled without publishing anything")]
    NothingPublished,
}

/// Reads a configuration snapshot as JSON.
pub fn load_config(path: &Path) -> Result<AnalysisConfig, CliError> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&text)?)
}

pub fn request_kind_label(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::Standard => "standard",
        RequestKind::ReferenceOnly => "reference-only",
    }
}

pub fn validate_config(config: &AnalysisConfig) -> Result<RequestKind, CliError> {
    Ok(config.validate()?)
}

/// Submits `config` and waits for the job to settle. Returns the assembled
/// result, or the reference layer of a reference-only run.
pub async fn submit_config(
    client: &AnalysisJobClient,
    config: AnalysisConfig,
) -> Result<Value, CliError> {
    let request = AnalysisRequest::new(config)?;
    let kind = request.kind();
    client.submit(request).await;
    client.wait_settled().await;

    let state = client.state();
    if let Some(error) = state.error {
        return Err(error.into());
    }
    let published = match kind {
        RequestKind::Standard => state.result.map(serde_json::to_value),
        RequestKind::ReferenceOnly => state.reference_layer.map(serde_json::to_value),
    };
    match published {
        Some(value) => {
            info!(kind = request_kind_label(kind), "analysis settled");
            Ok(value?)
        }
        None => Err(CliError::NothingPublished),
    }
}

/// One line per offered indicator: `variable<TAB>name<TAB>source`.
pub fn format_indicators(
    indicators: &[Indicator],
    analysis_type: Option<AnalysisType>,
    resolution: Option<TemporalResolution>,
) -> String {
    let offered: Vec<&Indicator> = match analysis_type {
        Some(t) => variable_options(indicators, t, resolution),
        None => {
            let mut all: Vec<&Indicator> = indicators.iter().collect();
            all.sort_by(|a, b| a.name.cmp(&b.name));
            all
        }
    };
    let mut out = String::new();
    for i in offered {
        let _ = writeln!(out, "{}\t{}\t{}", i.variable, i.name, i.source);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{CliError, format_indicators, load_config, submit_config, validate_config};
    use analysis::config::{AnalysisType, TemporalResolution};
    use analysis::indicator::Indicator;
    use analysis::validation::{RequestKind, ValidationError};
    use jobs::api::{Scripted, ScriptedAnalysisApi};
    use jobs::client::{AnalysisJobClient, JobSettings};
    use jobs::protocol::AnalysisResponse;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn write_config(dir: &tempfile::TempDir, body: serde_json::Value) -> std::path::PathBuf {
        let path = dir.path().join("config.json");
        std::fs::write(&path, body.to_string()).unwrap();
        path
    }

    fn baseline() -> serde_json::Value {
        json!({
            "analysisType": "baseline",
            "landscape": "K2C",
            "locations": [{"id": "c1", "name": "Kashongi", "latitude": -0.6, "longitude": 30.8}]
        })
    }

    #[test]
    fn validates_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&write_config(&dir, baseline())).unwrap();
        assert_eq!(validate_config(&config).unwrap(), RequestKind::Standard);

        let config = load_config(&write_config(&dir, json!({"analysisType": "baseline"}))).unwrap();
        assert!(matches!(
            validate_config(&config),
            Err(CliError::Validation(ValidationError::MissingLandscape))
        ));
        assert!(matches!(
            load_config(&dir.path().join("missing.json")),
            Err(CliError::Io { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn submit_prints_assembled_result() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&write_config(&dir, baseline())).unwrap();
        let api = Arc::new(ScriptedAnalysisApi::new());
        api.push_submit(Scripted::ok(AnalysisResponse::pending("t-1")))
            .push_poll(Scripted::ok(AnalysisResponse::completed(json!([{"forest_ha": 3.5}]))));
        let client = AnalysisJobClient::new(api, JobSettings::default());

        let out = submit_config(&client, config).await.unwrap();
        assert_eq!(out["view"]["kind"], "table");
        assert_eq!(out["view"]["columns"], json!(["forest_ha"]));
    }

    #[tokio::test(start_paused = true)]
    async fn submit_surfaces_server_errors() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&write_config(&dir, baseline())).unwrap();
        let api = Arc::new(ScriptedAnalysisApi::new());
        api.push_submit(Scripted::ok(AnalysisResponse::failed("quota exceeded")));
        let client = AnalysisJobClient::new(api, JobSettings::default());

        let err = submit_config(&client, config).await.unwrap_err();
        assert_eq!(err.to_string(), "quota exceeded");
    }

    #[test]
    fn indicators_are_filtered_and_sorted() {
        let indicators: Vec<Indicator> = serde_json::from_value(json!([
            {"name": "Soil carbon", "variable": "soc", "source": "isric",
             "analysisTypes": ["baseline"]},
            {"name": "Forest loss", "variable": "loss", "source": "hansen",
             "analysisTypes": ["temporal", "baci"], "temporalResolutions": ["annual"]}
        ]))
        .unwrap();
        assert_eq!(
            format_indicators(&indicators, None, None),
            "loss\tForest loss\thansen\nsoc\tSoil carbon\tisric\n"
        );
        assert_eq!(
            format_indicators(
                &indicators,
                Some(AnalysisType::Baci),
                Some(TemporalResolution::Monthly)
            ),
            ""
        );
        assert_eq!(
            format_indicators(&indicators, Some(AnalysisType::Baseline), None),
            "soc\tSoil carbon\tisric\n"
        );
    }
}
