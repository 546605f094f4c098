//! Wire types for the analysis backend.
//!
//! - `POST /analysis` takes an [`AnalysisRequest`] and answers an
//!   [`AnalysisResponse`]: either a finished (possibly server-cached) result
//!   or a task id to poll.
//! - `GET /analysis/task/{taskId}` answers the same shape until the task is
//!   terminal.
//! - `GET /indicator` lists [`analysis::Indicator`]s.

use analysis::config::AnalysisConfig;
use analysis::validation::{RequestKind, ValidationError};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// A validated configuration ready to be sent.
///
/// Only [`AnalysisRequest::new`] builds one, so an invalid draft cannot be
/// submitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    request_kind: RequestKind,
    #[serde(flatten)]
    config: AnalysisConfig,
}

impl AnalysisRequest {
    pub fn new(config: AnalysisConfig) -> Result<Self, ValidationError> {
        let request_kind = config.validate()?;
        Ok(Self {
            request_kind,
            config,
        })
    }

    pub fn kind(&self) -> RequestKind {
        self.request_kind
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Content fingerprint: blake3 over the request's JSON form. Fields
    /// serialize in declaration order, so equal requests hash alike. `None`
    /// when the request cannot be serialized; such a request is not cached.
    pub fn fingerprint(&self) -> Option<ResultKey> {
        match serde_json::to_vec(self) {
            Ok(bytes) => Some(ResultKey(blake3::hash(&bytes).to_hex().to_string())),
            Err(e) => {
                warn!(error = %e, "request not serializable, skipping cache");
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResultKey(pub String);

/// Task ids arrive as numbers or strings; both are kept as text.
fn task_id_from_wire<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum WireTaskId {
        Num(u64),
        Str(String),
    }

    Ok(
        Option::<WireTaskId>::deserialize(deserializer)?.map(|id| match id {
            WireTaskId::Num(n) => n.to_string(),
            WireTaskId::Str(s) => s,
        }),
    )
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub is_cached: bool,
    #[serde(
        default,
        deserialize_with = "task_id_from_wire",
        skip_serializing_if = "Option::is_none"
    )]
    pub task_id: Option<String>,
    /// Echo of the submitted configuration; older backends put the payload
    /// here instead of in `results`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResponse {
    pub fn completed(results: Value) -> Self {
        Self {
            status: Some(TaskStatus::Completed),
            results: Some(results),
            ..Self::default()
        }
    }

    pub fn cached(results: Value) -> Self {
        Self {
            is_cached: true,
            ..Self::completed(results)
        }
    }

    pub fn pending(task_id: impl Into<String>) -> Self {
        Self {
            status: Some(TaskStatus::Pending),
            task_id: Some(task_id.into()),
            ..Self::default()
        }
    }

    pub fn running(task_id: impl Into<String>) -> Self {
        Self {
            status: Some(TaskStatus::Running),
            ..Self::pending(task_id)
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(TaskStatus::Failed),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Reduces the loosely-shaped response to what the client acts on.
    pub fn reply(self) -> Reply {
        if self.status == Some(TaskStatus::Failed) || self.error.is_some() {
            return Reply::Failed(
                self.error
                    .unwrap_or_else(|| "Analysis failed without a message.".to_string()),
            );
        }
        if self.is_cached || self.status == Some(TaskStatus::Completed) {
            return match self.results.or(self.data) {
                Some(payload) => Reply::Ready {
                    payload,
                    cached: self.is_cached,
                },
                None => Reply::Malformed("completed response carries no data".into()),
            };
        }
        match (self.task_id, self.status) {
            (Some(task_id), status) => Reply::Pending {
                task_id,
                status: status.unwrap_or(TaskStatus::Pending),
            },
            (None, _) => Reply::Malformed("response has neither data nor a task id".into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ready { payload: Value, cached: bool },
    Pending { task_id: String, status: TaskStatus },
    Failed(String),
    Malformed(String),
}

fn default_tile_size() -> u32 {
    256
}

/// Percent-difference raster published by a reference-only Spatial run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceLayer {
    pub tiles: Vec<String>,
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend: Option<Value>,
}

impl ReferenceLayer {
    /// Reads the layer from a payload, either nested as `referenceLayer` or
    /// at the top level.
    pub fn from_payload(payload: &Value) -> Result<Self, serde_json::Error> {
        let layer = payload.get("referenceLayer").unwrap_or(payload);
        serde_json::from_value(layer.clone())
    }
}
