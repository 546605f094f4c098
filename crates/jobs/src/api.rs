//! Backend access.
//!
//! [`AnalysisApi`] is the seam between the job client and the network:
//! [`HttpAnalysisApi`] talks to the real service, [`ScriptedAnalysisApi`]
//! replays canned replies for offline runs and tests.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use analysis::indicator::Indicator;
use parking_lot::Mutex;
use tracing::debug;

use crate::protocol::{AnalysisRequest, AnalysisResponse};

/// Boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unreadable response: {0}")]
    Decode(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Methods return boxed futures so the trait stays dyn-compatible.
pub trait AnalysisApi: Send + Sync {
    fn submit(&self, request: AnalysisRequest) -> BoxFuture<'_, Result<AnalysisResponse, ApiError>>;

    fn task_status(&self, task_id: String) -> BoxFuture<'_, Result<AnalysisResponse, ApiError>>;

    fn indicators(&self) -> BoxFuture<'_, Result<Vec<Indicator>, ApiError>>;
}

pub struct HttpAnalysisApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpAnalysisApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

impl AnalysisApi for HttpAnalysisApi {
    fn submit(&self, request: AnalysisRequest) -> BoxFuture<'_, Result<AnalysisResponse, ApiError>> {
        let url = format!("{}/analysis", self.base_url);
        Box::pin(async move {
            debug!(%url, kind = ?request.kind(), "submitting analysis");
            let resp = self.client.post(&url).json(&request).send().await?;
            Self::read_json(resp).await
        })
    }

    fn task_status(&self, task_id: String) -> BoxFuture<'_, Result<AnalysisResponse, ApiError>> {
        let url = format!("{}/analysis/task/{task_id}", self.base_url);
        Box::pin(async move {
            let resp = self.client.get(&url).send().await?;
            Self::read_json(resp).await
        })
    }

    fn indicators(&self) -> BoxFuture<'_, Result<Vec<Indicator>, ApiError>> {
        let url = format!("{}/indicator", self.base_url);
        Box::pin(async move {
            let resp = self.client.get(&url).send().await?;
            Self::read_json(resp).await
        })
    }
}

/// One canned reply, optionally delivered after a delay.
#[derive(Debug, Clone)]
pub struct Scripted {
    pub delay: Duration,
    pub reply: Result<AnalysisResponse, String>,
}

impl Scripted {
    pub fn ok(reply: AnalysisResponse) -> Self {
        Self {
            delay: Duration::ZERO,
            reply: Ok(reply),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            delay: Duration::ZERO,
            reply: Err(message.into()),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    async fn deliver(self) -> Result<AnalysisResponse, ApiError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply.map_err(ApiError::Unavailable)
    }
}

/// Replays queued replies in call order.
///
/// Submissions with nothing queued fail; polls with nothing queued answer
/// `Running`, which models a task that never finishes.
#[derive(Debug, Default)]
pub struct ScriptedAnalysisApi {
    submits: Mutex<VecDeque<Scripted>>,
    polls: Mutex<VecDeque<Scripted>>,
    indicators: Mutex<Vec<Indicator>>,
    submitted: Mutex<Vec<AnalysisRequest>>,
    poll_calls: AtomicUsize,
}

impl ScriptedAnalysisApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_submit(&self, reply: Scripted) -> &Self {
        self.submits.lock().push_back(reply);
        self
    }

    pub fn push_poll(&self, reply: Scripted) -> &Self {
        self.polls.lock().push_back(reply);
        self
    }

    pub fn set_indicators(&self, indicators: Vec<Indicator>) {
        *self.indicators.lock() = indicators;
    }

    pub fn submitted(&self) -> Vec<AnalysisRequest> {
        self.submitted.lock().clone()
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }
}

impl AnalysisApi for ScriptedAnalysisApi {
    fn submit(&self, request: AnalysisRequest) -> BoxFuture<'_, Result<AnalysisResponse, ApiError>> {
        self.submitted.lock().push(request);
        let next = self.submits.lock().pop_front();
        Box::pin(async move {
            match next {
                Some(s) => s.deliver().await,
                None => Err(ApiError::Unavailable("no scripted submission reply".into())),
            }
        })
    }

    fn task_status(&self, task_id: String) -> BoxFuture<'_, Result<AnalysisResponse, ApiError>> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.polls.lock().pop_front();
        Box::pin(async move {
            match next {
                Some(s) => s.deliver().await,
                None => Ok(AnalysisResponse::running(task_id)),
            }
        })
    }

    fn indicators(&self) -> BoxFuture<'_, Result<Vec<Indicator>, ApiError>> {
        let list = self.indicators.lock().clone();
        Box::pin(async move { Ok(list) })
    }
}
