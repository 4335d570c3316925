use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde_json::Value;
use std::{future::Future, sync::Arc, time::Duration};
use thiserror::Error;

pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} answered with status {status}")]
    Status {
        service: &'static str,
        status: StatusCode,
    },

    #[error("{service} returned an unreadable body: {source}")]
    Body {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl CollectorError {
    /// Transport failures and 5xx answers are worth another attempt.
    fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => status.is_server_error(),
            Self::Body { .. } | Self::Client(_) => false,
        }
    }
}

/// DataCollector
///
/// Reads reference ids from the upstream data services. NBS records point at
/// Idra datasets and KPI definitions by these ids.
#[async_trait]
pub trait DataCollector: Send + Sync {
    async fn dataset_ids(&self) -> Result<Vec<String>, CollectorError>;

    async fn kpi_ids(&self) -> Result<Vec<String>, CollectorError>;
}

pub type CollectorState = Arc<dyn DataCollector>;

/// RetryPolicy
///
/// Fixed-delay retry for upstream calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub async fn run<F, Fut, T>(&self, service: &'static str, mut operation: F) -> Result<T, CollectorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CollectorError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    tracing::warn!(
                        service,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "Upstream call failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.delay).await;
                }
                Err(err) => {
                    tracing::error!(service, attempt, error = %err, "Upstream call failed");
                    return Err(err);
                }
            }
        }
    }
}

/// HttpDataCollector
pub struct HttpDataCollector {
    client: Client,
    idra_url: String,
    kpi_manager_url: String,
    retry: RetryPolicy,
}

impl HttpDataCollector {
    pub fn new(idra_url: impl Into<String>, kpi_manager_url: impl Into<String>) -> Result<Self, CollectorError> {
        let client = Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .build()
            .map_err(CollectorError::Client)?;

        Ok(Self {
            client,
            idra_url: idra_url.into(),
            kpi_manager_url: kpi_manager_url.into(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn fetch_ids(&self, service: &'static str, url: &str) -> Result<Vec<String>, CollectorError> {
        let body = self
            .retry
            .run(service, || self.fetch_json(service, url))
            .await?;

        let ids = extract_ids(&body);
        tracing::debug!(service, count = ids.len(), "Retrieved upstream ids");
        Ok(ids)
    }

    async fn fetch_json(&self, service: &'static str, url: &str) -> Result<Value, CollectorError> {
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|source| CollectorError::Transport { service, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollectorError::Status { service, status });
        }

        response
            .json::<Value>()
            .await
            .map_err(|source| CollectorError::Body { service, source })
    }
}

#[async_trait]
impl DataCollector for HttpDataCollector {
    async fn dataset_ids(&self) -> Result<Vec<String>, CollectorError> {
        self.fetch_ids("idra", &self.idra_url).await
    }

    async fn kpi_ids(&self) -> Result<Vec<String>, CollectorError> {
        self.fetch_ids("kpi-manager", &self.kpi_manager_url).await
    }
}

/// extract_ids
///
/// Accepts a top-level array, or an object wrapping one under `results` or
/// `data`. Items may be id strings or objects carrying an `id` (string or
/// number); anything else is skipped.
pub fn extract_ids(body: &Value) -> Vec<String> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(map) => match ["results", "data"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
        {
            Some(items) => items,
            None => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(id) => Some(id.clone()),
            Value::Object(fields) => match fields.get("id") {
                Some(Value::String(id)) => Some(id.clone()),
                Some(Value::Number(id)) => Some(id.to_string()),
                _ => None,
            },
            _ => None,
        })
        .filter(|id| !id.is_empty())
        .collect()
}

/// MockDataCollector
#[derive(Clone, Default)]
pub struct MockDataCollector {
    pub datasets: Vec<String>,
    pub kpis: Vec<String>,
    pub should_fail: bool,
}

impl MockDataCollector {
    pub fn with_ids(datasets: &[&str], kpis: &[&str]) -> Self {
        Self {
            datasets: datasets.iter().map(|id| id.to_string()).collect(),
            kpis: kpis.iter().map(|id| id.to_string()).collect(),
            should_fail: false,
        }
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    fn answer(&self, service: &'static str, ids: &[String]) -> Result<Vec<String>, CollectorError> {
        if self.should_fail {
            return Err(CollectorError::Status {
                service,
                status: StatusCode::BAD_GATEWAY,
            });
        }
        Ok(ids.to_vec())
    }
}

#[async_trait]
impl DataCollector for MockDataCollector {
    async fn dataset_ids(&self) -> Result<Vec<String>, CollectorError> {
        self.answer("idra", &self.datasets)
    }

    async fn kpi_ids(&self) -> Result<Vec<String>, CollectorError> {
        self.answer("kpi-manager", &self.kpis)
    }
}
