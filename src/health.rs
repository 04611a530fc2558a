use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use utoipa::ToSchema;

use crate::paystack::PaystackClient;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    #[schema(value_type = Object)]
    pub dependencies: HashMap<String, DependencyStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyStatus {
    Healthy { status: String, latency_ms: u64 },
    Unhealthy { status: String, error: String },
}

impl DependencyStatus {
    fn unhealthy(error: impl Into<String>) -> Self {
        DependencyStatus::Unhealthy {
            status: "unhealthy".to_string(),
            error: error.into(),
        }
    }

    fn healthy(start: Instant) -> Self {
        DependencyStatus::Healthy {
            status: "healthy".to_string(),
            latency_ms: start.elapsed().as_millis() as u64,
        }
    }
}

#[async_trait]
pub trait DependencyChecker: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether a failure makes the whole service unhealthy.
    fn critical(&self) -> bool {
        true
    }

    async fn check(&self) -> DependencyStatus;
}

pub struct PostgresChecker {
    pool: sqlx::PgPool,
}

impl PostgresChecker {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DependencyChecker for PostgresChecker {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => DependencyStatus::healthy(start),
            Err(e) => DependencyStatus::unhealthy(e.to_string()),
        }
    }
}

/// Reports the Paystack client's circuit breaker; an open circuit degrades
/// the service without making it unhealthy.
pub struct PaystackChecker {
    client: PaystackClient,
}

impl PaystackChecker {
    pub fn new(client: PaystackClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DependencyChecker for PaystackChecker {
    fn name(&self) -> &'static str {
        "paystack"
    }

    fn critical(&self) -> bool {
        false
    }

    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match self.client.circuit_state().as_str() {
            "closed" => DependencyStatus::healthy(start),
            state => DependencyStatus::unhealthy(format!("circuit breaker {}", state)),
        }
    }
}

pub async fn check_health(
    checkers: &[Arc<dyn DependencyChecker>],
    start_time: Instant,
) -> HealthResponse {
    let timeout_duration = Duration::from_secs(5);

    let results = run_checks(checkers, timeout_duration).await;

    let mut dependencies = HashMap::new();
    let mut critical_failure = false;
    let mut degraded = false;
    for (checker, status) in checkers.iter().zip(results) {
        if matches!(status, DependencyStatus::Unhealthy { .. }) {
            if checker.critical() {
                critical_failure = true;
            } else {
                degraded = true;
            }
        }
        dependencies.insert(checker.name().to_string(), status);
    }

    let status = if critical_failure {
        "unhealthy"
    } else if degraded {
        "degraded"
    } else {
        "healthy"
    };

    HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: start_time.elapsed().as_secs(),
        dependencies,
    }
}

/// Runs every check concurrently, each bounded by `limit`.
async fn run_checks(
    checkers: &[Arc<dyn DependencyChecker>],
    limit: Duration,
) -> Vec<DependencyStatus> {
    let handles: Vec<_> = checkers
        .iter()
        .cloned()
        .map(|checker| {
            tokio::spawn(async move {
                timeout(limit, checker.check())
                    .await
                    .unwrap_or_else(|_| DependencyStatus::unhealthy("timeout"))
            })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(
            handle
                .await
                .unwrap_or_else(|e| DependencyStatus::unhealthy(e.to_string())),
        );
    }
    results
}
