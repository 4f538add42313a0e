//! Metrics endpoints for monitoring and observability.
//!
//! Provides endpoints for:
//! - Prometheus metrics export
//! - Health checks
//! - Ledger and HTTP counters

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use sea_orm::ConnectionTrait;
use serde::Serialize;
use stackit_common::metrics::{MetricsSnapshot, get_metrics};

use crate::middleware::AppState;

/// Create the metrics router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_metrics_json))
        .route("/prometheus", get(get_metrics_prometheus))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
}

/// JSON metrics response.
#[derive(Serialize)]
pub struct MetricsResponse {
    pub http: HttpMetrics,
    pub ledger: LedgerMetrics,
    pub content: ContentMetrics,
    pub realtime: RealtimeMetrics,
    pub ai: AiMetrics,
}

#[derive(Serialize)]
pub struct HttpMetrics {
    pub requests_total: u64,
    pub requests_active: u64,
    pub requests_2xx: u64,
    pub requests_4xx: u64,
    pub requests_5xx: u64,
    pub latency_avg_us: u64,
}

#[derive(Serialize)]
pub struct LedgerMetrics {
    pub transactions_committed: u64,
    pub conflicts_retried: u64,
    pub transactions_exhausted: u64,
    pub bookkeeping_failures: u64,
}

#[derive(Serialize)]
pub struct ContentMetrics {
    pub questions_created: u64,
    pub answers_posted: u64,
    pub answers_accepted: u64,
    pub votes_cast: u64,
    pub users_registered: u64,
    pub follows_created: u64,
}

#[derive(Serialize)]
pub struct RealtimeMetrics {
    pub sse_connections_active: u64,
}

#[derive(Serialize)]
pub struct AiMetrics {
    pub failures: u64,
}

impl From<MetricsSnapshot> for MetricsResponse {
    fn from(s: MetricsSnapshot) -> Self {
        Self {
            http: HttpMetrics {
                requests_total: s.http_requests_total,
                requests_active: s.http_requests_active,
                requests_2xx: s.http_requests_2xx,
                requests_4xx: s.http_requests_4xx,
                requests_5xx: s.http_requests_5xx,
                latency_avg_us: s.http_request_latency_avg_us,
            },
            ledger: LedgerMetrics {
                transactions_committed: s.txn_committed,
                conflicts_retried: s.txn_conflicts_retried,
                transactions_exhausted: s.txn_exhausted,
                bookkeeping_failures: s.bookkeeping_failures,
            },
            content: ContentMetrics {
                questions_created: s.questions_created,
                answers_posted: s.answers_posted,
                answers_accepted: s.answers_accepted,
                votes_cast: s.votes_cast,
                users_registered: s.users_registered,
                follows_created: s.follows_created,
            },
            realtime: RealtimeMetrics {
                sse_connections_active: s.sse_connections_active,
            },
            ai: AiMetrics {
                failures: s.ai_failures,
            },
        }
    }
}

/// Get metrics in JSON format.
async fn get_metrics_json() -> Json<MetricsResponse> {
    let snapshot = get_metrics().snapshot();
    Json(MetricsResponse::from(snapshot))
}

/// Get metrics in Prometheus text format.
async fn get_metrics_prometheus() -> Response {
    let prometheus_output = get_metrics().to_prometheus();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        prometheus_output,
    )
        .into_response()
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Simple health check (liveness probe).
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub database: CheckResult,
    pub ai: CheckResult,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    pub latency_ms: Option<u64>,
}

/// Readiness check (readiness probe). The AI provider is reported but never blocks readiness.
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let start = std::time::Instant::now();

    let db_check = match state.db.execute_unprepared("SELECT 1").await {
        Ok(_) => CheckResult {
            status: "ok".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
        },
        Err(e) => {
            tracing::warn!(error = %e, "Readiness database check failed");
            CheckResult {
                status: "error".to_string(),
                latency_ms: None,
            }
        }
    };

    let db_ok = db_check.status == "ok";

    let ai_check = CheckResult {
        status: if state.ai_service.is_enabled() {
            "configured".to_string()
        } else {
            "disabled".to_string()
        },
        latency_ms: None,
    };

    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready: db_ok,
            checks: ReadinessChecks {
                database: db_check,
                ai: ai_check,
            },
        }),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            http_requests_total: 100,
            http_requests_active: 5,
            http_requests_2xx: 90,
            http_requests_4xx: 8,
            http_requests_5xx: 2,
            http_request_latency_avg_us: 1500,

            txn_committed: 40,
            txn_conflicts_retried: 3,
            txn_exhausted: 1,
            bookkeeping_failures: 2,

            questions_created: 12,
            answers_posted: 30,
            answers_accepted: 7,
            votes_cast: 250,
            users_registered: 25,
            follows_created: 100,

            sse_connections_active: 5,
            ai_failures: 4,
        }
    }

    #[test]
    fn test_metrics_response_from_snapshot() {
        let response = MetricsResponse::from(snapshot());

        assert_eq!(response.http.requests_total, 100);
        assert_eq!(response.http.latency_avg_us, 1500);
        assert_eq!(response.ledger.conflicts_retried, 3);
        assert_eq!(response.ledger.transactions_exhausted, 1);
        assert_eq!(response.content.votes_cast, 250);
        assert_eq!(response.realtime.sse_connections_active, 5);
        assert_eq!(response.ai.failures, 4);
    }

    #[test]
    fn test_metrics_response_serializes_groups() {
        let json = serde_json::to_value(MetricsResponse::from(snapshot())).unwrap();

        assert_eq!(json["content"]["answers_accepted"], 7);
        assert_eq!(json["ledger"]["bookkeeping_failures"], 2);
    }
}
