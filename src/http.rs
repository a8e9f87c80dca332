//! Read-only metrics endpoint.
//!
//! `GET /metrics` returns the current [`MetricsSnapshot`] as JSON. Any other
//! method gets `405 Method Not Allowed` and touches nothing. With the
//! `prometheus` feature, `GET /metrics/prometheus` serves the same values in
//! the text exposition format.

use crate::core::metrics::{MetricsAggregator, MetricsSnapshot};
use crate::error::ForgeResult;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Build the metrics router.
pub fn router(metrics: Arc<MetricsAggregator>) -> Router {
    let router = Router::new().route("/metrics", get(metrics_json));

    #[cfg(feature = "prometheus")]
    let router = router.route("/metrics/prometheus", get(exposition::metrics_text));

    router.with_state(metrics)
}

/// Serve the router on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    metrics: Arc<MetricsAggregator>,
    shutdown: CancellationToken,
) -> ForgeResult<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "Metrics endpoint listening");

    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    tracing::info!("Metrics endpoint stopped");
    Ok(())
}

async fn metrics_json(State(metrics): State<Arc<MetricsAggregator>>) -> Json<MetricsSnapshot> {
    Json(metrics.snapshot())
}

#[cfg(feature = "prometheus")]
#[cfg_attr(docsrs, doc(cfg(feature = "prometheus")))]
mod exposition {
    use super::*;
    use axum::http::{StatusCode, header};
    use axum::response::{IntoResponse, Response};
    use prometheus::{IntGauge, Registry, TEXT_FORMAT, TextEncoder};

    pub(super) async fn metrics_text(State(metrics): State<Arc<MetricsAggregator>>) -> Response {
        match render(&metrics.snapshot()) {
            Ok(body) => ([(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode metrics");
                (StatusCode::INTERNAL_SERVER_ERROR, "Could not encode metrics").into_response()
            }
        }
    }

    pub(super) fn render(snapshot: &MetricsSnapshot) -> prometheus::Result<String> {
        let registry = Registry::new();
        let gauges = [
            (
                "taskforge_queue_depth",
                "Last observed length of the work queue",
                snapshot.queue_depth,
            ),
            (
                "taskforge_jobs_done",
                "Successful task attempts",
                snapshot.jobs_done,
            ),
            (
                "taskforge_jobs_failed",
                "Failed task attempts",
                snapshot.jobs_failed,
            ),
        ];

        for (name, help, value) in gauges {
            let gauge = IntGauge::new(name, help)?;
            gauge.set(i64::try_from(value).unwrap_or(i64::MAX));
            registry.register(Box::new(gauge))?;
        }

        TextEncoder::new().encode_to_string(&registry.gather())
    }
}
