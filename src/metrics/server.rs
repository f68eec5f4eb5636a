//! Prometheus endpoint for the sink's grouping and flush metrics.
//!
//! The embedding host opts in by passing its [`MetricsConfig`]. When
//! enabled, counters recorded through `emit!` (records grouped, files and
//! bytes written, flush outcomes) are served at `/metrics` on the
//! configured address, with `/health` alongside for liveness probes.

use axum::{Extension, Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use snafu::prelude::*;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::error;

use crate::config::MetricsConfig;
use crate::error::{InvalidAddressSnafu, MetricsError, PrometheusInitSnafu};

/// Install the Prometheus recorder and serve it per `config`.
///
/// A no-op when metrics are disabled; events emitted without a recorder
/// are simply dropped. The recorder is process-global, so call this at
/// most once.
pub fn init(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config.address.parse().context(InvalidAddressSnafu {
        address: &config.address,
    })?;
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context(PrometheusInitSnafu)?;

    tokio::spawn(run_server(addr, handle));

    Ok(())
}

async fn run_server(addr: SocketAddr, handle: PrometheusHandle) {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(Extension(handle));

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind metrics server to {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!("Metrics server error: {}", e);
    }
}

async fn metrics_handler(Extension(handle): Extension<PrometheusHandle>) -> String {
    handle.render()
}

async fn health_handler() -> &'static str {
    "ok\n"
}
