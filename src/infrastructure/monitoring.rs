use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{AppError, AppResult};

/// Installs the global tracing subscriber (`RUST_LOG`, default `info`).
pub fn initialize_monitoring() -> AppResult<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| AppError::ConfigurationError(format!("Tracing already initialized: {}", e)))?;

    info!("Monitoring and observability initialized");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ServiceStatus,
    pub response_time_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ComponentHealth {
    /// Summarizes one store probe that started at `started`.
    pub fn from_probe(result: AppResult<()>, started: Instant) -> Self {
        let response_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        match result {
            Ok(()) => Self {
                status: ServiceStatus::Healthy,
                response_time_ms,
                details: None,
            },
            Err(e) => Self {
                status: ServiceStatus::Unhealthy,
                response_time_ms,
                details: Some(e.to_string()),
            },
        }
    }
}
