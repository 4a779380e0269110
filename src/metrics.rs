//! Prometheus metrics for the gateway.
//!
//! Metrics are exposed on a dedicated listener (`METRICS_PORT`, 0 disables).
//!
//! # Available Metrics
//!
//! ## Counters
//! - `gateway_admission_denied_total` - Requests rejected by the IP allow-list (label: reason)
//! - `gateway_tokens_issued_total` - Signed bearer tokens issued
//! - `gateway_token_verifications_total` - Token verifications (label: outcome)
//! - `gateway_default_credentials_total` - Default-chain resolutions (label: source)
//! - `gateway_sts_requests_total` - AssumeRole calls (label: status)
//! - `gateway_job_polls_total` - Completed poll loops (label: outcome)
//!
//! ## Histograms
//! - `gateway_request_duration_seconds` - HTTP request duration (labels: endpoint, method, status)
//! - `gateway_upstream_duration_seconds` - Downstream provider call duration (labels: provider, action)

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const ADMISSION_DENIED_TOTAL: &str = "gateway_admission_denied_total";
    pub const TOKENS_ISSUED_TOTAL: &str = "gateway_tokens_issued_total";
    pub const TOKEN_VERIFICATIONS_TOTAL: &str = "gateway_token_verifications_total";
    pub const DEFAULT_CREDENTIALS_TOTAL: &str = "gateway_default_credentials_total";
    pub const STS_REQUESTS_TOTAL: &str = "gateway_sts_requests_total";
    pub const JOB_POLLS_TOTAL: &str = "gateway_job_polls_total";
    pub const REQUEST_DURATION_SECONDS: &str = "gateway_request_duration_seconds";
    pub const UPSTREAM_DURATION_SECONDS: &str = "gateway_upstream_duration_seconds";
}

/// Install the Prometheus exporter and describe all metrics.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::ADMISSION_DENIED_TOTAL,
        "Requests rejected by the IP allow-list"
    );
    describe_counter!(names::TOKENS_ISSUED_TOTAL, "Signed bearer tokens issued");
    describe_counter!(
        names::TOKEN_VERIFICATIONS_TOTAL,
        "Bearer token verifications by outcome"
    );
    describe_counter!(
        names::DEFAULT_CREDENTIALS_TOTAL,
        "Requests served with default-chain credentials, by source"
    );
    describe_counter!(names::STS_REQUESTS_TOTAL, "AssumeRole calls by status");
    describe_counter!(names::JOB_POLLS_TOTAL, "Job poll loops by outcome");

    describe_histogram!(
        names::REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_histogram!(
        names::UPSTREAM_DURATION_SECONDS,
        "Downstream provider call duration in seconds"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

// =============================================================================
// Counters
// =============================================================================

pub fn record_admission_denied(reason: &'static str) {
    counter!(names::ADMISSION_DENIED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_token_issued() {
    counter!(names::TOKENS_ISSUED_TOTAL).increment(1);
}

/// `outcome` is `ok` or the auth failure reason.
pub fn record_token_verification(outcome: &'static str) {
    counter!(names::TOKEN_VERIFICATIONS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_default_chain_resolution(source: &'static str) {
    counter!(names::DEFAULT_CREDENTIALS_TOTAL, "source" => source).increment(1);
}

pub fn record_sts_request(status: &'static str) {
    counter!(names::STS_REQUESTS_TOTAL, "status" => status).increment(1);
}

/// `outcome` is one of `completed`, `timeout`, `cancelled`, `error`.
pub fn record_job_poll(outcome: &'static str) {
    counter!(names::JOB_POLLS_TOTAL, "outcome" => outcome).increment(1);
}

// =============================================================================
// Histograms
// =============================================================================

pub fn record_request_duration(endpoint: &str, method: &str, status: &str, duration_secs: f64) {
    histogram!(names::REQUEST_DURATION_SECONDS, "endpoint" => endpoint.to_string(), "method" => method.to_string(), "status" => status.to_string())
        .record(duration_secs);
}

pub fn record_upstream_duration(provider: &'static str, action: &str, duration_secs: f64) {
    histogram!(names::UPSTREAM_DURATION_SECONDS, "provider" => provider, "action" => action.to_string())
        .record(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Recording without an installed exporter must be a no-op.

    #[test]
    fn test_record_counters() {
        record_admission_denied("IP_NOT_ALLOWED");
        record_token_issued();
        record_token_verification("expired");
        record_default_chain_resolution("environment");
        record_sts_request("success");
        record_job_poll("timeout");
    }

    #[test]
    fn test_record_histograms() {
        record_request_duration("/api/auth/token", "POST", "200", 0.01);
        record_upstream_duration("tencent", "GetReconstructDocumentResult", 0.2);
    }
}
