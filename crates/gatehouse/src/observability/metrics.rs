//! Metrics definitions for the authentication engine.
//!
//! Recorded through the `metrics` facade; hosts install the exporter.
//! Naming follows Prometheus conventions: `gatehouse_` prefix, `_total`
//! suffix for counters, `_seconds` suffix for duration histograms.
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `status`: 2 values (success, error)
//! - `error_category`: the closed failure families plus "none"
//! - `guard`: 5 values (required, optional, roles, companies, verified_email)
//! - `outcome`: 2 values (allowed, rejected)

use metrics::{counter, histogram};
use std::time::Duration;

/// Record one token validation outcome and its duration.
///
/// Metrics: `gatehouse_token_validation_duration_seconds`,
/// `gatehouse_token_validations_total`
pub fn record_token_validation(status: &str, error_category: Option<&str>, duration: Duration) {
    let category = error_category.unwrap_or("none");
    histogram!("gatehouse_token_validation_duration_seconds", "status" => status.to_string())
        .record(duration.as_secs_f64());

    counter!("gatehouse_token_validations_total", "status" => status.to_string(), "error_category" => category.to_string())
        .increment(1);
}

/// Record one key-set refresh attempt.
///
/// Metric: `gatehouse_key_refresh_total`
pub fn record_key_refresh(status: &str) {
    counter!("gatehouse_key_refresh_total", "status" => status.to_string()).increment(1);
}

/// Record a degraded resolution served from a stale key set.
///
/// Metric: `gatehouse_stale_key_serves_total`
pub fn record_stale_key_serve() {
    counter!("gatehouse_stale_key_serves_total").increment(1);
}

/// Record a guard decision.
///
/// Metric: `gatehouse_guard_decisions_total`
pub fn record_guard_decision(guard: &str, outcome: &str) {
    counter!("gatehouse_guard_decisions_total", "guard" => guard.to_string(), "outcome" => outcome.to_string())
        .increment(1);
}
