//! fetchline engine metrics.
//!
//! Request lifecycle counters and rejection counters, exposed through
//! `metriken` for scraping by whatever exposition layer the host application
//! registers.

use metriken::{metric, Counter, Gauge};

// ── Request lifecycle ────────────────────────────────────────────

#[metric(
    name = "fetchline/requests/sent",
    description = "Requests accepted by send"
)]
pub static REQUESTS_SENT: Counter = Counter::new();

#[metric(
    name = "fetchline/requests/completed",
    description = "Requests that finished successfully"
)]
pub static REQUESTS_COMPLETED: Counter = Counter::new();

#[metric(
    name = "fetchline/requests/failed",
    description = "Requests that finished in failure"
)]
pub static REQUESTS_FAILED: Counter = Counter::new();

#[metric(
    name = "fetchline/requests/cancelled",
    description = "Requests cancelled by the caller"
)]
pub static REQUESTS_CANCELLED: Counter = Counter::new();

#[metric(
    name = "fetchline/requests/active",
    description = "Currently live requests"
)]
pub static REQUESTS_ACTIVE: Gauge = Gauge::new();

// ── Data volume ──────────────────────────────────────────────────

#[metric(
    name = "fetchline/bytes/fetched",
    description = "Total bytes delivered to caller buffers"
)]
pub static BYTES_FETCHED: Counter = Counter::new();

// ── Rejections ───────────────────────────────────────────────────

#[metric(
    name = "fetchline/pool/exhausted",
    description = "Sends rejected because the request pool was full"
)]
pub static POOL_EXHAUSTED: Counter = Counter::new();

#[metric(
    name = "fetchline/backlog/full",
    description = "Sends rejected because the channel backlog was full"
)]
pub static BACKLOG_FULL: Counter = Counter::new();
