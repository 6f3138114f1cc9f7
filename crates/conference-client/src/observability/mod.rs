//! Observability for the conference client.
//!
//! Logging goes through `tracing` with per-component targets
//! (`client.session`, `client.render`, `client.mode`, `client.supervisor`,
//! `client.devices`). Metrics go through the `metrics` facade; the client
//! installs no exporter because it opens no listener of its own.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `client_tracks_active` | Gauge | `ownership` | Registered tracks |
//! | `client_participants_active` | Gauge | none | Known remote participants |
//! | `client_surfaces_active` | Gauge | none | Live rendering surfaces |
//! | `client_contract_violations_total` | Counter | `kind` | Dropped engine events |
//! | `client_publish_total` | Counter | none | Local tracks submitted to the session |
//! | `client_cleanup_failures_total` | Counter | `operation` | Swallowed cleanup errors |
//! | `client_capture_requests_total` | Counter | `status` | Capture outcomes |

pub mod metrics;
