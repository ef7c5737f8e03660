//! New Relic telemetry workspace - integration tests for the telemetry SDK.
//!
//! This is a virtual package that provides workspace-level integration tests.
//! The actual functionality is provided by the workspace member crates:
//!
//! - `newrelic-telemetry`: record types, batching, JSON marshalling, transport
//!   and response classification for the New Relic ingest APIs
