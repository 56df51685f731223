//! # Inference-Pipeline Orchestrator
//!
//! Supervises one OS process per pipeline, routes commands to them over
//! a length-prefixed JSON wire protocol, maintains a warm pool and a
//! health-check loop, bridges live frames to WebRTC viewers, and ships
//! per-pipeline metrics to an external time-series store. Everything in
//! this crate is I/O-bound or concurrent; pure types live in
//! `orchestrator-domain` instead.
//!
//! - `config` — layered descriptor resolution (file → env → `--set`)
//! - `supervisor` — the process table, command router, health/warm-pool loops
//! - `worker` — the in-process driver that runs inside a spawned worker
//! - `sinks` — the buffer/video/metric sink chain workers attach to pipelines
//! - `webrtc` — the dedicated-thread bridge that forwards frames to viewers
//! - `monitor` — the orchestrator-side metrics poller and disk-quota sweep
//! - `store` — the external time-series store abstraction
//! - `metrics` — this process's own Prometheus registry and `/metrics` endpoint
//! - `backends` — the static plugin/backend enumeration behind `plugins list`
//! - `wire` — the length-prefixed JSON framing shared by every transport
//! - `logging` — process-wide `tracing` subscriber initialization

pub mod backends;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod sinks;
pub mod store;
pub mod supervisor;
pub mod webrtc;
pub mod wire;
pub mod worker;
