//! quicktrans-sidecar: supervisor and resilient client for the QuickTrans
//! local AI engine.
//!
//! The engine is an out-of-process worker (transcription and translation)
//! reachable over a loopback HTTP endpoint. This crate owns its lifecycle —
//! spawn, readiness detection, shutdown — and wraps every outbound call with
//! bounded retry so callers get one consistent answer to "is the backend
//! usable" even while the worker is warming up.

pub mod api;
pub mod client;
pub mod context;
pub mod launch;
pub mod logging;
pub mod platform;
pub mod probe;
pub mod supervisor;

pub use api::{ApiError, EngineApi, SystemStatus};
pub use client::{CallError, ResilientClient, RetryPolicy};
pub use context::EngineContext;
pub use launch::{EngineSpawner, ProcessSpawner, RunMode, WorkerSpec};
pub use platform::{PlatformProfile, Termination};
pub use probe::HealthProbe;
pub use supervisor::{ENGINE_HOST, ENGINE_PORT, EngineSupervisor, ReadinessState, StartError};
