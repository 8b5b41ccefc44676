//! Pacer - rate-governed task scheduler for multi-tenant LLM workloads
//!
//! A shared backend calling a hosted language model must never exceed the
//! provider's token-throughput ceiling, must make forward progress fairly
//! across tenants, must tolerate transient provider failures without losing
//! work, and must reclaim resources from tasks that stall or crash. Pacer
//! provides the pieces:
//!
//! - a global token-budget admission controller with watchdog reclamation
//! - per-tenant FIFO queues with bounded, resizable concurrency
//! - batch concurrency sizing from estimated token costs
//! - a generic retry/backoff wrapper for the provider call
//! - a content-addressed response cache
//!
//! The model call itself is an injected [`model::ModelClient`]; pacer owns
//! the scheduling around it, not the transport. In-flight reservations and
//! queued tasks are process-local: a restart loses them (best-effort
//! pipeline, by contract).

pub mod cache;
pub mod config;
pub mod estimator;
pub mod limiter;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod queue;
pub mod retry;
pub mod scheduler;

pub use config::PacerConfig;
pub use model::{AiRequest, Message, ModelClient, ModelError};
pub use scheduler::{Scheduler, SchedulerError};
