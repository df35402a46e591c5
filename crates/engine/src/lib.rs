//! Asynchronous job-orchestration engine for remote media generation.
//!
//! Drives the full lifecycle per run: submit batched generation requests
//! (rotating credentials, walking the model fallback ladder), poll
//! operation status in batches, and download completed artifacts with
//! bounded retries. The UI layer supplies job descriptors and a stop
//! token, subscribes to the event bus, and never performs network I/O.

pub mod config;
pub mod download;
pub mod driver;
pub mod poll;
pub mod rate_limit;
pub mod rotator;
pub mod submit;

pub use config::{EngineConfig, RateLimitConfig};
pub use driver::{Orchestrator, RunError, RunOptions, RunSummary};
pub use rate_limit::RateLimiter;
pub use rotator::{CredentialPool, RotationError};
pub use submit::model_ladder;
