//! HTTP client for the remote media-generation provider.
//!
//! [`api::FlowClient`] wraps the provider's REST surface (batch submit,
//! batch status check, reference-image upload, artifact fetch) behind
//! the [`provider::GenerationProvider`] trait so the engine and its
//! tests never depend on the concrete transport.
//!
//! Every failed call is classified exactly once, at this boundary, into
//! a [`reelforge_core::error::FailureKind`] via [`error::ApiError`].

pub mod api;
pub mod error;
pub mod provider;
pub mod status;
pub mod urls;

pub use api::{FlowClient, FlowEndpoints};
pub use error::ApiError;
pub use provider::{BatchCheckOutcome, GenerationProvider, SubmitAck, SubmitBatch};
pub use status::{OperationReport, OperationStatus};
