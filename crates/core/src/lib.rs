//! Domain types and pure helpers shared by every reelforge crate.
//!
//! No async, no I/O. Everything here is deterministic and unit-testable
//! in isolation: the job/copy state machine, the error taxonomy, backoff
//! math, prompt trimming, and artifact naming.

pub mod backoff;
pub mod error;
pub mod job;
pub mod naming;
pub mod prompt;
pub mod types;
