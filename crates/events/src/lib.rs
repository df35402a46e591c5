//! Typed engine events and the in-process event bus.
//!
//! The UI layer subscribes to [`bus::EventBus`] and renders
//! [`bus::EngineEvent`]s however it likes. Publishing is fire-and-forget
//! and never blocks the engine.

pub mod bus;

pub use bus::{EngineEvent, EventBus, FallbackStep};
