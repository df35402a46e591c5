//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the hub through which the engine reports every
//! status change, retry, backoff, and fallback decision. It replaces
//! the freeform string log callback the engine grew out of: events are
//! typed, inspectable in tests, and carry structured payloads.

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::broadcast;

use reelforge_core::error::FailureKind;
use reelforge_core::job::{CopyStatus, JobStatus};
use reelforge_core::types::{CopyIndex, SceneId};

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// A step the submitter degraded to while working around a rejected
/// request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FallbackStep {
    /// The ladder advanced to another model key.
    LadderModel { model: String },
    /// The reference image is being re-uploaded once.
    Reupload,
    /// Batch submission gave up; switching to one request per copy.
    PerCopy,
}

/// Everything the engine reports to its subscribers.
#[derive(Debug, Clone, Serialize)]
pub enum EngineEvent {
    // -- job lifecycle --
    JobStatusChanged {
        scene: SceneId,
        status: JobStatus,
    },
    CopyStatusChanged {
        scene: SceneId,
        copy: CopyIndex,
        status: CopyStatus,
    },

    // -- credential rotation --
    CredentialAttempt {
        index: usize,
        total: usize,
        hint: String,
    },
    CredentialBackoff {
        delay_ms: u64,
    },
    CredentialFailed {
        hint: String,
        kind: FailureKind,
    },
    /// Skipped without an attempt because the credential is cooling down.
    CredentialSkipped {
        hint: String,
    },
    CredentialsExhausted {
        attempts: usize,
    },

    // -- submission --
    SubmitStarted {
        scene: SceneId,
        copies: u32,
        model: String,
    },
    SubmitFallback {
        scene: SceneId,
        step: FallbackStep,
    },
    /// The provider returned an operation without a name; that copy is
    /// dropped rather than crashing the pipeline.
    HandleMissing {
        scene: SceneId,
        copy: CopyIndex,
    },
    JobSubmitted {
        scene: SceneId,
        handles: usize,
    },

    // -- polling --
    PollRound {
        round: u32,
        in_flight: usize,
    },
    /// The whole batch-check round failed at the transport level; it
    /// will be retried after a cooldown and no job is failed for it.
    PollRoundFailed {
        round: u32,
        detail: String,
    },

    // -- downloads --
    DownloadStarted {
        scene: SceneId,
        copy: CopyIndex,
    },
    DownloadCompleted {
        scene: SceneId,
        copy: CopyIndex,
        path: PathBuf,
    },
    /// A failed download that will be retried via the polling loop.
    DownloadRetry {
        scene: SceneId,
        copy: CopyIndex,
        attempt: u32,
        max: u32,
    },
    DownloadFailed {
        scene: SceneId,
        copy: CopyIndex,
    },
    ThumbnailFailed {
        scene: SceneId,
        copy: CopyIndex,
        detail: String,
    },

    // -- run --
    RunCompleted {
        jobs: usize,
        downloaded_copies: usize,
        failed_copies: usize,
    },
}

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so any number of subscribers can
/// independently receive every published [`EngineEvent`]. Cloning the
/// bus clones the sender; all clones publish into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest un-consumed events are dropped
    /// and slow receivers observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped;
    /// the engine never blocks or fails on event delivery.
    pub fn publish(&self, event: EngineEvent) {
        // A send error only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
