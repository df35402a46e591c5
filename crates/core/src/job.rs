//! Job lifecycle types and the per-copy state machine.
//!
//! A [`Job`] is created from an externally supplied [`JobDescriptor`],
//! gains operation handles during submission, moves its copies through
//! [`CopyStatus`] during polling, and is retired once every copy reaches
//! a terminal state. The job-level [`JobStatus`] is always derived from
//! the copy states after submission.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{CopyIndex, SceneId};

/// The provider accepts at most this many seeded variants per batch request.
pub const MAX_COPIES_PER_BATCH: u32 = 4;

/// At most this many reference images may accompany a job.
pub const MAX_REFERENCE_IMAGES: usize = 4;

// ---------------------------------------------------------------------------
// Descriptor (input from the UI/driver collaborator)
// ---------------------------------------------------------------------------

/// Everything the upstream layer supplies to generate one scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub scene: SceneId,
    pub prompt: String,
    /// Optional reference images; the first one becomes the start image.
    pub reference_images: Vec<PathBuf>,
    /// Requested number of seeded variants (clamped to the batch limit).
    pub copies: u32,
    pub aspect_ratio: AspectRatio,
    /// Preferred model key; the fallback ladder starts here.
    pub model_key: String,
    pub project_id: Option<String>,
    /// Base seed; copy `k` uses `seed + k`. Randomized when absent.
    pub seed: Option<u64>,
}

impl JobDescriptor {
    /// Structural validation before a descriptor becomes a [`Job`].
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.prompt.trim().is_empty() {
            return Err(CoreError::Validation(
                "prompt must not be empty".to_string(),
            ));
        }
        if self.copies == 0 {
            return Err(CoreError::Validation(
                "copies must be at least 1".to_string(),
            ));
        }
        if self.reference_images.len() > MAX_REFERENCE_IMAGES {
            return Err(CoreError::Validation(format!(
                "at most {MAX_REFERENCE_IMAGES} reference images are allowed, got {}",
                self.reference_images.len()
            )));
        }
        if self.model_key.trim().is_empty() {
            return Err(CoreError::Validation(
                "model_key must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Requested copies clamped to the provider's per-request limit.
    pub fn effective_copies(&self) -> u32 {
        self.copies.min(MAX_COPIES_PER_BATCH)
    }
}

/// Aspect ratio of the generated video, with the provider wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    Portrait,
    Landscape,
    Square,
}

impl AspectRatio {
    /// Wire value sent in generation requests.
    pub fn video_wire_value(self) -> &'static str {
        match self {
            AspectRatio::Portrait => "VIDEO_ASPECT_RATIO_PORTRAIT",
            AspectRatio::Landscape => "VIDEO_ASPECT_RATIO_LANDSCAPE",
            AspectRatio::Square => "VIDEO_ASPECT_RATIO_SQUARE",
        }
    }

    /// Hint sent alongside reference-image uploads.
    pub fn image_wire_value(self) -> &'static str {
        match self {
            AspectRatio::Portrait => "IMAGE_ASPECT_RATIO_PORTRAIT",
            AspectRatio::Landscape => "IMAGE_ASPECT_RATIO_LANDSCAPE",
            AspectRatio::Square => "IMAGE_ASPECT_RATIO_SQUARE",
        }
    }
}

// ---------------------------------------------------------------------------
// Operation handles
// ---------------------------------------------------------------------------

/// Opaque remote identifier for one in-flight generation task.
///
/// Maps 1:1 to a (job, copy index) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationHandle(String);

impl OperationHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Job-level status, derived from the copy states once submission ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    New,
    Uploading,
    Submitted,
    Processing,
    Done,
    Downloaded,
    Failed,
}

/// Per-copy state machine.
///
/// `Submitted -> Processing -> {Done | DoneNoUrl | Failed}` during
/// polling, then `Done -> {Downloaded | DownloadFailed}` during download.
/// A failed download below the retry cap moves the copy back to
/// `Processing` so the next poll round can re-validate the URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyStatus {
    /// An operation handle exists; no status report seen yet.
    Submitted,
    /// The provider reported the operation as still running.
    Processing,
    /// Generation finished and a playable URL is known.
    Done { url: String },
    /// The provider reported success but returned no playable URL.
    /// Never conflated with [`CopyStatus::Done`].
    DoneNoUrl,
    /// Generation failed remotely, or submission produced no handle.
    Failed,
    /// The artifact was written locally.
    Downloaded {
        path: PathBuf,
        thumbnail: Option<PathBuf>,
    },
    /// Download retries were exhausted; the URL is kept for inspection.
    DownloadFailed { url: String },
}

impl CopyStatus {
    /// Terminal states retire the copy from the in-flight set.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CopyStatus::DoneNoUrl
                | CopyStatus::Failed
                | CopyStatus::Downloaded { .. }
                | CopyStatus::DownloadFailed { .. }
        )
    }

    /// Whether the poller should still ask the provider about this copy.
    pub fn needs_polling(&self) -> bool {
        matches!(self, CopyStatus::Submitted | CopyStatus::Processing)
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One scene's generation run: descriptor plus all engine-owned state.
#[derive(Debug, Clone)]
pub struct Job {
    descriptor: JobDescriptor,
    /// Provider-side id of the uploaded reference image, if any.
    media_id: Option<String>,
    /// Copy index -> remote operation handle, in submission order.
    handles: BTreeMap<CopyIndex, OperationHandle>,
    copies: BTreeMap<CopyIndex, CopyStatus>,
    /// Copy indices already written to disk; repeat downloads are no-ops.
    downloaded: HashSet<CopyIndex>,
    download_attempts: BTreeMap<CopyIndex, u32>,
    status: JobStatus,
}

impl Job {
    pub fn new(descriptor: JobDescriptor) -> Self {
        Self {
            descriptor,
            media_id: None,
            handles: BTreeMap::new(),
            copies: BTreeMap::new(),
            downloaded: HashSet::new(),
            download_attempts: BTreeMap::new(),
            status: JobStatus::New,
        }
    }

    pub fn descriptor(&self) -> &JobDescriptor {
        &self.descriptor
    }

    pub fn scene(&self) -> SceneId {
        self.descriptor.scene
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn media_id(&self) -> Option<&str> {
        self.media_id.as_deref()
    }

    pub fn set_media_id(&mut self, media_id: String) {
        self.media_id = Some(media_id);
    }

    /// Explicit status override for the pre-submission phases
    /// (`Uploading`, `Submitted`, or `Failed` when nothing started).
    pub fn set_status(&mut self, status: JobStatus) {
        self.status = status;
    }

    /// Record the operation handle for one copy.
    ///
    /// Enforces the invariant that a job never holds more handles than
    /// requested copies, and that a copy is never bound twice.
    pub fn record_handle(
        &mut self,
        copy: CopyIndex,
        handle: OperationHandle,
    ) -> Result<(), CoreError> {
        let limit = self.descriptor.effective_copies();
        if copy >= limit {
            return Err(CoreError::Validation(format!(
                "copy index {copy} out of range for {limit} requested copies"
            )));
        }
        if self.handles.contains_key(&copy) {
            return Err(CoreError::InvalidTransition(format!(
                "copy {copy} already has an operation handle"
            )));
        }
        self.handles.insert(copy, handle);
        self.copies.insert(copy, CopyStatus::Submitted);
        Ok(())
    }

    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    pub fn handle_for(&self, copy: CopyIndex) -> Option<&OperationHandle> {
        self.handles.get(&copy)
    }

    /// Reverse lookup: which copy does a remote handle belong to.
    pub fn copy_for(&self, handle: &OperationHandle) -> Option<CopyIndex> {
        self.handles
            .iter()
            .find(|(_, h)| *h == handle)
            .map(|(c, _)| *c)
    }

    pub fn copy_status(&self, copy: CopyIndex) -> Option<&CopyStatus> {
        self.copies.get(&copy)
    }

    pub fn copy_states(&self) -> impl Iterator<Item = (CopyIndex, &CopyStatus)> {
        self.copies.iter().map(|(c, s)| (*c, s))
    }

    /// Set a copy's status and refresh the derived job status.
    pub fn set_copy_status(&mut self, copy: CopyIndex, status: CopyStatus) {
        self.copies.insert(copy, status);
        self.refresh_status();
    }

    /// Mark copies that never received a handle as failed.
    ///
    /// Called after submission so that a partial batch (scenario: per-copy
    /// fallback where one copy found no working model) settles immediately.
    pub fn fail_missing_copies(&mut self) {
        for copy in 0..self.descriptor.effective_copies() {
            if !self.handles.contains_key(&copy) {
                self.copies.insert(copy, CopyStatus::Failed);
            }
        }
        self.refresh_status();
    }

    /// Handles for copies that still need a status report.
    pub fn outstanding_handles(&self) -> Vec<OperationHandle> {
        self.copies
            .iter()
            .filter(|(_, s)| s.needs_polling())
            .filter_map(|(c, _)| self.handles.get(c).cloned())
            .collect()
    }

    pub fn is_downloaded(&self, copy: CopyIndex) -> bool {
        self.downloaded.contains(&copy)
    }

    pub fn mark_downloaded(&mut self, copy: CopyIndex) {
        self.downloaded.insert(copy);
    }

    /// Bump and return the download attempt count for one copy.
    pub fn note_download_attempt(&mut self, copy: CopyIndex) -> u32 {
        let n = self.download_attempts.entry(copy).or_insert(0);
        *n += 1;
        *n
    }

    pub fn download_attempts(&self, copy: CopyIndex) -> u32 {
        self.download_attempts.get(&copy).copied().unwrap_or(0)
    }

    /// A job is retired once every copy reached a terminal state.
    pub fn all_copies_terminal(&self) -> bool {
        !self.copies.is_empty() && self.copies.values().all(CopyStatus::is_terminal)
    }

    /// Everything this job wrote to disk, in copy order.
    pub fn artifacts(&self) -> Vec<Artifact> {
        self.copies
            .iter()
            .filter_map(|(copy, status)| match status {
                CopyStatus::Downloaded { path, thumbnail } => Some(Artifact {
                    scene: self.scene(),
                    copy: *copy,
                    path: path.clone(),
                    thumbnail: thumbnail.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    fn refresh_status(&mut self) {
        self.status = derive_job_status(&self.copies, self.status);
    }
}

/// Derive the job-level status from the copy states.
///
/// - no copies yet: keep the phase set by the submitter;
/// - all terminal: `Downloaded` when at least one copy made it to disk,
///   otherwise `Failed`;
/// - all remaining non-terminal copies done: `Done`;
/// - otherwise `Processing`.
fn derive_job_status(copies: &BTreeMap<CopyIndex, CopyStatus>, current: JobStatus) -> JobStatus {
    if copies.is_empty() {
        return current;
    }
    if copies.values().all(CopyStatus::is_terminal) {
        if copies
            .values()
            .any(|s| matches!(s, CopyStatus::Downloaded { .. }))
        {
            return JobStatus::Downloaded;
        }
        return JobStatus::Failed;
    }
    if copies
        .values()
        .filter(|s| !s.is_terminal())
        .all(|s| matches!(s, CopyStatus::Done { .. }))
    {
        return JobStatus::Done;
    }
    JobStatus::Processing
}

// ---------------------------------------------------------------------------
// Artifact
// ---------------------------------------------------------------------------

/// A downloaded generation output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub scene: SceneId,
    pub copy: CopyIndex,
    pub path: PathBuf,
    pub thumbnail: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(copies: u32) -> JobDescriptor {
        JobDescriptor {
            scene: 1,
            prompt: "a quiet harbor at dawn".to_string(),
            reference_images: vec![],
            copies,
            aspect_ratio: AspectRatio::Landscape,
            model_key: "veo_3_1_t2v_fast_ultra".to_string(),
            project_id: None,
            seed: Some(7),
        }
    }

    // -- descriptor validation -----------------------------------------------

    #[test]
    fn empty_prompt_rejected() {
        let mut d = descriptor(1);
        d.prompt = "   ".to_string();
        assert!(d.validate().is_err());
    }

    #[test]
    fn zero_copies_rejected() {
        assert!(descriptor(0).validate().is_err());
    }

    #[test]
    fn too_many_reference_images_rejected() {
        let mut d = descriptor(1);
        d.reference_images = (0..5).map(|i| PathBuf::from(format!("{i}.jpg"))).collect();
        assert!(d.validate().is_err());
    }

    #[test]
    fn copies_clamped_to_batch_limit() {
        assert_eq!(descriptor(9).effective_copies(), MAX_COPIES_PER_BATCH);
        assert_eq!(descriptor(2).effective_copies(), 2);
    }

    // -- handle invariants ---------------------------------------------------

    #[test]
    fn handle_count_never_exceeds_copies() {
        let mut job = Job::new(descriptor(2));
        job.record_handle(0, OperationHandle::new("op-0")).unwrap();
        job.record_handle(1, OperationHandle::new("op-1")).unwrap();
        assert!(job.record_handle(2, OperationHandle::new("op-2")).is_err());
        assert_eq!(job.handle_count(), 2);
    }

    #[test]
    fn copy_cannot_be_bound_twice() {
        let mut job = Job::new(descriptor(2));
        job.record_handle(0, OperationHandle::new("op-0")).unwrap();
        assert!(job.record_handle(0, OperationHandle::new("op-x")).is_err());
    }

    #[test]
    fn copy_index_maps_to_handle_deterministically() {
        let mut job = Job::new(descriptor(3));
        for i in 0..3 {
            job.record_handle(i, OperationHandle::new(format!("op-{i}")))
                .unwrap();
        }
        assert_eq!(job.handle_for(1).unwrap().name(), "op-1");
        assert_eq!(job.copy_for(&OperationHandle::new("op-2")), Some(2));
    }

    // -- status derivation ---------------------------------------------------

    #[test]
    fn job_processing_while_any_copy_in_flight() {
        let mut job = Job::new(descriptor(2));
        job.record_handle(0, OperationHandle::new("a")).unwrap();
        job.record_handle(1, OperationHandle::new("b")).unwrap();
        job.set_copy_status(0, CopyStatus::Processing);
        assert_eq!(job.status(), JobStatus::Processing);
    }

    #[test]
    fn job_failed_when_all_copies_failed() {
        let mut job = Job::new(descriptor(2));
        job.record_handle(0, OperationHandle::new("a")).unwrap();
        job.record_handle(1, OperationHandle::new("b")).unwrap();
        job.set_copy_status(0, CopyStatus::Failed);
        job.set_copy_status(1, CopyStatus::Failed);
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(job.all_copies_terminal());
    }

    #[test]
    fn job_downloaded_when_any_copy_on_disk() {
        let mut job = Job::new(descriptor(2));
        job.record_handle(0, OperationHandle::new("a")).unwrap();
        job.record_handle(1, OperationHandle::new("b")).unwrap();
        job.set_copy_status(
            0,
            CopyStatus::Downloaded {
                path: PathBuf::from("out.mp4"),
                thumbnail: None,
            },
        );
        job.set_copy_status(1, CopyStatus::Failed);
        assert_eq!(job.status(), JobStatus::Downloaded);
    }

    #[test]
    fn done_no_url_is_terminal_but_distinct_from_done() {
        assert!(CopyStatus::DoneNoUrl.is_terminal());
        assert!(!CopyStatus::Done {
            url: "https://cdn.example/v.mp4".to_string()
        }
        .is_terminal());
    }

    #[test]
    fn fail_missing_copies_settles_partial_batch() {
        let mut job = Job::new(descriptor(3));
        job.record_handle(0, OperationHandle::new("a")).unwrap();
        job.record_handle(2, OperationHandle::new("c")).unwrap();
        job.fail_missing_copies();
        assert_eq!(job.copy_status(1), Some(&CopyStatus::Failed));
        assert_eq!(job.handle_count(), 2);
    }

    #[test]
    fn outstanding_handles_skip_terminal_copies() {
        let mut job = Job::new(descriptor(2));
        job.record_handle(0, OperationHandle::new("a")).unwrap();
        job.record_handle(1, OperationHandle::new("b")).unwrap();
        job.set_copy_status(0, CopyStatus::Failed);
        let outstanding = job.outstanding_handles();
        assert_eq!(outstanding, vec![OperationHandle::new("b")]);
    }

    // -- download bookkeeping ------------------------------------------------

    #[test]
    fn download_attempts_accumulate() {
        let mut job = Job::new(descriptor(1));
        assert_eq!(job.note_download_attempt(0), 1);
        assert_eq!(job.note_download_attempt(0), 2);
        assert_eq!(job.download_attempts(0), 2);
        assert_eq!(job.download_attempts(1), 0);
    }

    #[test]
    fn downloaded_set_tracks_copies() {
        let mut job = Job::new(descriptor(2));
        assert!(!job.is_downloaded(0));
        job.mark_downloaded(0);
        assert!(job.is_downloaded(0));
        assert!(!job.is_downloaded(1));
    }

    #[test]
    fn artifacts_list_only_copies_on_disk() {
        let mut job = Job::new(descriptor(2));
        job.record_handle(0, OperationHandle::new("a")).unwrap();
        job.record_handle(1, OperationHandle::new("b")).unwrap();
        job.set_copy_status(
            1,
            CopyStatus::Downloaded {
                path: PathBuf::from("demo_1_2.mp4"),
                thumbnail: Some(PathBuf::from("thumb_c1_v2.jpg")),
            },
        );
        job.set_copy_status(0, CopyStatus::Failed);

        let artifacts = job.artifacts();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].scene, 1);
        assert_eq!(artifacts[0].copy, 1);
        assert_eq!(artifacts[0].path, PathBuf::from("demo_1_2.mp4"));
    }
}
