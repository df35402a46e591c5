//! Job submission with layered fallbacks.
//!
//! Submission walks a ladder of degradation steps until the provider
//! accepts the request or every option is spent:
//!
//! 1. upload the reference image (if any), then wait a short settle
//!    delay so the provider has indexed it,
//! 2. submit the whole batch, walking the model ladder on each
//!    "invalid argument" rejection,
//! 3. if still rejected and an image was involved, re-upload it once
//!    and walk the ladder again,
//! 4. finally fall back to one request per copy, each with its own
//!    ladder walk.
//!
//! Copies that never receive an operation handle are marked failed so
//! the job settles instead of polling forever.

use std::path::Path;

use reelforge_client::{GenerationProvider, SubmitAck, SubmitBatch};
use reelforge_core::job::{AspectRatio, Job, JobStatus, OperationHandle};
use reelforge_core::naming::image_mime_for_path;
use reelforge_core::prompt::trim_prompt;
use reelforge_events::{EngineEvent, EventBus, FallbackStep};

use crate::config::EngineConfig;
use crate::rate_limit::RateLimiter;
use crate::rotator::{CredentialPool, RotationError};

/// Submission failure worth reporting beyond the job itself; the job
/// is already settled as failed when this is returned.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("credential pool exhausted during submission")]
    CredentialsExhausted(#[source] RotationError),
}

/// Drives one job through upload and submission.
pub(crate) struct Submitter<'a> {
    pub provider: &'a dyn GenerationProvider,
    pub pool: &'a CredentialPool,
    pub gate: &'a RateLimiter,
    pub events: &'a EventBus,
    pub config: &'a EngineConfig,
}

/// Models to try for one submission, most preferred first.
///
/// The requested key leads; the rest is the built-in family for the
/// aspect ratio, which differs between image-to-video and text-to-video.
pub fn model_ladder(requested: &str, aspect: AspectRatio, image_to_video: bool) -> Vec<String> {
    let family: &[&str] = if image_to_video {
        match aspect {
            AspectRatio::Portrait => &[
                "veo_3_1_i2v_s_fast_portrait_ultra",
                "veo_3_1_i2v_s_fast_portrait",
                "veo_3_1_i2v_s_portrait",
                "veo_3_1_i2v_s",
            ],
            AspectRatio::Landscape => &[
                "veo_3_1_i2v_s_fast_ultra",
                "veo_3_1_i2v_s_fast",
                "veo_3_1_i2v_s",
            ],
            AspectRatio::Square => &["veo_3_1_i2v_s_fast", "veo_3_1_i2v_s"],
        }
    } else {
        &["veo_3_1_t2v_fast_ultra", "veo_3_1_t2v"]
    };

    let mut models = vec![requested.to_string()];
    models.extend(
        family
            .iter()
            .filter(|m| **m != requested)
            .map(|m| m.to_string()),
    );
    models
}

impl Submitter<'_> {
    /// Upload, submit with fallbacks, and bind operation handles.
    ///
    /// Returns the number of handles bound. Zero means the job failed to
    /// start; its copies are already marked failed. Only credential
    /// exhaustion is surfaced as an error since no later job can succeed
    /// without credentials either; the job is settled as failed before
    /// the error is returned, so it never lingers in the poll loop.
    pub async fn submit(&self, job: &mut Job) -> Result<usize, SubmitError> {
        match self.submit_inner(job).await {
            Ok(bound) => Ok(bound),
            Err(error) => {
                job.fail_missing_copies();
                self.set_job_status(job, JobStatus::Failed);
                Err(error)
            }
        }
    }

    async fn submit_inner(&self, job: &mut Job) -> Result<usize, SubmitError> {
        let scene = job.scene();
        let copies = job.descriptor().effective_copies();
        let base_seed = match job.descriptor().seed {
            Some(seed) => seed,
            None => rand::random::<u32>() as u64,
        };
        let prompt = trim_prompt(&job.descriptor().prompt);

        tracing::info!(
            scene,
            copies,
            model = %job.descriptor().model_key,
            "submitting job",
        );
        self.events.publish(EngineEvent::SubmitStarted {
            scene,
            copies,
            model: job.descriptor().model_key.clone(),
        });

        // 1) Reference image upload. Failure degrades to text-to-video
        // rather than failing the job.
        let reference = job.descriptor().reference_images.first().cloned();
        if let Some(path) = &reference {
            self.set_job_status(job, JobStatus::Uploading);
            self.upload_reference(job, path).await?;
        }

        let models = model_ladder(
            &job.descriptor().model_key,
            job.descriptor().aspect_ratio,
            job.media_id().is_some(),
        );

        let batch = SubmitBatch {
            aspect_ratio: job.descriptor().aspect_ratio.video_wire_value().to_string(),
            model_key: String::new(),
            prompt: prompt.clone(),
            base_seed,
            copies,
            media_id: job.media_id().map(str::to_string),
            project_id: job.descriptor().project_id.clone(),
        };

        // 2) Batch submission over the model ladder.
        let mut ack = self.walk_ladder(scene, &models, &batch).await?;

        // 3) Re-upload once, then walk the ladder again.
        if ack.is_none() && job.media_id().is_some() {
            if let Some(path) = &reference {
                tracing::warn!(scene, "batch rejected, re-uploading reference image");
                self.events.publish(EngineEvent::SubmitFallback {
                    scene,
                    step: FallbackStep::Reupload,
                });
                if self.upload_reference(job, path).await.is_ok() {
                    let batch = SubmitBatch {
                        media_id: job.media_id().map(str::to_string),
                        ..batch.clone()
                    };
                    ack = self.walk_ladder(scene, &models, &batch).await?;
                }
            }
        }

        match ack {
            Some(ack) => self.bind_batch(job, ack),
            None => {
                // 4) Per-copy fallback.
                tracing::warn!(scene, "batch submission failed, trying per copy");
                self.events.publish(EngineEvent::SubmitFallback {
                    scene,
                    step: FallbackStep::PerCopy,
                });
                self.submit_per_copy(job, &models, &batch).await?;
            }
        }

        job.fail_missing_copies();
        let bound = job.handle_count();
        if bound > 0 {
            self.set_job_status(job, JobStatus::Submitted);
            tracing::info!(scene, handles = bound, "job submitted");
            self.events.publish(EngineEvent::JobSubmitted {
                scene,
                handles: bound,
            });
        } else {
            self.set_job_status(job, JobStatus::Failed);
            tracing::error!(scene, "no operation handles, job failed to start");
        }
        Ok(bound)
    }

    /// Upload the first reference image and stamp its media id.
    ///
    /// Read or upload failures other than credential exhaustion leave
    /// the job without a media id, degrading it to text-to-video.
    async fn upload_reference(&self, job: &mut Job, path: &Path) -> Result<(), SubmitError> {
        let scene = job.scene();
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!(scene, path = %path.display(), %error, "reference image unreadable, continuing without it");
                return Ok(());
            }
        };
        let mime = image_mime_for_path(path);
        let aspect_hint = job.descriptor().aspect_ratio.image_wire_value();

        self.gate.gate().await;
        let result = self
            .pool
            .execute(|credential| {
                let bytes = &bytes;
                async move {
                    self.provider
                        .upload_image(&credential, bytes, mime, aspect_hint)
                        .await
                }
            })
            .await;

        match result {
            Ok(media_id) => {
                tracing::info!(scene, %media_id, "reference image uploaded");
                job.set_media_id(media_id);
                // The provider may 400 if the batch lands before it has
                // indexed the upload.
                tokio::time::sleep(self.config.upload_settle_delay).await;
                Ok(())
            }
            Err(e @ RotationError::Exhausted { .. }) => {
                Err(SubmitError::CredentialsExhausted(e))
            }
            Err(error) => {
                tracing::warn!(scene, %error, "reference image upload failed, continuing without it");
                Ok(())
            }
        }
    }

    /// Try the batch once per model until one is accepted.
    ///
    /// `Ok(None)` means every rung was rejected as a malformed request;
    /// any other failure exhausts the pool and ends the ladder.
    async fn walk_ladder(
        &self,
        scene: u32,
        models: &[String],
        batch: &SubmitBatch,
    ) -> Result<Option<SubmitAck>, SubmitError> {
        for (i, model) in models.iter().enumerate() {
            if i > 0 {
                self.events.publish(EngineEvent::SubmitFallback {
                    scene,
                    step: FallbackStep::LadderModel {
                        model: model.clone(),
                    },
                });
            }
            let attempt = SubmitBatch {
                model_key: model.clone(),
                ..batch.clone()
            };

            self.gate.gate().await;
            let result = self
                .pool
                .execute(|credential| {
                    let attempt = &attempt;
                    async move { self.provider.submit_batch(&credential, attempt).await }
                })
                .await;

            match result {
                Ok(ack) => return Ok(Some(ack)),
                // Aborted always carries a malformed-request failure;
                // the next rung may use a key the provider accepts.
                Err(RotationError::Aborted(error)) => {
                    tracing::warn!(scene, model = %model, %error, "model rejected, trying next rung");
                }
                Err(e @ RotationError::Exhausted { .. }) => {
                    return Err(SubmitError::CredentialsExhausted(e));
                }
            }
        }
        Ok(None)
    }

    /// Bind batch operation names to copies in submission order.
    fn bind_batch(&self, job: &mut Job, ack: SubmitAck) {
        let scene = job.scene();
        for (copy, name) in ack.operation_names.into_iter().enumerate() {
            let copy = copy as u32;
            match name {
                Some(name) if !name.is_empty() => {
                    self.bind_handle(job, copy, name);
                }
                _ => {
                    tracing::warn!(scene, copy, "operation acknowledged without a name, copy dropped");
                    self.events
                        .publish(EngineEvent::HandleMissing { scene, copy });
                }
            }
        }
    }

    /// One request per copy, each walking the full model ladder.
    async fn submit_per_copy(
        &self,
        job: &mut Job,
        models: &[String],
        batch: &SubmitBatch,
    ) -> Result<(), SubmitError> {
        let scene = job.scene();
        for copy in 0..job.descriptor().effective_copies() {
            let single = SubmitBatch {
                copies: 1,
                base_seed: batch.base_seed + copy as u64,
                ..batch.clone()
            };
            match self.walk_ladder(scene, models, &single).await? {
                Some(ack) => match ack.operation_names.into_iter().next().flatten() {
                    Some(name) if !name.is_empty() => {
                        self.bind_handle(job, copy, name);
                    }
                    _ => {
                        tracing::warn!(scene, copy, "per-copy submission returned no name");
                        self.events
                            .publish(EngineEvent::HandleMissing { scene, copy });
                    }
                },
                None => {
                    tracing::warn!(scene, copy, "per-copy submission found no working model");
                }
            }
        }
        Ok(())
    }

    fn bind_handle(&self, job: &mut Job, copy: u32, name: String) {
        let scene = job.scene();
        if let Err(error) = job.record_handle(copy, OperationHandle::new(name)) {
            tracing::warn!(scene, copy, %error, "could not bind operation handle");
            return;
        }
        self.events.publish(EngineEvent::CopyStatusChanged {
            scene,
            copy,
            status: reelforge_core::job::CopyStatus::Submitted,
        });
    }

    fn set_job_status(&self, job: &mut Job, status: JobStatus) {
        job.set_status(status);
        self.events.publish(EngineEvent::JobStatusChanged {
            scene: job.scene(),
            status,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_puts_requested_model_first() {
        let models = model_ladder("veo_3_1_i2v_s_portrait", AspectRatio::Portrait, true);
        assert_eq!(models[0], "veo_3_1_i2v_s_portrait");
        // No duplicate of the requested key further down.
        assert_eq!(
            models.iter().filter(|m| *m == "veo_3_1_i2v_s_portrait").count(),
            1
        );
        assert_eq!(models.last().map(String::as_str), Some("veo_3_1_i2v_s"));
    }

    #[test]
    fn ladder_differs_between_modes() {
        let i2v = model_ladder("custom", AspectRatio::Landscape, true);
        let t2v = model_ladder("custom", AspectRatio::Landscape, false);
        assert!(i2v.contains(&"veo_3_1_i2v_s_fast_ultra".to_string()));
        assert!(t2v.contains(&"veo_3_1_t2v_fast_ultra".to_string()));
        assert!(!t2v.iter().any(|m| m.contains("i2v")));
    }

    #[test]
    fn square_text_ladder_is_shared_family() {
        let models = model_ladder("veo_3_1_t2v", AspectRatio::Square, false);
        assert_eq!(models, vec!["veo_3_1_t2v", "veo_3_1_t2v_fast_ultra"]);
    }
}
