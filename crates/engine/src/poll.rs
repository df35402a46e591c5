//! Batched status polling.
//!
//! All outstanding operation handles across every job are checked in a
//! single provider round-trip per round. A failed round is transient:
//! nothing is marked failed for it, the round is retried after a
//! cooldown. Only explicit per-operation reports move copies to
//! terminal states.

use reelforge_client::{GenerationProvider, OperationReport, OperationStatus};
use reelforge_core::job::{CopyStatus, Job, OperationHandle};
use reelforge_core::types::{CopyIndex, SceneId};
use reelforge_events::{EngineEvent, EventBus};

use crate::rate_limit::RateLimiter;
use crate::rotator::CredentialPool;

/// A copy whose artifact URL just became known.
#[derive(Debug, Clone)]
pub(crate) struct ReadyCopy {
    pub scene: SceneId,
    pub copy: CopyIndex,
    pub url: String,
}

/// Outcome of one poll round.
pub(crate) enum RoundResult {
    /// Reports were applied; `ready` holds copies to download now.
    Applied { ready: Vec<ReadyCopy> },
    /// The round failed as a whole and should be retried after a
    /// cooldown. Credential exhaustion lands here too: cooldowns on
    /// throttled credentials expire, so the next round may succeed.
    Transient { detail: String },
}

pub(crate) struct Poller<'a> {
    pub provider: &'a dyn GenerationProvider,
    pub pool: &'a CredentialPool,
    pub gate: &'a RateLimiter,
    pub events: &'a EventBus,
}

impl Poller<'_> {
    /// Check every outstanding operation and apply the reports.
    pub async fn check(&self, jobs: &mut [Job], round: u32) -> RoundResult {
        let names: Vec<String> = jobs
            .iter()
            .flat_map(|job| job.outstanding_handles())
            .map(|handle| handle.name().to_string())
            .collect();
        if names.is_empty() {
            return RoundResult::Applied { ready: Vec::new() };
        }

        tracing::debug!(round, in_flight = names.len(), "poll round");
        self.events.publish(EngineEvent::PollRound {
            round,
            in_flight: names.len(),
        });

        self.gate.gate().await;
        let outcome = self
            .pool
            .execute(|credential| {
                let names = &names;
                async move { self.provider.batch_check(&credential, names).await }
            })
            .await;

        match outcome {
            Ok(outcome) => {
                let mut ready = Vec::new();
                for report in outcome.reports {
                    if let Some(hit) = apply_report(jobs, &report, self.events) {
                        ready.push(hit);
                    }
                }
                RoundResult::Applied { ready }
            }
            Err(error) => {
                let detail = error.to_string();
                tracing::warn!(round, %detail, "poll round failed, will retry after cooldown");
                self.events.publish(EngineEvent::PollRoundFailed {
                    round,
                    detail: detail.clone(),
                });
                RoundResult::Transient { detail }
            }
        }
    }
}

/// Apply one operation report to whichever job owns its handle.
///
/// Returns the copy when it just transitioned to `Done` with a URL.
/// Reports for unknown handles are dropped with a warning; they can
/// appear when the provider echoes operations from an older request.
fn apply_report(
    jobs: &mut [Job],
    report: &OperationReport,
    events: &EventBus,
) -> Option<ReadyCopy> {
    let handle = OperationHandle::new(report.name.clone());
    let (job, copy) = match jobs
        .iter_mut()
        .find_map(|job| job.copy_for(&handle).map(|copy| (job, copy)))
    {
        Some(hit) => hit,
        None => {
            tracing::warn!(handle = %handle, "status report for unknown operation");
            return None;
        }
    };
    let scene = job.scene();

    // Terminal copies keep their state; a late report never regresses one.
    if !job
        .copy_status(copy)
        .map(CopyStatus::needs_polling)
        .unwrap_or(false)
    {
        return None;
    }

    let (next, ready) = match report.status {
        OperationStatus::Processing => (CopyStatus::Processing, None),
        OperationStatus::Done => match report.primary_video_url() {
            Some(url) => (
                CopyStatus::Done {
                    url: url.to_string(),
                },
                Some(ReadyCopy {
                    scene,
                    copy,
                    url: url.to_string(),
                }),
            ),
            None => (CopyStatus::DoneNoUrl, None),
        },
        OperationStatus::DoneNoUrl => (CopyStatus::DoneNoUrl, None),
        OperationStatus::Failed => (CopyStatus::Failed, None),
    };

    if job.copy_status(copy) != Some(&next) {
        tracing::info!(scene, copy, status = ?next, "copy status changed");
        let old_job_status = job.status();
        job.set_copy_status(copy, next.clone());
        events.publish(EngineEvent::CopyStatusChanged {
            scene,
            copy,
            status: next,
        });
        if job.status() != old_job_status {
            events.publish(EngineEvent::JobStatusChanged {
                scene,
                status: job.status(),
            });
        }
    }
    ready
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelforge_core::job::{AspectRatio, JobDescriptor, JobStatus};

    fn job_with_handles(scene: SceneId, copies: u32) -> Job {
        let mut job = Job::new(JobDescriptor {
            scene,
            prompt: "a quiet street".to_string(),
            reference_images: vec![],
            copies,
            aspect_ratio: AspectRatio::Landscape,
            model_key: "veo_3_1_t2v".to_string(),
            project_id: None,
            seed: Some(7),
        });
        for copy in 0..copies {
            job.record_handle(copy, OperationHandle::new(format!("op/{scene}/{copy}")))
                .unwrap();
        }
        job.set_status(JobStatus::Submitted);
        job
    }

    fn report(name: &str, status: OperationStatus, video_urls: Vec<String>) -> OperationReport {
        OperationReport {
            name: name.to_string(),
            status,
            video_urls,
            image_urls: vec![],
        }
    }

    #[test]
    fn done_report_yields_a_ready_copy() {
        let mut jobs = vec![job_with_handles(1, 2)];
        let events = EventBus::default();

        let ready = apply_report(
            &mut jobs,
            &report(
                "op/1/1",
                OperationStatus::Done,
                vec!["https://cdn/video/a.mp4".to_string()],
            ),
            &events,
        );

        let ready = ready.expect("copy should be ready");
        assert_eq!((ready.scene, ready.copy), (1, 1));
        assert_eq!(
            jobs[0].copy_status(1),
            Some(&CopyStatus::Done {
                url: "https://cdn/video/a.mp4".to_string()
            })
        );
        // The sibling copy is untouched.
        assert_eq!(jobs[0].copy_status(0), Some(&CopyStatus::Submitted));
    }

    #[test]
    fn done_without_url_is_not_conflated_with_done() {
        let mut jobs = vec![job_with_handles(2, 1)];
        let events = EventBus::default();

        let ready = apply_report(
            &mut jobs,
            &report("op/2/0", OperationStatus::DoneNoUrl, vec![]),
            &events,
        );

        assert!(ready.is_none());
        assert_eq!(jobs[0].copy_status(0), Some(&CopyStatus::DoneNoUrl));
        assert!(jobs[0].all_copies_terminal());
    }

    #[test]
    fn late_report_never_regresses_a_terminal_copy() {
        let mut jobs = vec![job_with_handles(3, 1)];
        let events = EventBus::default();
        jobs[0].set_copy_status(0, CopyStatus::Failed);

        let ready = apply_report(
            &mut jobs,
            &report(
                "op/3/0",
                OperationStatus::Done,
                vec!["https://cdn/video/late.mp4".to_string()],
            ),
            &events,
        );

        assert!(ready.is_none());
        assert_eq!(jobs[0].copy_status(0), Some(&CopyStatus::Failed));
    }

    #[test]
    fn unknown_handle_is_ignored() {
        let mut jobs = vec![job_with_handles(4, 1)];
        let events = EventBus::default();

        let ready = apply_report(
            &mut jobs,
            &report("op/other/9", OperationStatus::Done, vec![]),
            &events,
        );
        assert!(ready.is_none());
        assert_eq!(jobs[0].copy_status(0), Some(&CopyStatus::Submitted));
    }

    #[test]
    fn processing_report_advances_submitted_copy() {
        let mut jobs = vec![job_with_handles(5, 1)];
        let events = EventBus::default();

        apply_report(
            &mut jobs,
            &report("op/5/0", OperationStatus::Processing, vec![]),
            &events,
        );
        assert_eq!(jobs[0].copy_status(0), Some(&CopyStatus::Processing));
        assert_eq!(jobs[0].status(), JobStatus::Processing);
    }
}
