//! Run orchestration: submit every job, then poll and download until
//! the in-flight set drains.
//!
//! One run is one sequential task. Submission happens job by job, then
//! a bounded poll loop checks all outstanding operations per round and
//! downloads copies as their URLs appear. The cancellation token is
//! checked before each submission and at the top of each round; an
//! in-flight HTTP call is never aborted, only not reissued. Everything
//! observable leaves through the event bus.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use reelforge_client::GenerationProvider;
use reelforge_core::error::CoreError;
use reelforge_core::job::{Artifact, CopyStatus, Job, JobDescriptor};
use reelforge_core::types::Timestamp;
use reelforge_events::{EngineEvent, EventBus};

use crate::config::EngineConfig;
use crate::download::{Downloader, DownloadResult};
use crate::poll::{Poller, RoundResult};
use crate::rate_limit::RateLimiter;
use crate::rotator::CredentialPool;
use crate::submit::Submitter;

/// Per-run parameters.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Directory artifacts and thumbnails are written into.
    pub output_dir: PathBuf,
    /// Project name used in artifact file names.
    pub project: String,
    /// Cooperative stop signal.
    pub stop: CancellationToken,
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub jobs: usize,
    pub downloaded_copies: usize,
    /// Copies that ended terminal without a local artifact.
    pub failed_copies: usize,
    /// Poll rounds actually spent.
    pub rounds: u32,
    /// Every file the run wrote, across all jobs.
    pub artifacts: Vec<Artifact>,
    pub finished_at: Timestamp,
}

/// Failures that stop a run before any provider traffic.
///
/// Per-job failures never end the run; they settle the job and the run
/// moves on.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("no credentials configured")]
    NoCredentials,
    #[error("invalid descriptor for scene {scene}")]
    InvalidDescriptor {
        scene: u32,
        #[source]
        source: CoreError,
    },
    #[error("duplicate scene id {scene} in run input")]
    DuplicateScene { scene: u32 },
    #[error("could not create output directory {path}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Drives generation runs against one provider with one credential pool.
///
/// The pool and rate limiter assume a single active run; start the next
/// run only after the previous one returned.
pub struct Orchestrator {
    provider: Arc<dyn GenerationProvider>,
    pool: CredentialPool,
    gate: RateLimiter,
    events: EventBus,
    config: EngineConfig,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        credentials: Vec<String>,
        config: EngineConfig,
        events: EventBus,
    ) -> Self {
        let pool = CredentialPool::new(
            credentials,
            config.backoff.clone(),
            config.credential_cooldown,
            events.clone(),
        );
        let gate = RateLimiter::new(config.rate_limit.clone());
        Self {
            provider,
            pool,
            gate,
            events,
            config,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// [`Self::run`] on a background task.
    pub fn spawn(
        self,
        descriptors: Vec<JobDescriptor>,
        options: RunOptions,
    ) -> JoinHandle<Result<RunSummary, RunError>> {
        tokio::spawn(async move { self.run(descriptors, options).await })
    }

    /// Execute one full run: submit, poll, download, settle.
    pub async fn run(
        &self,
        descriptors: Vec<JobDescriptor>,
        options: RunOptions,
    ) -> Result<RunSummary, RunError> {
        if self.pool.is_empty() {
            return Err(RunError::NoCredentials);
        }
        let mut jobs = validate_into_jobs(descriptors)?;
        tokio::fs::create_dir_all(&options.output_dir)
            .await
            .map_err(|source| RunError::OutputDir {
                path: options.output_dir.clone(),
                source,
            })?;

        let submitter = Submitter {
            provider: self.provider.as_ref(),
            pool: &self.pool,
            gate: &self.gate,
            events: &self.events,
            config: &self.config,
        };
        let poller = Poller {
            provider: self.provider.as_ref(),
            pool: &self.pool,
            gate: &self.gate,
            events: &self.events,
        };
        let downloader = Downloader {
            provider: self.provider.as_ref(),
            events: &self.events,
            config: &self.config,
            output_dir: &options.output_dir,
            project: &options.project,
        };

        // Submission phase. A job that fails to start is settled in
        // place; credential exhaustion fails that job but later jobs
        // still get their chance once cooldowns expire.
        for job in jobs.iter_mut() {
            if options.stop.is_cancelled() {
                tracing::info!(scene = job.scene(), "stop requested, skipping submission");
                job.fail_missing_copies();
                continue;
            }
            if let Err(error) = submitter.submit(job).await {
                tracing::error!(scene = job.scene(), %error, "submission failed");
            }
        }

        // Poll/download phase.
        let mut rounds = 0u32;
        while rounds < self.config.max_poll_rounds {
            if options.stop.is_cancelled() {
                tracing::info!("stop requested, ending poll loop");
                break;
            }
            if jobs.iter().all(Job::all_copies_terminal) {
                break;
            }
            rounds += 1;

            match poller.check(&mut jobs, rounds).await {
                RoundResult::Applied { ready } => {
                    for hit in ready {
                        if let Some(job) = jobs.iter_mut().find(|j| j.scene() == hit.scene) {
                            let result = downloader.fetch(job, hit.copy, &hit.url).await;
                            if result == DownloadResult::Retry {
                                tracing::debug!(
                                    scene = hit.scene,
                                    copy = hit.copy,
                                    "copy re-queued for polling",
                                );
                            }
                        }
                    }
                    if jobs.iter().all(Job::all_copies_terminal) {
                        break;
                    }
                    self.pause(&options.stop, self.config.poll_interval).await;
                }
                RoundResult::Transient { .. } => {
                    self.pause(&options.stop, self.config.poll_error_cooldown)
                        .await;
                }
            }
        }

        // Copies the poll budget or the stop signal left unresolved.
        for job in jobs.iter_mut() {
            let pending: Vec<u32> = job
                .copy_states()
                .filter(|(_, s)| !s.is_terminal())
                .map(|(c, _)| c)
                .collect();
            for copy in pending {
                tracing::warn!(scene = job.scene(), copy, "copy unresolved at end of run");
                job.set_copy_status(copy, CopyStatus::Failed);
                self.events.publish(EngineEvent::CopyStatusChanged {
                    scene: job.scene(),
                    copy,
                    status: CopyStatus::Failed,
                });
            }
        }

        let summary = summarize(&jobs, rounds);
        tracing::info!(
            jobs = summary.jobs,
            downloaded = summary.downloaded_copies,
            failed = summary.failed_copies,
            rounds = summary.rounds,
            "run completed",
        );
        self.events.publish(EngineEvent::RunCompleted {
            jobs: summary.jobs,
            downloaded_copies: summary.downloaded_copies,
            failed_copies: summary.failed_copies,
        });
        Ok(summary)
    }

    /// Sleep that wakes early when the stop token fires.
    async fn pause(&self, stop: &CancellationToken, duration: std::time::Duration) {
        tokio::select! {
            _ = stop.cancelled() => {}
            _ = tokio::time::sleep(duration) => {}
        }
    }
}

fn validate_into_jobs(descriptors: Vec<JobDescriptor>) -> Result<Vec<Job>, RunError> {
    let mut seen = std::collections::HashSet::new();
    let mut jobs = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        let scene = descriptor.scene;
        descriptor
            .validate()
            .map_err(|source| RunError::InvalidDescriptor { scene, source })?;
        if !seen.insert(scene) {
            return Err(RunError::DuplicateScene { scene });
        }
        jobs.push(Job::new(descriptor));
    }
    Ok(jobs)
}

fn summarize(jobs: &[Job], rounds: u32) -> RunSummary {
    let mut downloaded = 0usize;
    let mut failed = 0usize;
    let mut artifacts = Vec::new();
    for job in jobs {
        for (_, status) in job.copy_states() {
            match status {
                CopyStatus::Downloaded { .. } => downloaded += 1,
                s if s.is_terminal() => failed += 1,
                _ => {}
            }
        }
        artifacts.extend(job.artifacts());
    }
    RunSummary {
        jobs: jobs.len(),
        downloaded_copies: downloaded,
        failed_copies: failed,
        rounds,
        artifacts,
        finished_at: chrono::Utc::now(),
    }
}
