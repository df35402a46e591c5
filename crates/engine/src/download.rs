//! Artifact downloads with bounded retries and thumbnail extraction.
//!
//! A download attempt that fails (transport error, empty body, or an
//! unwritable file) puts the copy back into `Processing` so the next
//! poll round re-validates the URL; pre-signed URLs go stale and a
//! fresh report may carry a new one. After the retry cap the copy is
//! `DownloadFailed` and keeps its last URL for inspection. Downloads
//! are idempotent per copy: a second request for an already written
//! copy is a no-op.

use std::path::{Path, PathBuf};

use reelforge_client::GenerationProvider;
use reelforge_core::job::{CopyStatus, Job};
use reelforge_core::naming::{artifact_filename, thumbnail_filename};
use reelforge_core::types::CopyIndex;
use reelforge_events::{EngineEvent, EventBus};

use crate::config::EngineConfig;

/// Outcome of one download request for one copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DownloadResult {
    /// The artifact is on disk (thumbnail extraction may have failed).
    Completed,
    /// The copy was already written earlier; nothing was fetched.
    AlreadyDownloaded,
    /// The attempt failed below the retry cap; the copy went back to
    /// polling.
    Retry,
    /// Retries are exhausted; the copy is terminally failed.
    Failed,
}

pub(crate) struct Downloader<'a> {
    pub provider: &'a dyn GenerationProvider,
    pub events: &'a EventBus,
    pub config: &'a EngineConfig,
    pub output_dir: &'a Path,
    pub project: &'a str,
}

impl Downloader<'_> {
    /// Fetch one copy's artifact and write it next to its thumbnail.
    pub async fn fetch(&self, job: &mut Job, copy: CopyIndex, url: &str) -> DownloadResult {
        let scene = job.scene();
        if job.is_downloaded(copy) {
            tracing::debug!(scene, copy, "copy already downloaded, skipping");
            return DownloadResult::AlreadyDownloaded;
        }

        let attempt = job.note_download_attempt(copy);
        tracing::info!(scene, copy, attempt, %url, "downloading artifact");
        self.events
            .publish(EngineEvent::DownloadStarted { scene, copy });

        let bytes = match self.provider.fetch_artifact(url).await {
            Ok(bytes) if bytes.is_empty() => {
                tracing::warn!(scene, copy, "download returned an empty body");
                return self.fail_or_retry(job, copy, url, attempt);
            }
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!(scene, copy, %error, "download failed");
                return self.fail_or_retry(job, copy, url, attempt);
            }
        };

        let path = self
            .output_dir
            .join(artifact_filename(self.project, scene, copy));
        if let Err(error) = tokio::fs::write(&path, &bytes).await {
            tracing::warn!(scene, copy, path = %path.display(), %error, "could not write artifact");
            return self.fail_or_retry(job, copy, url, attempt);
        }

        let thumbnail = self.extract_thumbnail(job, copy, &path).await;

        job.mark_downloaded(copy);
        self.set_copy_status(
            job,
            copy,
            CopyStatus::Downloaded {
                path: path.clone(),
                thumbnail,
            },
        );
        tracing::info!(scene, copy, path = %path.display(), "artifact downloaded");
        self.events
            .publish(EngineEvent::DownloadCompleted { scene, copy, path });
        DownloadResult::Completed
    }

    /// Decide between another poll-driven retry and terminal failure.
    fn fail_or_retry(
        &self,
        job: &mut Job,
        copy: CopyIndex,
        url: &str,
        attempt: u32,
    ) -> DownloadResult {
        let scene = job.scene();
        let max = self.config.max_download_retries;
        if attempt >= max {
            tracing::error!(scene, copy, attempt, "download retries exhausted");
            self.set_copy_status(
                job,
                copy,
                CopyStatus::DownloadFailed {
                    url: url.to_string(),
                },
            );
            self.events
                .publish(EngineEvent::DownloadFailed { scene, copy });
            DownloadResult::Failed
        } else {
            self.events.publish(EngineEvent::DownloadRetry {
                scene,
                copy,
                attempt,
                max,
            });
            // Back to polling; the next report may carry a fresh URL.
            self.set_copy_status(job, copy, CopyStatus::Processing);
            DownloadResult::Retry
        }
    }

    /// Grab the first frame as a JPEG via ffmpeg.
    ///
    /// Thumbnail failure never fails the download; ffmpeg may simply be
    /// absent on the host.
    async fn extract_thumbnail(
        &self,
        job: &Job,
        copy: CopyIndex,
        video: &Path,
    ) -> Option<PathBuf> {
        let scene = job.scene();
        let out = self.output_dir.join(thumbnail_filename(scene, copy));
        let result = tokio::process::Command::new("ffmpeg")
            .arg("-y")
            .args(["-ss", "00:00:00"])
            .arg("-i")
            .arg(video)
            .args(["-frames:v", "1", "-q:v", "3"])
            .arg(&out)
            .output()
            .await;

        match result {
            Ok(output) if output.status.success() => Some(out),
            Ok(output) => {
                let detail = String::from_utf8_lossy(&output.stderr)
                    .chars()
                    .take(200)
                    .collect::<String>();
                tracing::warn!(scene, copy, %detail, "thumbnail extraction failed");
                self.events.publish(EngineEvent::ThumbnailFailed {
                    scene,
                    copy,
                    detail,
                });
                None
            }
            Err(error) => {
                tracing::warn!(scene, copy, %error, "could not run ffmpeg");
                self.events.publish(EngineEvent::ThumbnailFailed {
                    scene,
                    copy,
                    detail: error.to_string(),
                });
                None
            }
        }
    }

    fn set_copy_status(&self, job: &mut Job, copy: CopyIndex, status: CopyStatus) {
        let scene = job.scene();
        let old_job_status = job.status();
        job.set_copy_status(copy, status.clone());
        self.events.publish(EngineEvent::CopyStatusChanged {
            scene,
            copy,
            status,
        });
        if job.status() != old_job_status {
            self.events.publish(EngineEvent::JobStatusChanged {
                scene,
                status: job.status(),
            });
        }
    }
}
