//! Shared fixtures: a scripted [`GenerationProvider`] and run helpers.
//!
//! The mock names operations `op-{seed}` and serves artifact URLs
//! `https://cdn.test/video/{seed}.mp4`, so tests can predict both from
//! the seeds they hand out.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use reelforge_client::{
    ApiError, BatchCheckOutcome, GenerationProvider, OperationReport, OperationStatus, SubmitAck,
    SubmitBatch,
};
use reelforge_core::job::{AspectRatio, JobDescriptor};
use reelforge_engine::{EngineConfig, Orchestrator, RunOptions};
use reelforge_events::{EngineEvent, EventBus};

pub fn op_name(seed: u64) -> String {
    format!("op-{seed}")
}

pub fn artifact_url(seed: u64) -> String {
    format!("https://cdn.test/video/{seed}.mp4")
}

/// Static behavior script for a [`MockProvider`].
#[derive(Default)]
pub struct ProviderScript {
    /// Reject every multi-copy submission with HTTP 400.
    pub reject_batches: bool,
    /// Throttle every submission with HTTP 429.
    pub throttle_submits: bool,
    /// Seeds whose single-copy submissions always get HTTP 400.
    pub reject_single_seeds: HashSet<u64>,
    /// Poll rounds each operation reports `Processing` before settling.
    pub processing_rounds: u32,
    /// Seeds whose operations end `FAILED`.
    pub fail_seeds: HashSet<u64>,
    /// Seeds whose operations succeed without any playable URL.
    pub no_url_seeds: HashSet<u64>,
    /// Leading `batch_check` calls that fail with a server error.
    pub check_failures: u32,
    /// Leading fetch attempts per URL that fail with a server error.
    pub fetch_failures: HashMap<String, u32>,
    /// URLs that always return an empty body.
    pub empty_body_urls: HashSet<String>,
}

#[derive(Default)]
struct MockState {
    submits: Vec<SubmitBatch>,
    checks: u32,
    rounds_seen: HashMap<String, u32>,
    fetches: HashMap<String, u32>,
    uploads: u32,
}

/// Scripted in-memory provider.
pub struct MockProvider {
    script: ProviderScript,
    state: Mutex<MockState>,
}

impl MockProvider {
    pub fn new(script: ProviderScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            state: Mutex::new(MockState::default()),
        })
    }

    pub fn accept_all() -> Arc<Self> {
        Self::new(ProviderScript::default())
    }

    /// Every submission request observed, in order.
    pub fn submitted(&self) -> Vec<SubmitBatch> {
        self.state.lock().unwrap().submits.clone()
    }

    pub fn fetch_count(&self, url: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .fetches
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    pub fn upload_count(&self) -> u32 {
        self.state.lock().unwrap().uploads
    }

    fn provider_error(status: u16) -> ApiError {
        ApiError::Provider {
            status,
            message: "scripted failure".to_string(),
        }
    }

    fn seed_of(name: &str) -> u64 {
        name.strip_prefix("op-")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }
}

#[async_trait]
impl GenerationProvider for MockProvider {
    async fn submit_batch(
        &self,
        _credential: &str,
        batch: &SubmitBatch,
    ) -> Result<SubmitAck, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.submits.push(batch.clone());

        if self.script.throttle_submits {
            return Err(Self::provider_error(429));
        }
        if batch.copies > 1 && self.script.reject_batches {
            return Err(Self::provider_error(400));
        }
        if batch.copies == 1 && self.script.reject_single_seeds.contains(&batch.base_seed) {
            return Err(Self::provider_error(400));
        }
        let operation_names = (0..batch.copies)
            .map(|k| Some(op_name(batch.base_seed + k as u64)))
            .collect();
        Ok(SubmitAck { operation_names })
    }

    async fn batch_check(
        &self,
        _credential: &str,
        operation_names: &[String],
    ) -> Result<BatchCheckOutcome, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.checks += 1;
        if state.checks <= self.script.check_failures {
            return Err(Self::provider_error(503));
        }

        let mut reports = Vec::new();
        for name in operation_names {
            let seed = Self::seed_of(name);
            let seen = state.rounds_seen.entry(name.clone()).or_insert(0);
            *seen += 1;
            let (status, video_urls) = if *seen <= self.script.processing_rounds {
                (OperationStatus::Processing, vec![])
            } else if self.script.fail_seeds.contains(&seed) {
                (OperationStatus::Failed, vec![])
            } else if self.script.no_url_seeds.contains(&seed) {
                (OperationStatus::DoneNoUrl, vec![])
            } else {
                (OperationStatus::Done, vec![artifact_url(seed)])
            };
            reports.push(OperationReport {
                name: name.clone(),
                status,
                video_urls,
                image_urls: vec![],
            });
        }
        Ok(BatchCheckOutcome { reports })
    }

    async fn upload_image(
        &self,
        _credential: &str,
        _bytes: &[u8],
        _mime: &str,
        _aspect_hint: &str,
    ) -> Result<String, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.uploads += 1;
        Ok(format!("media-{}", state.uploads))
    }

    async fn fetch_artifact(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let mut state = self.state.lock().unwrap();
        let count = state.fetches.entry(url.to_string()).or_insert(0);
        *count += 1;
        if self.script.empty_body_urls.contains(url) {
            return Ok(Vec::new());
        }
        if *count <= self.script.fetch_failures.get(url).copied().unwrap_or(0) {
            return Err(Self::provider_error(502));
        }
        Ok(b"fake-mp4-bytes".to_vec())
    }
}

// ---------------------------------------------------------------------------
// Run helpers
// ---------------------------------------------------------------------------

/// A text-to-video descriptor with a fixed seed.
pub fn descriptor(scene: u32, copies: u32, seed: u64) -> JobDescriptor {
    JobDescriptor {
        scene,
        prompt: format!("scene {scene} establishing shot"),
        reference_images: vec![],
        copies,
        aspect_ratio: AspectRatio::Landscape,
        model_key: "veo_3_1_t2v_fast_ultra".to_string(),
        project_id: None,
        seed: Some(seed),
    }
}

/// Orchestrator over `provider` with one credential and default config.
pub fn orchestrator(provider: Arc<MockProvider>) -> Orchestrator {
    Orchestrator::new(
        provider,
        vec!["test-credential-123456".to_string()],
        EngineConfig::default(),
        EventBus::default(),
    )
}

pub fn run_options(output_dir: &Path) -> RunOptions {
    RunOptions {
        output_dir: output_dir.to_path_buf(),
        project: "demo".to_string(),
        stop: CancellationToken::new(),
    }
}

/// Collect everything published so far without blocking.
pub fn drain_events(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
