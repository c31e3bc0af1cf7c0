//! # Batch Processing
//!
//! Seals or opens many independent packages at once.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           BATCH EXECUTION                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  jobs[0..n] ──► Semaphore(max_parallel) ──► spawn_blocking(pipeline)   │
//! │                                                   │                     │
//! │                                                   ▼                     │
//! │                     JoinSet ──► results[index] (input order kept)      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every job owns its keys and its own [`RunControl`] deadline, so one
//! slow or failing job never affects another. Jobs share no mutable state.
//! A shared cancel handle stops jobs between stages.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::EngineConfig;
use crate::crypto::{KeyPair, PrivateKey, PublicKey};
use crate::error::{Error, Result};
use crate::pipeline::{open_with, seal_with, Opened, RunControl, SealOptions, SealOutput};

/// One file to seal
#[derive(Debug)]
pub struct SealJob {
    /// File contents
    pub plaintext: Vec<u8>,
    /// File name to record, if any
    pub file_name: Option<String>,
    /// Recipient's public key
    pub recipient: PublicKey,
    /// Sender identity; generated per job when absent
    pub sender: Option<KeyPair>,
}

/// One package to open
#[derive(Debug, Clone)]
pub struct OpenJob {
    /// Serialized package, binary or armored
    pub package_bytes: Vec<u8>,
    /// Recipient's private key, shared between jobs
    pub receiver: Arc<PrivateKey>,
    /// Public key the signature must verify against
    pub sender_public: PublicKey,
}

/// Seal every job, at most `config.max_parallel` at a time
///
/// The returned vector has one result per job, in input order.
pub async fn seal_batch(
    jobs: Vec<SealJob>,
    config: &EngineConfig,
    cancel: &RunControl,
) -> Result<Vec<Result<SealOutput>>> {
    config.validate()?;
    let job_config = config.clone();

    run_batch(jobs, config, cancel, move |job, control| {
        seal_with(
            &job.plaintext,
            SealOptions {
                file_name: job.file_name,
                sender: job.sender,
            },
            &job.recipient,
            &job_config,
            &control,
        )
    })
    .await
}

/// Open every job, at most `config.max_parallel` at a time
///
/// The returned vector has one result per job, in input order.
pub async fn open_batch(
    jobs: Vec<OpenJob>,
    config: &EngineConfig,
    cancel: &RunControl,
) -> Result<Vec<Result<Opened>>> {
    config.validate()?;

    run_batch(jobs, config, cancel, |job, control| {
        open_with(&job.package_bytes, &job.receiver, &job.sender_public, &control)
    })
    .await
}

async fn run_batch<J, T, F>(
    jobs: Vec<J>,
    config: &EngineConfig,
    cancel: &RunControl,
    work: F,
) -> Result<Vec<Result<T>>>
where
    J: Send + 'static,
    T: Send + 'static,
    F: Fn(J, RunControl) -> Result<T> + Clone + Send + 'static,
{
    let total = jobs.len();
    let permits = Arc::new(Semaphore::new(config.max_parallel));
    let mut tasks = JoinSet::new();

    tracing::debug!(jobs = total, max_parallel = config.max_parallel, "starting batch");

    for (index, job) in jobs.into_iter().enumerate() {
        let permit = permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::Internal(format!("batch semaphore closed: {}", e)))?;
        let control = job_control(config, cancel);
        let work = work.clone();

        tasks.spawn_blocking(move || {
            let result = work(job, control);
            drop(permit);
            (index, result)
        });
    }

    let mut results: Vec<Option<Result<T>>> = (0..total).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        let (index, result) =
            joined.map_err(|e| Error::Internal(format!("batch task failed: {}", e)))?;
        results[index] = Some(result);
    }

    let failed = results
        .iter()
        .filter(|r| matches!(r, Some(Err(_))))
        .count();
    tracing::info!(jobs = total, failed, "batch complete");

    results
        .into_iter()
        .map(|r| r.ok_or_else(|| Error::Internal("batch job produced no result".into())))
        .collect()
}

/// Per-job control: the job's own deadline, the batch's cancel flag
fn job_control(config: &EngineConfig, cancel: &RunControl) -> RunControl {
    config.run_control().sharing_cancel(cancel)
}

// ============================================================================
// TESTS
// ============================================================================
