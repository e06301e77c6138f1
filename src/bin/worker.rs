use bill_check::{
    app_state::AppState,
    config::AppConfig,
    db::{self, receipt_queries, user_queries},
    services::{
        analysis,
        cache::CacheClient,
        queue::{JobQueue, QueueConfig, QueuedJob},
        storage::ObjectStorage,
        token::TokenService,
        usage,
        vision::VisionClient,
    },
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting bill-check worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Initialize services
    tracing::info!("Initializing services");
    let storage = ObjectStorage::new(
        &config.storage_bucket,
        &config.storage_endpoint,
        &config.storage_access_key,
        &config.storage_secret_key,
        &config.storage_public_url,
    )
    .expect("Failed to initialize object storage client");

    let queue = JobQueue::new(&config.redis_url, QueueConfig::from_app_config(&config))
        .expect("Failed to initialize job queue");

    let cache = CacheClient::new(&config.redis_url).expect("Failed to initialize cache client");

    let vision = VisionClient::new(&config.gemini_api_key, &config.gemini_model);

    let tokens = TokenService::new(
        &config.jwt_secret,
        config.jwt_access_ttl_secs,
        config.jwt_refresh_ttl_secs,
    );

    let state = AppState::new(db_pool, storage, queue, vision, cache, tokens);

    let concurrency = config.worker_concurrency.max(1);
    let poll_interval = Duration::from_millis(config.worker_poll_ms);
    let permits = Arc::new(Semaphore::new(concurrency));

    tracing::info!(concurrency, "Worker ready, starting job processing loop");

    // Main processing loop. The queue is the sole coordination point;
    // multiple worker processes may run this loop concurrently.
    loop {
        if let Err(e) = state.queue.recover_stalled().await {
            tracing::error!(error = %e, "stall recovery failed");
        }

        let permit = permits
            .clone()
            .acquire_owned()
            .await
            .expect("worker semaphore closed");

        match state.queue.dequeue().await {
            Ok(Some(job)) => {
                let state = state.clone();
                tokio::spawn(async move {
                    process_job(&state, job).await;
                    drop(permit);
                });
            }
            Ok(None) => {
                drop(permit);
                tracing::trace!("No jobs available, sleeping");
                sleep(poll_interval).await;
            }
            Err(e) => {
                drop(permit);
                tracing::error!(error = %e, "Error dequeuing job, will retry");
                sleep(poll_interval).await;
            }
        }
    }
}

/// Drive one receipt through its processing stages. Failures mark the
/// receipt `failed`/`error` and hand the job back to the queue's retry
/// policy until attempts are exhausted.
async fn process_job(state: &AppState, job: QueuedJob) {
    let started = std::time::Instant::now();

    tracing::info!(
        job_id = %job.job_id,
        receipt_id = %job.receipt_id,
        attempt = job.attempts + 1,
        "Processing receipt job"
    );

    match process_job_inner(state, &job).await {
        Ok(result) => {
            if let Err(e) = state.queue.complete(&job, &result).await {
                tracing::error!(job_id = %job.job_id, error = %e, "Failed to mark job completed");
            }

            metrics::counter!("receipt_jobs_completed").increment(1);
            metrics::histogram!("receipt_processing_seconds").record(started.elapsed().as_secs_f64());

            tracing::info!(
                job_id = %job.job_id,
                receipt_id = %job.receipt_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Job completed successfully"
            );
        }
        Err(e) => {
            let message = e.to_string();
            tracing::error!(job_id = %job.job_id, receipt_id = %job.receipt_id, error = %message, "Job processing failed");

            if !e.retryable {
                // Data-integrity failure: retrying cannot help.
                if let Err(qe) = state.queue.fail(&job, &message).await {
                    tracing::error!(job_id = %job.job_id, error = %qe, "Failed to mark job failed");
                }
                metrics::counter!("receipt_jobs_failed").increment(1);
                return;
            }

            // The receipt reflects the failure immediately; a retry will
            // flip it back to processing.
            if let Err(de) = receipt_queries::fail_receipt(&state.db, job.receipt_id, &message).await
            {
                tracing::error!(receipt_id = %job.receipt_id, error = %de, "Failed to record receipt failure");
            }

            let attempts_done = job.attempts + 1;
            if attempts_done >= state.queue.config().max_attempts {
                if let Err(qe) = state.queue.fail(&job, &message).await {
                    tracing::error!(job_id = %job.job_id, error = %qe, "Failed to mark job failed");
                }
                metrics::counter!("receipt_jobs_failed").increment(1);
                tracing::warn!(
                    job_id = %job.job_id,
                    attempts = attempts_done,
                    "Job failed after max attempts"
                );
            } else {
                match state.queue.retry_later(&job, &message).await {
                    Ok(delay_ms) => tracing::info!(
                        job_id = %job.job_id,
                        attempts = attempts_done,
                        delay_ms,
                        "Job scheduled for retry"
                    ),
                    Err(qe) => tracing::error!(job_id = %job.job_id, error = %qe, "Failed to schedule retry"),
                }
            }
        }
    }

    if let Ok(stats) = state.queue.stats().await {
        metrics::gauge!("receipt_queue_depth").set(stats.waiting() as f64);
    }
}

/// A worker failure plus whether the queue should retry it.
#[derive(Debug)]
struct JobError {
    message: String,
    retryable: bool,
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl JobError {
    fn transient(e: impl std::fmt::Display) -> Self {
        Self { message: e.to_string(), retryable: true }
    }

    fn fatal(message: impl Into<String>) -> Self {
        Self { message: message.into(), retryable: false }
    }
}

/// Inner pipeline: fetch receipt, run the analysis collaborator, persist
/// the outcome, count the upload against the owner's quota.
async fn process_job_inner(
    state: &AppState,
    job: &QueuedJob,
) -> Result<serde_json::Value, JobError> {
    let started = std::time::Instant::now();

    let receipt = receipt_queries::get_receipt(&state.db, job.receipt_id)
        .await
        .map_err(JobError::transient)?;
    let Some(receipt) = receipt else {
        // The job references a receipt that no longer exists. Retrying
        // cannot recover it.
        tracing::error!(
            job_id = %job.job_id,
            receipt_id = %job.receipt_id,
            "data integrity error: receipt missing for queued job"
        );
        return Err(JobError::fatal("Receipt not found"));
    };

    receipt_queries::mark_processing(&state.db, receipt.id).await.map_err(JobError::transient)?;
    state.queue.progress(job, 10).await.map_err(JobError::transient)?;

    state.queue.progress(job, 20).await.map_err(JobError::transient)?;

    tracing::debug!(job_id = %job.job_id, "Calling vision collaborator");
    let outcome = state.vision.analyze(&job.image_url).await.map_err(JobError::transient)?;

    state.queue.progress(job, 80).await.map_err(JobError::transient)?;

    let summary = analysis::summarize(&outcome.extracted);
    let extracted_json =
        serde_json::to_value(&outcome.extracted).map_err(JobError::transient)?;

    receipt_queries::complete_receipt(
        &state.db,
        receipt.id,
        &extracted_json,
        &summary,
        started.elapsed().as_millis() as i64,
        outcome.processing_ms,
    )
    .await
    .map_err(JobError::transient)?;

    state.queue.progress(job, 95).await.map_err(JobError::transient)?;

    // Count the upload against the owner's quota, rolling the month
    // over when due. Missing owner is logged, not fatal: the receipt
    // itself completed.
    match user_queries::find_by_id(&state.db, job.user_id).await {
        Ok(Some(user)) => {
            let next = usage::record_upload(user.usage_snapshot(), Utc::now());
            if let Err(e) = user_queries::save_usage(&state.db, user.id, &next).await {
                tracing::error!(user_id = %job.user_id, error = %e, "Failed to update usage counters");
            }
        }
        Ok(None) => {
            tracing::warn!(user_id = %job.user_id, "owner missing while counting upload");
        }
        Err(e) => {
            tracing::error!(user_id = %job.user_id, error = %e, "Failed to load owner for usage update");
        }
    }

    tracing::info!(
        job_id = %job.job_id,
        receipt_id = %receipt.id,
        has_discrepancies = summary.has_discrepancies,
        total_discrepancy = summary.total_discrepancy,
        analysis_ms = outcome.processing_ms,
        "Analysis complete"
    );

    Ok(serde_json::json!({
        "hasDiscrepancies": summary.has_discrepancies,
        "totalDiscrepancy": summary.total_discrepancy,
        "confidence": summary.confidence,
        "itemCount": outcome.extracted.items.len(),
    }))
}
