use chrono::{DateTime, TimeZone, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::job::{EnqueueResult, JobPriority, JobState, JobStatusSnapshot, QueueStats};

const HIGH_KEY: &str = "bill_check:jobs:high";
const NORMAL_KEY: &str = "bill_check:jobs:normal";
const DELAYED_KEY: &str = "bill_check:jobs:delayed";
const PROCESSING_KEY: &str = "bill_check:jobs:processing";

/// Terminal job records are kept around this long for status polling.
const JOB_RECORD_TTL_SECS: i64 = 24 * 60 * 60;

/// At most this many job ids are kept per user.
const USER_INDEX_LEN: isize = 50;

fn job_key(job_id: Uuid) -> String {
    format!("bill_check:job:{job_id}")
}

fn lock_key(job_id: Uuid) -> String {
    format!("bill_check:lock:{job_id}")
}

fn user_jobs_key(user_id: Uuid) -> String {
    format!("bill_check:user_jobs:{user_id}")
}

/// Job payload serialized into Redis. `attempts` and `stalls` travel with
/// the payload so retry accounting survives worker restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
    pub job_id: Uuid,
    pub receipt_id: Uuid,
    pub image_url: String,
    pub user_id: Uuid,
    pub priority: JobPriority,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub stalls: u32,
}

/// Retry/backoff/stall tuning, normally taken from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub max_depth: i64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub lock_ms: u64,
    pub max_stalls: u32,
    pub avg_job_secs: i64,
    pub concurrency: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_depth: 50,
            max_attempts: 2,
            backoff_base_ms: 5000,
            lock_ms: 30_000,
            max_stalls: 1,
            avg_job_secs: 60,
            concurrency: 1,
        }
    }
}

impl QueueConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_depth: config.queue_max_depth,
            max_attempts: config.queue_max_attempts,
            backoff_base_ms: config.queue_backoff_ms,
            lock_ms: config.queue_lock_ms,
            max_stalls: config.queue_max_stalls,
            avg_job_secs: config.queue_avg_job_secs,
            concurrency: config.worker_concurrency,
        }
    }

    /// Exponential backoff: base × 2^(attempts−1).
    pub fn backoff_delay_ms(&self, attempts: u32) -> u64 {
        self.backoff_base_ms.saturating_mul(1u64 << attempts.saturating_sub(1).min(16))
    }

    /// Heuristic seconds until a job at `position` completes.
    pub fn estimated_time_secs(&self, position: i64) -> i64 {
        let concurrency = self.concurrency.max(1) as i64;
        (position / concurrency + 1) * self.avg_job_secs
    }
}

/// Redis-backed priority job queue with delayed retries and stall
/// recovery. The queue is the sole coordination point between the API
/// and worker processes.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    pub fn new(redis_url: &str, config: QueueConfig) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)
    }

    fn list_key(priority: JobPriority) -> &'static str {
        match priority {
            JobPriority::High => HIGH_KEY,
            JobPriority::Normal => NORMAL_KEY,
        }
    }

    /// Enqueue a processing job. Rejects when the waiting depth has
    /// reached the configured maximum.
    pub async fn enqueue(
        &self,
        receipt_id: Uuid,
        image_url: &str,
        user_id: Uuid,
        priority: JobPriority,
    ) -> Result<EnqueueResult, QueueError> {
        let mut conn = self.conn().await?;

        let high_len: i64 = conn.llen(HIGH_KEY).await.map_err(QueueError::Redis)?;
        let normal_len: i64 = conn.llen(NORMAL_KEY).await.map_err(QueueError::Redis)?;
        let depth = high_len + normal_len;
        if depth >= self.config.max_depth {
            return Err(QueueError::Full { depth, max_depth: self.config.max_depth });
        }

        let job = QueuedJob {
            job_id: Uuid::new_v4(),
            receipt_id,
            image_url: image_url.to_string(),
            user_id,
            priority,
            attempts: 0,
            stalls: 0,
        };
        let payload = serde_json::to_string(&job).map_err(QueueError::Serialize)?;

        let now = Utc::now();
        let record = [
            ("state", JobState::Waiting.to_string()),
            ("progress", "0".to_string()),
            ("priority", priority.to_string()),
            ("receipt_id", receipt_id.to_string()),
            ("user_id", user_id.to_string()),
            ("attempts", "0".to_string()),
            ("created_at", now.timestamp_millis().to_string()),
        ];
        conn.hset_multiple::<_, _, _, ()>(job_key(job.job_id), &record)
            .await
            .map_err(QueueError::Redis)?;

        conn.lpush::<_, _, ()>(Self::list_key(priority), &payload)
            .await
            .map_err(QueueError::Redis)?;

        let index = user_jobs_key(user_id);
        conn.lpush::<_, _, ()>(&index, job.job_id.to_string()).await.map_err(QueueError::Redis)?;
        conn.ltrim::<_, ()>(&index, 0, USER_INDEX_LEN - 1).await.map_err(QueueError::Redis)?;

        // Position behind everything already waiting; high jobs only wait
        // behind the high tier.
        let queue_position = match priority {
            JobPriority::High => high_len + 1,
            JobPriority::Normal => depth + 1,
        };

        Ok(EnqueueResult {
            job_id: job.job_id,
            queue_position,
            estimated_time: self.config.estimated_time_secs(queue_position),
            priority,
        })
    }

    /// Dequeue the next job: promote due retries, then drain the high
    /// tier before the normal one. Claims a lock so the job is owned by
    /// exactly one consumer.
    pub async fn dequeue(&self) -> Result<Option<QueuedJob>, QueueError> {
        let mut conn = self.conn().await?;
        self.promote_delayed(&mut conn).await?;

        let payload: Option<String> = {
            let from_high: Option<String> =
                conn.rpoplpush(HIGH_KEY, PROCESSING_KEY).await.map_err(QueueError::Redis)?;
            match from_high {
                Some(p) => Some(p),
                None => conn.rpoplpush(NORMAL_KEY, PROCESSING_KEY).await.map_err(QueueError::Redis)?,
            }
        };

        let Some(payload) = payload else {
            return Ok(None);
        };

        let job: QueuedJob = serde_json::from_str(&payload).map_err(QueueError::Serialize)?;

        conn.pset_ex::<_, _, ()>(lock_key(job.job_id), "1", self.config.lock_ms)
            .await
            .map_err(QueueError::Redis)?;
        conn.hset_multiple::<_, _, _, ()>(
            job_key(job.job_id),
            &[
                ("state", JobState::Active.to_string()),
                ("processed_at", Utc::now().timestamp_millis().to_string()),
                ("attempts", (job.attempts + 1).to_string()),
            ],
        )
        .await
        .map_err(QueueError::Redis)?;

        Ok(Some(job))
    }

    /// Move retry-scheduled jobs whose backoff has elapsed back onto
    /// their priority list.
    async fn promote_delayed(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
    ) -> Result<(), QueueError> {
        let now_ms = Utc::now().timestamp_millis();
        let due: Vec<String> = conn
            .zrangebyscore_limit(DELAYED_KEY, 0, now_ms, 0, 10)
            .await
            .map_err(QueueError::Redis)?;

        for payload in due {
            let removed: i64 = conn.zrem(DELAYED_KEY, &payload).await.map_err(QueueError::Redis)?;
            if removed == 0 {
                continue; // another worker promoted it first
            }
            let job: QueuedJob = serde_json::from_str(&payload).map_err(QueueError::Serialize)?;
            conn.lpush::<_, _, ()>(Self::list_key(job.priority), &payload)
                .await
                .map_err(QueueError::Redis)?;
        }
        Ok(())
    }

    /// Record coarse progress and refresh the job lock. Serves as the
    /// worker's heartbeat.
    pub async fn progress(&self, job: &QueuedJob, percent: u8) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        conn.hset::<_, _, _, ()>(job_key(job.job_id), "progress", percent.min(100).to_string())
            .await
            .map_err(QueueError::Redis)?;
        conn.pexpire::<_, ()>(lock_key(job.job_id), self.config.lock_ms as i64)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Mark a job completed and release its processing slot.
    pub async fn complete(
        &self,
        job: &QueuedJob,
        result: &serde_json::Value,
    ) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        self.release(&mut conn, job).await?;
        let key = job_key(job.job_id);
        conn.hset_multiple::<_, _, _, ()>(
            &key,
            &[
                ("state", JobState::Completed.to_string()),
                ("progress", "100".to_string()),
                ("result", result.to_string()),
                ("finished_at", Utc::now().timestamp_millis().to_string()),
            ],
        )
        .await
        .map_err(QueueError::Redis)?;
        conn.expire::<_, ()>(&key, JOB_RECORD_TTL_SECS).await.map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Mark a job failed terminally, preserving the error verbatim.
    pub async fn fail(&self, job: &QueuedJob, error: &str) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        self.release(&mut conn, job).await?;
        let key = job_key(job.job_id);
        conn.hset_multiple::<_, _, _, ()>(
            &key,
            &[
                ("state", JobState::Failed.to_string()),
                ("error", error.to_string()),
                ("finished_at", Utc::now().timestamp_millis().to_string()),
            ],
        )
        .await
        .map_err(QueueError::Redis)?;
        conn.expire::<_, ()>(&key, JOB_RECORD_TTL_SECS).await.map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Schedule a failed attempt for retry after an exponential backoff.
    /// The stored payload carries the bumped attempt count.
    pub async fn retry_later(&self, job: &QueuedJob, error: &str) -> Result<u64, QueueError> {
        let mut conn = self.conn().await?;
        self.release(&mut conn, job).await?;

        let mut retried = job.clone();
        retried.attempts += 1;
        let delay_ms = self.config.backoff_delay_ms(retried.attempts);
        let ready_at = Utc::now().timestamp_millis() + delay_ms as i64;
        let payload = serde_json::to_string(&retried).map_err(QueueError::Serialize)?;

        conn.zadd::<_, _, _, ()>(DELAYED_KEY, &payload, ready_at).await.map_err(QueueError::Redis)?;
        conn.hset_multiple::<_, _, _, ()>(
            job_key(job.job_id),
            &[
                ("state", JobState::Waiting.to_string()),
                ("progress", "0".to_string()),
                ("error", error.to_string()),
                ("attempts", retried.attempts.to_string()),
            ],
        )
        .await
        .map_err(QueueError::Redis)?;

        Ok(delay_ms)
    }

    /// Drop the job from the processing list and delete its lock.
    async fn release(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        job: &QueuedJob,
    ) -> Result<(), QueueError> {
        let payload = serde_json::to_string(job).map_err(QueueError::Serialize)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload).await.map_err(QueueError::Redis)?;
        conn.del::<_, ()>(lock_key(job.job_id)).await.map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Requeue processing-list entries whose lock has lapsed. A job is
    /// requeued at most `max_stalls` times, then failed.
    pub async fn recover_stalled(&self) -> Result<u32, QueueError> {
        let mut conn = self.conn().await?;
        let entries: Vec<String> =
            conn.lrange(PROCESSING_KEY, 0, -1).await.map_err(QueueError::Redis)?;

        let mut recovered = 0u32;
        for payload in entries {
            let job: QueuedJob = match serde_json::from_str(&payload) {
                Ok(j) => j,
                Err(e) => {
                    // Unparseable entry: drop it, it can never be processed.
                    tracing::error!(error = %e, "dropping malformed processing entry");
                    conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload)
                        .await
                        .map_err(QueueError::Redis)?;
                    continue;
                }
            };

            let locked: bool = conn.exists(lock_key(job.job_id)).await.map_err(QueueError::Redis)?;
            if locked {
                continue;
            }

            conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload).await.map_err(QueueError::Redis)?;

            if job.stalls >= self.config.max_stalls {
                tracing::warn!(job_id = %job.job_id, stalls = job.stalls, "job stalled too often, failing");
                drop(conn);
                self.fail(&job, "job stalled: no heartbeat within the lock window").await?;
                conn = self.conn().await?;
            } else {
                let mut requeued = job.clone();
                requeued.stalls += 1;
                let new_payload = serde_json::to_string(&requeued).map_err(QueueError::Serialize)?;
                // Back of the tier: RPUSH so a stalled job is retried next.
                conn.rpush::<_, _, ()>(Self::list_key(requeued.priority), &new_payload)
                    .await
                    .map_err(QueueError::Redis)?;
                conn.hset::<_, _, _, ()>(
                    job_key(job.job_id),
                    "state",
                    JobState::Waiting.to_string(),
                )
                .await
                .map_err(QueueError::Redis)?;
                tracing::warn!(job_id = %job.job_id, stalls = requeued.stalls, "requeued stalled job");
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    /// Read a job's queue-side record.
    pub async fn status(&self, job_id: Uuid) -> Result<Option<JobStatusSnapshot>, QueueError> {
        let mut conn = self.conn().await?;
        let record: std::collections::HashMap<String, String> =
            conn.hgetall(job_key(job_id)).await.map_err(QueueError::Redis)?;
        if record.is_empty() {
            return Ok(None);
        }
        Ok(Some(snapshot_from_record(job_id, &record)?))
    }

    /// Most recent jobs for one user, newest first.
    pub async fn jobs_for_user(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<JobStatusSnapshot>, QueueError> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn
            .lrange(user_jobs_key(user_id), 0, limit.saturating_sub(1) as isize)
            .await
            .map_err(QueueError::Redis)?;

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            let Ok(job_id) = id.parse::<Uuid>() else { continue };
            let record: std::collections::HashMap<String, String> =
                conn.hgetall(job_key(job_id)).await.map_err(QueueError::Redis)?;
            if record.is_empty() {
                continue; // expired record
            }
            jobs.push(snapshot_from_record(job_id, &record)?);
        }
        Ok(jobs)
    }

    /// Current depth counters for health and dashboard views.
    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        let mut conn = self.conn().await?;
        let waiting_high: i64 = conn.llen(HIGH_KEY).await.map_err(QueueError::Redis)?;
        let waiting_normal: i64 = conn.llen(NORMAL_KEY).await.map_err(QueueError::Redis)?;
        let delayed: i64 = conn.zcard(DELAYED_KEY).await.map_err(QueueError::Redis)?;
        let active: i64 = conn.llen(PROCESSING_KEY).await.map_err(QueueError::Redis)?;
        Ok(QueueStats { waiting_high, waiting_normal, delayed, active })
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await.map_err(QueueError::Redis)?;
        Ok(())
    }
}

fn snapshot_from_record(
    job_id: Uuid,
    record: &std::collections::HashMap<String, String>,
) -> Result<JobStatusSnapshot, QueueError> {
    let ms_field = |name: &str| -> Option<DateTime<Utc>> {
        record
            .get(name)
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    };

    Ok(JobStatusSnapshot {
        job_id,
        state: record
            .get("state")
            .and_then(|s| s.parse().ok())
            .unwrap_or(JobState::Waiting),
        progress: record.get("progress").and_then(|p| p.parse().ok()).unwrap_or(0),
        priority: record
            .get("priority")
            .and_then(|p| p.parse().ok())
            .unwrap_or(JobPriority::Normal),
        receipt_id: record
            .get("receipt_id")
            .and_then(|r| r.parse().ok())
            .ok_or_else(|| QueueError::Corrupt(format!("job {job_id} record missing receipt_id")))?,
        user_id: record
            .get("user_id")
            .and_then(|u| u.parse().ok())
            .ok_or_else(|| QueueError::Corrupt(format!("job {job_id} record missing user_id")))?,
        attempts: record.get("attempts").and_then(|a| a.parse().ok()).unwrap_or(0),
        result: record.get("result").and_then(|r| serde_json::from_str(r).ok()),
        error: record.get("error").cloned(),
        created_at: ms_field("created_at").unwrap_or_else(Utc::now),
        processed_at: ms_field("processed_at"),
        finished_at: ms_field("finished_at"),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("queue is full ({depth}/{max_depth})")]
    Full { depth: i64, max_depth: i64 },

    #[error("corrupt queue record: {0}")]
    Corrupt(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let config = QueueConfig { backoff_base_ms: 5000, ..QueueConfig::default() };
        assert_eq!(config.backoff_delay_ms(1), 5000);
        assert_eq!(config.backoff_delay_ms(2), 10_000);
        assert_eq!(config.backoff_delay_ms(3), 20_000);
    }

    #[test]
    fn backoff_is_capped_against_overflow() {
        let config = QueueConfig { backoff_base_ms: u64::MAX / 2, ..QueueConfig::default() };
        // Saturates instead of wrapping.
        assert_eq!(config.backoff_delay_ms(40), u64::MAX);
    }

    #[test]
    fn estimate_scales_with_depth_and_concurrency() {
        let config =
            QueueConfig { avg_job_secs: 60, concurrency: 1, ..QueueConfig::default() };
        assert_eq!(config.estimated_time_secs(1), 120);
        assert_eq!(config.estimated_time_secs(0), 60);

        let wide = QueueConfig { avg_job_secs: 60, concurrency: 2, ..QueueConfig::default() };
        assert_eq!(wide.estimated_time_secs(4), 180);
    }

    #[test]
    fn payload_round_trips_with_attempts() {
        let job = QueuedJob {
            job_id: Uuid::new_v4(),
            receipt_id: Uuid::new_v4(),
            image_url: "https://example.test/bill.jpg".into(),
            user_id: Uuid::new_v4(),
            priority: JobPriority::High,
            attempts: 2,
            stalls: 1,
        };
        let payload = serde_json::to_string(&job).unwrap();
        let parsed: QueuedJob = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed.job_id, job.job_id);
        assert_eq!(parsed.attempts, 2);
        assert_eq!(parsed.stalls, 1);
        assert_eq!(parsed.priority, JobPriority::High);
    }

    #[test]
    fn legacy_payload_defaults_counters() {
        let json = format!(
            r#"{{"job_id":"{}","receipt_id":"{}","image_url":"u","user_id":"{}","priority":"normal"}}"#,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4()
        );
        let parsed: QueuedJob = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.attempts, 0);
        assert_eq!(parsed.stalls, 0);
    }
}
