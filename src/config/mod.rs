use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string (job queue, sessions, token blacklist)
    pub redis_url: String,

    /// Generative-AI vision API key
    pub gemini_api_key: String,

    /// Vision model identifier
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    /// Object storage bucket name
    pub storage_bucket: String,

    /// Object storage endpoint URL (S3-compatible)
    pub storage_endpoint: String,

    /// Object storage access key ID
    pub storage_access_key: String,

    /// Object storage secret access key
    pub storage_secret_key: String,

    /// Public base URL under which stored objects are reachable
    pub storage_public_url: String,

    /// HMAC secret for signing JWTs
    pub jwt_secret: String,

    /// Access-token lifetime in seconds (default 7 days)
    #[serde(default = "default_access_ttl")]
    pub jwt_access_ttl_secs: i64,

    /// Refresh-token lifetime in seconds (default 30 days)
    #[serde(default = "default_refresh_ttl")]
    pub jwt_refresh_ttl_secs: i64,

    /// Enqueue is rejected once this many jobs are waiting
    #[serde(default = "default_queue_max_depth")]
    pub queue_max_depth: i64,

    /// Processing attempts per job before it fails terminally
    #[serde(default = "default_queue_max_attempts")]
    pub queue_max_attempts: u32,

    /// Initial retry backoff in milliseconds (doubles per attempt)
    #[serde(default = "default_queue_backoff_ms")]
    pub queue_backoff_ms: u64,

    /// Job lock lifetime; a job whose lock lapses counts as stalled
    #[serde(default = "default_queue_lock_ms")]
    pub queue_lock_ms: u64,

    /// Times a stalled job is requeued before being failed
    #[serde(default = "default_queue_max_stalls")]
    pub queue_max_stalls: u32,

    /// Heuristic seconds one job takes, for queue ETA estimates
    #[serde(default = "default_avg_job_secs")]
    pub queue_avg_job_secs: i64,

    /// Jobs a single worker process runs concurrently
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Worker poll interval when the queue is empty, in milliseconds
    #[serde(default = "default_worker_poll_ms")]
    pub worker_poll_ms: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_gemini_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_access_ttl() -> i64 {
    7 * 24 * 60 * 60
}

fn default_refresh_ttl() -> i64 {
    30 * 24 * 60 * 60
}

fn default_queue_max_depth() -> i64 {
    50
}

fn default_queue_max_attempts() -> u32 {
    2
}

fn default_queue_backoff_ms() -> u64 {
    5000
}

fn default_queue_lock_ms() -> u64 {
    30_000
}

fn default_queue_max_stalls() -> u32 {
    1
}

fn default_avg_job_secs() -> i64 {
    60
}

fn default_worker_concurrency() -> usize {
    1
}

fn default_worker_poll_ms() -> u64 {
    1000
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
