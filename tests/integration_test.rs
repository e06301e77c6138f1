use bill_check::{
    config::AppConfig,
    db::{self, receipt_queries, user_queries},
    models::bill::{BillItem, ExtractedBill},
    models::job::{JobPriority, JobState},
    models::receipt::{ProcessingStage, ReceiptStatus},
    models::user::SubscriptionTier,
    services::{
        analysis,
        queue::{JobQueue, QueueConfig},
        usage,
    },
};
use chrono::Utc;
use uuid::Uuid;

/// Integration test: full pipeline round trip
///
/// This test verifies the complete integration:
/// 1. Database connection and schema
/// 2. User and receipt creation
/// 3. Job queue (enqueue/dequeue/progress/complete)
/// 4. Receipt state transitions driven through the queries the worker uses
/// 5. Usage counter update
///
/// Note: This requires a running PostgreSQL and Redis instance
/// configured via environment variables.
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_full_pipeline_integration() {
    let config = AppConfig::from_env().expect("Failed to load config");

    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    db::run_migrations(&db_pool).await.expect("Failed to run migrations");

    let queue = JobQueue::new(&config.redis_url, QueueConfig::from_app_config(&config))
        .expect("Failed to initialize queue");

    // 1. Create a user
    let email = format!("pipeline-{}@example.test", Uuid::new_v4());
    let user = user_queries::create_user(
        &db_pool,
        user_queries::NewUser {
            name: "Pipeline Test",
            email: &email,
            password_hash: "$argon2id$test",
            shop_name: Some("Test Shop"),
            address: None,
            phone: None,
        },
    )
    .await
    .expect("Failed to create user");

    assert_eq!(user.tier(), SubscriptionTier::Free);
    assert_eq!(user.monthly_uploads, 0);

    // 2. Create a receipt in pending/uploaded
    let receipt = receipt_queries::create_receipt(
        &db_pool,
        user.id,
        "https://storage.example.test/receipts/test.jpg",
        "receipts/test.jpg",
    )
    .await
    .expect("Failed to create receipt");

    assert_eq!(receipt.status(), ReceiptStatus::Pending);
    assert_eq!(receipt.processing_stage, ProcessingStage::Uploaded.to_string());

    // 3. Enqueue a job for it
    let enqueued = queue
        .enqueue(receipt.id, &receipt.image_url, user.id, JobPriority::Normal)
        .await
        .expect("Failed to enqueue");

    assert!(enqueued.queue_position >= 1);
    assert!(enqueued.estimated_time > 0);

    receipt_queries::set_job_info(&db_pool, receipt.id, enqueued.job_id, enqueued.queue_position)
        .await
        .expect("Failed to attach job info");

    let snapshot = queue
        .status(enqueued.job_id)
        .await
        .expect("Failed to read job status")
        .expect("Job record missing");
    assert_eq!(snapshot.state, JobState::Waiting);
    assert_eq!(snapshot.receipt_id, receipt.id);

    // 4. Dequeue and walk the receipt through the worker's transitions
    let job = queue
        .dequeue()
        .await
        .expect("Failed to dequeue")
        .expect("No job in queue");
    assert_eq!(job.receipt_id, receipt.id);

    receipt_queries::mark_processing(&db_pool, receipt.id)
        .await
        .expect("Failed to mark processing");
    queue.progress(&job, 20).await.expect("Failed to record progress");

    let processing = receipt_queries::get_receipt(&db_pool, receipt.id)
        .await
        .expect("Failed to fetch receipt")
        .expect("Receipt missing");
    assert_eq!(processing.status(), ReceiptStatus::Processing);

    // 5. Complete with a discrepancy analysis
    let extracted = ExtractedBill {
        items: vec![
            BillItem { name: "Rice".into(), quantity: 2.0, price: 100.0 },
            BillItem { name: "Oil".into(), quantity: 1.0, price: 30.0 },
        ],
        written_total: Some(250.0),
        computed_total: Some(230.0),
        mismatch: true,
    };
    let summary = analysis::summarize(&extracted);
    assert_eq!(summary.total_discrepancy, 20.0);

    receipt_queries::complete_receipt(
        &db_pool,
        receipt.id,
        &serde_json::to_value(&extracted).unwrap(),
        &summary,
        1500,
        900,
    )
    .await
    .expect("Failed to complete receipt");

    queue
        .complete(&job, &serde_json::json!({"hasDiscrepancies": true}))
        .await
        .expect("Failed to complete job");

    let done = receipt_queries::get_receipt(&db_pool, receipt.id)
        .await
        .expect("Failed to fetch receipt")
        .expect("Receipt missing");
    assert_eq!(done.status(), ReceiptStatus::Completed);
    assert_eq!(done.processing_stage, ProcessingStage::AnalysisCompleted.to_string());
    assert!(done.has_discrepancies);
    assert_eq!(done.total_discrepancy, 20.0);
    assert_eq!(done.item_count(), 2);
    assert!(done.extracted_data.is_some());

    let finished = queue
        .status(job.job_id)
        .await
        .expect("Failed to read job status")
        .expect("Job record missing");
    assert_eq!(finished.state, JobState::Completed);
    assert_eq!(finished.progress, 100);

    // 6. Count the upload against the quota
    let next = usage::record_upload(user.usage_snapshot(), Utc::now());
    user_queries::save_usage(&db_pool, user.id, &next).await.expect("Failed to save usage");

    let updated = user_queries::find_by_id(&db_pool, user.id)
        .await
        .expect("Failed to load user")
        .expect("User missing");
    assert_eq!(updated.monthly_uploads, 1);
    assert_eq!(updated.total_uploads, 1);

    // Cleanup
    receipt_queries::delete_receipt(&db_pool, receipt.id).await.expect("Failed to delete receipt");
}

/// Integration test: retry path
///
/// A failed attempt marks the receipt failed and schedules the job for a
/// delayed retry; the retried job carries the bumped attempt count.
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_retry_path_integration() {
    let config = AppConfig::from_env().expect("Failed to load config");

    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&db_pool).await.expect("Failed to run migrations");

    let queue = JobQueue::new(&config.redis_url, QueueConfig::from_app_config(&config))
        .expect("Failed to initialize queue");

    let email = format!("retry-{}@example.test", Uuid::new_v4());
    let user = user_queries::create_user(
        &db_pool,
        user_queries::NewUser {
            name: "Retry Test",
            email: &email,
            password_hash: "$argon2id$test",
            shop_name: None,
            address: None,
            phone: None,
        },
    )
    .await
    .expect("Failed to create user");

    let receipt = receipt_queries::create_receipt(
        &db_pool,
        user.id,
        "https://storage.example.test/receipts/retry.jpg",
        "receipts/retry.jpg",
    )
    .await
    .expect("Failed to create receipt");

    let enqueued = queue
        .enqueue(receipt.id, &receipt.image_url, user.id, JobPriority::Normal)
        .await
        .expect("Failed to enqueue");

    let job = queue.dequeue().await.expect("Failed to dequeue").expect("No job in queue");
    assert_eq!(job.job_id, enqueued.job_id);

    // Simulate an analysis failure.
    receipt_queries::fail_receipt(&db_pool, receipt.id, "Vision analysis failed: boom")
        .await
        .expect("Failed to record failure");
    queue.retry_later(&job, "Vision analysis failed: boom").await.expect("Failed to schedule retry");

    let failed = receipt_queries::get_receipt(&db_pool, receipt.id)
        .await
        .expect("Failed to fetch receipt")
        .expect("Receipt missing");
    assert_eq!(failed.status(), ReceiptStatus::Failed);
    assert_eq!(failed.processing_stage, ProcessingStage::Error.to_string());
    assert_eq!(failed.error_message.as_deref(), Some("Vision analysis failed: boom"));
    assert_eq!(failed.retry_count, 1);

    let waiting = queue
        .status(job.job_id)
        .await
        .expect("Failed to read job status")
        .expect("Job record missing");
    assert_eq!(waiting.state, JobState::Waiting);
    assert_eq!(waiting.attempts, 1);
    assert_eq!(waiting.error.as_deref(), Some("Vision analysis failed: boom"));

    // Cleanup
    receipt_queries::delete_receipt(&db_pool, receipt.id).await.expect("Failed to delete receipt");
}

/// Priority ordering is a queue-level contract: a high job enqueued
/// after a normal one is dequeued first.
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_priority_ordering_integration() {
    let config = AppConfig::from_env().expect("Failed to load config");
    let queue = JobQueue::new(&config.redis_url, QueueConfig::from_app_config(&config))
        .expect("Failed to initialize queue");

    let user_id = Uuid::new_v4();
    let normal_receipt = Uuid::new_v4();
    let high_receipt = Uuid::new_v4();

    queue
        .enqueue(normal_receipt, "https://example.test/n.jpg", user_id, JobPriority::Normal)
        .await
        .expect("Failed to enqueue normal");
    queue
        .enqueue(high_receipt, "https://example.test/h.jpg", user_id, JobPriority::High)
        .await
        .expect("Failed to enqueue high");

    let first = queue.dequeue().await.expect("Failed to dequeue").expect("No job");
    assert_eq!(first.receipt_id, high_receipt, "high-priority job must be dequeued first");

    let second = queue.dequeue().await.expect("Failed to dequeue").expect("No job");
    assert_eq!(second.receipt_id, normal_receipt);

    queue.complete(&first, &serde_json::json!({})).await.expect("cleanup");
    queue.complete(&second, &serde_json::json!({})).await.expect("cleanup");
}
