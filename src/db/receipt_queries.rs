use sqlx::PgPool;
use uuid::Uuid;

use crate::models::receipt::{ProcessingStage, Receipt, ReceiptAnalysis, ReceiptStatus};

pub(crate) const RECEIPT_COLUMNS: &str = "id, user_id, image_url, storage_key, status, processing_stage, \
     extracted_data, has_discrepancies, total_discrepancy, confidence, suggestions, ai_note, \
     error_message, total_processing_ms, analysis_ms, retry_count, feedback, job_id, \
     queue_position, is_archived, archived_at, created_at, updated_at";

/// Insert a fresh receipt in `pending`/`uploaded` state.
pub async fn create_receipt(
    pool: &PgPool,
    user_id: Uuid,
    image_url: &str,
    storage_key: &str,
) -> Result<Receipt, sqlx::Error> {
    let sql = format!(
        "INSERT INTO receipts (user_id, image_url, storage_key)
         VALUES ($1, $2, $3)
         RETURNING {RECEIPT_COLUMNS}"
    );
    sqlx::query_as::<_, Receipt>(&sql)
        .bind(user_id)
        .bind(image_url)
        .bind(storage_key)
        .fetch_one(pool)
        .await
}

/// Attach the queue's job reference after a successful enqueue.
pub async fn set_job_info(
    pool: &PgPool,
    receipt_id: Uuid,
    job_id: Uuid,
    queue_position: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE receipts SET job_id = $2, queue_position = $3, updated_at = NOW() WHERE id = $1",
    )
    .bind(receipt_id)
    .bind(job_id)
    .bind(queue_position)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_receipt(pool: &PgPool, receipt_id: Uuid) -> Result<Option<Receipt>, sqlx::Error> {
    let sql = format!("SELECT {RECEIPT_COLUMNS} FROM receipts WHERE id = $1");
    sqlx::query_as::<_, Receipt>(&sql).bind(receipt_id).fetch_optional(pool).await
}

/// Move a receipt into `processing`/`analysis_started` when its job is
/// picked up.
pub async fn mark_processing(pool: &PgPool, receipt_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE receipts
         SET status = $2, processing_stage = $3, updated_at = NOW()
         WHERE id = $1",
    )
    .bind(receipt_id)
    .bind(ReceiptStatus::Processing.to_string())
    .bind(ProcessingStage::AnalysisStarted.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Persist a successful analysis: extraction, summary, timings, and the
/// `completed`/`analysis_completed` transition in one statement.
pub async fn complete_receipt(
    pool: &PgPool,
    receipt_id: Uuid,
    extracted_data: &serde_json::Value,
    analysis: &ReceiptAnalysis,
    total_processing_ms: i64,
    analysis_ms: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE receipts
         SET status = $2,
             processing_stage = $3,
             extracted_data = $4,
             has_discrepancies = $5,
             total_discrepancy = $6,
             confidence = $7,
             suggestions = $8,
             ai_note = $9,
             error_message = NULL,
             total_processing_ms = $10,
             analysis_ms = $11,
             updated_at = NOW()
         WHERE id = $1",
    )
    .bind(receipt_id)
    .bind(ReceiptStatus::Completed.to_string())
    .bind(ProcessingStage::AnalysisCompleted.to_string())
    .bind(extracted_data)
    .bind(analysis.has_discrepancies)
    .bind(analysis.total_discrepancy)
    .bind(analysis.confidence)
    .bind(serde_json::json!(analysis.suggestions))
    .bind(&analysis.ai_note)
    .bind(total_processing_ms)
    .bind(analysis_ms)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record a failure: `failed`/`error` with the message preserved
/// verbatim, and the attempt counted.
pub async fn fail_receipt(
    pool: &PgPool,
    receipt_id: Uuid,
    error_message: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE receipts
         SET status = $2,
             processing_stage = $3,
             error_message = $4,
             retry_count = retry_count + 1,
             updated_at = NOW()
         WHERE id = $1",
    )
    .bind(receipt_id)
    .bind(ReceiptStatus::Failed.to_string())
    .bind(ProcessingStage::Error.to_string())
    .bind(error_message)
    .execute(pool)
    .await?;
    Ok(())
}

/// Filterable, paginated, newest-first listing for one user. Archived
/// receipts are excluded.
pub async fn list_receipts(
    pool: &PgPool,
    user_id: Uuid,
    page: i64,
    limit: i64,
    status: Option<ReceiptStatus>,
    has_discrepancies: Option<bool>,
) -> Result<(Vec<Receipt>, i64), sqlx::Error> {
    let offset = (page - 1) * limit;
    let status_text = status.map(|s| s.to_string());

    let sql = format!(
        "SELECT {RECEIPT_COLUMNS} FROM receipts
         WHERE user_id = $1
           AND NOT is_archived
           AND ($2::text IS NULL OR status = $2)
           AND ($3::boolean IS NULL OR has_discrepancies = $3)
         ORDER BY created_at DESC
         LIMIT $4 OFFSET $5"
    );
    let rows = sqlx::query_as::<_, Receipt>(&sql)
        .bind(user_id)
        .bind(&status_text)
        .bind(has_discrepancies)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    let total: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM receipts
         WHERE user_id = $1
           AND NOT is_archived
           AND ($2::text IS NULL OR status = $2)
           AND ($3::boolean IS NULL OR has_discrepancies = $3)",
    )
    .bind(user_id)
    .bind(&status_text)
    .bind(has_discrepancies)
    .fetch_one(pool)
    .await?;

    Ok((rows, total.0))
}

/// Store owner feedback on a completed analysis.
pub async fn set_feedback(
    pool: &PgPool,
    receipt_id: Uuid,
    feedback: &serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE receipts SET feedback = $2, updated_at = NOW() WHERE id = $1")
        .bind(receipt_id)
        .bind(feedback)
        .execute(pool)
        .await?;
    Ok(())
}

/// Archive: the receipt leaves lists and aggregates but stays stored.
pub async fn archive_receipt(pool: &PgPool, receipt_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE receipts SET is_archived = TRUE, archived_at = NOW(), updated_at = NOW()
         WHERE id = $1",
    )
    .bind(receipt_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Hard delete, owner- or admin-initiated only.
pub async fn delete_receipt(pool: &PgPool, receipt_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM receipts WHERE id = $1").bind(receipt_id).execute(pool).await?;
    Ok(())
}
