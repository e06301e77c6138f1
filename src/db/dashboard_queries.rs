use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Per-user receipt statistics for the dashboard overview.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ReceiptStats {
    pub total_receipts: i64,
    pub completed_receipts: i64,
    pub processing_receipts: i64,
    pub failed_receipts: i64,
    pub receipts_with_discrepancies: i64,
    pub total_discrepancy_amount: f64,
    pub avg_confidence: f64,
}

pub async fn user_receipt_stats(pool: &PgPool, user_id: Uuid) -> Result<ReceiptStats, sqlx::Error> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                COUNT(*) FILTER (WHERE status = 'processing') AS processing,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                COUNT(*) FILTER (WHERE has_discrepancies) AS with_discrepancies,
                COALESCE(SUM(total_discrepancy), 0) AS discrepancy_amount,
                COALESCE(AVG(confidence) FILTER (WHERE status = 'completed'), 0) AS avg_confidence
         FROM receipts
         WHERE user_id = $1 AND NOT is_archived",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(ReceiptStats {
        total_receipts: row.try_get("total")?,
        completed_receipts: row.try_get("completed")?,
        processing_receipts: row.try_get("processing")?,
        failed_receipts: row.try_get("failed")?,
        receipts_with_discrepancies: row.try_get("with_discrepancies")?,
        total_discrepancy_amount: row.try_get("discrepancy_amount")?,
        avg_confidence: row.try_get("avg_confidence")?,
    })
}

/// One month of upload activity in the rolling trend.
#[derive(Debug, Clone, Serialize)]
pub struct MonthlyTrendPoint {
    pub year: i32,
    pub month: i32,
    pub count: i64,
    pub discrepancies: i64,
    pub total_discrepancy_amount: f64,
}

/// Last six calendar months of activity, oldest first.
pub async fn monthly_trend(pool: &PgPool, user_id: Uuid) -> Result<Vec<MonthlyTrendPoint>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT EXTRACT(YEAR FROM created_at)::int AS year,
                EXTRACT(MONTH FROM created_at)::int AS month,
                COUNT(*) AS count,
                COUNT(*) FILTER (WHERE has_discrepancies) AS discrepancies,
                COALESCE(SUM(total_discrepancy), 0) AS amount
         FROM receipts
         WHERE user_id = $1
           AND NOT is_archived
           AND created_at >= NOW() - INTERVAL '6 months'
         GROUP BY 1, 2
         ORDER BY 1, 2",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(MonthlyTrendPoint {
                year: row.try_get("year")?,
                month: row.try_get("month")?,
                count: row.try_get("count")?,
                discrepancies: row.try_get("discrepancies")?,
                total_discrepancy_amount: row.try_get("amount")?,
            })
        })
        .collect()
}

/// System-wide counters for the admin dashboard.
#[derive(Debug, Clone, Serialize, Default)]
pub struct SystemStats {
    pub total_receipts: i64,
    pub completed_receipts: i64,
    pub processing_receipts: i64,
    pub failed_receipts: i64,
    pub receipts_with_discrepancies: i64,
    pub success_rate: i64,
}

pub async fn system_receipt_stats(pool: &PgPool) -> Result<SystemStats, sqlx::Error> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                COUNT(*) FILTER (WHERE status = 'processing') AS processing,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                COUNT(*) FILTER (WHERE has_discrepancies) AS with_discrepancies
         FROM receipts",
    )
    .fetch_one(pool)
    .await?;

    let total: i64 = row.try_get("total")?;
    let completed: i64 = row.try_get("completed")?;
    Ok(SystemStats {
        total_receipts: total,
        completed_receipts: completed,
        processing_receipts: row.try_get("processing")?,
        failed_receipts: row.try_get("failed")?,
        receipts_with_discrepancies: row.try_get("with_discrepancies")?,
        success_rate: if total > 0 { completed * 100 / total } else { 0 },
    })
}

/// One day of system activity, for the admin 30-day view.
#[derive(Debug, Clone, Serialize)]
pub struct DailyStatPoint {
    pub day: chrono::NaiveDate,
    pub uploads: i64,
    pub completed: i64,
    pub failed: i64,
    pub discrepancies: i64,
}

pub async fn daily_stats(pool: &PgPool, days: i64) -> Result<Vec<DailyStatPoint>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT date_trunc('day', created_at)::date AS day,
                COUNT(*) AS uploads,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                COUNT(*) FILTER (WHERE has_discrepancies) AS discrepancies
         FROM receipts
         WHERE created_at >= NOW() - ($1 || ' days')::interval
         GROUP BY 1
         ORDER BY 1",
    )
    .bind(days.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(DailyStatPoint {
                day: row.try_get("day")?,
                uploads: row.try_get("uploads")?,
                completed: row.try_get("completed")?,
                failed: row.try_get("failed")?,
                discrepancies: row.try_get("discrepancies")?,
            })
        })
        .collect()
}

/// Processing-time aggregates over completed receipts.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ProcessingAnalytics {
    pub avg_processing_ms: f64,
    pub min_processing_ms: i64,
    pub max_processing_ms: i64,
    pub avg_analysis_ms: f64,
    pub total_processed: i64,
}

pub async fn processing_analytics(pool: &PgPool, days: i64) -> Result<ProcessingAnalytics, sqlx::Error> {
    let row = sqlx::query(
        "SELECT COALESCE(AVG(total_processing_ms), 0)::double precision AS avg_ms,
                COALESCE(MIN(total_processing_ms), 0) AS min_ms,
                COALESCE(MAX(total_processing_ms), 0) AS max_ms,
                COALESCE(AVG(analysis_ms), 0)::double precision AS avg_analysis_ms,
                COUNT(*) AS total
         FROM receipts
         WHERE status = 'completed'
           AND total_processing_ms IS NOT NULL
           AND created_at >= NOW() - ($1 || ' days')::interval",
    )
    .bind(days.to_string())
    .fetch_one(pool)
    .await?;

    Ok(ProcessingAnalytics {
        avg_processing_ms: row.try_get("avg_ms")?,
        min_processing_ms: row.try_get("min_ms")?,
        max_processing_ms: row.try_get("max_ms")?,
        avg_analysis_ms: row.try_get("avg_analysis_ms")?,
        total_processed: row.try_get("total")?,
    })
}

/// Most frequent failure messages in the window.
#[derive(Debug, Clone, Serialize)]
pub struct FailureReason {
    pub error_message: String,
    pub count: i64,
}

pub async fn failure_reasons(pool: &PgPool, days: i64, limit: i64) -> Result<Vec<FailureReason>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT COALESCE(error_message, 'unknown') AS error_message, COUNT(*) AS count
         FROM receipts
         WHERE status = 'failed'
           AND created_at >= NOW() - ($1 || ' days')::interval
         GROUP BY 1
         ORDER BY count DESC
         LIMIT $2",
    )
    .bind(days.to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(FailureReason {
                error_message: row.try_get("error_message")?,
                count: row.try_get("count")?,
            })
        })
        .collect()
}

/// Confidence histogram bucket (five equal buckets over [0, 1]).
#[derive(Debug, Clone, Serialize)]
pub struct ConfidenceBucket {
    pub bucket: i32,
    pub count: i64,
    pub avg_discrepancy: f64,
}

pub async fn confidence_distribution(pool: &PgPool, days: i64) -> Result<Vec<ConfidenceBucket>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT width_bucket(confidence, 0.0, 1.0, 5) AS bucket,
                COUNT(*) AS count,
                COALESCE(AVG(total_discrepancy), 0) AS avg_discrepancy
         FROM receipts
         WHERE status = 'completed'
           AND created_at >= NOW() - ($1 || ' days')::interval
         GROUP BY 1
         ORDER BY 1",
    )
    .bind(days.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(ConfidenceBucket {
                bucket: row.try_get("bucket")?,
                count: row.try_get("count")?,
                avg_discrepancy: row.try_get("avg_discrepancy")?,
            })
        })
        .collect()
}

/// Most recent non-archived receipts for the dashboard sidebars.
pub async fn recent_receipts(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
) -> Result<Vec<crate::models::receipt::Receipt>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM receipts
         WHERE user_id = $1 AND NOT is_archived
         ORDER BY created_at DESC
         LIMIT $2",
        super::receipt_queries::RECEIPT_COLUMNS
    );
    sqlx::query_as::<_, crate::models::receipt::Receipt>(&sql)
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await
}
