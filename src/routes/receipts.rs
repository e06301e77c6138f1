use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use garde::Validate;
use serde_json::json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::receipt_queries;
use crate::error::AppError;
use crate::models::api::{ApiResponse, Pagination};
use crate::models::job::JobPriority;
use crate::models::receipt::{FeedbackRequest, ListReceiptsQuery, Receipt, ReceiptStatus};
use crate::routes::AuthUser;
use crate::services::image;
use crate::services::usage;

/// Upload size cap, matched by the server-wide body limit layer.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Multipart field name the client must use.
const UPLOAD_FIELD: &str = "receipt";

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 50;

fn receipt_summary(receipt: &Receipt) -> serde_json::Value {
    json!({
        "id": receipt.id,
        "status": receipt.status,
        "processingStage": receipt.processing_stage,
        "hasDiscrepancies": receipt.has_discrepancies,
        "totalDiscrepancy": receipt.total_discrepancy,
        "itemCount": receipt.item_count(),
        "confidence": receipt.confidence,
        "createdAt": receipt.created_at,
        "imageUrl": receipt.image_url,
    })
}

fn receipt_detail(receipt: &Receipt) -> serde_json::Value {
    json!({
        "id": receipt.id,
        "status": receipt.status,
        "processingStage": receipt.processing_stage,
        "extractedData": receipt.extracted_data,
        "analysis": {
            "hasDiscrepancies": receipt.has_discrepancies,
            "totalDiscrepancy": receipt.total_discrepancy,
            "overallConfidence": receipt.confidence,
            "suggestions": receipt.suggestions,
            "aiAnalysis": receipt.ai_note,
            "errorMessage": receipt.error_message,
        },
        "processingMetadata": {
            "totalProcessingTime": receipt.total_processing_ms,
            "analysisTime": receipt.analysis_ms,
            "retryCount": receipt.retry_count,
        },
        "userFeedback": receipt.feedback,
        "imageUrl": receipt.image_url,
        "createdAt": receipt.created_at,
        "updatedAt": receipt.updated_at,
    })
}

/// Load a receipt and enforce owner-or-admin access.
async fn load_owned_receipt(
    state: &AppState,
    auth: &AuthUser,
    receipt_id: Uuid,
    admin_allowed: bool,
) -> Result<Receipt, AppError> {
    let receipt = receipt_queries::get_receipt(&state.db, receipt_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Receipt not found".into()))?;

    let is_owner = receipt.user_id == auth.user.id;
    if !is_owner && !(admin_allowed && auth.user.is_admin()) {
        tracing::warn!(
            security = true,
            user_id = %auth.user.id,
            receipt_id = %receipt_id,
            "denied access to foreign receipt"
        );
        return Err(AppError::Forbidden("Access denied".into()));
    }
    Ok(receipt)
}

/// POST /api/v1/image/upload
///
/// Accepts one image file (≤10 MB, `image/*`) in the `receipt` multipart
/// field, then: quota check, normalize, store, create the receipt in
/// `pending`/`uploaded`, and enqueue a processing job at a priority
/// matching the caller's subscription tier.
pub async fn upload_receipt(
    State(state): State<AppState>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<serde_json::Value>>), AppError> {
    // Quota gate before touching the file.
    let decision = usage::can_upload(auth.user.usage_snapshot(), auth.user.tier(), Utc::now());
    if !decision.allowed {
        return Err(AppError::QuotaExceeded {
            current_usage: decision.current_usage,
            limit: decision.limit,
            subscription_tier: auth.user.subscription_tier.clone(),
        });
    }

    // Exactly one file, under the expected field name.
    let mut image_data: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::Validation("File size too large. Maximum size is 10MB.".into()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name != UPLOAD_FIELD {
            return Err(AppError::Validation(format!(
                "Unexpected file field. Use \"{UPLOAD_FIELD}\" field name."
            )));
        }
        if image_data.is_some() {
            return Err(AppError::Validation("Only one file may be uploaded at a time".into()));
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        if !content_type.starts_with("image/") {
            return Err(AppError::Validation("Only image files are allowed".into()));
        }

        let data = field
            .bytes()
            .await
            .map_err(|_| AppError::Validation("File size too large. Maximum size is 10MB.".into()))?;
        if data.len() > MAX_UPLOAD_BYTES {
            return Err(AppError::Validation("File size too large. Maximum size is 10MB.".into()));
        }

        // Content must actually decode as an image, not just claim to.
        ::image::guess_format(&data)
            .map_err(|_| AppError::Validation("Only image files are allowed".into()))?;

        image_data = Some(data.to_vec());
    }

    let original = image_data.ok_or_else(|| AppError::Validation("No image file provided".into()))?;

    // Normalization failure degrades to the original bytes.
    let normalized = image::normalize(&original);

    let key = format!("receipts/{}.jpg", Uuid::new_v4());
    let stored = state.storage.upload_bytes(&key, &normalized, "image/jpeg").await?;

    let receipt =
        receipt_queries::create_receipt(&state.db, auth.user.id, &stored.url, &stored.key).await?;

    let priority =
        if auth.user.tier().is_priority() { JobPriority::High } else { JobPriority::Normal };

    let enqueued = state.queue.enqueue(receipt.id, &stored.url, auth.user.id, priority).await?;

    receipt_queries::set_job_info(&state.db, receipt.id, enqueued.job_id, enqueued.queue_position)
        .await?;

    metrics::counter!("receipt_jobs_total").increment(1);

    tracing::info!(
        user_id = %auth.user.id,
        receipt_id = %receipt.id,
        job_id = %enqueued.job_id,
        priority = %priority,
        file_size = original.len(),
        "receipt uploaded and queued"
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(
            "Receipt uploaded successfully and queued for processing",
            json!({
                "receipt": {
                    "id": receipt.id,
                    "status": receipt.status,
                    "processingStage": receipt.processing_stage,
                    "imageUrl": stored.url,
                    "createdAt": receipt.created_at,
                },
                "processing": {
                    "jobId": enqueued.job_id,
                    "queuePosition": enqueued.queue_position,
                    "estimatedTime": enqueued.estimated_time,
                    "priority": enqueued.priority,
                },
            }),
        )),
    ))
}

/// GET /api/v1/image/{id}
///
/// Full receipt for the owner (or an admin). Reads have no side effects;
/// live queue status is joined in while the receipt is still in flight.
pub async fn get_receipt(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let receipt = load_owned_receipt(&state, &auth, id, true).await?;

    let job_status = match receipt.job_id {
        Some(job_id) if receipt.status().is_in_flight() => state.queue.status(job_id).await?,
        _ => None,
    };

    Ok(Json(ApiResponse::success(json!({
        "receipt": receipt_detail(&receipt),
        "jobStatus": job_status,
    }))))
}

/// GET /api/v1/image
///
/// Paginated, filterable, newest-first listing scoped to the caller.
pub async fn list_receipts(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListReceiptsQuery>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(
            raw.parse::<ReceiptStatus>()
                .map_err(|_| AppError::Validation("Invalid status filter".into()))?,
        ),
    };

    let (receipts, total) = receipt_queries::list_receipts(
        &state.db,
        auth.user.id,
        page,
        limit,
        status,
        query.has_discrepancies,
    )
    .await?;

    let mut entries = Vec::with_capacity(receipts.len());
    for receipt in &receipts {
        let job_status = match receipt.job_id {
            Some(job_id) if receipt.status().is_in_flight() => state.queue.status(job_id).await?,
            _ => None,
        };
        let mut entry = receipt_summary(receipt);
        entry["jobStatus"] = serde_json::to_value(job_status)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        entries.push(entry);
    }

    Ok(Json(ApiResponse::success(json!({
        "receipts": entries,
        "pagination": Pagination::new(page, limit, total),
    }))))
}

/// GET /api/v1/image/jobs/{job_id}/status
///
/// Queue-level status; once the job is terminal the persisted receipt is
/// joined into the response.
pub async fn get_job_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let snapshot = state
        .queue
        .status(job_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Job not found".into()))?;

    if snapshot.user_id != auth.user.id && !auth.user.is_admin() {
        return Err(AppError::Forbidden("Access denied".into()));
    }

    let receipt = if snapshot.state.is_terminal() {
        receipt_queries::get_receipt(&state.db, snapshot.receipt_id).await?
    } else {
        None
    };

    Ok(Json(ApiResponse::success(json!({
        "jobStatus": snapshot,
        "receipt": receipt.as_ref().map(receipt_detail),
    }))))
}

/// GET /api/v1/image/jobs
pub async fn get_user_jobs(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let jobs = state.queue.jobs_for_user(auth.user.id, 10).await?;
    Ok(Json(ApiResponse::success(json!({ "jobs": jobs }))))
}

/// POST /api/v1/image/{id}/feedback
pub async fn provide_feedback(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<FeedbackRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    req.validate()?;

    // Feedback is the owner's alone; admins do not write it.
    let receipt = load_owned_receipt(&state, &auth, id, false).await?;

    let feedback = json!({
        "isAccurate": req.is_accurate,
        "correctedItems": req.corrected_items.unwrap_or_default(),
        "comments": req.comments.unwrap_or_default(),
        "rating": req.rating,
    });
    receipt_queries::set_feedback(&state.db, receipt.id, &feedback).await?;

    tracing::info!(user_id = %auth.user.id, receipt_id = %receipt.id, "feedback recorded");

    Ok(Json(ApiResponse::success_with_message(
        "Feedback saved successfully",
        json!({ "feedback": feedback }),
    )))
}

/// PATCH /api/v1/image/{id}/archive
pub async fn archive_receipt(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let receipt = load_owned_receipt(&state, &auth, id, false).await?;
    receipt_queries::archive_receipt(&state.db, receipt.id).await?;

    tracing::info!(user_id = %auth.user.id, receipt_id = %receipt.id, "receipt archived");

    Ok(Json(ApiResponse::message("Receipt archived successfully")))
}

/// DELETE /api/v1/image/{id}
pub async fn delete_receipt(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let receipt = load_owned_receipt(&state, &auth, id, true).await?;

    // Best-effort: a dangling object must not block the delete.
    if let Err(e) = state.storage.delete(&receipt.storage_key).await {
        tracing::warn!(receipt_id = %receipt.id, error = %e, "failed to delete stored image");
    }

    receipt_queries::delete_receipt(&state.db, receipt.id).await?;

    tracing::info!(user_id = %auth.user.id, receipt_id = %receipt.id, "receipt deleted");

    Ok(Json(ApiResponse::message("Receipt deleted successfully")))
}
