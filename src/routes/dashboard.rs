use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::app_state::AppState;
use crate::db::{dashboard_queries, user_queries};
use crate::error::AppError;
use crate::models::api::ApiResponse;
use crate::routes::{AdminUser, AuthUser};
use crate::services::usage;

/// GET /api/v1/dashboard/user
///
/// Per-user overview: status counts, discrepancy totals, recent
/// receipts, six-month trend and the quota snapshot.
pub async fn user_dashboard(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let stats = dashboard_queries::user_receipt_stats(&state.db, auth.user.id).await?;
    let recent = dashboard_queries::recent_receipts(&state.db, auth.user.id, 5).await?;
    let trends = dashboard_queries::monthly_trend(&state.db, auth.user.id).await?;

    let now = Utc::now();
    let tier = auth.user.tier();
    let snapshot = auth.user.usage_snapshot();
    let decision = usage::can_upload(snapshot, tier, now);

    let recent_entries: Vec<serde_json::Value> = recent
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "status": r.status,
                "hasDiscrepancies": r.has_discrepancies,
                "totalDiscrepancy": r.total_discrepancy,
                "createdAt": r.created_at,
            })
        })
        .collect();

    Ok(Json(ApiResponse::success(json!({
        "stats": stats,
        "recentReceipts": recent_entries,
        "monthlyTrends": trends,
        "usageStats": {
            "monthlyUploads": decision.current_usage,
            "totalUploads": snapshot.total_uploads,
            "remainingUploads": usage::remaining_uploads(snapshot, tier, now),
            "currentLimit": decision.limit,
            "subscriptionStatus": auth.user.subscription_tier,
        },
    }))))
}

/// GET /api/v1/dashboard/admin
///
/// System overview: totals, queue stats, recent registrations, top
/// uploaders and 30-day daily activity. Admin only.
pub async fn admin_dashboard(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let system = dashboard_queries::system_receipt_stats(&state.db).await?;
    let (total_users, active_users) = user_queries::count_users(&state.db).await?;
    let queue_stats = state.queue.stats().await?;
    let recent_users = user_queries::recent_users(&state.db, 10).await?;
    let top_users = user_queries::top_users_by_uploads(&state.db, 10).await?;
    let daily = dashboard_queries::daily_stats(&state.db, 30).await?;

    let user_entry = |u: &crate::models::user::User| {
        json!({
            "id": u.id,
            "name": u.name,
            "email": u.email,
            "subscriptionStatus": u.subscription_tier,
            "totalUploads": u.total_uploads,
            "createdAt": u.created_at,
        })
    };

    Ok(Json(ApiResponse::success(json!({
        "systemStats": {
            "totalUsers": total_users,
            "activeUsers": active_users,
            "totalReceipts": system.total_receipts,
            "completedReceipts": system.completed_receipts,
            "processingReceipts": system.processing_receipts,
            "failedReceipts": system.failed_receipts,
            "receiptsWithDiscrepancies": system.receipts_with_discrepancies,
            "successRate": system.success_rate,
        },
        "queueStats": queue_stats,
        "recentUsers": recent_users.iter().map(user_entry).collect::<Vec<_>>(),
        "topUsers": top_users.iter().map(user_entry).collect::<Vec<_>>(),
        "dailyStats": daily,
    }))))
}

/// GET /api/v1/dashboard/health
///
/// Pipeline health snapshot: database, cache and queue. Degraded state
/// answers 503 so load balancers and uptime checks can react.
pub async fn system_health(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<(StatusCode, Json<ApiResponse<serde_json::Value>>), AppError> {
    let database_ok = sqlx::query("SELECT 1").execute(&state.db).await.is_ok();
    let cache_ok = state.cache.health_check().await.is_ok();
    let queue_stats = state.queue.stats().await.ok();

    let healthy = database_ok && cache_ok && queue_stats.is_some();
    let status_code = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    let body = json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "timestamp": Utc::now(),
        "services": {
            "database": if database_ok { "healthy" } else { "unhealthy" },
            "redis": if cache_ok { "healthy" } else { "unhealthy" },
            "queue": if queue_stats.is_some() { "healthy" } else { "unhealthy" },
        },
        "metrics": {
            "queueSize": queue_stats.as_ref().map(|s| s.waiting()).unwrap_or(0),
            "activeJobs": queue_stats.as_ref().map(|s| s.active).unwrap_or(0),
            "delayedJobs": queue_stats.as_ref().map(|s| s.delayed).unwrap_or(0),
        },
    });

    Ok((status_code, Json(ApiResponse::success(body))))
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub days: Option<i64>,
}

/// GET /api/v1/dashboard/analytics
///
/// Processing-time aggregates, failure reasons and the confidence
/// histogram over a trailing window. Admin only.
pub async fn processing_analytics(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let days = query.days.unwrap_or(7).clamp(1, 90);

    let processing = dashboard_queries::processing_analytics(&state.db, days).await?;
    let failures = dashboard_queries::failure_reasons(&state.db, days, 10).await?;
    let confidence = dashboard_queries::confidence_distribution(&state.db, days).await?;

    Ok(Json(ApiResponse::success(json!({
        "processingAnalytics": processing,
        "errorAnalysis": failures,
        "confidenceDistribution": confidence,
    }))))
}
