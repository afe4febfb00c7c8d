/// Admin panel endpoints
///
/// Every handler authenticates through [`AdminAuthContext`] and checks the
/// stored account's permissions. Moderation actions go through the ban
/// service, so the identity provider is updated before anything else.
use super::{admin_auth::AdminView, Ack};
use crate::{
    admin::{AuditLogEntry, NewAdminAccount, Permission},
    auth::AdminAuthContext,
    context::AppContext,
    error::{AppError, AppResult},
    identity::UserRecord,
    learning::{Companion, DashboardCounts, Feedback, FeedbackFilter, FeedbackStatus},
    moderation::BanSignal,
    pagination::{PageInfo, PageQuery},
    require_admin_role, require_permission,
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub fn routes() -> Router<AppContext> {
    Router::new()
        // Users and moderation
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/:id", patch(update_user).delete(delete_user))
        .route("/api/admin/ban", post(ban_user).delete(unban_user))
        .route("/api/admin/user-status", get(user_status_log))
        // Admin accounts
        .route("/api/admin/admins", get(list_admins).post(create_admin))
        .route("/api/admin/audit-log", get(audit_log))
        // Dashboard and content
        .route("/api/admin/analytics", get(dashboard))
        .route("/api/admin/analytics/funnel", get(funnel_report))
        .route("/api/admin/analytics/churn", get(churn_report))
        .route("/api/admin/analytics/cohorts", get(cohort_report))
        .route("/api/admin/analytics/companions", get(companion_report))
        .route("/api/admin/analytics/dashboard", get(dashboard_report))
        .route("/api/admin/companions", get(list_companions))
        .route("/api/admin/companions/:id", axum::routing::delete(delete_companion))
        .route("/api/admin/feedback", get(list_feedback))
        .route("/api/admin/feedback/:id", patch(update_feedback))
}

/// Record an admin action; failures are logged and ignored
async fn audit(
    ctx: &AppContext,
    auth: &AdminAuthContext,
    action: &str,
    subject: Option<&str>,
    details: Option<serde_json::Value>,
) {
    if let Err(e) = ctx
        .admin_accounts
        .log_action(&auth.admin_id, action, subject, details)
        .await
    {
        tracing::warn!(action, error = %e, "failed to write audit entry");
    }
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Serialize)]
struct UserListResponse {
    users: Vec<UserRecord>,
    pagination: PageInfo,
}

async fn list_users(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<UserListResponse>> {
    require_permission!(auth, Permission::ViewUsers);

    let page = query.resolve(20, 100);
    let (users, total) = ctx.identity.list_users(page).await?;

    Ok(Json(UserListResponse {
        users,
        pagination: page.info(total),
    }))
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum UserAction {
    Approve,
    Ban,
    Unban,
    Delete,
}

#[derive(Debug, Deserialize)]
struct UpdateUserRequest {
    action: UserAction,
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct UserActionResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<UserRecord>,
}

async fn update_user(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(user_id): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> AppResult<Json<UserActionResponse>> {
    require_permission!(auth, Permission::EditUsers);

    let (user, message) = match req.action {
        UserAction::Approve => {
            // Approving also clears the ban flag, so lifting a ban stays
            // behind ban_users however it is requested
            let target = ctx
                .identity
                .get_user(&user_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;
            if target.is_banned() {
                require_permission!(auth, Permission::BanUsers);
            }
            let user = ctx.ban_service.unban(&user_id, &auth.admin_id).await?;
            (Some(user), "User approved")
        }
        UserAction::Ban => {
            require_permission!(auth, Permission::BanUsers);
            let user = ctx
                .ban_service
                .ban(&user_id, req.reason.as_deref(), &auth.admin_id)
                .await?;
            (Some(user), "User banned")
        }
        UserAction::Unban => {
            require_permission!(auth, Permission::BanUsers);
            let user = ctx.ban_service.unban(&user_id, &auth.admin_id).await?;
            (Some(user), "User unbanned")
        }
        UserAction::Delete => {
            require_permission!(auth, Permission::DeleteUsers);
            ctx.ban_service.delete(&user_id, &auth.admin_id).await?;
            (None, "User deleted")
        }
    };

    let action = match req.action {
        UserAction::Approve => "user.approve",
        UserAction::Ban => "user.ban",
        UserAction::Unban => "user.unban",
        UserAction::Delete => "user.delete",
    };
    audit(&ctx, &auth, action, Some(&user_id), req.reason.map(|r| json!({ "reason": r }))).await;

    Ok(Json(UserActionResponse {
        success: true,
        message: message.to_string(),
        user,
    }))
}

async fn delete_user(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(user_id): Path<String>,
) -> AppResult<Json<Ack>> {
    require_permission!(auth, Permission::DeleteUsers);

    ctx.ban_service.delete(&user_id, &auth.admin_id).await?;
    audit(&ctx, &auth, "user.delete", Some(&user_id), None).await;

    Ok(Json(Ack::new("User deleted")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BanRequest {
    user_id: String,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnbanQuery {
    user_id: Option<String>,
}

async fn ban_user(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Json(req): Json<BanRequest>,
) -> AppResult<Json<UserActionResponse>> {
    require_permission!(auth, Permission::BanUsers);

    if req.user_id.trim().is_empty() {
        return Err(AppError::Validation("User ID is required".to_string()));
    }

    let user = ctx
        .ban_service
        .ban(&req.user_id, req.reason.as_deref(), &auth.admin_id)
        .await?;
    audit(
        &ctx,
        &auth,
        "user.ban",
        Some(&req.user_id),
        Some(json!({ "reason": user.status_reason })),
    )
    .await;

    Ok(Json(UserActionResponse {
        success: true,
        message: "User banned successfully".to_string(),
        user: Some(user),
    }))
}

async fn unban_user(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Query(query): Query<UnbanQuery>,
) -> AppResult<Json<UserActionResponse>> {
    require_permission!(auth, Permission::BanUsers);

    let user_id = query
        .user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::Validation("User ID is required".to_string()))?;

    let user = ctx.ban_service.unban(&user_id, &auth.admin_id).await?;
    audit(&ctx, &auth, "user.unban", Some(&user_id), None).await;

    Ok(Json(UserActionResponse {
        success: true,
        message: "User unbanned successfully".to_string(),
        user: Some(user),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusLogQuery {
    user_id: Option<String>,
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
struct StatusLogResponse {
    entries: Vec<BanSignal>,
}

/// Recent entries from the ban mirror. Informational only.
async fn user_status_log(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Query(query): Query<StatusLogQuery>,
) -> AppResult<Json<StatusLogResponse>> {
    require_permission!(auth, Permission::ViewUsers);

    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let entries = ctx
        .status_mirror
        .recent(query.user_id.as_deref(), limit)
        .await?;

    Ok(Json(StatusLogResponse { entries }))
}

// ============================================================================
// Admin accounts
// ============================================================================

#[derive(Debug, Serialize)]
struct AdminListResponse {
    admins: Vec<AdminView>,
}

async fn list_admins(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
) -> AppResult<Json<AdminListResponse>> {
    require_permission!(auth, Permission::ViewAdmins);

    let admins = ctx.admin_accounts.list().await?;
    Ok(Json(AdminListResponse {
        admins: admins.iter().map(AdminView::from).collect(),
    }))
}

#[derive(Debug, Serialize)]
struct CreatedAdminResponse {
    success: bool,
    admin: AdminView,
}

async fn create_admin(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Json(mut req): Json<NewAdminAccount>,
) -> AppResult<Json<CreatedAdminResponse>> {
    require_permission!(auth, Permission::CreateAdmins);
    // Nobody grants a role above their own
    require_admin_role!(auth, req.role);

    req.created_by = Some(auth.admin_id.clone());
    let account = ctx.admin_accounts.create(req).await?;

    audit(
        &ctx,
        &auth,
        "admin.create",
        Some(&account.id),
        Some(json!({ "role": account.role })),
    )
    .await;

    Ok(Json(CreatedAdminResponse {
        success: true,
        admin: AdminView::from(&account),
    }))
}

#[derive(Debug, Deserialize)]
struct AuditLogQuery {
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
struct AuditLogResponse {
    entries: Vec<AuditLogEntry>,
}

async fn audit_log(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Query(query): Query<AuditLogQuery>,
) -> AppResult<Json<AuditLogResponse>> {
    require_permission!(auth, Permission::ViewAdmins);

    let entries = ctx.admin_accounts.audit_log(query.limit.unwrap_or(100)).await?;
    Ok(Json(AuditLogResponse { entries }))
}

// ============================================================================
// Dashboard and content
// ============================================================================

async fn dashboard(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
) -> AppResult<Json<DashboardCounts>> {
    require_permission!(auth, Permission::ViewAnalytics);

    let week_ago = Utc::now() - Duration::days(7);
    let (total_feedback, average_feedback_rating) = ctx.feedback.summary().await?;

    Ok(Json(DashboardCounts {
        total_users: ctx.identity.count_users().await?,
        total_companions: ctx.companions.count().await?,
        total_sessions: ctx.sessions.count_sessions().await?,
        active_users_last_7_days: ctx.sessions.active_users_since(week_ago).await?,
        total_learning_logs: ctx.learning_logs.count().await?,
        total_feedback,
        average_feedback_rating,
        events_last_7_days: ctx.analytics.counts_by_type(week_ago).await?,
    }))
}

// Reports wrap their payload the same way: `{ "success": true, "data": ... }`

async fn funnel_report(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
) -> AppResult<Json<serde_json::Value>> {
    require_permission!(auth, Permission::ViewAnalytics);
    let report = ctx.reports.funnel().await?;
    Ok(Json(json!({ "success": true, "data": report })))
}

async fn churn_report(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
) -> AppResult<Json<serde_json::Value>> {
    require_permission!(auth, Permission::ViewAnalytics);
    let report = ctx.reports.churn(Utc::now()).await?;
    Ok(Json(json!({ "success": true, "data": report })))
}

async fn cohort_report(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
) -> AppResult<Json<serde_json::Value>> {
    require_permission!(auth, Permission::ViewAnalytics);
    let cohorts = ctx.reports.cohorts().await?;
    Ok(Json(json!({ "success": true, "data": cohorts })))
}

async fn companion_report(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
) -> AppResult<Json<serde_json::Value>> {
    require_permission!(auth, Permission::ViewAnalytics);
    let report = ctx.reports.companions(Utc::now()).await?;
    Ok(Json(json!({ "success": true, "data": report })))
}

async fn dashboard_report(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
) -> AppResult<Json<serde_json::Value>> {
    require_permission!(auth, Permission::ViewAnalytics);
    let report = ctx.reports.dashboard(Utc::now()).await?;
    Ok(Json(json!({ "success": true, "data": report })))
}

#[derive(Debug, Serialize)]
struct CompanionListResponse {
    companions: Vec<Companion>,
    pagination: PageInfo,
}

async fn list_companions(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<CompanionListResponse>> {
    require_permission!(auth, Permission::ViewCompanions);

    let page = query.resolve(20, 100);
    let (companions, total) = ctx.companions.list_all(page).await?;

    Ok(Json(CompanionListResponse {
        companions,
        pagination: page.info(total),
    }))
}

async fn delete_companion(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(companion_id): Path<String>,
) -> AppResult<Json<Ack>> {
    require_permission!(auth, Permission::DeleteCompanions);

    ctx.companions.delete(&companion_id).await?;
    audit(&ctx, &auth, "companion.delete", Some(&companion_id), None).await;

    Ok(Json(Ack::new("Companion deleted")))
}

#[derive(Debug, Serialize)]
struct FeedbackListResponse {
    feedback: Vec<Feedback>,
    pagination: PageInfo,
}

async fn list_feedback(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Query(filter): Query<FeedbackFilter>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<FeedbackListResponse>> {
    require_permission!(auth, Permission::ViewUsers);

    let page = query.resolve(20, 100);
    let (feedback, total) = ctx.feedback.list(None, &filter, page).await?;

    Ok(Json(FeedbackListResponse {
        feedback,
        pagination: page.info(total),
    }))
}

#[derive(Debug, Deserialize)]
struct UpdateFeedbackRequest {
    status: FeedbackStatus,
}

async fn update_feedback(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(feedback_id): Path<String>,
    Json(req): Json<UpdateFeedbackRequest>,
) -> AppResult<Json<Feedback>> {
    require_permission!(auth, Permission::EditUsers);

    let feedback = ctx.feedback.update_status(&feedback_id, req.status).await?;
    audit(
        &ctx,
        &auth,
        "feedback.update",
        Some(&feedback_id),
        Some(json!({ "status": req.status.as_str() })),
    )
    .await;

    Ok(Json(feedback))
}
