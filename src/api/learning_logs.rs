/// Learning log endpoints
use crate::{
    auth::UserAuthContext,
    context::AppContext,
    error::AppResult,
    learning::{LearningLog, LearningLogFilter, NewLearningLog},
    pagination::{PageInfo, PageQuery},
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Serialize;

pub fn routes() -> Router<AppContext> {
    Router::new().route("/api/learning-logs", post(create_log).get(list_logs))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LearningLogCreated {
    success: bool,
    learning_log: LearningLog,
}

async fn create_log(
    State(ctx): State<AppContext>,
    auth: UserAuthContext,
    Json(req): Json<NewLearningLog>,
) -> AppResult<(StatusCode, Json<LearningLogCreated>)> {
    let learning_log = ctx.learning_logs.create(&auth.user_id, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(LearningLogCreated {
            success: true,
            learning_log,
        }),
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LearningLogList {
    learning_logs: Vec<LearningLog>,
    pagination: PageInfo,
}

async fn list_logs(
    State(ctx): State<AppContext>,
    auth: UserAuthContext,
    Query(filter): Query<LearningLogFilter>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<LearningLogList>> {
    let page = query.resolve(10, 50);
    let (learning_logs, total) = ctx
        .learning_logs
        .list(&auth.user_id, &filter, page)
        .await?;

    Ok(Json(LearningLogList {
        learning_logs,
        pagination: page.info(total),
    }))
}
