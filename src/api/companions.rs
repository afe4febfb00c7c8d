/// Companion and bookmark endpoints
use super::Ack;
use crate::{
    auth::UserAuthContext,
    context::AppContext,
    error::AppResult,
    learning::{Companion, CompanionFilter, NewCompanion},
    pagination::PageQuery,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/companions", post(create_companion).get(list_companions))
        .route("/api/companions/:id", get(get_companion).delete(delete_companion))
        .route("/api/companions/:id/bookmark", post(add_bookmark).delete(remove_bookmark))
        .route("/api/bookmarks", get(list_bookmarks))
}

#[derive(Debug, Serialize)]
struct CompanionList {
    companions: Vec<Companion>,
}

async fn create_companion(
    State(ctx): State<AppContext>,
    auth: UserAuthContext,
    Json(req): Json<NewCompanion>,
) -> AppResult<(StatusCode, Json<Companion>)> {
    let companion = ctx.companions.create(&auth.user_id, req).await?;
    tracing::info!(companion_id = %companion.id, user_id = %auth.user_id, "companion created");
    Ok((StatusCode::CREATED, Json(companion)))
}

async fn list_companions(
    State(ctx): State<AppContext>,
    auth: UserAuthContext,
    Query(filter): Query<CompanionFilter>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<CompanionList>> {
    let companions = ctx
        .companions
        .list_for_user(&auth.user_id, &filter, query.resolve(10, 100))
        .await?;
    Ok(Json(CompanionList { companions }))
}

async fn get_companion(
    State(ctx): State<AppContext>,
    auth: UserAuthContext,
    Path(id): Path<String>,
) -> AppResult<Json<Companion>> {
    Ok(Json(ctx.companions.get_owned(&auth.user_id, &id).await?))
}

async fn delete_companion(
    State(ctx): State<AppContext>,
    auth: UserAuthContext,
    Path(id): Path<String>,
) -> AppResult<Json<Ack>> {
    ctx.companions.delete_owned(&auth.user_id, &id).await?;
    Ok(Json(Ack::new("Companion deleted")))
}

#[derive(Debug, Default, Deserialize)]
struct BookmarkRequest {
    /// Page to revalidate on the front end
    pathname: Option<String>,
}

async fn add_bookmark(
    State(ctx): State<AppContext>,
    auth: UserAuthContext,
    Path(id): Path<String>,
    body: Option<Json<BookmarkRequest>>,
) -> AppResult<Json<Ack>> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    ctx.companions
        .add_bookmark(&auth.user_id, &id, req.pathname.as_deref())
        .await?;
    Ok(Json(Ack::new("Bookmark added")))
}

async fn remove_bookmark(
    State(ctx): State<AppContext>,
    auth: UserAuthContext,
    Path(id): Path<String>,
) -> AppResult<Json<Ack>> {
    let removed = ctx.companions.remove_bookmark(&auth.user_id, &id).await?;
    let message = if removed { "Bookmark removed" } else { "Bookmark not found" };
    Ok(Json(Ack::new(message)))
}

async fn list_bookmarks(
    State(ctx): State<AppContext>,
    auth: UserAuthContext,
) -> AppResult<Json<CompanionList>> {
    let companions = ctx.companions.bookmarked(&auth.user_id).await?;
    Ok(Json(CompanionList { companions }))
}
