use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::jwt::{CurrentUser, Staff},
    error::AppError,
    giftcards::{
        dto::{
            CreateGiftCardRequest, DebitRequest, GiftCardListResponse, GiftCardResponse,
            ListQuery, UpdateGiftCardRequest,
        },
        service,
    },
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/giftcards", get(list_gift_cards))
        .route("/giftcards/:id", get(get_gift_card))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/giftcards", post(create_gift_card))
        .route(
            "/giftcards/:id",
            put(update_gift_card).delete(delete_gift_card),
        )
        .route("/giftcards/:id/debit", post(debit_gift_card))
}

#[instrument(skip(state, _claims))]
pub async fn list_gift_cards(
    State(state): State<AppState>,
    CurrentUser(_claims): CurrentUser,
    Query(q): Query<ListQuery>,
) -> Result<Json<GiftCardListResponse>, AppError> {
    Ok(Json(service::list(&state, q).await?))
}

#[instrument(skip(state, _claims))]
pub async fn get_gift_card(
    State(state): State<AppState>,
    CurrentUser(_claims): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<GiftCardResponse>, AppError> {
    Ok(Json(service::get(&state, id).await?))
}

#[instrument(skip(state, _claims, payload))]
pub async fn create_gift_card(
    State(state): State<AppState>,
    Staff(_claims): Staff,
    Json(payload): Json<CreateGiftCardRequest>,
) -> Result<(StatusCode, Json<GiftCardResponse>), AppError> {
    let created = service::create(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[instrument(skip(state, _claims, payload))]
pub async fn update_gift_card(
    State(state): State<AppState>,
    Staff(_claims): Staff,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateGiftCardRequest>,
) -> Result<Json<GiftCardResponse>, AppError> {
    Ok(Json(service::update(&state, id, payload).await?))
}

#[instrument(skip(state, _claims, payload))]
pub async fn debit_gift_card(
    State(state): State<AppState>,
    Staff(_claims): Staff,
    Path(id): Path<Uuid>,
    Json(payload): Json<DebitRequest>,
) -> Result<Json<GiftCardResponse>, AppError> {
    Ok(Json(service::debit(&state, id, payload).await?))
}

#[instrument(skip(state, _claims))]
pub async fn delete_gift_card(
    State(state): State<AppState>,
    Staff(_claims): Staff,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    service::remove(&state, id).await?;
    Ok(Json(
        serde_json::json!({ "success": true, "message": "gift card deleted" }),
    ))
}
