//! CRUD handlers for the site content
//!
//! The handlers are generic over [`Stored`] and [`StoredContent`], so each
//! collection is wired up in the router by naming its record type.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::analytics::TrackRequest;
use crate::app::AppState;
use crate::error::{AppError, AppJson, AppResult};
use crate::models::{CarouselImage, ContactMessage, Record};
use crate::store::{Stored, StoredContent};

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deleted {
    pub success: bool,
    pub id: String,
}

// Record ids live under their own `id:` segment so no id can shadow a list key
fn list_key(collection: &str) -> String {
    format!("{collection}:list")
}

fn active_key(collection: &str) -> String {
    format!("{collection}:active")
}

fn record_key(collection: &str, id: &str) -> String {
    format!("{collection}:id:{id}")
}

fn invalidate<T: Record>(state: &AppState) {
    state.cache.invalidate_prefix(&format!("{}:", T::COLLECTION));
}

// Collections

pub async fn list_records<T: Stored>(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let key = list_key(T::COLLECTION);
    if let Some(cached) = state.cache.get(&key) {
        return Ok(Json(cached));
    }

    let value = serde_json::to_value(T::collection(&state.store).list().await)?;
    state.cache.insert(key, value.clone());
    Ok(Json(value))
}

pub async fn get_record<T: Stored>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let key = record_key(T::COLLECTION, &id);
    if let Some(cached) = state.cache.get(&key) {
        return Ok(Json(cached));
    }

    let value = serde_json::to_value(T::collection(&state.store).get(&id).await?)?;
    state.cache.insert(key, value.clone());
    Ok(Json(value))
}

pub async fn create_record<T: Stored>(
    State(state): State<AppState>,
    AppJson(body): AppJson<Value>,
) -> AppResult<(StatusCode, Json<T>)> {
    let record = T::collection(&state.store).insert(body).await?;
    invalidate::<T>(&state);
    info!("Created {} {}", T::LABEL.to_lowercase(), record.id());
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn update_record<T: Stored>(
    State(state): State<AppState>,
    Path(id): Path<String>,
    AppJson(patch): AppJson<Value>,
) -> AppResult<Json<T>> {
    let record = T::collection(&state.store).update(&id, patch).await?;
    invalidate::<T>(&state);
    info!("Updated {} {}", T::LABEL.to_lowercase(), id);
    Ok(Json(record))
}

pub async fn delete_record<T: Stored>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Deleted>> {
    let removed = T::collection(&state.store).delete(&id).await?;
    invalidate::<T>(&state);
    info!("Deleted {} {}", T::LABEL.to_lowercase(), id);
    Ok(Json(Deleted {
        success: true,
        id: removed.id().to_string(),
    }))
}

pub async fn reorder_records<T: Stored>(
    State(state): State<AppState>,
    AppJson(request): AppJson<ReorderRequest>,
) -> AppResult<Json<Vec<T>>> {
    if request.ids.is_empty() {
        return Err(AppError::validation("ids must not be empty"));
    }
    let records = T::collection(&state.store).reorder(&request.ids).await?;
    invalidate::<T>(&state);
    Ok(Json(records))
}

// Carousel

/// Public slideshow: active images only
pub async fn list_active_carousel(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let key = active_key(CarouselImage::COLLECTION);
    if let Some(cached) = state.cache.get(&key) {
        return Ok(Json(cached));
    }

    let active: Vec<CarouselImage> = state
        .store
        .carousel_images
        .list()
        .await
        .into_iter()
        .filter(|image| image.active)
        .collect();
    let value = serde_json::to_value(active)?;
    state.cache.insert(key, value.clone());
    Ok(Json(value))
}

/// Remove the record, then the hosted file when this server uploaded it
pub async fn delete_carousel_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Deleted>> {
    let removed = state.store.carousel_images.delete(&id).await?;
    invalidate::<CarouselImage>(&state);

    if let Some(public_id) = &removed.public_id {
        let provider = removed.provider.as_deref().unwrap_or(state.images.name());
        if provider == state.images.name() {
            if let Err(e) = state.images.delete(public_id).await {
                warn!("Carousel image {} removed but its file was not: {}", id, e);
            }
        } else {
            warn!(
                "Carousel image {} is hosted on {}, leaving {} in place",
                id, provider, public_id
            );
        }
    }

    info!("Deleted carousel image {}", id);
    Ok(Json(Deleted { success: true, id }))
}

// Singletons

pub async fn get_content<T: StoredContent>(State(state): State<AppState>) -> AppResult<Json<Value>> {
    if let Some(cached) = state.cache.get(T::NAME) {
        return Ok(Json(cached));
    }

    let value = serde_json::to_value(T::singleton(&state.store).get().await)?;
    state.cache.insert(T::NAME, value.clone());
    Ok(Json(value))
}

pub async fn update_content<T: StoredContent>(
    State(state): State<AppState>,
    AppJson(patch): AppJson<Value>,
) -> AppResult<Json<T>> {
    let updated = T::singleton(&state.store).update(patch).await?;
    state.cache.invalidate_prefix(T::NAME);
    info!("Updated {}", T::NAME);
    Ok(Json(updated))
}

// Contact messages

/// Fields a visitor may not set on their own message
const SERVER_FIELDS: [&str; 4] = ["id", "read", "createdAt", "updatedAt"];

pub async fn submit_contact(
    State(state): State<AppState>,
    AppJson(mut body): AppJson<Value>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let fields = body
        .as_object_mut()
        .ok_or_else(|| AppError::BadRequest("expected a JSON object".into()))?;
    for field in SERVER_FIELDS {
        fields.remove(field);
    }

    let message = state.store.messages.insert(body).await?;
    info!("Contact message {} from {}", message.id(), message.email);

    state.notifications.contact_received(&message).await;
    if let Err(e) = state.analytics.track(TrackRequest {
        event_type: "contact_submit".into(),
        path: Some("/contact".into()),
        referrer: None,
    }) {
        warn!("Failed to record contact analytics: {}", e);
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "id": message.id(),
            "message": "Thank you for your message. I will get back to you soon."
        })),
    ))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesQuery {
    #[serde(default)]
    pub unread_only: bool,
}

pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
) -> Json<Vec<ContactMessage>> {
    let messages = state
        .store
        .messages
        .list()
        .await
        .into_iter()
        .filter(|m| !query.unread_only || !m.read)
        .collect();
    Json(messages)
}

pub async fn mark_message_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ContactMessage>> {
    let message = state
        .store
        .messages
        .update(&id, json!({ "read": true }))
        .await?;
    Ok(Json(message))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Deleted>> {
    state.store.messages.delete(&id).await?;
    info!("Deleted message {}", id);
    Ok(Json(Deleted { success: true, id }))
}
