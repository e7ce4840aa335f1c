use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::model::{Channel, Playlist, generate_id, unix_now};
use crate::storage::Storage;
use crate::{bad_request, server_error};

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Storage>,
}

impl AppState {
    pub fn new(storage: Storage) -> Self {
        AppState {
            storage: Arc::new(storage),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: &'static str,
}

fn success<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

fn ok(verb: &'static str) -> Response {
    success(OkResponse { ok: verb })
}

// Bodies are decoded regardless of Content-Type so plain fetch() calls work.
// A bare `null` body decodes to the zero value.
fn decode<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice::<Option<T>>(body)
        .map(Option::unwrap_or_default)
        .map_err(|e| {
            tracing::info!(error = %e, "rejected request body");
            bad_request(&e.to_string())
        })
}

/// Playlist id addressed by a `/api/playlists/...` path: its last non-empty
/// segment, or the empty string when there is none.
pub fn playlist_id_from_path(rest: &str) -> &str {
    rest.rsplit('/').find(|s| !s.is_empty()).unwrap_or("")
}

pub async fn healthcheck() -> Response {
    success(serde_json::json!({ "status": "ok" }))
}

pub async fn get_data(State(state): State<AppState>) -> Response {
    success(state.storage.read_all())
}

pub async fn list_playlists(State(state): State<AppState>) -> Response {
    success(state.storage.playlists())
}

pub async fn upsert_playlist(State(state): State<AppState>, body: Bytes) -> Response {
    let mut playlist: Playlist = match decode(&body) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    if playlist.id.is_empty() {
        playlist.id = generate_id();
    }
    if playlist.created_at == 0 {
        playlist.created_at = unix_now();
    }

    if let Err(e) = state.storage.upsert_playlist(playlist.clone()) {
        tracing::error!(id = %playlist.id, error = %e, "failed to save playlist");
        return server_error(&e.to_string());
    }

    tracing::info!(id = %playlist.id, channels = playlist.channels.len(), "saved playlist");
    success(playlist)
}

pub async fn delete_playlist(State(state): State<AppState>, Path(rest): Path<String>) -> Response {
    remove_playlist(&state, playlist_id_from_path(&rest))
}

pub async fn delete_playlist_without_id(State(state): State<AppState>) -> Response {
    remove_playlist(&state, "")
}

fn remove_playlist(state: &AppState, id: &str) -> Response {
    if let Err(e) = state.storage.delete_playlist(id) {
        tracing::error!(id = %id, error = %e, "failed to delete playlist");
        return server_error(&e.to_string());
    }

    tracing::info!(id = %id, "deleted playlist");
    ok("deleted")
}

pub async fn list_history(State(state): State<AppState>) -> Response {
    success(state.storage.history())
}

pub async fn record_history(State(state): State<AppState>, body: Bytes) -> Response {
    let mut channel: Channel = match decode(&body) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    if channel.id.is_empty() {
        channel.id = generate_id();
    }
    channel.added_at = unix_now();

    if let Err(e) = state.storage.record_history(channel.clone()) {
        tracing::error!(url = %channel.url, error = %e, "failed to record history");
        return server_error(&e.to_string());
    }

    tracing::info!(url = %channel.url, "recorded history entry");
    success(channel)
}

pub async fn clear_history(State(state): State<AppState>) -> Response {
    if let Err(e) = state.storage.clear_history() {
        tracing::error!(error = %e, "failed to clear history");
        return server_error(&e.to_string());
    }

    tracing::info!("cleared history");
    ok("cleared")
}
